//! Request DTOs with validation.

use std::collections::HashMap;

use bytes::Bytes;
use validator::Validate;

use migrator_cloud::Credentials;
use migrator_core::error::AppError;
use migrator_core::types::ReplicationStrategy;

/// Domain used when the form leaves a domain field empty.
const DEFAULT_DOMAIN: &str = "Default";

/// A file part of the submission form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// File name as sent by the client.
    pub file_name: String,
    /// File content.
    pub data: Bytes,
}

/// Login details of one cloud, as submitted.
#[derive(Debug, Clone, Validate)]
pub struct CloudCredentialsForm {
    /// Identity endpoint.
    #[validate(length(min = 1, message = "auth_url is required"))]
    pub auth_url: String,
    /// Project name.
    #[validate(length(min = 1, message = "project_name is required"))]
    pub project_name: String,
    /// User name.
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    /// Password.
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
    /// User domain.
    pub user_domain_name: String,
    /// Project domain.
    pub project_domain_name: String,
}

impl CloudCredentialsForm {
    /// Read the `<prefix>_*` fields.
    fn from_fields(fields: &HashMap<String, String>, prefix: &str) -> Self {
        let field = |name: &str| {
            fields
                .get(&format!("{prefix}_{name}"))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };
        let domain = |name: &str| {
            let value = field(name);
            if value.is_empty() {
                DEFAULT_DOMAIN.to_string()
            } else {
                value
            }
        };
        Self {
            auth_url: field("auth_url"),
            project_name: field("project_name"),
            username: field("username"),
            password: fields
                .get(&format!("{prefix}_password"))
                .cloned()
                .unwrap_or_default(),
            user_domain_name: domain("user_domain_name"),
            project_domain_name: domain("project_domain_name"),
        }
    }
}

impl From<CloudCredentialsForm> for Credentials {
    fn from(form: CloudCredentialsForm) -> Self {
        Self {
            auth_url: form.auth_url,
            project_name: form.project_name,
            username: form.username,
            password: form.password,
            user_domain_name: form.user_domain_name,
            project_domain_name: form.project_domain_name,
        }
    }
}

/// `POST /migrate` form, without its files.
#[derive(Debug, Clone, Validate)]
pub struct MigrateRequest {
    /// Source cloud login.
    #[validate(nested)]
    pub source: CloudCredentialsForm,
    /// Target cloud login.
    #[validate(nested)]
    pub target: CloudCredentialsForm,
    /// Pool of the source volumes.
    #[validate(length(min = 1, message = "source_pool is required"))]
    pub source_pool: String,
    /// Pool of the target volumes.
    #[validate(length(min = 1, message = "target_pool is required"))]
    pub target_pool: String,
    /// VM-level and pair-level concurrency.
    #[validate(range(min = 1, message = "concurrency must be at least 1"))]
    pub concurrency: usize,
    /// Replication strategy.
    pub migration_method: ReplicationStrategy,
    /// Answer as soon as the job is accepted.
    pub detach: bool,
}

impl MigrateRequest {
    /// Build the request from the form's text fields.
    ///
    /// Missing `concurrency` falls back to `default_concurrency`, missing
    /// `migration_method` to `snapshot`. Pools may also be sent as
    /// `source_ceph_pool` / `target_ceph_pool`.
    pub fn from_fields(
        fields: &HashMap<String, String>,
        default_concurrency: usize,
    ) -> Result<Self, AppError> {
        let text = |name: &str| fields.get(name).map(|v| v.trim()).unwrap_or_default();
        let pool = |name: &str, alias: &str| match text(name) {
            "" => text(alias).to_string(),
            value => value.to_string(),
        };

        let concurrency = match text("concurrency") {
            "" => default_concurrency,
            raw => raw
                .parse()
                .map_err(|_| AppError::validation(format!("Invalid concurrency '{raw}'")))?,
        };
        let migration_method = match text("migration_method") {
            "" => ReplicationStrategy::default(),
            raw => raw.parse()?,
        };
        let detach = match text("detach") {
            "" | "false" | "0" | "off" | "no" => false,
            "true" | "1" | "on" | "yes" => true,
            raw => return Err(AppError::validation(format!("Invalid detach flag '{raw}'"))),
        };

        Ok(Self {
            source: CloudCredentialsForm::from_fields(fields, "source"),
            target: CloudCredentialsForm::from_fields(fields, "target"),
            source_pool: pool("source_pool", "source_ceph_pool"),
            target_pool: pool("target_pool", "target_ceph_pool"),
            concurrency,
            migration_method,
            detach,
        })
    }
}

#[cfg(test)]
mod tests {
    use migrator_core::error::ErrorKind;

    use super::*;

    fn fields(extra: &[(&str, &str)]) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = [
            ("source_auth_url", "http://src:5000/v3"),
            ("source_project_name", "admin"),
            ("source_username", "admin"),
            ("source_password", "secret"),
            ("target_auth_url", "http://dst:5000"),
            ("target_project_name", "admin"),
            ("target_username", "admin"),
            ("target_password", "secret"),
            ("source_pool", "volumes"),
            ("target_pool", "volumes"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            map.insert(k.to_string(), v.to_string());
        }
        map
    }

    #[test]
    fn test_defaults() {
        let request = MigrateRequest::from_fields(&fields(&[]), 3).expect("parse");
        assert_eq!(request.concurrency, 3);
        assert_eq!(request.migration_method, ReplicationStrategy::Snapshot);
        assert!(!request.detach);
        assert_eq!(request.source.user_domain_name, "Default");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_explicit_values() {
        let request = MigrateRequest::from_fields(
            &fields(&[
                ("concurrency", "4"),
                ("migration_method", "full_migrate"),
                ("detach", "true"),
                ("target_user_domain_name", "corp"),
            ]),
            1,
        )
        .expect("parse");
        assert_eq!(request.concurrency, 4);
        assert_eq!(request.migration_method, ReplicationStrategy::FullCopy);
        assert!(request.detach);
        assert_eq!(request.target.user_domain_name, "corp");
    }

    #[test]
    fn test_ceph_pool_aliases() {
        let mut map = fields(&[("source_ceph_pool", "ssd"), ("target_ceph_pool", "ssd-b")]);
        map.remove("source_pool");
        map.remove("target_pool");
        let request = MigrateRequest::from_fields(&map, 1).expect("parse");
        assert_eq!(request.source_pool, "ssd");
        assert_eq!(request.target_pool, "ssd-b");

        // The primary name wins when both are sent.
        let request =
            MigrateRequest::from_fields(&fields(&[("source_ceph_pool", "ssd")]), 1).expect("parse");
        assert_eq!(request.source_pool, "volumes");
    }

    #[test]
    fn test_invalid_values() {
        let err = MigrateRequest::from_fields(&fields(&[("concurrency", "many")]), 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        let err =
            MigrateRequest::from_fields(&fields(&[("migration_method", "rsync")]), 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_validation_catches_missing_fields() {
        let mut map = fields(&[("concurrency", "0")]);
        map.remove("source_password");
        let request = MigrateRequest::from_fields(&map, 1).expect("parse");
        let errors = request.validate().unwrap_err().to_string();
        assert!(errors.contains("concurrency"));
        assert!(errors.contains("password"));
    }
}
