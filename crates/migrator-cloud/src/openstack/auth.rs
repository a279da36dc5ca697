//! Keystone v3 password authentication and service catalog lookup.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing;

use migrator_core::error::{AppError, ErrorKind};
use migrator_core::result::AppResult;

/// Refresh tokens this long before they expire.
const TOKEN_REFRESH_MARGIN_SECONDS: i64 = 120;

/// Credentials of one cloud environment, as submitted with a migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Identity endpoint, with or without the `/v3` suffix.
    pub auth_url: String,
    /// Project to scope the token to.
    pub project_name: String,
    /// User name.
    pub username: String,
    /// Password.
    #[serde(skip_serializing)]
    pub password: String,
    /// Domain of the user.
    pub user_domain_name: String,
    /// Domain of the project.
    pub project_domain_name: String,
}

impl Credentials {
    /// Identity v3 base URL.
    pub fn identity_url(&self) -> String {
        let base = self.auth_url.trim_end_matches('/');
        if base.ends_with("/v3") {
            base.to_string()
        } else {
            format!("{base}/v3")
        }
    }

    /// Request body for a project-scoped password token.
    pub(crate) fn token_request(&self) -> serde_json::Value {
        json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": self.username,
                            "domain": { "name": self.user_domain_name },
                            "password": self.password,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": self.project_name,
                        "domain": { "name": self.project_domain_name },
                    }
                }
            }
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Deserialize)]
struct Endpoint {
    interface: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    token: TokenPayload,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    expires_at: DateTime<Utc>,
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

/// An issued token with its service catalog.
#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub catalog: Vec<CatalogEntry>,
}

impl Token {
    fn is_fresh(&self) -> bool {
        self.expires_at - Duration::seconds(TOKEN_REFRESH_MARGIN_SECONDS) > Utc::now()
    }

    /// URL of the first endpoint of one of `service_types` on `interface`.
    pub fn endpoint(&self, service_types: &[&str], interface: &str) -> AppResult<String> {
        service_types
            .iter()
            .find_map(|wanted| {
                self.catalog
                    .iter()
                    .filter(|entry| entry.service_type == *wanted)
                    .flat_map(|entry| entry.endpoints.iter())
                    .find(|ep| ep.interface == interface)
            })
            .map(|ep| ep.url.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                AppError::cloud(format!(
                    "No {interface} endpoint for service {service_types:?} in catalog"
                ))
            })
    }
}

/// Authenticated session against one cloud, refreshing its token as needed.
#[derive(Debug)]
pub(crate) struct Session {
    http: Client,
    credentials: Credentials,
    token: RwLock<Option<Token>>,
}

impl Session {
    pub fn new(http: Client, credentials: Credentials) -> Self {
        Self {
            http,
            credentials,
            token: RwLock::new(None),
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Current token, authenticating when absent or close to expiry.
    pub async fn token(&self) -> AppResult<Token> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_fresh() {
                return Ok(token.clone());
            }
        }

        let mut guard = self.token.write().await;
        if let Some(token) = guard.as_ref() {
            if token.is_fresh() {
                return Ok(token.clone());
            }
        }
        let token = self.authenticate().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn authenticate(&self) -> AppResult<Token> {
        let url = format!("{}/auth/tokens", self.credentials.identity_url());
        tracing::debug!("Authenticating user '{}' at {}", self.credentials.username, url);

        let response = self
            .http
            .post(&url)
            .json(&self.credentials.token_request())
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Cloud, format!("POST {url} failed: {e}"), e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::cloud(format!(
                "Authentication at {url} returned {status}: {body}"
            )));
        }

        let value = response
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AppError::cloud("Identity response has no X-Subject-Token header"))?;

        let body: TokenBody = response.json().await.map_err(|e| {
            AppError::with_source(ErrorKind::Cloud, format!("Unreadable token body: {e}"), e)
        })?;

        tracing::info!(
            "Authenticated to {} as '{}' (project '{}')",
            self.credentials.auth_url,
            self.credentials.username,
            self.credentials.project_name
        );

        Ok(Token {
            value,
            expires_at: body.token.expires_at,
            catalog: body.token.catalog,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(catalog: serde_json::Value) -> Token {
        Token {
            value: "t".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            catalog: serde_json::from_value(catalog).expect("catalog"),
        }
    }

    #[test]
    fn test_identity_url_normalization() {
        let mut creds = Credentials {
            auth_url: "http://keystone:5000".to_string(),
            ..Default::default()
        };
        assert_eq!(creds.identity_url(), "http://keystone:5000/v3");
        creds.auth_url = "http://keystone:5000/v3/".to_string();
        assert_eq!(creds.identity_url(), "http://keystone:5000/v3");
    }

    #[test]
    fn test_token_request_shape() {
        let creds = Credentials {
            auth_url: "http://keystone:5000/v3".to_string(),
            project_name: "admin".to_string(),
            username: "ops".to_string(),
            password: "secret".to_string(),
            user_domain_name: "Default".to_string(),
            project_domain_name: "Default".to_string(),
        };
        let body = creds.token_request();
        assert_eq!(body["auth"]["identity"]["password"]["user"]["name"], "ops");
        assert_eq!(body["auth"]["scope"]["project"]["name"], "admin");
    }

    #[test]
    fn test_endpoint_lookup_by_interface() {
        let token = token(serde_json::json!([
            {"type": "compute", "endpoints": [
                {"interface": "internal", "url": "http://nova-int:8774/v2.1"},
                {"interface": "public", "url": "http://nova:8774/v2.1/"}
            ]},
            {"type": "volumev3", "endpoints": [
                {"interface": "public", "url": "http://cinder:8776/v3/p1"}
            ]}
        ]));
        assert_eq!(
            token.endpoint(&["compute"], "public").unwrap(),
            "http://nova:8774/v2.1"
        );
        assert_eq!(
            token.endpoint(&["block-storage", "volumev3"], "public").unwrap(),
            "http://cinder:8776/v3/p1"
        );
        assert!(token.endpoint(&["network"], "public").is_err());
    }

    #[test]
    fn test_expiring_token_is_not_fresh() {
        let mut t = token(serde_json::json!([]));
        assert!(t.is_fresh());
        t.expires_at = Utc::now() + Duration::seconds(30);
        assert!(!t.is_fresh());
    }
}
