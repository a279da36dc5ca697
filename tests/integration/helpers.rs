//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode, header};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use migrator_api::{AppState, build_router};
use migrator_core::config::AppConfig;
use migrator_worker::testing::{FakeBackend, FakeCloud, FakeContextFactory, fast_config};

const BOUNDARY: &str = "migrator-test-boundary";

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Shared state behind the router
    pub state: AppState,
    /// Fakes handed to every submission
    pub fakes: FakeContextFactory,
    /// Upload directory and log file live here
    pub dir: TempDir,
}

/// A response with its body read as text.
pub struct TestResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Body
    pub body: String,
}

impl TestResponse {
    /// Body parsed as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("JSON body")
    }
}

impl TestApp {
    /// Create an app over the given fakes.
    pub fn new(source: FakeCloud, target: FakeCloud, backend: FakeBackend) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).expect("upload dir");

        let mut config: AppConfig = fast_config();
        config.migration.upload_dir = uploads.to_string_lossy().into_owned();
        config.logging.file = dir
            .path()
            .join("migration.log")
            .to_string_lossy()
            .into_owned();
        let config = Arc::new(config);

        let fakes = FakeContextFactory {
            source: Arc::new(source),
            target: Arc::new(target),
            backend: Arc::new(backend),
            config: Arc::clone(&config),
        };
        let state = AppState::new(config, Arc::new(fakes.clone()));
        let router = build_router(state.clone());

        Self {
            router,
            state,
            fakes,
            dir,
        }
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        TestResponse {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    /// GET `uri`.
    pub async fn get(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        self.send(request).await
    }

    /// POST a migration form.
    pub async fn submit(&self, form: &MigrationForm) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri("/migrate")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(form.encode()))
            .expect("request");
        self.send(request).await
    }
}

/// Builder for the `POST /migrate` multipart body.
#[derive(Debug, Clone, Default)]
pub struct MigrationForm {
    fields: Vec<(String, String)>,
    files: Vec<(String, String, Vec<u8>)>,
}

impl MigrationForm {
    /// A complete form submitting `manifest` as `file_name`.
    pub fn new(file_name: &str, manifest: &str) -> Self {
        Self::credentials_only()
            .file("manifest_file", file_name, manifest.as_bytes())
            .field("source_pool", "volumes")
            .field("target_pool", "volumes-b")
    }

    /// Login fields of both clouds and nothing else.
    pub fn credentials_only() -> Self {
        let mut form = Self::default();
        for side in ["source", "target"] {
            form = form
                .field(&format!("{side}_auth_url"), &format!("http://{side}:5000/v3"))
                .field(&format!("{side}_project_name"), "admin")
                .field(&format!("{side}_username"), "admin")
                .field(&format!("{side}_password"), "secret")
                .field(&format!("{side}_user_domain_name"), "Default")
                .field(&format!("{side}_project_domain_name"), "Default");
        }
        form
    }

    /// Form without a manifest file.
    pub fn without_manifest() -> Self {
        let mut form = Self::new("unused.csv", "");
        form.files.clear();
        form
    }

    /// Set a text field, replacing an earlier value.
    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.fields.retain(|(n, _)| n != name);
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    /// Add a file part.
    pub fn file(mut self, name: &str, file_name: &str, data: &[u8]) -> Self {
        self.files
            .push((name.to_string(), file_name.to_string(), data.to_vec()));
        self
    }

    fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in &self.fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, file_name, data) in &self.files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }
}

/// Job id from a submission answer (`Migration job <id> ...`).
pub fn job_id(body: &str) -> String {
    body.split_whitespace()
        .nth(2)
        .expect("job id in body")
        .trim_end_matches('.')
        .to_string()
}
