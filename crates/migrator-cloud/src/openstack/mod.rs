//! OpenStack cloud provider.

pub mod auth;
pub mod compute;
pub mod image;
pub mod network;
pub mod volume;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing;

use migrator_core::config::CloudConfig;
use migrator_core::error::{AppError, ErrorKind};
use migrator_core::result::AppResult;
use migrator_core::traits::cloud::{
    CloudProvider, FixedAddress, Flavor, Server, ServerCreateRequest, SubnetRef, Volume,
};

pub use self::auth::Credentials;
use self::auth::Session;

/// Compute API microversion. 2.47 embeds flavor details in servers and
/// 2.67 accepts a volume type in block device mappings.
const COMPUTE_MICROVERSION: &str = "2.67";

/// OpenStack service addressed through the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Service {
    Compute,
    Volume,
    Network,
    Image,
}

impl Service {
    fn catalog_types(self) -> &'static [&'static str] {
        match self {
            Self::Compute => &["compute"],
            Self::Volume => &["block-storage", "volumev3"],
            Self::Network => &["network"],
            Self::Image => &["image"],
        }
    }

    /// API version prefix for services whose catalog URL is unversioned.
    fn version_prefix(self) -> Option<&'static str> {
        match self {
            Self::Network => Some("/v2.0"),
            Self::Image => Some("/v2"),
            Self::Compute | Self::Volume => None,
        }
    }

    fn base_url(self, endpoint: &str) -> String {
        match self.version_prefix() {
            Some(prefix) if !endpoint.ends_with(prefix) => format!("{endpoint}{prefix}"),
            _ => endpoint.to_string(),
        }
    }
}

/// Cloud provider backed by the OpenStack REST APIs.
#[derive(Debug)]
pub struct OpenStackProvider {
    /// Environment label used in logs (`source`, `target`).
    environment: String,
    /// Authenticated session.
    session: Session,
    /// Catalog interface.
    interface: String,
}

impl OpenStackProvider {
    /// Create a provider. Authentication happens lazily on first use.
    pub fn new(
        environment: impl Into<String>,
        credentials: Credentials,
        config: &CloudConfig,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Configuration,
                    format!("Failed to build HTTP client: {e}"),
                    e,
                )
            })?;

        Ok(Self {
            environment: environment.into(),
            session: Session::new(http, credentials),
            interface: config.interface.clone(),
        })
    }

    /// Build an authenticated request against a service.
    pub(crate) async fn request(
        &self,
        service: Service,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> AppResult<RequestBuilder> {
        let token = self.session.token().await?;
        let endpoint = token.endpoint(service.catalog_types(), &self.interface)?;
        let raw = format!("{}{}", service.base_url(&endpoint), path);
        let mut url = Url::parse(&raw)
            .map_err(|e| AppError::cloud(format!("Invalid endpoint URL '{raw}': {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let mut builder = self
            .session
            .http()
            .request(method, url)
            .header("X-Auth-Token", token.value);
        if service == Service::Compute {
            builder = builder
                .header("X-OpenStack-Nova-API-Version", COMPUTE_MICROVERSION)
                .header(
                    "OpenStack-API-Version",
                    format!("compute {COMPUTE_MICROVERSION}"),
                );
        }
        Ok(builder)
    }

    /// Send a request, mapping transport errors and non-success statuses.
    pub(crate) async fn send(&self, builder: RequestBuilder) -> AppResult<Response> {
        let response = builder.send().await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Cloud,
                format!("[{}] request failed: {e}", self.environment),
                e,
            )
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(
            "[{}] {} returned {}: {}",
            self.environment,
            url,
            status,
            body
        );
        let message = format!("[{}] {url} returned {status}: {body}", self.environment);
        if status == StatusCode::NOT_FOUND {
            Err(AppError::not_found(message))
        } else {
            Err(AppError::cloud(message))
        }
    }

    /// Send a request and decode its JSON body.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> AppResult<T> {
        let response = self.send(builder).await?;
        response.json::<T>().await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Cloud,
                format!("[{}] unreadable response body: {e}", self.environment),
                e,
            )
        })
    }
}

/// Turn a not-found error into `None`.
pub(crate) fn optional<T>(result: AppResult<T>) -> AppResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl CloudProvider for OpenStackProvider {
    fn environment(&self) -> &str {
        &self.environment
    }

    async fn find_server(&self, name: &str) -> AppResult<Option<Server>> {
        compute::find_server(self, name).await
    }

    async fn get_server(&self, id: &str) -> AppResult<Server> {
        compute::get_server(self, id).await
    }

    async fn get_volume(&self, id: &str) -> AppResult<Volume> {
        volume::get_volume(self, id).await
    }

    async fn fixed_addresses(&self, server: &Server) -> AppResult<Vec<FixedAddress>> {
        network::fixed_addresses(self, &server.id).await
    }

    async fn image_name(&self, image_id: &str) -> AppResult<Option<String>> {
        image::image_name(self, image_id).await
    }

    async fn find_image(&self, name: &str) -> AppResult<Option<String>> {
        image::find_image(self, name).await
    }

    async fn ensure_flavor(&self, flavor: &Flavor) -> AppResult<String> {
        compute::ensure_flavor(self, flavor).await
    }

    async fn subnets_with_cidr(&self, cidr: &str) -> AppResult<Vec<SubnetRef>> {
        network::subnets_with_cidr(self, cidr).await
    }

    async fn create_port(&self, subnet: &SubnetRef, ip_address: &str) -> AppResult<String> {
        network::create_port(self, subnet, ip_address).await
    }

    async fn create_server(&self, request: &ServerCreateRequest) -> AppResult<Server> {
        compute::create_server(self, request).await
    }

    async fn stop_server(&self, id: &str) -> AppResult<()> {
        compute::stop_server(self, id).await
    }
}
