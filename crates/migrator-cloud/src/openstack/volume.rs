//! Block storage (Cinder) operations.

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;

use migrator_core::result::AppResult;
use migrator_core::traits::cloud::Volume;

use super::{OpenStackProvider, Service};

#[derive(Debug, Deserialize)]
struct VolumeEnvelope {
    volume: VolumeView,
}

#[derive(Debug, Deserialize)]
struct VolumeView {
    id: String,
    #[serde(default)]
    name: Option<String>,
    /// `"true"` / `"false"`.
    #[serde(default)]
    bootable: Value,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    volume_image_metadata: Option<ImageMetadata>,
}

#[derive(Debug, Deserialize)]
struct ImageMetadata {
    #[serde(default)]
    image_id: Option<String>,
}

fn is_true(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

impl From<VolumeView> for Volume {
    fn from(view: VolumeView) -> Self {
        Volume {
            name: view.name.unwrap_or_default(),
            bootable: is_true(&view.bootable),
            size_gb: view.size,
            image_id: view.volume_image_metadata.and_then(|m| m.image_id),
            id: view.id,
        }
    }
}

pub(crate) async fn get_volume(provider: &OpenStackProvider, id: &str) -> AppResult<Volume> {
    let request = provider
        .request(Service::Volume, Method::GET, &format!("/volumes/{id}"), &[])
        .await?;
    let envelope: VolumeEnvelope = provider.send_json(request).await?;
    Ok(envelope.volume.into())
}
