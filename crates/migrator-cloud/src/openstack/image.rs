//! Image (Glance) lookups.

use reqwest::Method;
use serde::Deserialize;

use migrator_core::result::AppResult;

use super::{OpenStackProvider, Service, optional};

#[derive(Debug, Deserialize)]
struct ImageView {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageList {
    #[serde(default)]
    images: Vec<ImageView>,
}

pub(crate) async fn image_name(
    provider: &OpenStackProvider,
    image_id: &str,
) -> AppResult<Option<String>> {
    let request = provider
        .request(Service::Image, Method::GET, &format!("/images/{image_id}"), &[])
        .await?;
    let image: Option<ImageView> = optional(provider.send_json(request).await)?;
    Ok(image.and_then(|i| i.name))
}

pub(crate) async fn find_image(provider: &OpenStackProvider, name: &str) -> AppResult<Option<String>> {
    let request = provider
        .request(Service::Image, Method::GET, "/images", &[("name", name)])
        .await?;
    let list: ImageList = provider.send_json(request).await?;
    Ok(list
        .images
        .into_iter()
        .find(|i| i.name.as_deref() == Some(name))
        .map(|i| i.id))
}
