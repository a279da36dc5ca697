//! Compute (Nova) operations.

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing;

use migrator_core::result::AppResult;
use migrator_core::traits::cloud::{
    BlockDevice, Flavor, NetworkAttachment, Server, ServerCreateRequest, ServerStatus,
};

use super::{OpenStackProvider, Service};

#[derive(Debug, Deserialize)]
struct ServerEnvelope {
    server: ServerView,
}

#[derive(Debug, Deserialize)]
struct ServerList {
    #[serde(default)]
    servers: Vec<ServerView>,
}

#[derive(Debug, Deserialize)]
struct ServerView {
    id: String,
    name: String,
    status: String,
    /// Empty string for servers booted from a volume, `{"id": ..}` otherwise.
    #[serde(default)]
    image: Value,
    #[serde(default)]
    flavor: FlavorView,
    #[serde(rename = "os-extended-volumes:volumes_attached", default)]
    volumes_attached: Vec<IdRef>,
}

#[derive(Debug, Default, Deserialize)]
struct FlavorView {
    #[serde(default)]
    original_name: String,
    #[serde(default)]
    ram: u64,
    #[serde(default)]
    vcpus: u32,
    #[serde(default)]
    disk: u64,
    #[serde(default)]
    ephemeral: u64,
    #[serde(default)]
    swap: Value,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FlavorList {
    #[serde(default)]
    flavors: Vec<FlavorSummary>,
}

#[derive(Debug, Deserialize)]
struct FlavorSummary {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct FlavorEnvelope {
    flavor: FlavorSummary,
}

#[derive(Debug, Deserialize)]
struct CreatedServer {
    server: IdRef,
}

/// Swap is reported as `""` when unset and as an integer otherwise.
fn swap_mb(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

impl From<ServerView> for Server {
    fn from(view: ServerView) -> Self {
        let image_id = view
            .image
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Server {
            id: view.id,
            name: view.name,
            status: ServerStatus::from_api(&view.status),
            image_id,
            flavor: Flavor {
                original_name: view.flavor.original_name,
                ram_mb: view.flavor.ram,
                vcpus: view.flavor.vcpus,
                disk_gb: view.flavor.disk,
                ephemeral_gb: view.flavor.ephemeral,
                swap_mb: swap_mb(&view.flavor.swap),
            },
            attached_volume_ids: view.volumes_attached.into_iter().map(|v| v.id).collect(),
        }
    }
}

/// Anchored regular expression matching exactly `name`.
fn name_filter(name: &str) -> String {
    let mut filter = String::with_capacity(name.len() + 2);
    filter.push('^');
    for c in name.chars() {
        if matches!(
            c,
            '\\' | '.' | '^' | '$' | '|' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' | '}'
        ) {
            filter.push('\\');
        }
        filter.push(c);
    }
    filter.push('$');
    filter
}

pub(crate) async fn find_server(
    provider: &OpenStackProvider,
    name: &str,
) -> AppResult<Option<Server>> {
    // The name filter is a regular expression; anchor it and re-check.
    let filter = name_filter(name);
    let request = provider
        .request(
            Service::Compute,
            Method::GET,
            "/servers/detail",
            &[("name", filter.as_str())],
        )
        .await?;
    let list: ServerList = provider.send_json(request).await?;

    Ok(list
        .servers
        .into_iter()
        .find(|s| s.name == name)
        .map(Server::from))
}

pub(crate) async fn get_server(provider: &OpenStackProvider, id: &str) -> AppResult<Server> {
    let request = provider
        .request(Service::Compute, Method::GET, &format!("/servers/{id}"), &[])
        .await?;
    let envelope: ServerEnvelope = provider.send_json(request).await?;
    Ok(envelope.server.into())
}

pub(crate) async fn ensure_flavor(
    provider: &OpenStackProvider,
    flavor: &Flavor,
) -> AppResult<String> {
    let request = provider
        .request(
            Service::Compute,
            Method::GET,
            "/flavors/detail",
            &[("is_public", "None")],
        )
        .await?;
    let list: FlavorList = provider.send_json(request).await?;

    if let Some(existing) = list.flavors.into_iter().find(|f| f.name == flavor.original_name) {
        tracing::debug!("Flavor '{}' exists as {}", existing.name, existing.id);
        return Ok(existing.id);
    }

    let request = provider
        .request(Service::Compute, Method::POST, "/flavors", &[])
        .await?
        .json(&flavor_body(flavor));
    let created: FlavorEnvelope = provider.send_json(request).await?;

    tracing::info!(
        target: migrator_core::MIGRATION_TARGET,
        "Created flavor '{}' ({} MB, {} vCPU, {} GB)",
        created.flavor.name,
        flavor.ram_mb,
        flavor.vcpus,
        flavor.disk_gb
    );
    Ok(created.flavor.id)
}

fn flavor_body(flavor: &Flavor) -> Value {
    json!({
        "flavor": {
            "name": flavor.original_name,
            "ram": flavor.ram_mb,
            "vcpus": flavor.vcpus,
            "disk": flavor.disk_gb,
            "OS-FLV-EXT-DATA:ephemeral": flavor.ephemeral_gb,
            "swap": flavor.swap_mb,
        }
    })
}

fn server_body(request: &ServerCreateRequest) -> Value {
    let networks: Vec<Value> = request
        .networks
        .iter()
        .map(|attachment| match attachment {
            NetworkAttachment::Port(id) => json!({ "port": id }),
            NetworkAttachment::Network(id) => json!({ "uuid": id }),
        })
        .collect();

    let block_devices: Vec<Value> = request
        .block_devices
        .iter()
        .enumerate()
        .map(|(index, device)| match device {
            BlockDevice::FromImage {
                image_id,
                size_gb,
                volume_type,
            } => json!({
                "boot_index": index,
                "uuid": image_id,
                "source_type": "image",
                "destination_type": "volume",
                "volume_size": size_gb,
                "volume_type": volume_type,
                "delete_on_termination": false,
            }),
            BlockDevice::Blank {
                size_gb,
                volume_type,
            } => json!({
                "boot_index": -1,
                "source_type": "blank",
                "destination_type": "volume",
                "volume_size": size_gb,
                "volume_type": volume_type,
                "delete_on_termination": false,
            }),
        })
        .collect();

    let security_groups: Vec<Value> = request
        .security_groups
        .iter()
        .map(|name| json!({ "name": name }))
        .collect();

    json!({
        "server": {
            "name": request.name,
            "adminPass": request.admin_password,
            "flavorRef": request.flavor_id,
            "networks": networks,
            "block_device_mapping_v2": block_devices,
            "security_groups": security_groups,
            "availability_zone": request.availability_zone,
        }
    })
}

pub(crate) async fn create_server(
    provider: &OpenStackProvider,
    request: &ServerCreateRequest,
) -> AppResult<Server> {
    let http = provider
        .request(Service::Compute, Method::POST, "/servers", &[])
        .await?
        .json(&server_body(request));
    let created: CreatedServer = provider.send_json(http).await?;

    tracing::info!(
        target: migrator_core::MIGRATION_TARGET,
        "Requested server '{}' ({}) in zone '{}'",
        request.name,
        created.server.id,
        request.availability_zone
    );
    get_server(provider, &created.server.id).await
}

pub(crate) async fn stop_server(provider: &OpenStackProvider, id: &str) -> AppResult<()> {
    let request = provider
        .request(
            Service::Compute,
            Method::POST,
            &format!("/servers/{id}/action"),
            &[],
        )
        .await?
        .json(&json!({ "os-stop": null }));
    provider.send(request).await?;
    Ok(())
}
