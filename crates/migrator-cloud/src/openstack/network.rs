//! Network (Neutron) operations.

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing;

use migrator_core::result::AppResult;
use migrator_core::traits::cloud::{FixedAddress, SubnetRef};

use super::{OpenStackProvider, Service};

#[derive(Debug, Deserialize)]
struct PortList {
    #[serde(default)]
    ports: Vec<PortView>,
}

#[derive(Debug, Deserialize)]
struct PortEnvelope {
    port: PortView,
}

#[derive(Debug, Deserialize)]
struct PortView {
    id: String,
    #[serde(default)]
    fixed_ips: Vec<FixedIp>,
}

#[derive(Debug, Deserialize)]
struct FixedIp {
    subnet_id: String,
    ip_address: String,
}

#[derive(Debug, Deserialize)]
struct SubnetEnvelope {
    subnet: SubnetView,
}

#[derive(Debug, Deserialize)]
struct SubnetList {
    #[serde(default)]
    subnets: Vec<SubnetView>,
}

#[derive(Debug, Deserialize)]
struct SubnetView {
    id: String,
    network_id: String,
    cidr: String,
}

pub(crate) async fn fixed_addresses(
    provider: &OpenStackProvider,
    server_id: &str,
) -> AppResult<Vec<FixedAddress>> {
    let request = provider
        .request(
            Service::Network,
            Method::GET,
            "/ports",
            &[("device_id", server_id)],
        )
        .await?;
    let ports: PortList = provider.send_json(request).await?;

    let mut addresses = Vec::new();
    for fixed in ports.ports.into_iter().flat_map(|p| p.fixed_ips) {
        let request = provider
            .request(
                Service::Network,
                Method::GET,
                &format!("/subnets/{}", fixed.subnet_id),
                &[],
            )
            .await?;
        let subnet: SubnetEnvelope = provider.send_json(request).await?;
        addresses.push(FixedAddress {
            subnet_id: fixed.subnet_id,
            cidr: subnet.subnet.cidr,
            ip_address: fixed.ip_address,
        });
    }
    Ok(addresses)
}

pub(crate) async fn subnets_with_cidr(
    provider: &OpenStackProvider,
    cidr: &str,
) -> AppResult<Vec<SubnetRef>> {
    let request = provider
        .request(Service::Network, Method::GET, "/subnets", &[("cidr", cidr)])
        .await?;
    let list: SubnetList = provider.send_json(request).await?;
    Ok(list
        .subnets
        .into_iter()
        .filter(|s| s.cidr == cidr)
        .map(|s| SubnetRef {
            network_id: s.network_id,
            subnet_id: s.id,
        })
        .collect())
}

pub(crate) async fn create_port(
    provider: &OpenStackProvider,
    subnet: &SubnetRef,
    ip_address: &str,
) -> AppResult<String> {
    let body = json!({
        "port": {
            "name": ip_address,
            "network_id": subnet.network_id,
            "fixed_ips": [{ "subnet_id": subnet.subnet_id, "ip_address": ip_address }],
        }
    });
    let request = provider
        .request(Service::Network, Method::POST, "/ports", &[])
        .await?
        .json(&body);
    let created: PortEnvelope = provider.send_json(request).await?;
    tracing::debug!("Created port {} for {}", created.port.id, ip_address);
    Ok(created.port.id)
}
