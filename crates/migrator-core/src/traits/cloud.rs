//! Cloud provisioning capability.
//!
//! Compute, network, image and volume operations against one cloud
//! environment. The VM migration job talks to the source and the target
//! cloud only through this trait; `migrator-cloud` implements it against
//! the OpenStack REST APIs.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::result::AppResult;

/// Compute server status as reported by the cloud.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    /// Being created.
    Build,
    /// Running.
    Active,
    /// Stopped.
    Shutoff,
    /// Failed.
    Error,
    /// Paused.
    Paused,
    /// Suspended.
    Suspended,
    /// Any other status string.
    Other(String),
}

impl ServerStatus {
    /// Parse the status string returned by the compute API.
    pub fn from_api(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "BUILD" => Self::Build,
            "ACTIVE" => Self::Active,
            "SHUTOFF" => Self::Shutoff,
            "ERROR" => Self::Error,
            "PAUSED" => Self::Paused,
            "SUSPENDED" => Self::Suspended,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether a server in this state will not become active on its own.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Error | Self::Paused | Self::Suspended)
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "BUILD"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Shutoff => write!(f, "SHUTOFF"),
            Self::Error => write!(f, "ERROR"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Suspended => write!(f, "SUSPENDED"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Flavor attributes embedded in a server description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    /// Flavor name as created in the source cloud.
    pub original_name: String,
    /// Memory in MB.
    pub ram_mb: u64,
    /// Virtual CPU count.
    pub vcpus: u32,
    /// Root disk in GB.
    pub disk_gb: u64,
    /// Ephemeral disk in GB.
    pub ephemeral_gb: u64,
    /// Swap in MB.
    pub swap_mb: u64,
}

/// A compute server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Server id.
    pub id: String,
    /// Server name.
    pub name: String,
    /// Current status.
    pub status: ServerStatus,
    /// Image the server booted from, absent when it boots from a volume.
    pub image_id: Option<String>,
    /// Flavor attributes.
    pub flavor: Flavor,
    /// Ids of attached volumes, in attachment order.
    pub attached_volume_ids: Vec<String>,
}

impl Server {
    /// Whether the root disk is a managed block volume.
    pub fn boots_from_volume(&self) -> bool {
        self.image_id.is_none()
    }
}

/// A managed block volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume id.
    pub id: String,
    /// Volume name.
    pub name: String,
    /// Whether the volume is flagged bootable.
    pub bootable: bool,
    /// Size in GB.
    pub size_gb: u64,
    /// Image the volume was created from, if any.
    pub image_id: Option<String>,
}

/// A fixed IP address of a server, with the subnet it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedAddress {
    /// Subnet id in the server's cloud.
    pub subnet_id: String,
    /// Subnet CIDR.
    pub cidr: String,
    /// Assigned address.
    pub ip_address: String,
}

/// A network/subnet pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetRef {
    /// Network id.
    pub network_id: String,
    /// Subnet id.
    pub subnet_id: String,
}

/// A block device to attach at server creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockDevice {
    /// Boot volume created from an image.
    FromImage {
        /// Image id.
        image_id: String,
        /// Volume size in GB.
        size_gb: u64,
        /// Volume type.
        volume_type: String,
    },
    /// Empty data volume.
    Blank {
        /// Volume size in GB.
        size_gb: u64,
        /// Volume type.
        volume_type: String,
    },
}

/// How the server is attached to a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkAttachment {
    /// A pre-created port (carries a fixed address).
    Port(String),
    /// A network; the cloud picks the address.
    Network(String),
}

/// Parameters for creating a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCreateRequest {
    /// Server name.
    pub name: String,
    /// Admin password.
    pub admin_password: String,
    /// Flavor id.
    pub flavor_id: String,
    /// Network attachments.
    pub networks: Vec<NetworkAttachment>,
    /// Block devices, boot device first.
    pub block_devices: Vec<BlockDevice>,
    /// Security group names.
    pub security_groups: Vec<String>,
    /// Availability zone.
    pub availability_zone: String,
}

/// Trait for cloud environments.
#[async_trait]
pub trait CloudProvider: Send + Sync + fmt::Debug + 'static {
    /// Human-readable name of the environment (used in logs).
    fn environment(&self) -> &str;

    /// Find a server by name.
    async fn find_server(&self, name: &str) -> AppResult<Option<Server>>;

    /// Fetch a server by id.
    async fn get_server(&self, id: &str) -> AppResult<Server>;

    /// Fetch a volume by id.
    async fn get_volume(&self, id: &str) -> AppResult<Volume>;

    /// Fixed addresses of a server's ports, with their subnets.
    async fn fixed_addresses(&self, server: &Server) -> AppResult<Vec<FixedAddress>>;

    /// Name of an image, `None` if the image does not exist.
    async fn image_name(&self, image_id: &str) -> AppResult<Option<String>>;

    /// Id of the image with the given name, `None` if there is none.
    async fn find_image(&self, name: &str) -> AppResult<Option<String>>;

    /// Return the id of a flavor named like `flavor`, creating it if needed.
    async fn ensure_flavor(&self, flavor: &Flavor) -> AppResult<String>;

    /// Networks owning a subnet with the given CIDR.
    async fn subnets_with_cidr(&self, cidr: &str) -> AppResult<Vec<SubnetRef>>;

    /// Create a port with a fixed address; returns the port id.
    async fn create_port(&self, subnet: &SubnetRef, ip_address: &str) -> AppResult<String>;

    /// Create a server.
    async fn create_server(&self, request: &ServerCreateRequest) -> AppResult<Server>;

    /// Request a server stop.
    async fn stop_server(&self, id: &str) -> AppResult<()>;

    /// Volumes attached to a server, in attachment order.
    async fn server_volumes(&self, server: &Server) -> AppResult<Vec<Volume>> {
        let mut volumes = Vec::with_capacity(server.attached_volume_ids.len());
        for id in &server.attached_volume_ids {
            volumes.push(self.get_volume(id).await?);
        }
        Ok(volumes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(ServerStatus::from_api("active"), ServerStatus::Active);
        assert_eq!(ServerStatus::from_api("SHUTOFF"), ServerStatus::Shutoff);
        assert_eq!(
            ServerStatus::from_api("MIGRATING"),
            ServerStatus::Other("MIGRATING".to_string())
        );
    }

    #[test]
    fn test_failed_states() {
        assert!(ServerStatus::Error.is_failed());
        assert!(ServerStatus::Paused.is_failed());
        assert!(ServerStatus::Suspended.is_failed());
        assert!(!ServerStatus::Build.is_failed());
        assert!(!ServerStatus::Active.is_failed());
    }
}
