//! Target VM provisioning.
//!
//! Recreates a source VM in the target cloud: same flavor, an image with
//! the same name (or the configured fallback), ports carrying the source's
//! fixed addresses, a boot volume plus one blank volume per data volume.
//! The new VM is started by the cloud, awaited, and stopped so its volumes
//! can be overwritten.

use std::time::Duration;

use tokio::time::Instant;
use tracing;

use migrator_core::MIGRATION_TARGET;
use migrator_core::error::AppError;
use migrator_core::result::AppResult;
use migrator_core::traits::cloud::{
    BlockDevice, NetworkAttachment, Server, ServerCreateRequest, ServerStatus, SubnetRef, Volume,
};

use crate::context::MigrationContext;

/// Provisions target VMs for one migration context.
#[derive(Debug)]
pub struct TargetProvisioner<'a> {
    context: &'a MigrationContext,
}

impl<'a> TargetProvisioner<'a> {
    /// Create a provisioner.
    pub fn new(context: &'a MigrationContext) -> Self {
        Self { context }
    }

    /// Make sure a stopped VM named `target_name` exists in the target cloud.
    ///
    /// An existing VM is reused. Otherwise one is created from `source` and
    /// its volumes, placed in `target_az`.
    pub async fn ensure(
        &self,
        source: &Server,
        source_volumes: &[Volume],
        target_name: &str,
        target_az: &str,
    ) -> AppResult<Server> {
        let budget = Duration::from_secs(self.context.config.migration.provision_timeout_seconds);
        let deadline = Instant::now() + budget;

        if let Some(existing) = self.context.target.find_server(target_name).await? {
            tracing::info!(
                target: MIGRATION_TARGET,
                "VM '{}' already exists in the target cloud ({}), reusing it",
                target_name,
                existing.status
            );
            return self.settle(existing, deadline).await;
        }

        let request = self
            .build_request(source, source_volumes, target_name, target_az)
            .await?;
        let created = self.context.target.create_server(&request).await?;
        tracing::info!(
            target: MIGRATION_TARGET,
            "Creating VM '{}' ({}) in zone '{}'",
            target_name,
            created.id,
            target_az
        );

        self.settle(created, deadline).await
    }

    /// Assemble the creation request for the target VM.
    pub async fn build_request(
        &self,
        source: &Server,
        source_volumes: &[Volume],
        target_name: &str,
        target_az: &str,
    ) -> AppResult<ServerCreateRequest> {
        let settings = &self.context.config.provisioning;

        let flavor_id = self.context.target.ensure_flavor(&source.flavor).await?;
        let image_id = self.resolve_image(source, source_volumes).await?;
        let networks = self.attach_networks(source).await?;
        let block_devices =
            block_devices(source, source_volumes, &image_id, &settings.volume_type);

        Ok(ServerCreateRequest {
            name: target_name.to_string(),
            admin_password: settings.admin_password.clone(),
            flavor_id,
            networks,
            block_devices,
            security_groups: vec![settings.security_group.clone()],
            availability_zone: target_az.to_string(),
        })
    }

    /// Target image with the same name as the source VM's image, or the
    /// configured default image.
    async fn resolve_image(
        &self,
        source: &Server,
        source_volumes: &[Volume],
    ) -> AppResult<String> {
        let source_image = source
            .image_id
            .clone()
            .or_else(|| source_volumes.first().and_then(|v| v.image_id.clone()));

        if let Some(image_id) = source_image {
            if let Some(name) = self.context.source.image_name(&image_id).await? {
                if let Some(target_id) = self.context.target.find_image(&name).await? {
                    return Ok(target_id);
                }
                tracing::warn!(
                    target: MIGRATION_TARGET,
                    "Image '{}' not found in the target cloud, using the default image",
                    name
                );
            }
        }

        let fallback = &self.context.config.provisioning.default_image;
        self.context
            .target
            .find_image(fallback)
            .await?
            .ok_or_else(|| {
                AppError::provisioning(format!("Default image '{fallback}' not found in target"))
            })
    }

    /// Ports mirroring the source VM's fixed addresses, or the first matching
    /// network when no port could be created.
    async fn attach_networks(&self, source: &Server) -> AppResult<Vec<NetworkAttachment>> {
        let addresses = self.context.source.fixed_addresses(source).await?;

        let mut placements: Vec<(SubnetRef, String)> = Vec::new();
        for address in &addresses {
            for subnet in self.context.target.subnets_with_cidr(&address.cidr).await? {
                placements.push((subnet, address.ip_address.clone()));
            }
        }

        let Some((first, _)) = placements.first() else {
            return Err(AppError::provisioning(format!(
                "No target network matches the subnets of '{}'",
                source.name
            )));
        };
        let fallback = first.network_id.clone();

        let mut ports = Vec::new();
        for (subnet, ip) in &placements {
            match self.context.target.create_port(subnet, ip).await {
                Ok(port) => ports.push(NetworkAttachment::Port(port)),
                Err(e) => tracing::warn!(
                    target: MIGRATION_TARGET,
                    "Cannot create port with {} on network {}: {}",
                    ip,
                    subnet.network_id,
                    e
                ),
            }
        }

        if ports.is_empty() {
            tracing::warn!(
                target: MIGRATION_TARGET,
                "No port created for '{}', attaching network {} instead",
                source.name,
                fallback
            );
            ports.push(NetworkAttachment::Network(fallback));
        }
        Ok(ports)
    }

    /// Wait for `server` to become active, stop it and wait for it to shut off.
    async fn settle(&self, server: Server, deadline: Instant) -> AppResult<Server> {
        let server = match server.status {
            ServerStatus::Shutoff => return Ok(server),
            ServerStatus::Active => server,
            _ => self.wait_for(&server, ServerStatus::Active, deadline).await?,
        };

        self.context.target.stop_server(&server.id).await?;
        tracing::info!(target: MIGRATION_TARGET, "Stopping VM '{}'", server.name);
        let stopped = self.wait_for(&server, ServerStatus::Shutoff, deadline).await?;
        tracing::info!(
            target: MIGRATION_TARGET,
            "VM '{}' is ready in the target cloud",
            stopped.name
        );
        Ok(stopped)
    }

    async fn wait_for(
        &self,
        server: &Server,
        wanted: ServerStatus,
        deadline: Instant,
    ) -> AppResult<Server> {
        let poll = Duration::from_secs(self.context.config.migration.poll_interval_seconds);
        loop {
            let current = self.context.target.get_server(&server.id).await?;
            if current.status == wanted {
                return Ok(current);
            }
            if current.status.is_failed() {
                return Err(AppError::provisioning(format!(
                    "VM '{}' entered state {} while waiting for {}",
                    server.name, current.status, wanted
                )));
            }
            if Instant::now() >= deadline {
                return Err(AppError::timeout(format!(
                    "VM '{}' still {} after {}s, expected {}",
                    server.name,
                    current.status,
                    self.context.config.migration.provision_timeout_seconds,
                    wanted
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }
}

/// Boot volume from `image_id` followed by one blank volume per non-bootable
/// source volume.
///
/// The boot volume takes the size of the first source volume when that one
/// is bootable, the flavor's root disk size otherwise.
pub fn block_devices(
    source: &Server,
    source_volumes: &[Volume],
    image_id: &str,
    volume_type: &str,
) -> Vec<BlockDevice> {
    let boot_size = match source_volumes.first() {
        Some(first) if first.bootable => first.size_gb,
        _ => source.flavor.disk_gb,
    };

    let mut devices = vec![BlockDevice::FromImage {
        image_id: image_id.to_string(),
        size_gb: boot_size,
        volume_type: volume_type.to_string(),
    }];
    devices.extend(
        source_volumes
            .iter()
            .filter(|v| !v.bootable)
            .map(|v| BlockDevice::Blank {
                size_gb: v.size_gb,
                volume_type: volume_type.to_string(),
            }),
    );
    devices
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use migrator_core::traits::cloud::FixedAddress;

    use super::*;
    use crate::testing::{FakeBackend, FakeCloud, fast_config, server, volume};

    fn address(cidr: &str, ip: &str) -> FixedAddress {
        FixedAddress {
            subnet_id: "src-subnet".to_string(),
            cidr: cidr.to_string(),
            ip_address: ip.to_string(),
        }
    }

    fn source_cloud() -> FakeCloud {
        FakeCloud::new("source")
            .with_server(
                server("s1", "web01", None, &["v-root", "v-data"]),
                vec![
                    volume("v-root", "root", true, 40),
                    volume("v-data", "data", false, 100),
                ],
            )
            .with_addresses("s1", vec![address("10.0.0.0/24", "10.0.0.5")])
            .with_image("img-src", "centos-7")
    }

    async fn source_vm(context: &MigrationContext) -> (Server, Vec<Volume>) {
        let source = context
            .source
            .find_server("web01")
            .await
            .expect("lookup")
            .expect("source vm");
        let volumes = context
            .source
            .server_volumes(&source)
            .await
            .expect("volumes");
        (source, volumes)
    }

    fn context(source: FakeCloud, target: FakeCloud) -> (MigrationContext, Arc<FakeCloud>) {
        let target = Arc::new(target);
        let context = MigrationContext {
            source: Arc::new(source),
            target: target.clone(),
            backend: Arc::new(FakeBackend::new()),
            source_pool: "volumes".to_string(),
            target_pool: "volumes".to_string(),
            config: Arc::new(fast_config()),
        };
        (context, target)
    }

    #[test]
    fn test_block_devices_for_volume_booted_vm() {
        let source = server("s1", "web01", None, &[]);
        let volumes = vec![
            volume("a", "root", true, 40),
            volume("b", "data", false, 100),
            volume("c", "logs", false, 10),
        ];
        let devices = block_devices(&source, &volumes, "img", "hdd");
        assert_eq!(devices.len(), 3);
        assert!(matches!(
            devices[0],
            BlockDevice::FromImage { size_gb: 40, .. }
        ));
        assert!(matches!(devices[1], BlockDevice::Blank { size_gb: 100, .. }));
        assert!(matches!(devices[2], BlockDevice::Blank { size_gb: 10, .. }));
    }

    #[test]
    fn test_block_devices_for_image_booted_vm_use_flavor_disk() {
        let source = server("s1", "web01", Some("img"), &[]);
        let devices = block_devices(&source, &[volume("b", "data", false, 50)], "img", "ssd");
        assert!(matches!(
            devices[0],
            BlockDevice::FromImage { size_gb: 20, .. }
        ));
        assert_eq!(devices.len(), 2);
    }

    #[tokio::test]
    async fn test_creates_and_stops_target_vm() {
        let target = FakeCloud::new("target")
            .with_image("img-tgt", "centos-7")
            .with_subnet("10.0.0.0/24", "net-1", "sub-1");
        let (context, target) = context(source_cloud(), target);
        let (source, volumes) = source_vm(&context).await;

        let created = TargetProvisioner::new(&context)
            .ensure(&source, &volumes, "web01", "az-b")
            .await
            .expect("provisioned");

        assert_eq!(created.status, ServerStatus::Shutoff);
        assert_eq!(created.attached_volume_ids.len(), 2);
        assert_eq!(target.count("create_server"), 1);
        assert_eq!(target.count("create_port"), 1);
        assert_eq!(target.count("stop_server"), 1);
        assert!(target.calls().iter().any(|c| c.starts_with("networks port:")));
    }

    #[tokio::test]
    async fn test_port_failure_falls_back_to_network() {
        let target = FakeCloud::new("target")
            .with_image("img-tgt", "centos-7")
            .with_subnet("10.0.0.0/24", "net-1", "sub-1")
            .with_failing_ports();
        let (context, target) = context(source_cloud(), target);
        let (source, volumes) = source_vm(&context).await;

        let request = TargetProvisioner::new(&context)
            .build_request(&source, &volumes, "web01", "az-b")
            .await
            .expect("request");
        assert_eq!(
            request.networks,
            vec![NetworkAttachment::Network("net-1".to_string())]
        );
        assert_eq!(target.count("create_port"), 1);
    }

    #[tokio::test]
    async fn test_no_matching_network_fails() {
        let target = FakeCloud::new("target").with_image("img-tgt", "centos-7");
        let (context, target) = context(source_cloud(), target);
        let (source, volumes) = source_vm(&context).await;

        let err = TargetProvisioner::new(&context)
            .ensure(&source, &volumes, "web01", "az-b")
            .await
            .unwrap_err();
        assert_eq!(err.kind, migrator_core::error::ErrorKind::Provisioning);
        assert_eq!(target.count("create_server"), 0);
    }

    #[tokio::test]
    async fn test_missing_image_falls_back_to_default() {
        let target = FakeCloud::new("target")
            .with_image("img-default", "migration-generic-qcow2")
            .with_subnet("10.0.0.0/24", "net-1", "sub-1");
        let (context, _) = context(source_cloud(), target);
        let (source, volumes) = source_vm(&context).await;

        let request = TargetProvisioner::new(&context)
            .build_request(&source, &volumes, "web01", "az-b")
            .await
            .expect("request");
        assert!(matches!(
            &request.block_devices[0],
            BlockDevice::FromImage { image_id, .. } if image_id == "img-default"
        ));
    }

    #[tokio::test]
    async fn test_error_state_fails_provisioning() {
        let target = FakeCloud::new("target")
            .with_image("img-tgt", "centos-7")
            .with_subnet("10.0.0.0/24", "net-1", "sub-1")
            .with_created_status(ServerStatus::Error);
        let (context, target) = context(source_cloud(), target);
        let (source, volumes) = source_vm(&context).await;

        let err = TargetProvisioner::new(&context)
            .ensure(&source, &volumes, "web01", "az-b")
            .await
            .unwrap_err();
        assert_eq!(err.kind, migrator_core::error::ErrorKind::Provisioning);
        assert_eq!(target.count("stop_server"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_build_times_out() {
        let target = FakeCloud::new("target")
            .with_image("img-tgt", "centos-7")
            .with_subnet("10.0.0.0/24", "net-1", "sub-1")
            .with_created_status(ServerStatus::Build);
        let mut config = fast_config();
        config.migration.poll_interval_seconds = 5;
        config.migration.provision_timeout_seconds = 60;
        let (mut context, _) = context(source_cloud(), target);
        context.config = Arc::new(config);
        let (source, volumes) = source_vm(&context).await;

        let err = TargetProvisioner::new(&context)
            .ensure(&source, &volumes, "web01", "az-b")
            .await
            .unwrap_err();
        assert_eq!(err.kind, migrator_core::error::ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_existing_target_vm_is_reused() {
        let target = FakeCloud::new("target").with_server(
            server("t1", "web01", None, &[]),
            vec![],
        );
        let (context, target) = context(source_cloud(), target);
        let (source, volumes) = source_vm(&context).await;

        let reused = TargetProvisioner::new(&context)
            .ensure(&source, &volumes, "web01", "az-b")
            .await
            .expect("reused");
        assert_eq!(reused.id, "t1");
        assert_eq!(target.count("create_server"), 0);
        assert_eq!(target.count("ensure_flavor"), 0);
        // The fixture server is running, so it is stopped first.
        assert_eq!(target.count("stop_server"), 1);
    }
}
