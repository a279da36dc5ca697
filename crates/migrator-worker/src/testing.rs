//! In-memory cloud and storage fakes.
//!
//! [`FakeCloud`] keeps servers, volumes, images and networks in memory and
//! records every call. [`FakeBackend`] models images as byte buffers with
//! snapshots so transfers can be checked for content and size.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use migrator_core::config::AppConfig;
use migrator_core::error::AppError;
use migrator_core::result::AppResult;
use migrator_core::traits::cloud::{
    BlockDevice, CloudProvider, FixedAddress, Flavor, NetworkAttachment, Server,
    ServerCreateRequest, ServerStatus, SubnetRef, Volume,
};
use migrator_core::traits::replication::{
    ImageSpec, ReplicationBackend, Site, SnapshotInfo, TransferStats,
};

use crate::context::{ContextFactory, MigrationContext, MigrationRequest};

/// Cloud calls that create or change target resources.
pub const PROVISIONING_CALLS: [&str; 4] =
    ["ensure_flavor", "create_port", "create_server", "stop_server"];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Build a server.
pub fn server(id: &str, name: &str, image_id: Option<&str>, volume_ids: &[&str]) -> Server {
    Server {
        id: id.to_string(),
        name: name.to_string(),
        status: ServerStatus::Active,
        image_id: image_id.map(str::to_string),
        flavor: Flavor {
            original_name: "m1.small".to_string(),
            ram_mb: 2048,
            vcpus: 1,
            disk_gb: 20,
            ephemeral_gb: 0,
            swap_mb: 0,
        },
        attached_volume_ids: volume_ids.iter().map(|v| v.to_string()).collect(),
    }
}

/// Build a volume.
pub fn volume(id: &str, name: &str, bootable: bool, size_gb: u64) -> Volume {
    Volume {
        id: id.to_string(),
        name: name.to_string(),
        bootable,
        size_gb,
        image_id: bootable.then(|| "img-src".to_string()),
    }
}

#[derive(Debug, Default)]
struct CloudState {
    servers: Vec<Server>,
    volumes: HashMap<String, Volume>,
    addresses: HashMap<String, Vec<FixedAddress>>,
    images: HashMap<String, String>,
    flavors: Vec<(String, String)>,
    subnets: Vec<(String, SubnetRef)>,
    calls: Vec<String>,
    failing_ports: bool,
    failing_servers: HashSet<String>,
    created_status: Option<ServerStatus>,
    next_id: usize,
}

/// In-memory [`CloudProvider`].
#[derive(Debug, Default)]
pub struct FakeCloud {
    name: String,
    state: Mutex<CloudState>,
}

impl FakeCloud {
    /// Create an empty cloud.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(CloudState::default()),
        }
    }

    /// Add a server with its volumes.
    pub fn with_server(self, server: Server, volumes: Vec<Volume>) -> Self {
        {
            let mut state = lock(&self.state);
            for volume in volumes {
                state.volumes.insert(volume.id.clone(), volume);
            }
            state.servers.push(server);
        }
        self
    }

    /// Add fixed addresses to a server.
    pub fn with_addresses(self, server_id: &str, addresses: Vec<FixedAddress>) -> Self {
        lock(&self.state)
            .addresses
            .insert(server_id.to_string(), addresses);
        self
    }

    /// Add an image.
    pub fn with_image(self, id: &str, name: &str) -> Self {
        lock(&self.state)
            .images
            .insert(id.to_string(), name.to_string());
        self
    }

    /// Add a subnet.
    pub fn with_subnet(self, cidr: &str, network_id: &str, subnet_id: &str) -> Self {
        lock(&self.state).subnets.push((
            cidr.to_string(),
            SubnetRef {
                network_id: network_id.to_string(),
                subnet_id: subnet_id.to_string(),
            },
        ));
        self
    }

    /// Make every port creation fail.
    pub fn with_failing_ports(self) -> Self {
        lock(&self.state).failing_ports = true;
        self
    }

    /// Make server creation fail for `name`.
    pub fn with_failing_server(self, name: &str) -> Self {
        lock(&self.state).failing_servers.insert(name.to_string());
        self
    }

    /// Status newly created servers stay in (default: `ACTIVE`).
    pub fn with_created_status(self, status: ServerStatus) -> Self {
        lock(&self.state).created_status = Some(status);
        self
    }

    /// All recorded calls, `op arg`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Number of calls of operation `op`.
    pub fn count(&self, op: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .count()
    }

    /// Number of provisioning calls.
    pub fn provisioning_calls(&self) -> usize {
        PROVISIONING_CALLS.iter().map(|op| self.count(op)).sum()
    }

    /// Server named `name`.
    pub fn server_named(&self, name: &str) -> Option<Server> {
        lock(&self.state)
            .servers
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    fn record(&self, call: String) -> MutexGuard<'_, CloudState> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    fn environment(&self) -> &str {
        &self.name
    }

    async fn find_server(&self, name: &str) -> AppResult<Option<Server>> {
        let state = self.record(format!("find_server {name}"));
        Ok(state.servers.iter().find(|s| s.name == name).cloned())
    }

    async fn get_server(&self, id: &str) -> AppResult<Server> {
        let state = self.record(format!("get_server {id}"));
        state
            .servers
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("server {id}")))
    }

    async fn get_volume(&self, id: &str) -> AppResult<Volume> {
        let state = self.record(format!("get_volume {id}"));
        state
            .volumes
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("volume {id}")))
    }

    async fn fixed_addresses(&self, server: &Server) -> AppResult<Vec<FixedAddress>> {
        let state = self.record(format!("fixed_addresses {}", server.id));
        Ok(state.addresses.get(&server.id).cloned().unwrap_or_default())
    }

    async fn image_name(&self, image_id: &str) -> AppResult<Option<String>> {
        let state = self.record(format!("image_name {image_id}"));
        Ok(state.images.get(image_id).cloned())
    }

    async fn find_image(&self, name: &str) -> AppResult<Option<String>> {
        let state = self.record(format!("find_image {name}"));
        Ok(state
            .images
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| id.clone()))
    }

    async fn ensure_flavor(&self, flavor: &Flavor) -> AppResult<String> {
        let mut state = self.record(format!("ensure_flavor {}", flavor.original_name));
        if let Some((id, _)) = state
            .flavors
            .iter()
            .find(|(_, name)| *name == flavor.original_name)
        {
            return Ok(id.clone());
        }
        let id = format!("flavor-{}", state.flavors.len());
        state
            .flavors
            .push((id.clone(), flavor.original_name.clone()));
        Ok(id)
    }

    async fn subnets_with_cidr(&self, cidr: &str) -> AppResult<Vec<SubnetRef>> {
        let state = self.record(format!("subnets_with_cidr {cidr}"));
        Ok(state
            .subnets
            .iter()
            .filter(|(c, _)| c == cidr)
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn create_port(&self, subnet: &SubnetRef, ip_address: &str) -> AppResult<String> {
        let mut state = self.record(format!("create_port {ip_address}"));
        if state.failing_ports {
            return Err(AppError::cloud(format!("IP {ip_address} unavailable")));
        }
        state.next_id += 1;
        Ok(format!("port-{}-{}", subnet.subnet_id, state.next_id))
    }

    async fn create_server(&self, request: &ServerCreateRequest) -> AppResult<Server> {
        let mut state = self.record(format!("create_server {}", request.name));
        if state.failing_servers.contains(&request.name) {
            return Err(AppError::cloud(format!("quota exceeded for {}", request.name)));
        }

        state.next_id += 1;
        let server_id = format!("{}-srv-{}", self.name, state.next_id);
        let mut volume_ids = Vec::new();
        for (index, device) in request.block_devices.iter().enumerate() {
            let (bootable, size_gb, image_id) = match device {
                BlockDevice::FromImage {
                    image_id, size_gb, ..
                } => (true, *size_gb, Some(image_id.clone())),
                BlockDevice::Blank { size_gb, .. } => (false, *size_gb, None),
            };
            let id = format!("{server_id}-vol-{index}");
            state.volumes.insert(
                id.clone(),
                Volume {
                    id: id.clone(),
                    name: String::new(),
                    bootable,
                    size_gb,
                    image_id,
                },
            );
            volume_ids.push(id);
        }

        let created = Server {
            id: server_id,
            name: request.name.clone(),
            status: state.created_status.clone().unwrap_or(ServerStatus::Active),
            image_id: None,
            flavor: Flavor {
                original_name: request.flavor_id.clone(),
                ..Flavor::default()
            },
            attached_volume_ids: volume_ids,
        };
        // Networks are only recorded.
        let networks: Vec<String> = request
            .networks
            .iter()
            .map(|n| match n {
                NetworkAttachment::Port(id) => format!("port:{id}"),
                NetworkAttachment::Network(id) => format!("net:{id}"),
            })
            .collect();
        state.calls.push(format!("networks {}", networks.join(",")));
        state.servers.push(created.clone());
        Ok(created)
    }

    async fn stop_server(&self, id: &str) -> AppResult<()> {
        let mut state = self.record(format!("stop_server {id}"));
        let server = state
            .servers
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::not_found(format!("server {id}")))?;
        server.status = ServerStatus::Shutoff;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct FakeImage {
    data: Vec<u8>,
    snapshots: Vec<(SnapshotInfo, Vec<u8>)>,
    size_gb: Option<u64>,
}

#[derive(Debug, Default)]
struct BackendState {
    images: HashMap<ImageSpec, FakeImage>,
    calls: Vec<String>,
    failures: HashSet<(String, String)>,
}

/// In-memory [`ReplicationBackend`].
#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
    transfer_delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every transfer for `delay`, to observe concurrency.
    pub fn with_transfer_delay(mut self, delay: Duration) -> Self {
        self.transfer_delay = Some(delay);
        self
    }

    /// Seed an image.
    pub fn with_image(self, site: Site, pool: &str, image: &str, data: &[u8]) -> Self {
        self.write(&spec(site, pool, image), data);
        self
    }

    /// Make operation `op` fail on `pool/image`.
    pub fn failing(self, op: &str, image: &str) -> Self {
        lock(&self.state)
            .failures
            .insert((op.to_string(), image.to_string()));
        self
    }

    /// Overwrite an image's content, creating it if needed.
    pub fn write(&self, image: &ImageSpec, data: &[u8]) {
        lock(&self.state)
            .images
            .entry(image.clone())
            .or_default()
            .data = data.to_vec();
    }

    /// Current content of an image.
    pub fn data(&self, image: &ImageSpec) -> Option<Vec<u8>> {
        lock(&self.state).images.get(image).map(|i| i.data.clone())
    }

    /// Size an image was created with, if it was created through
    /// `create_image`.
    pub fn size_gb(&self, image: &ImageSpec) -> Option<u64> {
        lock(&self.state).images.get(image).and_then(|i| i.size_gb)
    }

    /// Snapshot names of an image.
    pub fn snapshot_names(&self, image: &ImageSpec) -> Vec<String> {
        lock(&self.state)
            .images
            .get(image)
            .map(|i| i.snapshots.iter().map(|(s, _)| s.name.clone()).collect())
            .unwrap_or_default()
    }

    /// All recorded calls, `op pool/image`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Number of calls of operation `op`.
    pub fn count(&self, op: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .count()
    }

    /// Highest number of transfers observed running at once.
    pub fn peak_transfers(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn begin(&self, op: &str, image: &ImageSpec) -> AppResult<MutexGuard<'_, BackendState>> {
        let mut state = lock(&self.state);
        state.calls.push(format!("{op} {image}"));
        if state.failures.contains(&(op.to_string(), image.to_string())) {
            return Err(AppError::replication(format!("{op} failed on {image}")));
        }
        Ok(state)
    }

    async fn hold_transfer(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.transfer_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn spec(site: Site, pool: &str, image: &str) -> ImageSpec {
    ImageSpec {
        site,
        pool: pool.to_string(),
        image: image.to_string(),
    }
}

/// Bytes that differ between two buffers, counting length changes.
fn changed_bytes(from: &[u8], to: &[u8]) -> u64 {
    let common = from.iter().zip(to).filter(|(a, b)| a != b).count();
    (common + from.len().abs_diff(to.len())) as u64
}

fn missing(image: &ImageSpec) -> AppError {
    AppError::replication(format!("image {image} does not exist"))
}

#[async_trait]
impl ReplicationBackend for FakeBackend {
    async fn create_snapshot(&self, image: &ImageSpec, snapshot: &str) -> AppResult<()> {
        let mut state = self.begin("create_snapshot", image)?;
        let entry = state.images.get_mut(image).ok_or_else(|| missing(image))?;
        if entry.snapshots.iter().any(|(s, _)| s.name == snapshot) {
            return Err(AppError::replication(format!(
                "snapshot {image}@{snapshot} exists"
            )));
        }
        let data = entry.data.clone();
        entry.snapshots.push((
            SnapshotInfo {
                name: snapshot.to_string(),
                created_at: Utc::now(),
            },
            data,
        ));
        Ok(())
    }

    async fn list_snapshots(&self, image: &ImageSpec) -> AppResult<Vec<SnapshotInfo>> {
        let state = self.begin("list_snapshots", image)?;
        let entry = state.images.get(image).ok_or_else(|| missing(image))?;
        Ok(entry.snapshots.iter().map(|(s, _)| s.clone()).collect())
    }

    async fn remove_image(&self, image: &ImageSpec) -> AppResult<()> {
        // Removing an absent image is tolerated so tests need not seed
        // every target volume.
        let mut state = self.begin("remove_image", image)?;
        state.images.remove(image);
        Ok(())
    }

    async fn create_image(&self, image: &ImageSpec, size_gb: u64) -> AppResult<()> {
        let mut state = self.begin("create_image", image)?;
        if state.images.contains_key(image) {
            return Err(AppError::replication(format!("image {image} exists")));
        }
        state.images.insert(
            image.clone(),
            FakeImage {
                size_gb: Some(size_gb),
                ..FakeImage::default()
            },
        );
        Ok(())
    }

    async fn rollback(&self, image: &ImageSpec, snapshot: &str) -> AppResult<()> {
        let mut state = self.begin("rollback", image)?;
        let entry = state.images.get_mut(image).ok_or_else(|| missing(image))?;
        let data = entry
            .snapshots
            .iter()
            .find(|(s, _)| s.name == snapshot)
            .map(|(_, d)| d.clone())
            .ok_or_else(|| AppError::replication(format!("no snapshot {image}@{snapshot}")))?;
        entry.data = data;
        Ok(())
    }

    async fn export_import(
        &self,
        source: &ImageSpec,
        target: &ImageSpec,
    ) -> AppResult<TransferStats> {
        {
            let mut state = self.begin("export_import", source)?;
            if state.failures.contains(&("import".to_string(), target.to_string())) {
                return Err(AppError::replication(format!("import failed on {target}")));
            }
            let data = state
                .images
                .get(source)
                .map(|i| i.data.clone())
                .ok_or_else(|| missing(source))?;
            if state.images.contains_key(target) {
                return Err(AppError::replication(format!("image {target} exists")));
            }
            state.images.insert(
                target.clone(),
                FakeImage {
                    data,
                    ..FakeImage::default()
                },
            );
        }
        self.hold_transfer().await;
        let bytes = self.data(target).map(|d| d.len() as u64).unwrap_or(0);
        Ok(TransferStats { bytes })
    }

    async fn export_import_diff(
        &self,
        source: &ImageSpec,
        from_snapshot: Option<&str>,
        at_snapshot: Option<&str>,
        target: &ImageSpec,
    ) -> AppResult<TransferStats> {
        let bytes = {
            let mut state = self.begin("export_import_diff", source)?;
            let src = state.images.get(source).ok_or_else(|| missing(source))?;
            let snapshot_data = |name: &str| {
                src.snapshots
                    .iter()
                    .find(|(s, _)| s.name == name)
                    .map(|(s, d)| (s.clone(), d.clone()))
                    .ok_or_else(|| AppError::replication(format!("no snapshot {source}@{name}")))
            };
            let base = match from_snapshot {
                Some(name) => snapshot_data(name)?.1,
                None => Vec::new(),
            };
            let (end_snapshot, end) = match at_snapshot {
                Some(name) => {
                    let (info, data) = snapshot_data(name)?;
                    (Some(info), data)
                }
                None => (None, src.data.clone()),
            };
            let bytes = changed_bytes(&base, &end);

            let dst = state.images.get_mut(target).ok_or_else(|| missing(target))?;
            if let Some(from) = from_snapshot {
                if !dst.snapshots.iter().any(|(s, _)| s.name == from) {
                    return Err(AppError::replication(format!(
                        "start snapshot {from} missing on {target}"
                    )));
                }
            }
            dst.data = end.clone();
            if let Some(info) = end_snapshot {
                dst.snapshots.push((info, end));
            }
            bytes
        };
        self.hold_transfer().await;
        Ok(TransferStats { bytes })
    }
}

/// Context factory returning the same fakes for every request.
#[derive(Debug, Clone)]
pub struct FakeContextFactory {
    /// Source cloud.
    pub source: Arc<FakeCloud>,
    /// Target cloud.
    pub target: Arc<FakeCloud>,
    /// Storage backend.
    pub backend: Arc<FakeBackend>,
    /// Configuration.
    pub config: Arc<AppConfig>,
}

impl FakeContextFactory {
    /// Context using the pools of `request`.
    pub fn context(&self, source_pool: &str, target_pool: &str) -> MigrationContext {
        MigrationContext {
            source: self.source.clone(),
            target: self.target.clone(),
            backend: self.backend.clone(),
            source_pool: source_pool.to_string(),
            target_pool: target_pool.to_string(),
            config: Arc::clone(&self.config),
        }
    }
}

impl ContextFactory for FakeContextFactory {
    fn build(&self, request: &MigrationRequest) -> AppResult<MigrationContext> {
        Ok(self.context(&request.source_pool, &request.target_pool))
    }
}

/// Configuration with instant polling.
pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.migration.poll_interval_seconds = 0;
    config.migration.provision_timeout_seconds = 5;
    config
}
