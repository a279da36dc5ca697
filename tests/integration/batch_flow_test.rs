//! End-to-end batch flows against the in-memory clouds and storage.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use migrator_core::traits::cloud::{FixedAddress, ServerStatus};
use migrator_core::traits::replication::{ImageSpec, Site};
use migrator_core::types::ReplicationStrategy;
use migrator_worker::BatchCoordinator;
use migrator_worker::testing::{FakeBackend, FakeCloud, FakeContextFactory, fast_config, server, volume};

fn image(site: Site, pool: &str, name: &str) -> ImageSpec {
    ImageSpec {
        site,
        pool: pool.to_string(),
        image: name.to_string(),
    }
}

/// Four stopped VMs present in both clouds, one volume each.
fn fleet() -> FakeContextFactory {
    let mut source = FakeCloud::new("source");
    let mut target = FakeCloud::new("target");
    let mut backend = FakeBackend::new().with_transfer_delay(Duration::from_millis(50));
    for i in 0..4 {
        source = source.with_server(
            server(&format!("s{i}"), &format!("app{i}"), None, &[&format!("sv{i}")]),
            vec![volume(&format!("sv{i}"), &format!("app{i}-root"), true, 10)],
        );
        let mut existing = server(&format!("t{i}"), &format!("app{i}"), None, &[&format!("tv{i}")]);
        existing.status = ServerStatus::Shutoff;
        target = target.with_server(existing, vec![volume(&format!("tv{i}"), "", true, 10)]);
        backend = backend.with_image(
            Site::Source,
            "volumes",
            &format!("volume-sv{i}"),
            format!("disk of app{i}").as_bytes(),
        );
    }
    FakeContextFactory {
        source: Arc::new(source),
        target: Arc::new(target),
        backend: Arc::new(backend),
        config: Arc::new(fast_config()),
    }
}

async fn manifest(dir: &tempfile::TempDir, rows: &str) -> std::path::PathBuf {
    let path = dir.path().join("batch.csv");
    tokio::fs::write(&path, format!("vm_name,target_az,owner\n{rows}"))
        .await
        .expect("write manifest");
    path
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_then_incremental_sync() {
    let fakes = fleet();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = manifest(&dir, "app0,az-a,ops\napp1,az-a,ops\napp2,az-b,\napp3,az-b,dev\n").await;
    let coordinator = BatchCoordinator::new(fakes.context("volumes", "volumes-b"));

    let failed = coordinator
        .run_manifest(&path, 2, ReplicationStrategy::Snapshot)
        .await
        .expect("snapshot batch");
    assert!(failed.is_empty());
    assert_eq!(fakes.backend.peak_transfers(), 2);

    for i in 0..4 {
        let source = image(Site::Source, "volumes", &format!("volume-sv{i}"));
        let target = image(Site::Target, "volumes-b", &format!("volume-tv{i}"));
        assert_eq!(fakes.backend.data(&target), fakes.backend.data(&source));
        assert_eq!(fakes.backend.snapshot_names(&source).len(), 1);
        assert_eq!(
            fakes.backend.snapshot_names(&target),
            fakes.backend.snapshot_names(&source)
        );
    }

    // New writes on one VM are carried over by the incremental run.
    let changed = image(Site::Source, "volumes", "volume-sv2");
    fakes.backend.write(&changed, b"disk of app2, patched");

    let failed = coordinator
        .run_manifest(&path, 2, ReplicationStrategy::IncrementalDiff)
        .await
        .expect("incremental batch");
    assert!(failed.is_empty());
    assert_eq!(fakes.backend.count("rollback"), 4);
    assert_eq!(
        fakes.backend.data(&image(Site::Target, "volumes-b", "volume-tv2")),
        Some(b"disk of app2, patched".to_vec())
    );
    assert_eq!(fakes.target.count("create_server"), 0);
}

#[tokio::test]
async fn test_one_failure_does_not_affect_the_rest() {
    let fakes = fleet();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = manifest(&dir, "app0,az-a,\nmissing,az-a,\napp1,az-a,\n\n,az-b,\n").await;

    let failed = BatchCoordinator::new(fakes.context("volumes", "volumes-b"))
        .run_manifest(&path, 3, ReplicationStrategy::FullCopy)
        .await
        .expect("batch");

    assert_eq!(failed, BTreeSet::from(["missing".to_string()]));
    assert_eq!(fakes.backend.count("export_import"), 2);
}

#[tokio::test]
async fn test_provisioning_failure_is_isolated() {
    let source = FakeCloud::new("source")
        .with_server(
            server("s0", "web", None, &["sv0"]),
            vec![volume("sv0", "web-root", true, 10)],
        )
        .with_addresses(
            "s0",
            vec![FixedAddress {
                subnet_id: "src-sub".to_string(),
                cidr: "192.168.1.0/24".to_string(),
                ip_address: "192.168.1.20".to_string(),
            }],
        )
        .with_image("img-src", "ubuntu-22.04")
        .with_server(
            server("s1", "db", None, &["sv1"]),
            vec![volume("sv1", "db-root", true, 10)],
        )
        .with_addresses(
            "s1",
            vec![FixedAddress {
                subnet_id: "src-sub".to_string(),
                cidr: "192.168.1.0/24".to_string(),
                ip_address: "192.168.1.21".to_string(),
            }],
        );
    let target = FakeCloud::new("target")
        .with_image("img-tgt", "ubuntu-22.04")
        .with_subnet("192.168.1.0/24", "net-a", "sub-a")
        .with_failing_server("db");
    let backend = FakeBackend::new()
        .with_image(Site::Source, "volumes", "volume-sv0", b"web disk")
        .with_image(Site::Source, "volumes", "volume-sv1", b"db disk");
    let fakes = FakeContextFactory {
        source: Arc::new(source),
        target: Arc::new(target),
        backend: Arc::new(backend),
        config: Arc::new(fast_config()),
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let path = manifest(&dir, "web,az-a,\ndb,az-a,\n").await;

    let failed = BatchCoordinator::new(fakes.context("volumes", "volumes-b"))
        .run_manifest(&path, 2, ReplicationStrategy::Snapshot)
        .await
        .expect("batch");

    assert_eq!(failed, BTreeSet::from(["db".to_string()]));
    let web = fakes.target.server_named("web").expect("web created");
    assert_eq!(web.status, ServerStatus::Shutoff);
    let boot = image(
        Site::Target,
        "volumes-b",
        &format!("volume-{}", web.attached_volume_ids[0]),
    );
    assert_eq!(fakes.backend.data(&boot), Some(b"web disk".to_vec()));
}
