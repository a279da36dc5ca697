//! Integration tests for the HTTP surface.

mod helpers;

use std::time::Duration;

use http::StatusCode;
use serde_json::Value;

use migrator_core::traits::cloud::ServerStatus;
use migrator_core::traits::replication::{ImageSpec, Site};
use migrator_worker::testing::{FakeBackend, FakeCloud, server, volume};

use helpers::{MigrationForm, TestApp, job_id};

const MANIFEST: &str = "vm_name,target_az\nvm1,az-b\n";

/// `vm1` in both clouds, stopped in the target, with a boot and a data
/// volume on each side.
fn vm1_fleet() -> (FakeCloud, FakeCloud, FakeBackend) {
    let source = FakeCloud::new("source").with_server(
        server("s1", "vm1", None, &["v-root", "v-data"]),
        vec![
            volume("v-root", "root", true, 20),
            volume("v-data", "data", false, 50),
        ],
    );
    let mut existing = server("t1", "vm1", None, &["t-root", "t-data"]);
    existing.status = ServerStatus::Shutoff;
    let target = FakeCloud::new("target").with_server(
        existing,
        vec![
            volume("t-root", "", true, 20),
            volume("t-data", "", false, 50),
        ],
    );
    let backend = FakeBackend::new()
        .with_image(Site::Source, "volumes", "volume-v-root", b"boot-bytes")
        .with_image(Site::Source, "volumes", "volume-v-data", b"data-bytes");
    (source, target, backend)
}

fn app() -> TestApp {
    let (source, target, backend) = vm1_fleet();
    TestApp::new(source, target, backend)
}

fn target_image(name: &str) -> ImageSpec {
    ImageSpec {
        site: Site::Target,
        pool: "volumes-b".to_string(),
        image: name.to_string(),
    }
}

async fn wait_until_done(app: &TestApp, id: &str) -> Value {
    for _ in 0..250 {
        let record = app.get(&format!("/migrations/{id}")).await.json();
        if record["data"]["state"] != "running" {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {id} did not finish");
}

#[tokio::test]
async fn test_healthz() {
    let response = app().get("/healthz").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "OK");
}

#[tokio::test]
async fn test_full_migrate_into_existing_vm() {
    let app = app();
    let form = MigrationForm::new("batch.csv", MANIFEST)
        .field("migration_method", "full_migrate")
        .field("concurrency", "2");

    let response = app.submit(&form).await;

    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert!(response.body.ends_with("All VMs migrated."));
    assert_eq!(app.fakes.target.provisioning_calls(), 0);
    assert_eq!(app.fakes.backend.count("remove_image"), 2);
    assert_eq!(app.fakes.backend.count("export_import"), 2);
    assert_eq!(
        app.fakes.backend.data(&target_image("volume-t-root")),
        Some(b"boot-bytes".to_vec())
    );
    assert_eq!(
        app.fakes.backend.data(&target_image("volume-t-data")),
        Some(b"data-bytes".to_vec())
    );

    let list = app.get("/migrations").await.json();
    let jobs = list["data"].as_array().expect("job list");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["state"], "completed");
    assert_eq!(jobs[0]["id"], job_id(&response.body).as_str());
    assert_eq!(jobs[0]["failed_vms"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_failed_vms_are_reported() {
    let app = app();
    let form = MigrationForm::new("batch.csv", "vm_name,target_az\nvm1,az-b\nghost,az-a\n")
        .field("migration_method", "full_migrate");

    let response = app.submit(&form).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.ends_with("Failed VMs: ghost"));
    let record = app
        .get(&format!("/migrations/{}", job_id(&response.body)))
        .await
        .json();
    assert_eq!(record["data"]["failed_vms"][0], "ghost");
}

#[tokio::test]
async fn test_manifest_error_fails_job() {
    let app = app();
    let response = app
        .submit(&MigrationForm::new("batch.csv", "name,zone\nvm1,az-b\n"))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body.starts_with("Migration job"));
    assert!(app.fakes.source.calls().is_empty());

    let jobs = app.get("/migrations").await.json();
    assert_eq!(jobs["data"][0]["state"], "error");
}

#[tokio::test]
async fn test_invalid_submissions_are_rejected() {
    let app = app();

    let missing = app.submit(&MigrationForm::without_manifest()).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert!(missing.body.contains("manifest_file"));

    let method = app
        .submit(&MigrationForm::new("batch.csv", MANIFEST).field("migration_method", "rsync"))
        .await;
    assert_eq!(method.status, StatusCode::BAD_REQUEST);

    let zero = app
        .submit(&MigrationForm::new("batch.csv", MANIFEST).field("concurrency", "0"))
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    let too_many = app
        .submit(&MigrationForm::new("batch.csv", MANIFEST).field("concurrency", "65"))
        .await;
    assert_eq!(too_many.status, StatusCode::BAD_REQUEST);

    let password = app
        .submit(&MigrationForm::new("batch.csv", MANIFEST).field("target_password", ""))
        .await;
    assert_eq!(password.status, StatusCode::BAD_REQUEST);

    // Nothing was registered.
    let jobs = app.get("/migrations").await.json();
    assert_eq!(jobs["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_duplicate_submission_while_running() {
    let (source, target, backend) = vm1_fleet();
    let app = TestApp::new(
        source,
        target,
        backend.with_transfer_delay(Duration::from_millis(500)),
    );
    let form = MigrationForm::new("batch.csv", MANIFEST)
        .field("migration_method", "full_migrate")
        .field("detach", "true");

    let first = app.submit(&form).await;
    assert_eq!(first.status, StatusCode::ACCEPTED);

    let second = app.submit(&form.clone().field("detach", "false")).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert!(second.body.contains("already running"));

    let record = wait_until_done(&app, &job_id(&first.body)).await;
    assert_eq!(record["data"]["state"], "completed");
    // One execution only.
    assert_eq!(app.fakes.backend.count("export_import"), 2);

    // The key is free again once the job finished.
    let third = app.submit(&form).await;
    assert_eq!(third.status, StatusCode::ACCEPTED);
    wait_until_done(&app, &job_id(&third.body)).await;
    assert_eq!(app.fakes.backend.count("export_import"), 4);
}

#[tokio::test]
async fn test_storage_configs_are_saved() {
    let app = app();
    let form = MigrationForm::new("batch.csv", MANIFEST)
        .field("migration_method", "full_migrate")
        .file("source_storage_conf", "ceph.conf", b"[global]\nmon_host = 10.0.0.1\n")
        .file("target_storage_conf", "", b"");

    let response = app.submit(&form).await;
    assert_eq!(response.status, StatusCode::OK);

    let id = job_id(&response.body);
    let mut saved: Vec<String> = std::fs::read_dir(&app.state.config.migration.upload_dir)
        .expect("upload dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    saved.sort();
    assert_eq!(saved, vec![format!("{id}-batch.csv"), format!("{id}-ceph.conf")]);
}

#[tokio::test]
async fn test_workbook_upload_with_ceph_field_names() {
    let mut book = rust_xlsxwriter::Workbook::new();
    let sheet = book.add_worksheet();
    for (col, (header, value)) in [("vm_name", "vm1"), ("target_az", "az-b")]
        .into_iter()
        .enumerate()
    {
        sheet.write_string(0, col as u16, header).expect("header");
        sheet.write_string(1, col as u16, value).expect("cell");
    }
    let workbook = book.save_to_buffer().expect("workbook");

    let app = app();
    let form = MigrationForm::credentials_only()
        .file("excel_file", "batch.xlsx", &workbook)
        .file("source_ceph_conf_file", "ceph.conf", b"[global]\n")
        .file("target_ceph_conf_file", "ceph-b.conf", b"[global]\n")
        .field("source_ceph_pool", "volumes")
        .field("target_ceph_pool", "volumes-b")
        .field("migration_method", "full_migrate");

    let response = app.submit(&form).await;

    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert!(response.body.ends_with("All VMs migrated."));
    assert_eq!(
        app.fakes.backend.data(&target_image("volume-t-root")),
        Some(b"boot-bytes".to_vec())
    );

    let id = job_id(&response.body);
    let mut saved: Vec<String> = std::fs::read_dir(&app.state.config.migration.upload_dir)
        .expect("upload dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    saved.sort();
    assert_eq!(
        saved,
        vec![
            format!("{id}-batch.xlsx"),
            format!("{id}-ceph-b.conf"),
            format!("{id}-ceph.conf"),
        ]
    );
}

#[tokio::test]
async fn test_job_lookup_errors() {
    let app = app();
    assert_eq!(
        app.get("/migrations/not-a-uuid").await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        app.get("/migrations/6f1c3c1e-8f7a-4a55-9a42-3c8d2f1b0e11")
            .await
            .status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_logs_show_migration_lines_only() {
    let app = app();

    let missing = app.get("/logs").await;
    assert_eq!(missing.status, StatusCode::OK);
    assert_eq!(missing.body, "Log file not found.");

    std::fs::write(
        &app.state.config.logging.file,
        "2024-05-01T10:00:00Z  INFO migration: Migrating VM 'vm1'\n\
         2024-05-01T10:00:01Z  INFO migrator_api::middleware::logging: HTTP request\n\
         2024-05-01T10:00:02Z ERROR migration: Migration of VM 'vm2' failed\n",
    )
    .expect("write log");

    let logs = app.get("/logs").await;
    assert_eq!(logs.status, StatusCode::OK);
    assert_eq!(
        logs.body,
        "2024-05-01T10:00:00Z  INFO migration: Migrating VM 'vm1'\n\
         2024-05-01T10:00:02Z ERROR migration: Migration of VM 'vm2' failed"
    );
}
