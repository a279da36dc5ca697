//! Migration submission handler.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing;
use validator::Validate;

use migrator_core::MIGRATION_TARGET;
use migrator_core::error::{AppError, ErrorKind};
use migrator_core::result::AppResult;
use migrator_core::types::{JobId, JobKey};
use migrator_worker::{BatchCoordinator, JobOutcome, MigrationRequest, TaskRegistry};

use crate::dto::request::{MigrateRequest, UploadedFile};
use crate::dto::response::{MigrationAccepted, MigrationSummary};
use crate::error::ApiError;
use crate::state::AppState;

/// Submission form split into text fields and files.
#[derive(Debug, Default)]
struct MigrateForm {
    fields: HashMap<String, String>,
    manifest: Option<UploadedFile>,
    source_storage_conf: Option<UploadedFile>,
    target_storage_conf: Option<UploadedFile>,
}

/// POST /migrate
///
/// Runs the batch to completion unless `detach` is set, in which case the
/// job id is returned as soon as the job is accepted.
pub async fn submit_migration(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = read_form(multipart).await?;
    let settings = &state.config.migration;

    let request = MigrateRequest::from_fields(&form.fields, settings.default_concurrency)?;
    request
        .validate()
        .map_err(|e| AppError::validation(format!("Invalid submission: {e}")))?;
    if request.concurrency > settings.max_concurrency {
        return Err(AppError::validation(format!(
            "concurrency must not exceed {}",
            settings.max_concurrency
        ))
        .into());
    }
    let manifest = form
        .manifest
        .as_ref()
        .ok_or_else(|| AppError::validation("manifest_file is required"))?;
    let manifest_name = base_name(&manifest.file_name, "manifest.csv");

    let key = JobKey::derive(&manifest_name, &request.source.auth_url);
    let Some(job_id) = state.registry.begin(key.clone()) else {
        return Err(AppError::conflict(format!(
            "Migration of '{manifest_name}' is already running"
        ))
        .into());
    };
    tracing::info!(
        target: MIGRATION_TARGET,
        "Accepted migration job {} ({}): strategy {}, concurrency {}",
        job_id,
        key,
        request.migration_method,
        request.concurrency
    );

    let detach = request.detach;
    let prepared = prepare(&state, job_id, manifest_name, request, &form).await;
    let (coordinator, migration) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            state
                .registry
                .finish(job_id, JobOutcome::Error(e.message.clone()));
            return Err(e.into());
        }
    };

    let handle = tokio::spawn(run_job(
        Arc::clone(&state.registry),
        job_id,
        coordinator,
        migration,
    ));

    if detach {
        let accepted = MigrationAccepted { job_id };
        return Ok((StatusCode::ACCEPTED, accepted.to_string()).into_response());
    }

    match handle.await {
        Ok(Ok(failed_vms)) => Ok(MigrationSummary { job_id, failed_vms }
            .to_string()
            .into_response()),
        Ok(Err(e)) => Err(AppError::new(
            e.kind,
            format!("Migration job {job_id} failed: {}", e.message),
        )
        .into()),
        Err(e) => Err(AppError::internal(format!("Migration job {job_id} aborted: {e}")).into()),
    }
}

/// Save the uploads and connect to both environments.
async fn prepare(
    state: &AppState,
    job_id: JobId,
    manifest_name: String,
    request: MigrateRequest,
    form: &MigrateForm,
) -> AppResult<(BatchCoordinator, MigrationRequest)> {
    let upload_dir = Path::new(&state.config.migration.upload_dir);
    let manifest_path = match &form.manifest {
        Some(file) => save_upload(upload_dir, job_id, "manifest.csv", file).await?,
        None => return Err(AppError::validation("manifest_file is required")),
    };
    let source_storage_conf = match &form.source_storage_conf {
        Some(file) => Some(save_upload(upload_dir, job_id, "source.conf", file).await?),
        None => None,
    };
    let target_storage_conf = match &form.target_storage_conf {
        Some(file) => Some(save_upload(upload_dir, job_id, "target.conf", file).await?),
        None => None,
    };

    let migration = MigrationRequest {
        manifest_path,
        manifest_name,
        source: request.source.into(),
        target: request.target.into(),
        source_storage_conf,
        target_storage_conf,
        source_pool: request.source_pool,
        target_pool: request.target_pool,
        concurrency: request.concurrency,
        strategy: request.migration_method,
    };
    let context = state.contexts.build(&migration)?;
    Ok((BatchCoordinator::new(context), migration))
}

/// Run the batch and record its outcome.
async fn run_job(
    registry: Arc<TaskRegistry>,
    job_id: JobId,
    coordinator: BatchCoordinator,
    migration: MigrationRequest,
) -> AppResult<BTreeSet<String>> {
    let batch = tokio::spawn(async move {
        coordinator
            .run_manifest(
                &migration.manifest_path,
                migration.concurrency,
                migration.strategy,
            )
            .await
    });
    let result = match batch.await {
        Ok(result) => result,
        Err(e) => Err(AppError::internal(format!("Batch task aborted: {e}"))),
    };

    match &result {
        Ok(failed_vms) => {
            tracing::info!(
                target: MIGRATION_TARGET,
                "Migration job {} completed with {} failed VM(s)",
                job_id,
                failed_vms.len()
            );
            registry.finish(
                job_id,
                JobOutcome::Completed {
                    failed_vms: failed_vms.clone(),
                },
            );
        }
        Err(e) => {
            tracing::error!(
                target: MIGRATION_TARGET,
                "Migration job {} failed: {}",
                job_id,
                e
            );
            registry.finish(job_id, JobOutcome::Error(e.message.clone()));
        }
    }
    result
}

/// Split the multipart body into text fields and files.
///
/// `excel_file`, `source_ceph_conf_file` and `target_ceph_conf_file` are
/// accepted as aliases of the file fields.
async fn read_form(mut multipart: Multipart) -> AppResult<MigrateForm> {
    let mut form = MigrateForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "manifest_file" | "excel_file" => form.manifest = read_file(field).await?,
            "source_storage_conf" | "source_ceph_conf_file" => {
                form.source_storage_conf = read_file(field).await?
            }
            "target_storage_conf" | "target_ceph_conf_file" => {
                form.target_storage_conf = read_file(field).await?
            }
            _ => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::validation(format!("Read error: {e}")))?;
                form.fields.insert(name, text);
            }
        }
    }
    Ok(form)
}

/// Read a file part. An empty part without a file name means no file.
async fn read_file(field: Field<'_>) -> AppResult<Option<UploadedFile>> {
    let file_name = field.file_name().map(String::from).unwrap_or_default();
    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::validation(format!("Read error: {e}")))?;
    if file_name.is_empty() && data.is_empty() {
        return Ok(None);
    }
    Ok(Some(UploadedFile { file_name, data }))
}

/// Write an upload under `dir`, prefixed with the job id.
async fn save_upload(
    dir: &Path,
    job_id: JobId,
    fallback: &str,
    file: &UploadedFile,
) -> AppResult<PathBuf> {
    let path = dir.join(format!("{job_id}-{}", base_name(&file.file_name, fallback)));
    tokio::fs::write(&path, &file.data).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Io,
            format!("Cannot save upload '{}': {e}", path.display()),
            e,
        )
    })?;
    Ok(path)
}

/// Final path component of a client-supplied file name.
fn base_name(file_name: &str, fallback: &str) -> String {
    Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
