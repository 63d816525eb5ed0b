//! Handlers for the `/converts` and `/convert-outcomes` resources.

use std::io::Cursor;
use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use docconv_core::error::CoreError;
use docconv_core::status::JobStatus;
use docconv_core::types::JobId;
use docconv_core::upload::validate_upload;
use docconv_db::models::job::{Job, NewJob};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;
use crate::ws::JobEvent;

/// How many jobs the listing returns.
pub const RECENT_JOBS_LIMIT: i64 = 100;

/// A hypermedia link attached to a job.
#[derive(Debug, Serialize)]
pub struct Link {
    pub href: String,
    pub rel: &'static str,
    pub method: &'static str,
}

/// A job plus the links that apply to its current status.
#[derive(Debug, Serialize)]
pub struct JobWithLinks {
    #[serde(flatten)]
    pub job: Job,
    pub links: Vec<Link>,
}

impl From<Job> for JobWithLinks {
    fn from(job: Job) -> Self {
        let mut links = vec![Link {
            href: convert_location(job.id),
            rel: "self",
            method: "GET",
        }];
        if job.status == JobStatus::Complete && job.converted_file.is_some() {
            links.push(Link {
                href: format!("/api/v1/convert-outcomes/{}", job.id),
                rel: "download",
                method: "GET",
            });
        }
        Self { job, links }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedJob {
    pub id: JobId,
}

fn convert_location(id: JobId) -> String {
    format!("/api/v1/converts/{id}")
}

/// An uploaded `file` field, read fully into memory.
struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    data: axum::body::Bytes,
}

async fn read_file_field(multipart: &mut Multipart) -> AppResult<UploadedFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        return Ok(UploadedFile {
            filename,
            content_type,
            data,
        });
    }
    Err(AppError::BadRequest("No file provided".into()))
}

/// POST /api/v1/converts
///
/// Accept a document upload as multipart form data with a `file` field.
/// The job is created `pending` and converted in the background.
pub async fn create_convert(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    if state.shutdown.is_cancelled() {
        return Err(AppError::Unavailable(
            "Server is shutting down; no new conversions are accepted".into(),
        ));
    }

    let upload = read_file_field(&mut multipart).await?;
    let accepted = validate_upload(&upload.filename, upload.content_type.as_deref())
        .inspect_err(|e| {
            tracing::warn!(
                filename = %upload.filename,
                content_type = upload.content_type.as_deref().unwrap_or(""),
                error = %e,
                "Rejected upload"
            );
        })?;

    let job = state.store.create(&NewJob::new(accepted.filename.clone())).await?;
    tracing::info!(
        job_id = %job.id,
        filename = %accepted.filename,
        size = upload.data.len(),
        "Conversion job created"
    );

    state.lifecycle.spawn(
        &state.tasks,
        job.id,
        Cursor::new(upload.data),
        accepted.filename,
    );

    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, convert_location(job.id))],
        Json(DataResponse {
            data: CreatedJob { id: job.id },
        }),
    ))
}

/// GET /api/v1/converts
///
/// The most recently created jobs, newest first.
pub async fn list_converts(State(state): State<AppState>) -> AppResult<Json<DataResponse<Vec<Job>>>> {
    let jobs = state.store.list_recent(RECENT_JOBS_LIMIT).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/converts/{id}
pub async fn get_convert(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<Json<DataResponse<JobWithLinks>>> {
    let job = state.store.get(id).await?;
    Ok(Json(DataResponse { data: job.into() }))
}

/// GET /api/v1/convert-outcomes/{id}
///
/// Stream the converted HTML as an attachment. Only a `complete` job with a
/// readable artifact has an outcome.
pub async fn download_outcome(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.store.get(id).await?;
    let not_found = || {
        AppError::Core(CoreError::NotFound {
            entity: "Converted file",
            id: id.to_string(),
        })
    };

    if job.status != JobStatus::Complete {
        return Err(not_found());
    }
    let path = job.converted_file.ok_or_else(not_found)?;

    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        tracing::warn!(job_id = %id, path = %path, error = %e, "Failed to open converted file");
        not_found()
    })?;

    let name = FsPath::new(&path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{id}.html"));

    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment_disposition(&name)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    ))
}

/// DELETE /api/v1/converts/{id}
///
/// Only terminal jobs can be deleted. Removes the working directory and the
/// record, then tells observers.
pub async fn delete_convert(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<StatusCode> {
    let job = state.store.get(id).await?;
    if !job.is_terminal() {
        return Err(AppError::Core(CoreError::Forbidden(
            "Cannot delete job in progress".into(),
        )));
    }

    let paths = state.storage.job(id);
    if let Err(e) = paths.remove().await {
        tracing::error!(
            job_id = %id,
            path = %paths.job_dir.display(),
            error = %e,
            "Failed to remove job directory"
        );
    }

    state.store.delete(id).await?;
    tracing::info!(job_id = %id, "Conversion job deleted");

    state.registry.broadcast(&JobEvent::deleted(id)).await;
    Ok(StatusCode::NO_CONTENT)
}

/// `Content-Disposition` value for `name`, reduced to characters that are
/// safe inside a quoted header parameter.
fn attachment_disposition(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}
