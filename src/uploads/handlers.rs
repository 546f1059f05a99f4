use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection}, DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    routing::post,
    Json, Router,
};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use super::services::{self, IncomingFile, UploadError, UploadedFile};
use crate::{
    auth::AdminUser,
    error::{AppError, Envelope},
    state::AppState,
    validation::ApiQuery,
};

const FILE_FIELD: &str = "file";
/// Multipart framing on top of the file itself.
const BODY_OVERHEAD: usize = 64 * 1024;

pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_file).delete(delete_file))
        // Above the file ceiling, so oversized files reach the service check.
        .layer(DefaultBodyLimit::max(max_upload_bytes * 2 + BODY_OVERHEAD))
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub file: UploadedFile,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub filename: Option<String>,
}

impl From<UploadError> for AppError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::InvalidType(_) | UploadError::TooLarge { .. } | UploadError::InvalidName(_) => {
                AppError::BadRequest(e.to_string())
            }
            UploadError::NotFound(_) => AppError::NotFound("File not found".into()),
            UploadError::Io(io) => AppError::Io(io),
        }
    }
}

fn multipart_error(e: MultipartError, max: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return UploadError::TooLarge { max }.into();
    }
    AppError::BadRequest(e.body_text())
}

#[instrument(skip(state, mp), fields(user_id = %admin.user_id))]
pub async fn upload_file(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    mp: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let max = state.config.uploads.max_bytes;
    let mut mp = mp.map_err(|e| AppError::BadRequest(e.body_text()))?;

    while let Some(mut field) = mp.next_field().await.map_err(|e| multipart_error(e, max))? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        if !services::is_allowed_type(&content_type) {
            warn!(%content_type, "upload rejected: type");
            return Err(UploadError::InvalidType(content_type).into());
        }
        let original_name = field.file_name().unwrap_or("file").to_string();

        // Stop reading as soon as the ceiling is crossed.
        let mut buf = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, max))? {
            if buf.len() + chunk.len() > max {
                warn!(%original_name, "upload rejected: size");
                return Err(UploadError::TooLarge { max }.into());
            }
            buf.extend_from_slice(&chunk);
        }

        let file = services::upload(
            &state,
            IncomingFile {
                original_name,
                content_type,
                body: buf.freeze(),
            },
        )
        .await?;
        return Ok(Json(UploadResponse { success: true, file }));
    }

    Err(AppError::BadRequest("No file uploaded".into()))
}

#[instrument(skip(state), fields(user_id = %admin.user_id))]
pub async fn delete_file(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiQuery(params): ApiQuery<DeleteParams>,
) -> Result<Json<Envelope<()>>, AppError> {
    let filename = params
        .filename
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AppError::BadRequest("filename is required".into()))?;
    services::remove(&state, &filename).await?;
    Ok(Json(Envelope::done()))
}
