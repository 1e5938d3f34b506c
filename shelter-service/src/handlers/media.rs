use service_core::{
    axum::{
        body::Bytes,
        extract::{Path, State},
        http::{header, StatusCode},
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{dtos::media::MediaUploadResponse, middleware::AuthUser, AppState};

/// Store an uploaded media file
#[utoipa::path(
    post,
    path = "/media",
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Media stored", body = MediaUploadResponse),
        (status = 400, description = "Empty body", body = ErrorResponse),
        (status = 403, description = "Missing permissions", body = ErrorResponse)
    ),
    tag = "Media",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn upload_media(
    State(state): State<AppState>,
    AuthUser(token): AuthUser,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    state.gate.authorize(&["media:write"], &token)?;

    if body.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("Media body is empty")));
    }

    let blob_id = state.media.save_blob(&body).await?;
    Ok((
        StatusCode::CREATED,
        Json(MediaUploadResponse {
            blob_id,
            size: body.len(),
        }),
    ))
}

/// Fetch media bytes
#[utoipa::path(
    get,
    path = "/media/{blob_id}",
    params(("blob_id" = Uuid, Path, description = "Blob id")),
    responses(
        (status = 200, description = "Media bytes", content_type = "application/octet-stream"),
        (status = 403, description = "Missing permissions", body = ErrorResponse),
        (status = 404, description = "Media not found", body = ErrorResponse)
    ),
    tag = "Media",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_media(
    State(state): State<AppState>,
    Path(blob_id): Path<Uuid>,
    AuthUser(token): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.gate.authorize(&["media:read"], &token)?;

    let bytes = state
        .media
        .read_blob(blob_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Media {} not found", blob_id)))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream"),
            // Blobs are immutable once stored.
            (header::CACHE_CONTROL, "private, max-age=3600"),
        ],
        Bytes::copy_from_slice(&bytes),
    ))
}

/// Delete media and evict it from the byte cache
#[utoipa::path(
    delete,
    path = "/media/{blob_id}",
    params(("blob_id" = Uuid, Path, description = "Blob id")),
    responses(
        (status = 204, description = "Media deleted"),
        (status = 403, description = "Missing permissions", body = ErrorResponse),
        (status = 404, description = "Media not found", body = ErrorResponse)
    ),
    tag = "Media",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_media(
    State(state): State<AppState>,
    Path(blob_id): Path<Uuid>,
    AuthUser(token): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.gate.authorize(&["media:write"], &token)?;

    if !state.media.delete_blob(blob_id).await? {
        return Err(AppError::NotFound(anyhow::anyhow!("Media {} not found", blob_id)));
    }
    Ok(StatusCode::NO_CONTENT)
}
