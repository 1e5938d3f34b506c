use service_core::{
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};

use crate::{middleware::AuthUser, models::EditingLock, AppState};

/// Lock a section of an animal record for editing
#[utoipa::path(
    post,
    path = "/animals/{id}/{section}/lock",
    params(
        ("id" = i64, Path, description = "Animal id"),
        ("section" = String, Path, description = "Section name")
    ),
    responses(
        (status = 200, description = "Lock held by the caller", body = EditingLock),
        (status = 403, description = "Missing permissions or locked by another user", body = ErrorResponse)
    ),
    tag = "Editing Locks",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn acquire_lock(
    State(state): State<AppState>,
    Path((resource_id, section)): Path<(i64, String)>,
    AuthUser(token): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .gate
        .authorize_for_section(&section, &["crm:read"], &token)?;
    let lock = state.locks.acquire(resource_id, &section, user.id).await?;
    Ok((StatusCode::OK, Json(lock)))
}

/// Release the caller's lock on a section
#[utoipa::path(
    delete,
    path = "/animals/{id}/{section}/lock",
    params(
        ("id" = i64, Path, description = "Animal id"),
        ("section" = String, Path, description = "Section name")
    ),
    responses(
        (status = 204, description = "Lock released"),
        (status = 403, description = "Missing permissions or locked by another user", body = ErrorResponse),
        (status = 404, description = "No lock on this section", body = ErrorResponse)
    ),
    tag = "Editing Locks",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn release_lock(
    State(state): State<AppState>,
    Path((resource_id, section)): Path<(i64, String)>,
    AuthUser(token): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .gate
        .authorize_for_section(&section, &["crm:read"], &token)?;
    state.locks.release(resource_id, &section, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
