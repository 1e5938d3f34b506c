use service_core::{
    axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use validator::Validate;

use crate::{
    dtos::permissions::{
        CreatePermissionRequest, ListQuery, PermissionListResponse, UpdatePermissionRequest,
    },
    middleware::AuthUser,
    models::Permission,
    utils::ValidatedJson,
    AppState,
};

/// List permissions, served from the response cache when possible
#[utoipa::path(
    get,
    path = "/permissions",
    params(ListQuery),
    responses(
        (status = 200, description = "Permission page", body = PermissionListResponse),
        (status = 403, description = "Missing permissions", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    AuthUser(token): AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    state.gate.authorize(&["permission:read"], &token)?;
    query.validate()?;

    let key = state.permissions_cache.key_for_all("permissions", &query)?;
    if let Some(cached) = state
        .permissions_cache
        .get::<PermissionListResponse>(&key)
        .await
    {
        return Ok(Json(cached));
    }

    let all = state.directory.list_permissions().await?;
    let total = all.len();
    let items = all
        .into_iter()
        .skip(query.skip as usize)
        .take(query.limit as usize)
        .collect();
    let page = PermissionListResponse { items, total };

    state.permissions_cache.set(&key, &page).await;
    Ok(Json(page))
}

/// Create a permission and drop every cached listing
#[utoipa::path(
    post,
    path = "/permissions",
    request_body = CreatePermissionRequest,
    responses(
        (status = 201, description = "Permission created", body = Permission),
        (status = 403, description = "Missing permissions", body = ErrorResponse),
        (status = 409, description = "Permission already exists", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_permission(
    State(state): State<AppState>,
    AuthUser(token): AuthUser,
    ValidatedJson(req): ValidatedJson<CreatePermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.gate.authorize(&["permission:write"], &token)?;

    let permission = Permission::new(&req.entity, &req.operation, req.title);
    state.directory.create_permission(&permission).await?;

    let dropped = state.permissions_cache.invalidate_all_registered().await;
    tracing::info!(
        permission = %permission.scope(),
        invalidated = dropped,
        "Permission created"
    );

    Ok((StatusCode::CREATED, Json(permission)))
}

/// Retitle a permission
#[utoipa::path(
    patch,
    path = "/permissions/{entity}/{operation}",
    params(
        ("entity" = String, Path, description = "Permission entity"),
        ("operation" = String, Path, description = "Permission operation")
    ),
    request_body = UpdatePermissionRequest,
    responses(
        (status = 200, description = "Permission updated", body = Permission),
        (status = 403, description = "Missing permissions", body = ErrorResponse),
        (status = 404, description = "Permission not found", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_permission(
    State(state): State<AppState>,
    Path((entity, operation)): Path<(String, String)>,
    AuthUser(token): AuthUser,
    ValidatedJson(req): ValidatedJson<UpdatePermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.gate.authorize(&["permission:write"], &token)?;

    let mut permission = state
        .directory
        .find_permission(&entity, &operation)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Permission not found")))?;

    if req.title.is_some() {
        permission.title = req.title;
        state.directory.update_permission(&permission).await?;
        // Roles embed their permissions.
        state.permissions_cache.invalidate_all_registered().await;
        state.roles_cache.invalidate_all_registered().await;
    }

    Ok(Json(permission))
}

/// Delete a permission, withdrawing it from every role
///
/// Tokens already issued keep the scope until they are replaced.
#[utoipa::path(
    delete,
    path = "/permissions/{entity}/{operation}",
    params(
        ("entity" = String, Path, description = "Permission entity"),
        ("operation" = String, Path, description = "Permission operation")
    ),
    responses(
        (status = 204, description = "Permission deleted"),
        (status = 403, description = "Missing permissions", body = ErrorResponse),
        (status = 404, description = "Permission not found", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    Path((entity, operation)): Path<(String, String)>,
    AuthUser(token): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.gate.authorize(&["permission:delete"], &token)?;

    let permission = state
        .directory
        .find_permission(&entity, &operation)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Permission not found")))?;
    state.directory.delete_permission(permission.id).await?;

    let dropped = state.permissions_cache.invalidate_all_registered().await
        + state.roles_cache.invalidate_all_registered().await;
    tracing::info!(
        permission = %permission.scope(),
        invalidated = dropped,
        "Permission deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}
