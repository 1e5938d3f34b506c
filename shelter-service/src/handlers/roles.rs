use service_core::{
    axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    dtos::roles::{CreateRoleRequest, RoleQuery, UpdateRoleRequest},
    middleware::AuthUser,
    models::{Permission, Role},
    services::{AuthenticatedToken, UserDirectory},
    utils::ValidatedJson,
    AppState,
};

/// List roles across domains, served from the response cache when possible
///
/// Without a `domain` filter only the super admin sees every domain; anyone
/// else gets their own.
#[utoipa::path(
    get,
    path = "/roles",
    params(RoleQuery),
    responses(
        (status = 200, description = "Matching roles", body = Vec<Role>),
        (status = 403, description = "Missing permissions", body = ErrorResponse),
        (status = 404, description = "No role matches", body = ErrorResponse)
    ),
    tag = "Roles",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_roles(
    State(state): State<AppState>,
    AuthUser(token): AuthUser,
    Query(query): Query<RoleQuery>,
) -> Result<impl IntoResponse, AppError> {
    let domain = scoped_domain(&state, query.domain.as_deref(), &token);
    let checked = domain.as_deref().unwrap_or(token.user.domain.as_str());
    state.gate.authorize_in_domain(checked, &["role:read"], &token)?;

    let roles = cached_roles(&state, domain.as_deref(), query.name.as_deref()).await?;
    Ok(Json(roles))
}

/// List the roles of one domain
#[utoipa::path(
    get,
    path = "/roles/{domain}",
    params(
        ("domain" = String, Path, description = "Role domain"),
        RoleQuery
    ),
    responses(
        (status = 200, description = "Roles of the domain", body = Vec<Role>),
        (status = 403, description = "Missing permissions", body = ErrorResponse),
        (status = 404, description = "No role matches", body = ErrorResponse)
    ),
    tag = "Roles",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_domain_roles(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    AuthUser(token): AuthUser,
    Query(query): Query<RoleQuery>,
) -> Result<impl IntoResponse, AppError> {
    let domain = domain.trim().to_lowercase();
    state
        .gate
        .authorize_in_domain(&domain, &["role:read"], &token)?;

    let roles = cached_roles(&state, Some(&domain), query.name.as_deref()).await?;
    Ok(Json(roles))
}

/// Create a role with an initial set of grants
#[utoipa::path(
    post,
    path = "/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Unknown permissions", body = ErrorResponse),
        (status = 403, description = "Missing permissions or foreign domain", body = ErrorResponse),
        (status = 409, description = "Role already exists", body = ErrorResponse)
    ),
    tag = "Roles",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_role(
    State(state): State<AppState>,
    AuthUser(token): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = req.name.trim().to_lowercase();
    let domain = req.domain.trim().to_lowercase();
    state
        .gate
        .authorize_role_grant(&domain, &name, &["role:write"], &token)?;

    let permissions = resolve_scopes(state.directory.as_ref(), &req.permissions).await?;
    let role = Role {
        id: Uuid::new_v4(),
        name,
        domain,
        title: req.title,
        permissions,
    };
    state.directory.create_role(&role).await?;

    let dropped = state.roles_cache.invalidate_all_registered().await;
    tracing::info!(
        role = %role.name,
        domain = %role.domain,
        invalidated = dropped,
        "Role created"
    );

    Ok((StatusCode::CREATED, Json(role)))
}

/// Change a role's title and grant or withdraw permissions
///
/// Holders of the role see the change once they obtain a new access token.
#[utoipa::path(
    patch,
    path = "/roles/{domain}/{name}",
    params(
        ("domain" = String, Path, description = "Role domain"),
        ("name" = String, Path, description = "Role name")
    ),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 400, description = "Unknown permissions", body = ErrorResponse),
        (status = 403, description = "Missing permissions or foreign domain", body = ErrorResponse),
        (status = 404, description = "Role not found", body = ErrorResponse)
    ),
    tag = "Roles",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_role(
    State(state): State<AppState>,
    Path((domain, name)): Path<(String, String)>,
    AuthUser(token): AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let domain = domain.trim().to_lowercase();
    let name = name.trim().to_lowercase();
    state
        .gate
        .authorize_role_grant(&domain, &name, &["role:write"], &token)?;

    let mut role = state
        .directory
        .find_role(&domain, &name)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Role not found")))?;

    // Both lists are checked before anything changes.
    let mut scopes = req.assign.clone();
    scopes.extend(req.unassign.iter().cloned());
    let resolved = resolve_scopes(state.directory.as_ref(), &scopes).await?;
    let (assign, unassign) = resolved.split_at(req.assign.len());

    if let Some(title) = req.title {
        role.title = Some(title);
    }
    for permission in assign {
        if !role.permissions.iter().any(|p| p.id == permission.id) {
            role.permissions.push(permission.clone());
        }
    }
    role.permissions
        .retain(|p| !unassign.iter().any(|u| u.id == p.id));
    role.permissions
        .sort_by(|a, b| (&a.entity, &a.operation).cmp(&(&b.entity, &b.operation)));

    state.directory.update_role(&role).await?;

    let dropped = state.roles_cache.invalidate_all_registered().await;
    tracing::info!(
        role = %role.name,
        domain = %role.domain,
        assigned = assign.len(),
        unassigned = unassign.len(),
        invalidated = dropped,
        "Role updated"
    );

    Ok(Json(role))
}

/// Delete a role. Users holding it are left without a role
#[utoipa::path(
    delete,
    path = "/roles/{domain}/{name}",
    params(
        ("domain" = String, Path, description = "Role domain"),
        ("name" = String, Path, description = "Role name")
    ),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 403, description = "Missing permissions or protected role", body = ErrorResponse),
        (status = 404, description = "Role not found", body = ErrorResponse)
    ),
    tag = "Roles",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_role(
    State(state): State<AppState>,
    Path((domain, name)): Path<(String, String)>,
    AuthUser(token): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let domain = domain.trim().to_lowercase();
    let name = name.trim().to_lowercase();
    state
        .gate
        .authorize_in_domain(&domain, &["role:delete"], &token)?;

    if state.gate.is_super_role(&name, &domain) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "The super admin role cannot be deleted"
        )));
    }

    let role = state
        .directory
        .find_role(&domain, &name)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Role not found")))?;
    state.directory.delete_role(role.id).await?;

    let dropped = state.roles_cache.invalidate_all_registered().await
        + state.users_cache.invalidate_all_registered().await;
    tracing::info!(role = %role.name, domain = %role.domain, invalidated = dropped, "Role deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// The domain a listing is narrowed to: the requested one, or the caller's
/// own unless the caller is the super admin.
pub(crate) fn scoped_domain(
    state: &AppState,
    requested: Option<&str>,
    token: &AuthenticatedToken,
) -> Option<String> {
    match requested.map(str::trim).filter(|d| !d.is_empty()) {
        Some(domain) => Some(domain.to_lowercase()),
        None if state.gate.is_super_admin(&token.claims) => None,
        None => Some(token.user.domain.clone()),
    }
}

async fn cached_roles(
    state: &AppState,
    domain: Option<&str>,
    name: Option<&str>,
) -> Result<Vec<Role>, AppError> {
    let name = name.map(|n| n.trim().to_lowercase());
    let key = state
        .roles_cache
        .key_for_all("roles", &(domain, name.as_deref()))?;
    if let Some(cached) = state.roles_cache.get::<Vec<Role>>(&key).await {
        return Ok(cached);
    }

    let roles = state.directory.list_roles(domain, name.as_deref()).await?;
    if roles.is_empty() {
        return Err(AppError::NotFound(anyhow::anyhow!("Role not found")));
    }

    state.roles_cache.set(&key, &roles).await;
    Ok(roles)
}

/// Look up `entity:operation` scopes, failing with every unknown one named.
async fn resolve_scopes(
    directory: &dyn UserDirectory,
    scopes: &[String],
) -> Result<Vec<Permission>, AppError> {
    let mut found = Vec::with_capacity(scopes.len());
    let mut unknown = Vec::new();

    for scope in scopes {
        let permission = match scope.split_once(':') {
            Some((entity, operation)) => directory.find_permission(entity, operation).await?,
            None => None,
        };
        match permission {
            Some(permission) => found.push(permission),
            None => unknown.push(scope.as_str()),
        }
    }

    if !unknown.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Unknown permissions: {}",
            unknown.join(", ")
        )));
    }
    Ok(found)
}
