use service_core::{
    axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};

use crate::{
    dtos::{
        auth::ChangePasswordRequest,
        users::{UpdateUserRequest, UserQuery},
        MessageResponse,
    },
    handlers::roles::scoped_domain,
    middleware::AuthUser,
    models::SanitizedUser,
    services::TokenStore,
    utils::ValidatedJson,
    AppState,
};

/// List users, served from the response cache when possible
///
/// Without a `domain` filter only the super admin sees every domain.
#[utoipa::path(
    get,
    path = "/users",
    params(UserQuery),
    responses(
        (status = 200, description = "Matching users", body = Vec<SanitizedUser>),
        (status = 403, description = "Missing permissions", body = ErrorResponse),
        (status = 404, description = "No user matches", body = ErrorResponse)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(token): AuthUser,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, AppError> {
    let domain = scoped_domain(&state, query.domain.as_deref(), &token);
    let checked = domain.as_deref().unwrap_or(token.user.domain.as_str());
    state.gate.authorize_in_domain(checked, &["user:read"], &token)?;

    let email = query.email.map(|e| e.trim().to_lowercase());
    let key = state
        .users_cache
        .key_for_all("users", &(domain.as_deref(), email.as_deref()))?;
    if let Some(cached) = state.users_cache.get::<Vec<SanitizedUser>>(&key).await {
        return Ok(Json(cached));
    }

    let users: Vec<SanitizedUser> = state
        .directory
        .list_users(domain.as_deref(), email.as_deref())
        .await?
        .iter()
        .map(SanitizedUser::from)
        .collect();
    if users.is_empty() {
        return Err(AppError::NotFound(anyhow::anyhow!("User not found")));
    }

    state.users_cache.set(&key, &users).await;
    Ok(Json(users))
}

/// Update a user's profile or role
///
/// Users may edit their own profile. Changing a role needs `user:write` and
/// ends the user's refresh tokens.
#[utoipa::path(
    patch,
    path = "/users/{domain}/{email}",
    params(
        ("domain" = String, Path, description = "User domain"),
        ("email" = String, Path, description = "User email")
    ),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = SanitizedUser),
        (status = 403, description = "Missing permissions or reserved role", body = ErrorResponse),
        (status = 404, description = "User or role not found", body = ErrorResponse)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path((domain, email)): Path<(String, String)>,
    AuthUser(token): AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role_name = req.role.as_deref().map(|r| r.trim().to_lowercase());
    match role_name.as_deref() {
        Some(role_name) => state
            .gate
            .authorize_role_grant(&domain, role_name, &["user:write"], &token)?,
        None => state
            .gate
            .authorize_or_self(&domain, &email, &["user:write"], &token)?,
    };

    let user = state
        .directory
        .find_user(&domain, &email)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User {} not found", email)))?;

    let profile = req.profile();
    if !profile.is_empty() {
        state.directory.update_profile(user.id, &profile).await?;
    }

    if let Some(role_name) = role_name {
        let role = state
            .directory
            .find_role(&domain, &role_name)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Role not found")))?;
        state.directory.assign_role(user.id, Some(role.id)).await?;

        // Tokens embed the old role's scopes.
        let revoked = state.tokens.store().delete_all_for_user(user.id).await?;
        tracing::info!(user_id = %user.id, role = %role.name, revoked, "Role assigned");
    }

    let updated = state
        .directory
        .find_user_by_id(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User {} not found", email)))?;
    state.users_cache.invalidate_all_registered().await;

    Ok(Json(SanitizedUser::from(&updated)))
}

/// Delete a user together with their tokens and editing locks
#[utoipa::path(
    delete,
    path = "/users/{domain}/{email}",
    params(
        ("domain" = String, Path, description = "User domain"),
        ("email" = String, Path, description = "User email")
    ),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Missing permissions or protected user", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path((domain, email)): Path<(String, String)>,
    AuthUser(token): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state
        .gate
        .authorize_in_domain(&domain, &["user:delete"], &token)?;

    let user = state
        .directory
        .find_user(&domain, &email)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User {} not found", email)))?;

    let holds_super_role = user
        .role
        .as_ref()
        .is_some_and(|r| state.gate.is_super_role(&r.name, &r.domain));
    if holds_super_role && !state.gate.is_super_admin(&token.claims) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only the super admin can delete this user"
        )));
    }

    state.directory.delete_user(user.id).await?;
    let dropped = state.users_cache.invalidate_all_registered().await;
    tracing::info!(user_id = %user.id, invalidated = dropped, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Change a user's password. Users may always change their own.
///
/// Every token of the user is revoked, including the one used for this call.
#[utoipa::path(
    post,
    path = "/users/{domain}/{email}/password",
    params(
        ("domain" = String, Path, description = "User domain"),
        ("email" = String, Path, description = "User email")
    ),
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Current password is incorrect", body = ErrorResponse),
        (status = 403, description = "Missing permissions", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    Path((domain, email)): Path<(String, String)>,
    AuthUser(token): AuthUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .gate
        .authorize_or_self(&domain, &email, &["user:write"], &token)?;

    state
        .auth_service
        .change_password(&domain, &email, &req.current_password, &req.new_password)
        .await?;

    Ok((StatusCode::OK, Json(MessageResponse::new("Password changed"))))
}
