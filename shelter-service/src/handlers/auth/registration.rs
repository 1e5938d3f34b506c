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
        auth::{InviteRequest, RegisterRequest, TokenQuery},
        MessageResponse,
    },
    middleware::AuthUser,
    models::SanitizedUser,
    utils::ValidatedJson,
    AppState,
};

/// Invite a new user into a domain with a role
#[utoipa::path(
    post,
    path = "/auth/invite/{domain}",
    params(("domain" = String, Path, description = "Target domain")),
    request_body = InviteRequest,
    responses(
        (status = 202, description = "Invitation sent", body = MessageResponse),
        (status = 403, description = "Missing permissions, foreign domain or reserved role", body = ErrorResponse),
        (status = 404, description = "Role not found", body = ErrorResponse),
        (status = 409, description = "User already exists", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn invite(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    AuthUser(token): AuthUser,
    ValidatedJson(req): ValidatedJson<InviteRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .gate
        .authorize_role_grant(&domain, &req.role, &["user:write"], &token)?;
    state
        .auth_service
        .invite(&domain, &req.email, &req.role)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(MessageResponse::new("Invitation sent"))))
}

/// Complete registration from an invitation token
#[utoipa::path(
    post,
    path = "/auth/register",
    params(TokenQuery),
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = SanitizedUser),
        (status = 400, description = "Email does not match the invitation", body = ErrorResponse),
        (status = 401, description = "Invalid or expired invitation", body = ErrorResponse),
        (status = 409, description = "User already exists", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.auth_service.register(&query.token, req).await?;
    Ok((StatusCode::CREATED, Json(SanitizedUser::from(&user))))
}
