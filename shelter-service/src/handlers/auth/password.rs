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
        auth::{PasswordResetRequest, TokenQuery},
        MessageResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// Mail a password reset link
#[utoipa::path(
    post,
    path = "/auth/password/forgot/{domain}/{email}",
    params(
        ("domain" = String, Path, description = "User domain"),
        ("email" = String, Path, description = "User email")
    ),
    responses(
        (status = 202, description = "Reset link sent", body = MessageResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Path((domain, email)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.forgot_password(&domain, &email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new("Password reset link sent")),
    ))
}

/// Set a new password from a reset token
#[utoipa::path(
    post,
    path = "/auth/password/reset",
    params(TokenQuery),
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth_service
        .reset_password(&query.token, &req.password)
        .await?;
    Ok((StatusCode::OK, Json(MessageResponse::new("Password has been reset"))))
}
