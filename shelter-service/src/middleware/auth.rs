use service_core::{
    axum::{
        async_trait,
        extract::{FromRequestParts, Request, State},
        http::{header, request::Parts},
        middleware::Next,
        response::Response,
    },
    error::AppError,
};

use crate::{services::AuthenticatedToken, AppState};

/// Require a valid access token and resolve its user.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
        })?;

    let (record, claims) = state.tokens.validate_access(token).await?;

    let user = match record.user_id {
        Some(user_id) => state.directory.find_user_by_id(user_id).await?,
        None => None,
    }
    .ok_or_else(|| {
        tracing::warn!(token_id = %record.id, "Access token without a live user");
        AppError::Unauthorized(anyhow::anyhow!("Could not validate credentials"))
    })?;

    req.extensions_mut()
        .insert(AuthenticatedToken { record, claims, user });

    Ok(next.run(req).await)
}

/// Extractor for the token placed in request extensions by [`auth_middleware`].
pub struct AuthUser(pub AuthenticatedToken);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .extensions
            .get::<AuthenticatedToken>()
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Auth token missing from request extensions"
                ))
            })?;

        Ok(AuthUser(token.clone()))
    }
}
