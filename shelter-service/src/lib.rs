pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::State,
    http::{header, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Json, Router,
};
use service_core::middleware::{
    rate_limit::{ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::ShelterConfig;
use crate::services::{
    AuthService, AuthorizationGate, CacheBackend, EditingLockManager, HealthCheck,
    MediaRepository, ResponseCache, TokenService, UserDirectory,
};
use service_core::error::AppError;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::session::login,
        handlers::auth::session::refresh,
        handlers::auth::session::logout,
        handlers::auth::registration::invite,
        handlers::auth::registration::register,
        handlers::auth::password::forgot_password,
        handlers::auth::password::reset_password,
        handlers::user::change_password,
        handlers::user::list_users,
        handlers::user::update_user,
        handlers::user::delete_user,
        handlers::roles::list_roles,
        handlers::roles::list_domain_roles,
        handlers::roles::create_role,
        handlers::roles::update_role,
        handlers::roles::delete_role,
        handlers::permissions::list_permissions,
        handlers::permissions::create_permission,
        handlers::permissions::update_permission,
        handlers::permissions::delete_permission,
        handlers::locks::acquire_lock,
        handlers::locks::release_lock,
        handlers::media::upload_media,
        handlers::media::get_media,
        handlers::media::delete_media,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::LoginRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::TokenResponse,
            dtos::auth::InviteRequest,
            dtos::auth::RegisterRequest,
            dtos::auth::PasswordResetRequest,
            dtos::auth::ChangePasswordRequest,
            dtos::permissions::CreatePermissionRequest,
            dtos::permissions::UpdatePermissionRequest,
            dtos::permissions::PermissionListResponse,
            dtos::roles::CreateRoleRequest,
            dtos::roles::UpdateRoleRequest,
            dtos::users::UpdateUserRequest,
            dtos::media::MediaUploadResponse,
            models::Permission,
            models::Role,
            models::SanitizedUser,
            models::EditingLock,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login, token refresh and credential flows"),
        (name = "User", description = "User account management"),
        (name = "Roles", description = "Roles and the permissions they grant"),
        (name = "Permissions", description = "Permission catalogue"),
        (name = "Editing Locks", description = "Per-section edit locks on animal records"),
        (name = "Media", description = "Media storage"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: ShelterConfig,
    pub db_health: Arc<dyn HealthCheck>,
    pub cache_backend: Arc<dyn CacheBackend>,
    pub directory: Arc<dyn UserDirectory>,
    pub tokens: TokenService,
    pub gate: AuthorizationGate,
    pub locks: EditingLockManager,
    pub auth_service: AuthService,
    pub media: MediaRepository,
    pub permissions_cache: Arc<ResponseCache>,
    pub roles_cache: Arc<ResponseCache>,
    pub users_cache: Arc<ResponseCache>,
    pub login_rate_limiter: IpRateLimiter,
    pub invite_rate_limiter: IpRateLimiter,
    pub password_rate_limiter: IpRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let login_route = Router::new()
        .route("/auth/login", post(handlers::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let forgot_route = Router::new()
        .route(
            "/auth/password/forgot/:domain/:email",
            post(handlers::forgot_password),
        )
        .layer(from_fn_with_state(
            state.password_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    // Rate limit runs before authentication.
    let invite_route = Router::new()
        .route("/auth/invite/:domain", post(handlers::invite))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .layer(from_fn_with_state(
            state.invite_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let protected = Router::new()
        .route("/auth/logout", post(handlers::logout))
        .route("/users", get(handlers::list_users))
        .route(
            "/users/:domain/:email",
            patch(handlers::update_user).delete(handlers::delete_user),
        )
        .route(
            "/users/:domain/:email/password",
            post(handlers::change_password),
        )
        .route(
            "/roles",
            get(handlers::list_roles).post(handlers::create_role),
        )
        .route("/roles/:domain", get(handlers::list_domain_roles))
        .route(
            "/roles/:domain/:name",
            patch(handlers::update_role).delete(handlers::delete_role),
        )
        .route(
            "/permissions",
            get(handlers::list_permissions).post(handlers::create_permission),
        )
        .route(
            "/permissions/:entity/:operation",
            patch(handlers::update_permission).delete(handlers::delete_permission),
        )
        .route(
            "/animals/:id/:section/lock",
            post(handlers::acquire_lock).delete(handlers::release_lock),
        )
        .route("/media", post(handlers::upload_media))
        .route(
            "/media/:blob_id",
            get(handlers::get_media).delete(handlers::delete_media),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Ignoring invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    let app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/register", post(handlers::register))
        .route("/auth/password/reset", post(handlers::reset_password))
        .merge(login_route)
        .merge(forgot_route)
        .merge(invite_route)
        .merge(protected)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );

    Ok(app)
}

/// Service health check
///
/// The response cache is optional: without it the service answers from the
/// database and reports `degraded`. Only a database failure is `503`.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy or running without cache"),
        (status = 503, description = "Database is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.db_health.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::ServiceUnavailable
    })?;

    let cache = match state.cache_backend.health_check().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::warn!(error = %e, "Cache health check failed, serving uncached");
            "degraded"
        }
    };
    let status = if cache == "up" { "healthy" } else { "degraded" };

    Ok(Json(serde_json::json!({
        "status": status,
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "database": "up",
            "cache": cache
        }
    })))
}
