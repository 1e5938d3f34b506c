//! Test helpers for shelter-service integration tests.
//!
//! Builds an `AppState` over in-memory stores, an in-memory cache backend and
//! the mock mailer, and drives the router with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use shelter_service::{
    build_router,
    config::{
        CacheConfig, CrmConfig, DatabaseConfig, Environment, RateLimitConfig, RedisConfig,
        SchedulerConfig, SecurityConfig, ShelterConfig, SmtpConfig, SuperUserConfig, TokenConfig,
        UrlConfig,
    },
    dtos::auth::TokenResponse,
    models::{NewUser, Permission, Role, User},
    services::{
        AuthService, AuthorizationGate, CacheBackend, EditingLockManager, InMemoryCache,
        InMemoryDatabase, MediaCache, MediaRepository, MockEmailService, ResponseCache,
        TokenService, UserDirectory,
    },
    utils::{hash_password, Password},
    AppState,
};
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const DOMAIN: &str = "north";
pub const PASSWORD: &str = "correct-horse-battery";

/// Cache backend whose every call fails, as with Redis down.
pub struct UnreachableCache;

#[async_trait]
impl CacheBackend for UnreachableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, anyhow::Error> {
        Err(anyhow::anyhow!("connection refused"))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: u64) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("connection refused"))
    }

    async fn delete(&self, _key: &str) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("connection refused"))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("connection refused"))
    }
}

pub fn test_config() -> ShelterConfig {
    ShelterConfig {
        common: service_core::config::Config { port: 8080 },
        environment: Environment::Dev,
        service_name: "shelter-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://localhost/shelter_test".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://localhost:6379".to_string(),
            connect_timeout_ms: 200,
        },
        token: TokenConfig {
            secret_key: "integration-test-secret-0123456789".to_string(),
            algorithm: "HS256".to_string(),
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
            invitation_token_expire_days: 7,
            reset_token_expire_hours: 1,
            clock_skew_seconds: 0,
        },
        super_user: SuperUserConfig {
            role: "admin".to_string(),
            domain: "system".to_string(),
            email: None,
            password: None,
        },
        crm: CrmConfig {
            editing_lock_expire_minutes: 15,
        },
        scheduler: SchedulerConfig {
            frequency_seconds: 14400,
        },
        cache: CacheConfig {
            default_ttl_seconds: 900,
            media_cache_size: 1024,
            media_cache_record_limit: 256,
            blob_chunk_size: 64,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 1025,
            user: String::new(),
            password: String::new(),
            mail_from: "Shelter <noreply@shelter.test>".to_string(),
        },
        urls: UrlConfig {
            register: "http://localhost:3000/register".to_string(),
            login: "http://localhost:3000/login".to_string(),
            reset_password: "http://localhost:3000/reset-password".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        rate_limit: RateLimitConfig {
            times: 5,
            seconds: 60,
        },
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub db: Arc<InMemoryDatabase>,
    pub email: Arc<MockEmailService>,
    pub cache: Arc<InMemoryCache>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config(), None).await
    }

    /// Build the app with a replacement response-cache backend.
    pub async fn spawn_with(
        config: ShelterConfig,
        cache_backend: Option<Arc<dyn CacheBackend>>,
    ) -> Self {
        let db = Arc::new(InMemoryDatabase::new());
        let email = Arc::new(MockEmailService::new());
        let cache = Arc::new(InMemoryCache::new());
        let backend =
            cache_backend.unwrap_or_else(|| cache.clone() as Arc<dyn CacheBackend>);

        let tokens =
            TokenService::new(&config.token, db.clone()).expect("Failed to create token service");
        let locks = EditingLockManager::new(db.clone(), config.crm.editing_lock_expire_minutes);
        let media = MediaRepository::new(
            db.clone(),
            Arc::new(MediaCache::new(
                config.cache.media_cache_size,
                config.cache.media_cache_record_limit,
            )),
            config.cache.blob_chunk_size,
        );
        let auth_service =
            AuthService::new(db.clone(), tokens.clone(), email.clone(), config.urls.clone());

        let state = AppState {
            config: config.clone(),
            db_health: db.clone(),
            cache_backend: backend.clone(),
            directory: db.clone(),
            tokens,
            gate: AuthorizationGate::new(&config.super_user),
            locks,
            auth_service,
            media,
            permissions_cache: Arc::new(ResponseCache::new(
                "permissions",
                backend.clone(),
                config.cache.default_ttl_seconds,
            )),
            roles_cache: Arc::new(ResponseCache::new(
                "roles",
                backend.clone(),
                config.cache.default_ttl_seconds,
            )),
            users_cache: Arc::new(ResponseCache::new(
                "users",
                backend,
                config.cache.default_ttl_seconds,
            )),
            login_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.times,
                config.rate_limit.seconds,
            ),
            invite_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.times,
                config.rate_limit.seconds,
            ),
            password_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.times,
                config.rate_limit.seconds,
            ),
        };

        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        TestApp {
            state,
            router,
            db,
            email,
            cache,
        }
    }

    /// Create a role in `domain` granting `scopes`, registering the permissions.
    pub async fn seed_role(&self, domain: &str, name: &str, scopes: &[&str]) -> Role {
        let mut permissions = Vec::new();
        for scope in scopes {
            let (entity, operation) = scope.split_once(':').expect("scope is entity:operation");
            let permission = Permission::new(entity, operation, None);
            // Shared permissions across roles already exist.
            let _ = self.db.create_permission(&permission).await;
            permissions.push(permission);
        }

        let role = Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            domain: domain.to_string(),
            title: None,
            permissions,
        };
        self.db.create_role(&role).await.expect("Failed to seed role");
        role
    }

    pub async fn seed_user(&self, domain: &str, email: &str, role: Option<&Role>) -> User {
        let hash = hash_password(&Password::new(PASSWORD)).expect("Failed to hash password");
        self.db
            .create_user(NewUser::new(email, domain, hash, role.map(|r| r.id)))
            .await
            .expect("Failed to seed user")
    }

    /// Seed a user holding `scopes` and log them in.
    pub async fn user_with_scopes(&self, email: &str, scopes: &[&str]) -> (User, TokenResponse) {
        let role_name = format!("role-{}", Uuid::new_v4());
        let role = self.seed_role(DOMAIN, &role_name, scopes).await;
        let user = self.seed_user(DOMAIN, email, Some(&role)).await;
        let tokens = self.login(DOMAIN, email).await;
        (user, tokens)
    }

    pub async fn super_admin(&self) -> (User, TokenResponse) {
        let role = self.seed_role("system", "admin", &[]).await;
        let user = self.seed_user("system", "root@shelter.test", Some(&role)).await;
        let tokens = self.login("system", "root@shelter.test").await;
        (user, tokens)
    }

    pub async fn login(&self, domain: &str, email: &str) -> TokenResponse {
        self.state
            .auth_service
            .login(domain, email, PASSWORD)
            .await
            .expect("Login failed")
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router call failed");
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

pub fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::empty())
        .expect("Failed to build request")
}
