//! Services layer for the shelter backend.
//!
//! Token issuing and validation, authorization, editing locks, response and
//! media caching, credential flows and background maintenance.

mod auth;
mod authorization;
mod cache;
mod database;
mod directory;
mod editing_lock;
mod email;
mod jwt;
mod media;
mod media_cache;
mod memory;
pub mod reaper;
pub mod redis;
mod token_store;

use async_trait::async_trait;
use service_core::error::AppError;

pub use auth::AuthService;
pub use authorization::{AuthenticatedToken, AuthorizationGate};
pub use cache::ResponseCache;
pub use database::Database;
pub use directory::UserDirectory;
pub use editing_lock::{EditingLockManager, LockStore};
pub use email::{EmailProvider, EmailService, MockEmailService, SentEmail};
pub use jwt::{AccessClaims, EmailClaims, RefreshClaims, TokenClaims, TokenService};
pub use media::{BlobStore, MediaRepository};
pub use media_cache::MediaCache;
pub use memory::InMemoryDatabase;
pub use reaper::{JobOutcome, LockSweepJob, Reaper, ScheduledJob, TokenSweepJob};
pub use redis::{CacheBackend, InMemoryCache, RedisService};
pub use token_store::TokenStore;

/// Liveness check for the primary store.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;
}
