use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{SecurityToken, TokenType};

/// Persistence of issued security tokens.
///
/// Lookups are by (token string, type): the same string stored under a
/// different type is a different record.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn write(
        &self,
        token: &str,
        token_type: TokenType,
        expire_on: DateTime<Utc>,
        user_id: Option<Uuid>,
    ) -> Result<SecurityToken, AppError>;

    /// Newest record for (token, type) by `created_at`.
    async fn read(
        &self,
        token: &str,
        token_type: TokenType,
    ) -> Result<Option<SecurityToken>, AppError>;

    async fn read_by_id(&self, id: Uuid) -> Result<Option<SecurityToken>, AppError>;

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, AppError>;

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError>;

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;

    /// Delete the given record, if any, and hand it back.
    async fn delete(
        &self,
        token: Option<SecurityToken>,
    ) -> Result<Option<SecurityToken>, AppError> {
        match token {
            Some(token) => {
                self.delete_by_id(token.id).await?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    async fn sweep_expired(&self) -> Result<u64, AppError> {
        let deleted = self.delete_expired_before(Utc::now()).await?;
        if deleted == 0 {
            tracing::info!("No security tokens to delete");
        } else {
            tracing::info!(count = deleted, "Deleted expired security tokens");
        }
        Ok(deleted)
    }
}
