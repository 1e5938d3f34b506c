use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::EditingLock;

#[async_trait]
pub trait LockStore: Send + Sync {
    async fn find_lock(
        &self,
        resource_id: i64,
        section_name: &str,
    ) -> Result<Option<EditingLock>, AppError>;

    /// Insert `lock` unless one already exists for its (resource, section).
    /// Returns whether the row was written.
    async fn insert_lock(&self, lock: &EditingLock) -> Result<bool, AppError>;

    async fn delete_lock(&self, id: Uuid) -> Result<bool, AppError>;

    async fn delete_locks_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Time-boxed per-section edit locks on case records.
#[derive(Clone)]
pub struct EditingLockManager {
    store: Arc<dyn LockStore>,
    expiry: Duration,
}

impl EditingLockManager {
    pub fn new(store: Arc<dyn LockStore>, expire_minutes: i64) -> Self {
        Self {
            store,
            expiry: Duration::minutes(expire_minutes),
        }
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Take the lock, or return the caller's own live lock unchanged.
    ///
    /// Expired locks are replaced regardless of who held them.
    pub async fn acquire(
        &self,
        resource_id: i64,
        section_name: &str,
        user_id: Uuid,
    ) -> Result<EditingLock, AppError> {
        if let Some(existing) = self.store.find_lock(resource_id, section_name).await? {
            if !existing.is_expired_at(Utc::now(), self.expiry) {
                if existing.user_id == user_id {
                    return Ok(existing);
                }
                return Err(held_by(&existing));
            }

            tracing::debug!(
                resource_id,
                section = %section_name,
                previous_owner = %existing.user_id,
                "Replacing expired editing lock"
            );
            self.store.delete_lock(existing.id).await?;
        }

        let lock = EditingLock::new(resource_id, section_name, user_id);
        if self.store.insert_lock(&lock).await? {
            tracing::info!(
                resource_id,
                section = %section_name,
                user_id = %user_id,
                "Editing lock acquired"
            );
            return Ok(lock);
        }

        // A concurrent acquire inserted first.
        match self.store.find_lock(resource_id, section_name).await? {
            Some(winner) if winner.user_id == user_id => Ok(winner),
            Some(winner) => Err(held_by(&winner)),
            None => Err(AppError::Conflict(anyhow::anyhow!(
                "Editing lock for section '{}' changed concurrently",
                section_name
            ))),
        }
    }

    pub async fn release(
        &self,
        resource_id: i64,
        section_name: &str,
        user_id: Uuid,
    ) -> Result<EditingLock, AppError> {
        let lock = self
            .store
            .find_lock(resource_id, section_name)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Editing lock not found")))?;

        if lock.user_id != user_id {
            return Err(held_by(&lock));
        }

        self.store.delete_lock(lock.id).await?;
        tracing::info!(
            resource_id,
            section = %section_name,
            user_id = %user_id,
            "Editing lock released"
        );
        Ok(lock)
    }

    /// Spend the caller's live lock on a section update.
    pub async fn consume(
        &self,
        resource_id: i64,
        section_name: &str,
        user_id: Uuid,
    ) -> Result<EditingLock, AppError> {
        let not_found = || AppError::Forbidden(anyhow::anyhow!("Editing lock not found"));

        let lock = self
            .store
            .find_lock(resource_id, section_name)
            .await?
            .ok_or_else(not_found)?;

        let expired = lock.is_expired_at(Utc::now(), self.expiry);
        if lock.user_id != user_id {
            return Err(if expired { not_found() } else { held_by(&lock) });
        }
        if expired {
            return Err(AppError::Forbidden(anyhow::anyhow!("Editing lock expired")));
        }

        self.store.delete_lock(lock.id).await?;
        Ok(lock)
    }

    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        let deleted = self
            .store
            .delete_locks_created_before(Utc::now() - self.expiry)
            .await?;
        if deleted == 0 {
            tracing::info!("No editing locks to delete");
        } else {
            tracing::info!(count = deleted, "Deleted expired editing locks");
        }
        Ok(deleted)
    }
}

fn held_by(lock: &EditingLock) -> AppError {
    AppError::Forbidden(anyhow::anyhow!(
        "Section '{}' of resource {} is locked by user {} since {}",
        lock.section_name,
        lock.resource_id,
        lock.user_id,
        lock.created_at.to_rfc3339()
    ))
}
