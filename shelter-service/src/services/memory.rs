use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};
use uuid::Uuid;

use crate::models::{
    EditingLock, NewUser, Permission, ProfileUpdate, Role, SecurityToken, TokenType, User,
};
use crate::services::{BlobStore, HealthCheck, LockStore, TokenStore, UserDirectory};

#[derive(Default)]
struct State {
    tokens: Vec<SecurityToken>,
    users: HashMap<Uuid, (User, Option<Uuid>)>,
    roles: HashMap<Uuid, Role>,
    permissions: Vec<Permission>,
    locks: Vec<EditingLock>,
    blobs: HashMap<Uuid, Vec<Vec<u8>>>,
}

/// In-process stand-in for [`Database`](crate::services::Database) used by
/// tests and local tooling.
///
/// Uniqueness rules match the SQL schema. Role permissions are taken as given
/// and not checked against the permission table.
#[derive(Default)]
pub struct InMemoryDatabase {
    state: Mutex<State>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Store lock poisoned: {}", e)))
    }

    pub fn token_count(&self) -> usize {
        self.state().map(|s| s.tokens.len()).unwrap_or(0)
    }

    pub fn lock_count(&self) -> usize {
        self.state().map(|s| s.locks.len()).unwrap_or(0)
    }
}

impl State {
    /// Users carry a snapshot of their role; refresh it from the role table.
    fn resolve_user(&self, user: &User, role_id: Option<Uuid>) -> User {
        let mut user = user.clone();
        user.role = role_id.and_then(|id| self.roles.get(&id).cloned());
        user
    }
}

#[async_trait]
impl HealthCheck for InMemoryDatabase {
    async fn health_check(&self) -> Result<(), AppError> {
        self.state().map(|_| ())
    }
}

#[async_trait]
impl TokenStore for InMemoryDatabase {
    async fn write(
        &self,
        token: &str,
        token_type: TokenType,
        expire_on: DateTime<Utc>,
        user_id: Option<Uuid>,
    ) -> Result<SecurityToken, AppError> {
        let record = SecurityToken::new(token.to_string(), token_type, expire_on, user_id);
        self.state()?.tokens.push(record.clone());
        Ok(record)
    }

    async fn read(
        &self,
        token: &str,
        token_type: TokenType,
    ) -> Result<Option<SecurityToken>, AppError> {
        Ok(self
            .state()?
            .tokens
            .iter()
            .filter(|t| t.token == token && t.token_type == token_type)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn read_by_id(&self, id: Uuid) -> Result<Option<SecurityToken>, AppError> {
        Ok(self.state()?.tokens.iter().find(|t| t.id == id).cloned())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state()?;
        let before = state.tokens.len();
        state.tokens.retain(|t| t.id != id);
        Ok(state.tokens.len() < before)
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut state = self.state()?;
        let before = state.tokens.len();
        state.tokens.retain(|t| t.user_id != Some(user_id));
        Ok((before - state.tokens.len()) as u64)
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut state = self.state()?;
        let before = state.tokens.len();
        state.tokens.retain(|t| t.expire_on >= cutoff);
        Ok((before - state.tokens.len()) as u64)
    }
}

#[async_trait]
impl LockStore for InMemoryDatabase {
    async fn find_lock(
        &self,
        resource_id: i64,
        section_name: &str,
    ) -> Result<Option<EditingLock>, AppError> {
        Ok(self
            .state()?
            .locks
            .iter()
            .find(|l| l.resource_id == resource_id && l.section_name == section_name)
            .cloned())
    }

    async fn insert_lock(&self, lock: &EditingLock) -> Result<bool, AppError> {
        let mut state = self.state()?;
        let taken = state
            .locks
            .iter()
            .any(|l| l.resource_id == lock.resource_id && l.section_name == lock.section_name);
        if taken {
            return Ok(false);
        }
        state.locks.push(lock.clone());
        Ok(true)
    }

    async fn delete_lock(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state()?;
        let before = state.locks.len();
        state.locks.retain(|l| l.id != id);
        Ok(state.locks.len() < before)
    }

    async fn delete_locks_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut state = self.state()?;
        let before = state.locks.len();
        state.locks.retain(|l| l.created_at > cutoff);
        Ok((before - state.locks.len()) as u64)
    }
}

#[async_trait]
impl UserDirectory for InMemoryDatabase {
    async fn find_user(&self, domain: &str, email: &str) -> Result<Option<User>, AppError> {
        let state = self.state()?;
        Ok(state
            .users
            .values()
            .find(|(u, _)| u.is_identity(domain, email))
            .map(|(u, role_id)| state.resolve_user(u, *role_id)))
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let state = self.state()?;
        Ok(state
            .users
            .get(&id)
            .map(|(u, role_id)| state.resolve_user(u, *role_id)))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut state = self.state()?;
        if state
            .users
            .values()
            .any(|(u, _)| u.is_identity(&user.domain, &user.email))
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "User {} already exists in domain {}",
                user.email,
                user.domain
            )));
        }

        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            domain: user.domain,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            role: None,
            created_at: Utc::now(),
        };
        state
            .users
            .insert(created.id, (created.clone(), user.role_id));
        Ok(state.resolve_user(&created, user.role_id))
    }

    async fn list_users(
        &self,
        domain: Option<&str>,
        email: Option<&str>,
    ) -> Result<Vec<User>, AppError> {
        let state = self.state()?;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|(u, _)| domain.map_or(true, |d| u.domain == d))
            .filter(|(u, _)| email.map_or(true, |e| u.email.eq_ignore_ascii_case(e.trim())))
            .map(|(u, role_id)| state.resolve_user(u, *role_id))
            .collect();
        users.sort_by(|a, b| (&a.domain, &a.email).cmp(&(&b.domain, &b.email)));
        Ok(users)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let mut state = self.state()?;
        let (user, _) = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<(), AppError> {
        let mut state = self.state()?;
        let (user, _) = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
        update.apply(user);
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state()?;
        if state.users.remove(&user_id).is_none() {
            return Ok(false);
        }
        state.tokens.retain(|t| t.user_id != Some(user_id));
        state.locks.retain(|l| l.user_id != user_id);
        Ok(true)
    }

    async fn assign_role(&self, user_id: Uuid, role_id: Option<Uuid>) -> Result<(), AppError> {
        let mut state = self.state()?;
        if let Some(role_id) = role_id {
            if !state.roles.contains_key(&role_id) {
                return Err(AppError::NotFound(anyhow::anyhow!("Role not found")));
            }
        }
        let (_, assigned) = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
        *assigned = role_id;
        Ok(())
    }

    async fn find_role(&self, domain: &str, name: &str) -> Result<Option<Role>, AppError> {
        Ok(self
            .state()?
            .roles
            .values()
            .find(|r| r.domain == domain && r.name == name)
            .cloned())
    }

    async fn list_roles(
        &self,
        domain: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<Role>, AppError> {
        let mut roles: Vec<Role> = self
            .state()?
            .roles
            .values()
            .filter(|r| domain.map_or(true, |d| r.domain == d))
            .filter(|r| name.map_or(true, |n| r.name == n))
            .cloned()
            .collect();
        roles.sort_by(|a, b| (&a.domain, &a.name).cmp(&(&b.domain, &b.name)));
        Ok(roles)
    }

    async fn create_role(&self, role: &Role) -> Result<(), AppError> {
        let mut state = self.state()?;
        if state
            .roles
            .values()
            .any(|r| r.domain == role.domain && r.name == role.name)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Role {} already exists in domain {}",
                role.name,
                role.domain
            )));
        }
        state.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn update_role(&self, role: &Role) -> Result<(), AppError> {
        let mut state = self.state()?;
        let stored = state
            .roles
            .get_mut(&role.id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Role not found")))?;
        stored.title = role.title.clone();
        stored.permissions = role.permissions.clone();
        Ok(())
    }

    async fn delete_role(&self, role_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state()?;
        if state.roles.remove(&role_id).is_none() {
            return Ok(false);
        }
        for (_, assigned) in state.users.values_mut() {
            if *assigned == Some(role_id) {
                *assigned = None;
            }
        }
        Ok(true)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, AppError> {
        let mut permissions = self.state()?.permissions.clone();
        permissions.sort_by(|a, b| (&a.entity, &a.operation).cmp(&(&b.entity, &b.operation)));
        Ok(permissions)
    }

    async fn find_permission(
        &self,
        entity: &str,
        operation: &str,
    ) -> Result<Option<Permission>, AppError> {
        let wanted = Permission::new(entity, operation, None);
        Ok(self
            .state()?
            .permissions
            .iter()
            .find(|p| p.entity == wanted.entity && p.operation == wanted.operation)
            .cloned())
    }

    async fn create_permission(&self, permission: &Permission) -> Result<(), AppError> {
        let mut state = self.state()?;
        if state
            .permissions
            .iter()
            .any(|p| p.entity == permission.entity && p.operation == permission.operation)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Permission {} already exists",
                permission.scope()
            )));
        }
        state.permissions.push(permission.clone());
        Ok(())
    }

    async fn update_permission(&self, permission: &Permission) -> Result<(), AppError> {
        let mut state = self.state()?;
        let stored = state
            .permissions
            .iter_mut()
            .find(|p| p.id == permission.id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Permission not found")))?;
        stored.title = permission.title.clone();

        for role in state.roles.values_mut() {
            for granted in role.permissions.iter_mut().filter(|p| p.id == permission.id) {
                granted.title = permission.title.clone();
            }
        }
        Ok(())
    }

    async fn delete_permission(&self, permission_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state()?;
        let before = state.permissions.len();
        state.permissions.retain(|p| p.id != permission_id);
        if state.permissions.len() == before {
            return Ok(false);
        }
        for role in state.roles.values_mut() {
            role.permissions.retain(|p| p.id != permission_id);
        }
        Ok(true)
    }
}

#[async_trait]
impl BlobStore for InMemoryDatabase {
    async fn insert_chunks(&self, blob_id: Uuid, chunks: Vec<Vec<u8>>) -> Result<(), AppError> {
        let mut state = self.state()?;
        if state.blobs.contains_key(&blob_id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Blob {} already exists",
                blob_id
            )));
        }
        state.blobs.insert(blob_id, chunks);
        Ok(())
    }

    async fn read_chunks(&self, blob_id: Uuid) -> Result<Vec<Vec<u8>>, AppError> {
        Ok(self
            .state()?
            .blobs
            .get(&blob_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_chunks(&self, blob_id: Uuid) -> Result<u64, AppError> {
        Ok(self
            .state()?
            .blobs
            .remove(&blob_id)
            .map(|chunks| chunks.len() as u64)
            .unwrap_or(0))
    }
}
