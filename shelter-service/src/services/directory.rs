use async_trait::async_trait;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{NewUser, Permission, ProfileUpdate, Role, User};

/// Users, roles and permissions.
///
/// Users come back with their role and the role's permissions resolved.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Email comparison is case-insensitive.
    async fn find_user(&self, domain: &str, email: &str) -> Result<Option<User>, AppError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// `Conflict` when (email, domain) is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;

    /// Users sorted by (domain, email), optionally narrowed to one domain or email.
    async fn list_users(
        &self,
        domain: Option<&str>,
        email: Option<&str>,
    ) -> Result<Vec<User>, AppError>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), AppError>;

    /// Apply the fields set in `update`; `NotFound` for an unknown user.
    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<(), AppError>;

    /// Removes the user with their tokens and editing locks.
    async fn delete_user(&self, user_id: Uuid) -> Result<bool, AppError>;

    /// Outstanding refresh tokens stop working once the role name changes.
    async fn assign_role(&self, user_id: Uuid, role_id: Option<Uuid>) -> Result<(), AppError>;

    async fn find_role(&self, domain: &str, name: &str) -> Result<Option<Role>, AppError>;

    /// Roles sorted by (domain, name), with their permissions.
    async fn list_roles(
        &self,
        domain: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<Role>, AppError>;

    /// Persist a role and its permission grants. Permissions must already exist.
    async fn create_role(&self, role: &Role) -> Result<(), AppError>;

    /// Replace the title and grant set of an existing role.
    async fn update_role(&self, role: &Role) -> Result<(), AppError>;

    /// Users holding the role are left without one.
    async fn delete_role(&self, role_id: Uuid) -> Result<bool, AppError>;

    async fn list_permissions(&self) -> Result<Vec<Permission>, AppError>;

    async fn find_permission(
        &self,
        entity: &str,
        operation: &str,
    ) -> Result<Option<Permission>, AppError>;

    /// `Conflict` when (entity, operation) is taken.
    async fn create_permission(&self, permission: &Permission) -> Result<(), AppError>;

    async fn update_permission(&self, permission: &Permission) -> Result<(), AppError>;

    /// The permission is withdrawn from every role granting it.
    async fn delete_permission(&self, permission_id: Uuid) -> Result<bool, AppError>;
}
