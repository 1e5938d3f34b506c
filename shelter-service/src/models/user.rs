//! Staff users, their roles and the permissions a role grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A single `entity:operation` grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    #[schema(example = "animal")]
    pub entity: String,
    #[schema(example = "read")]
    pub operation: String,
    pub title: Option<String>,
}

impl Permission {
    pub fn new(entity: &str, operation: &str, title: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity: entity.trim().to_lowercase(),
            operation: operation.trim().to_lowercase(),
            title,
        }
    }

    /// String form carried in token claims and required by routes.
    pub fn scope(&self) -> String {
        format!("{}:{}", self.entity, self.operation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub domain: String,
    pub title: Option<String>,
    pub permissions: Vec<Permission>,
}

impl Role {
    pub fn scopes(&self) -> Vec<String> {
        self.permissions.iter().map(Permission::scope).collect()
    }
}

/// User account, unique on (email, domain).
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub domain: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Permission scopes granted through the role. Empty without a role.
    pub fn scopes(&self) -> Vec<String> {
        self.role.as_ref().map(Role::scopes).unwrap_or_default()
    }

    pub fn role_name(&self) -> Option<&str> {
        self.role.as_ref().map(|r| r.name.as_str())
    }

    /// Whether this user is the account identified by (domain, email).
    pub fn is_identity(&self, domain: &str, email: &str) -> bool {
        self.domain == domain && self.email.eq_ignore_ascii_case(email.trim())
    }
}

/// User without credentials, safe to return to clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SanitizedUser {
    pub id: Uuid,
    #[schema(example = "keeper@shelter.org")]
    pub email: String,
    #[schema(example = "north-shelter")]
    pub domain: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    #[schema(example = "keeper")]
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for SanitizedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            domain: user.domain.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone: user.phone.clone(),
            role: user.role_name().map(str::to_string),
            created_at: user.created_at,
        }
    }
}

/// Insert payload for a new user. The email is lower-cased on construction.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub domain: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role_id: Option<Uuid>,
}

impl NewUser {
    pub fn new(email: &str, domain: &str, password_hash: String, role_id: Option<Uuid>) -> Self {
        Self {
            email: email.trim().to_lowercase(),
            domain: domain.to_string(),
            password_hash,
            first_name: None,
            last_name: None,
            phone: None,
            role_id,
        }
    }
}

/// Profile fields to change; `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.phone.is_none()
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(first_name) = &self.first_name {
            user.first_name = Some(first_name.clone());
        }
        if let Some(last_name) = &self.last_name {
            user.last_name = Some(last_name.clone());
        }
        if let Some(phone) = &self.phone {
            user.phone = Some(phone.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role_with(perms: &[(&str, &str)]) -> Role {
        Role {
            id: Uuid::new_v4(),
            name: "keeper".to_string(),
            domain: "north".to_string(),
            title: None,
            permissions: perms
                .iter()
                .map(|(e, o)| Permission::new(e, o, None))
                .collect(),
        }
    }

    #[test]
    fn test_permission_scope_format() {
        let p = Permission::new(" Animal ", "READ", None);
        assert_eq!(p.scope(), "animal:read");
    }

    #[test]
    fn test_user_without_role_has_no_scopes() {
        let user = User {
            id: Uuid::new_v4(),
            email: "a@b.org".to_string(),
            domain: "north".to_string(),
            password_hash: String::new(),
            first_name: None,
            last_name: None,
            phone: None,
            role: None,
            created_at: Utc::now(),
        };
        assert!(user.scopes().is_empty());

        let user = User {
            role: Some(role_with(&[("animal", "read"), ("crm", "write")])),
            ..user
        };
        assert_eq!(user.scopes(), vec!["animal:read", "crm:write"]);
        assert!(user.is_identity("north", "A@B.org"));
        assert!(!user.is_identity("south", "a@b.org"));
    }

    #[test]
    fn test_new_user_lowercases_email() {
        let new_user = NewUser::new(" Keeper@Shelter.ORG ", "north", "hash".to_string(), None);
        assert_eq!(new_user.email, "keeper@shelter.org");
    }

    #[test]
    fn test_profile_update_keeps_unset_fields() {
        let mut user = User {
            id: Uuid::new_v4(),
            email: "a@b.org".to_string(),
            domain: "north".to_string(),
            password_hash: String::new(),
            first_name: Some("Ann".to_string()),
            last_name: Some("Lee".to_string()),
            phone: None,
            role: None,
            created_at: Utc::now(),
        };
        let update = ProfileUpdate {
            phone: Some("+380441234567".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty());
        update.apply(&mut user);

        assert_eq!(user.first_name.as_deref(), Some("Ann"));
        assert_eq!(user.phone.as_deref(), Some("+380441234567"));
        assert!(ProfileUpdate::default().is_empty());
    }
}
