use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 64, message = "Name must be 1-64 characters"))]
    #[schema(example = "keeper")]
    pub name: String,

    #[validate(length(min = 1, max = 128, message = "Domain must be 1-128 characters"))]
    #[schema(example = "north-shelter")]
    pub domain: String,

    pub title: Option<String>,

    /// Scopes to grant, as `entity:operation`.
    #[serde(default)]
    #[schema(example = json!(["animal:read", "animal:write"]))]
    pub permissions: Vec<String>,
}

/// Grants to add and withdraw. Unknown scopes fail the whole update.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateRoleRequest {
    pub title: Option<String>,

    #[serde(default)]
    #[schema(example = json!(["medical:write"]))]
    pub assign: Vec<String>,

    #[serde(default)]
    pub unassign: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
pub struct RoleQuery {
    pub name: Option<String>,
    pub domain: Option<String>,
}
