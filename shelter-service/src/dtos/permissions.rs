use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePermissionRequest {
    #[validate(length(min = 1, max = 64, message = "Entity must be 1-64 characters"))]
    #[schema(example = "animal")]
    pub entity: String,

    #[validate(length(min = 1, max = 64, message = "Operation must be 1-64 characters"))]
    #[schema(example = "read")]
    pub operation: String,

    pub title: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdatePermissionRequest {
    #[validate(length(max = 255, message = "Title must be at most 255 characters"))]
    #[schema(example = "Edit animal records")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, IntoParams)]
pub struct ListQuery {
    #[serde(default)]
    #[validate(range(min = 0))]
    pub skip: i64,

    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PermissionListResponse {
    pub items: Vec<crate::models::Permission>,
    #[schema(example = 42)]
    pub total: usize,
}
