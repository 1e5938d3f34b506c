use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::ProfileUpdate;

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
pub struct UserQuery {
    pub domain: Option<String>,
    pub email: Option<String>,
}

/// Profile fields and role to change. Absent fields are left as they are.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(max = 128, message = "First name must be at most 128 characters"))]
    pub first_name: Option<String>,

    #[validate(length(max = 128, message = "Last name must be at most 128 characters"))]
    pub last_name: Option<String>,

    #[validate(length(max = 32, message = "Phone must be at most 32 characters"))]
    pub phone: Option<String>,

    /// Role name within the user's domain.
    #[schema(example = "vet")]
    pub role: Option<String>,
}

impl UpdateUserRequest {
    pub fn profile(&self) -> ProfileUpdate {
        ProfileUpdate {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone.clone(),
        }
    }
}
