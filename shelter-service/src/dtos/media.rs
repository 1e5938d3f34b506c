use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MediaUploadResponse {
    pub blob_id: Uuid,
    #[schema(example = 48213)]
    pub size: usize,
}
