use serde::{Deserialize, Serialize};

use crate::collections::repo::Collection;

#[derive(Debug, Deserialize)]
pub struct CollectionRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CollectionResponse {
    pub success: bool,
    pub message: String,
    pub collection: Collection,
}

#[derive(Debug, Serialize)]
pub struct CollectionListResponse {
    pub success: bool,
    pub message: String,
    pub collections: Vec<Collection>,
}
