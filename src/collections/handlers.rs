use axum::{
    extract::{Path, State},
    routing::{post, put},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    collections::{
        dto::{CollectionListResponse, CollectionRequest, CollectionResponse},
        repo,
    },
    error::ApiError,
    state::AppState,
};

pub fn collection_routes() -> Router<AppState> {
    Router::new()
        .route("/collection", post(create_collection).get(list_collections))
        .route(
            "/collection/:id",
            put(update_collection).delete(delete_collection),
        )
}

#[instrument(skip(state, payload))]
pub async fn create_collection(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(payload): Json<CollectionRequest>,
) -> Result<Json<CollectionResponse>, ApiError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("Collection name is required"));
    }

    let collection = repo::create(&state.db, name).await?;
    info!(collection_id = %collection.id, "collection created");
    Ok(Json(CollectionResponse {
        success: true,
        message: "Collection created with success".into(),
        collection,
    }))
}

#[instrument(skip(state, payload))]
pub async fn update_collection(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CollectionRequest>,
) -> Result<Json<CollectionResponse>, ApiError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("Collection name is required"));
    }

    let collection = repo::rename(&state.db, id, name)
        .await?
        .ok_or_else(|| ApiError::not_found("Collection not found"))?;
    info!(collection_id = %collection.id, "collection updated");
    Ok(Json(CollectionResponse {
        success: true,
        message: "Collection updated successfully".into(),
        collection,
    }))
}

#[instrument(skip(state))]
pub async fn delete_collection(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !repo::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Collection not found"));
    }
    info!(collection_id = %id, "collection deleted");
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Collection deleted successfully",
    })))
}

#[instrument(skip(state))]
pub async fn list_collections(
    State(state): State<AppState>,
) -> Result<Json<CollectionListResponse>, ApiError> {
    let collections = repo::list(&state.db).await?;
    Ok(Json(CollectionListResponse {
        success: true,
        message: "All the collections".into(),
        collections,
    }))
}
