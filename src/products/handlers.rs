use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    error::ApiError,
    products::{
        dto::{Pagination, ProductDetails, ProductListResponse, ProductResponse},
        repo::{self, NewProduct},
        services::{upload_product_photos, UploadItem},
    },
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/product", get(list_products))
        .route("/product/:id", get(get_product))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/product", post(add_product))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
}

/// POST /product (multipart): text fields `name`, `price`, `description`,
/// `collection_id` plus any number of `files` parts.
#[instrument(skip(state, mp))]
pub async fn add_product(
    State(state): State<AppState>,
    _auth: AuthUser,
    mut mp: Multipart,
) -> Result<Json<ProductResponse>, ApiError> {
    let mut name = None;
    let mut price = None;
    let mut description = None;
    let mut collection_id = None;
    let mut stock = None;
    let mut files: Vec<UploadItem> = Vec::new();

    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::validation(e.to_string()))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("name") => name = Some(read_text(field).await?),
            Some("price") => price = Some(read_text(field).await?),
            Some("description") => description = Some(read_text(field).await?),
            Some("collection_id") | Some("collectionId") => {
                collection_id = Some(read_text(field).await?)
            }
            Some("stock") => stock = Some(read_text(field).await?),
            Some("files") | Some("files[]") | Some("photos") => {
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(e.to_string()))?;
                files.push(UploadItem { body, content_type });
            }
            _ => {}
        }
    }

    let (name, price, description, collection_id) = match (name, price, description, collection_id)
    {
        (Some(n), Some(p), Some(d), Some(c)) if !n.is_empty() && !d.is_empty() => (n, p, d, c),
        _ => return Err(ApiError::validation("Please fill all details")),
    };
    let price: i64 = price
        .parse()
        .map_err(|_| ApiError::validation("Invalid price"))?;
    let collection_id: Uuid = collection_id
        .parse()
        .map_err(|_| ApiError::validation("Invalid collection id"))?;
    let stock: i32 = match stock {
        Some(raw) => raw.parse().map_err(|_| ApiError::validation("Invalid stock"))?,
        None => 0,
    };

    // The row goes in first; photo rows reference it by foreign key.
    let product_id = Uuid::new_v4();
    let product = repo::insert(
        &state.db,
        &NewProduct {
            id: product_id,
            collection_id,
            name,
            price,
            description,
            stock,
        },
    )
    .await?;

    let photos = upload_product_photos(&state, product_id, files).await?;

    info!(%product_id, "product created");
    Ok(Json(ProductResponse {
        success: true,
        message: "Product created successfully".into(),
        product: ProductDetails { product, photos },
    }))
}

#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(p): Query<Pagination>,
) -> Result<Json<ProductListResponse>, ApiError> {
    let products = repo::list(&state.db, p.limit, p.offset).await?;
    Ok(Json(ProductListResponse {
        success: true,
        message: "Product found".into(),
        products,
    }))
}

#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = repo::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("No product was found"))?;

    let mut photos = Vec::new();
    for photo in repo::photos_for(&state.db, id).await? {
        photos.push(state.storage.presign_get(&photo.s3_key, 600).await?);
    }

    Ok(Json(ProductResponse {
        success: true,
        message: "Product found".into(),
        product: ProductDetails { product, photos },
    }))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map(|s| s.trim().to_string())
        .map_err(|e| ApiError::validation(e.to_string()))
}
