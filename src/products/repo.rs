use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

/// Catalog item. `price` is in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub name: String,
    pub price: i64,
    pub description: String,
    pub stock: i32,
    pub sold: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductPhoto {
    pub id: Uuid,
    pub product_id: Uuid,
    pub s3_key: String,
    pub created_at: OffsetDateTime,
}

pub struct NewProduct {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub name: String,
    pub price: i64,
    pub description: String,
    pub stock: i32,
}

const PRODUCT_COLUMNS: &str =
    "id, collection_id, name, price, description, stock, sold, created_at, updated_at";

pub async fn insert(db: &PgPool, new: &NewProduct) -> anyhow::Result<Product> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "INSERT INTO products (id, collection_id, name, price, description, stock) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(new.id)
    .bind(new.collection_id)
    .bind(&new.name)
    .bind(new.price)
    .bind(&new.description)
    .bind(new.stock)
    .fetch_one(db)
    .await?;
    Ok(product)
}

pub async fn list(db: &PgPool, limit: i64, offset: i64) -> anyhow::Result<Vec<Product>> {
    let rows = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         ORDER BY created_at DESC \
         LIMIT $1 OFFSET $2"
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(product)
}

/// Link a photo row within a transaction, so a batch of keys lands all or
/// not at all.
pub async fn add_photo_tx(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    s3_key: &str,
) -> anyhow::Result<()> {
    tx.execute(
        sqlx::query(
            r#"
            INSERT INTO product_photos (product_id, s3_key)
            VALUES ($1, $2)
            "#,
        )
        .bind(product_id)
        .bind(s3_key),
    )
    .await?;
    Ok(())
}

pub async fn photos_for(db: &PgPool, product_id: Uuid) -> anyhow::Result<Vec<ProductPhoto>> {
    let rows = sqlx::query_as::<_, ProductPhoto>(
        r#"
        SELECT id, product_id, s3_key, created_at
        FROM product_photos
        WHERE product_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(product_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
