use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Named product grouping.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Collection {
    pub id: Uuid,
    pub name: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

pub async fn create(db: &PgPool, name: &str) -> anyhow::Result<Collection> {
    let collection = sqlx::query_as::<_, Collection>(
        r#"
        INSERT INTO collections (name)
        VALUES ($1)
        RETURNING id, name, created_at, updated_at
        "#,
    )
    .bind(name)
    .fetch_one(db)
    .await?;
    Ok(collection)
}

pub async fn rename(db: &PgPool, id: Uuid, name: &str) -> anyhow::Result<Option<Collection>> {
    let collection = sqlx::query_as::<_, Collection>(
        r#"
        UPDATE collections
        SET name = $2, updated_at = now()
        WHERE id = $1
        RETURNING id, name, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(name)
    .fetch_optional(db)
    .await?;
    Ok(collection)
}

pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM collections WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Collection>> {
    let rows = sqlx::query_as::<_, Collection>(
        r#"
        SELECT id, name, created_at, updated_at
        FROM collections
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}
