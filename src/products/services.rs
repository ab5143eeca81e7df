use anyhow::Context;
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use crate::{products::repo, state::AppState};

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// Upload product photos to object storage and record their keys. Every key
/// is namespaced under the product id, so names never collide. The caller
/// must have inserted the product row already; the photo rows reference it.
/// All objects go up first, then the rows land in one transaction.
pub async fn upload_product_photos(
    state: &AppState,
    product_id: Uuid,
    files: Vec<UploadItem>,
) -> anyhow::Result<Vec<String>> {
    if files.is_empty() {
        return Ok(Vec::new());
    }

    let mut keys = Vec::with_capacity(files.len());
    for (index, file) in files.into_iter().enumerate() {
        let key = format!("products/{}/photo_{}", product_id, index + 1);
        state
            .storage
            .put_object(&key, file.body, &file.content_type)
            .await
            .with_context(|| format!("put_object {}", key))?;
        keys.push(key);
    }

    let mut tx = state.db.begin().await.context("begin tx")?;
    for key in &keys {
        repo::add_photo_tx(&mut tx, product_id, key).await?;
    }
    tx.commit().await.context("commit tx")?;

    info!(%product_id, count = keys.len(), "product photos uploaded");
    Ok(keys)
}
