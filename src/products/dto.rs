use serde::{Deserialize, Serialize};

use crate::products::repo::Product;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

/// Product plus presigned photo URLs.
#[derive(Debug, Serialize)]
pub struct ProductDetails {
    #[serde(flatten)]
    pub product: Product,
    pub photos: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub success: bool,
    pub message: String,
    pub product: ProductDetails,
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub success: bool,
    pub message: String,
    pub products: Vec<Product>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[test]
    fn pagination_defaults() {
        let p: Pagination = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(p.limit, 20);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn details_flatten_product_fields() {
        let details = ProductDetails {
            product: Product {
                id: Uuid::new_v4(),
                collection_id: Uuid::new_v4(),
                name: "Mug".into(),
                price: 1299,
                description: "A mug".into(),
                stock: 5,
                sold: 0,
                created_at: OffsetDateTime::now_utc(),
                updated_at: OffsetDateTime::now_utc(),
            },
            photos: vec!["https://example/photo_1".into()],
        };
        let json = serde_json::to_value(&details).expect("serialize");
        assert_eq!(json["name"], "Mug");
        assert_eq!(json["price"], 1299);
        assert_eq!(json["photos"][0], "https://example/photo_1");
    }
}
