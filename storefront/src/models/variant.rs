// kloven_storefront/src/models/variant.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A size/color instance of a product; the unit of stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProductVariant {
  pub id: Uuid,
  pub product_id: Uuid,
  pub size: String,
  pub color: String,
  pub stock: i32,
  pub sku: String,
  pub active: bool,
}
