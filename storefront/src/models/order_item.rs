// kloven_storefront/src/models/order_item.rs

use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Snapshot of a purchased line. Never updated after the order is written.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct OrderItem {
  pub id: Uuid,
  pub order_id: Uuid,
  pub product_id: Uuid,
  pub variant_id: Uuid,
  pub product_name: String,
  pub size: String,
  pub color: String,
  pub quantity: i32,
  pub unit_price: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
  pub product_id: Uuid,
  pub variant_id: Uuid,
  pub product_name: String,
  pub size: String,
  pub color: String,
  pub quantity: i32,
  pub unit_price: i64,
}
