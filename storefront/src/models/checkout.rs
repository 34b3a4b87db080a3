// kloven_storefront/src/models/checkout.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutLine {
  pub product_id: Uuid,
  pub variant_id: Uuid,
  pub quantity: i32,
}

/// Intake request body. Text fields default to empty so that missing
/// fields reach validation and get its message instead of a parse error.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CheckoutRequest {
  #[serde(default)]
  pub items: Vec<CheckoutLine>,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub phone: String,
  #[serde(default)]
  pub address: String,
  #[serde(default)]
  pub city: String,
  #[serde(default)]
  pub zip: String,
  pub promo_code: Option<String>,
  /// Signed-in buyer's loyalty account.
  pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutResponse {
  pub init_point: String,
  pub order_id: Uuid,
}
