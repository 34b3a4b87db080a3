// kloven_storefront/src/models/product.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::variant::ProductVariant;

/// Prices are whole ARS; the currency has no minor unit in this catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Product {
  pub id: Uuid,
  pub name: String,
  pub slug: String,
  pub description: String,
  pub price: i64,
  pub category: String,
  pub image_url: String,
  pub material: String,
  pub fit: String,
  pub featured: bool,
  pub active: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductWithVariants {
  #[serde(flatten)]
  pub product: Product,
  pub product_variants: Vec<ProductVariant>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
  pub category: Option<String>,
  pub featured: bool,
}

/// Admin create/update payload. On update, leaving out `variants` keeps the
/// existing ones untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
  pub name: String,
  pub slug: String,
  #[serde(default)]
  pub description: String,
  pub price: i64,
  pub category: String,
  #[serde(default)]
  pub image_url: String,
  #[serde(default)]
  pub material: String,
  #[serde(default)]
  pub fit: String,
  #[serde(default)]
  pub featured: bool,
  #[serde(default = "default_active")]
  pub active: bool,
  #[serde(default)]
  pub variants: Option<Vec<VariantInput>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantInput {
  pub size: String,
  pub color: String,
  #[serde(default)]
  pub stock: i32,
  /// Generated from slug, size and color when left empty.
  #[serde(default)]
  pub sku: String,
  #[serde(default = "default_active")]
  pub active: bool,
}

fn default_active() -> bool {
  true
}

impl ProductInput {
  pub fn normalized(mut self) -> Self {
    self.name = self.name.trim().to_string();
    self.slug = self.slug.trim().to_lowercase();
    self.category = self.category.trim().to_lowercase();
    let slug = self.slug.clone();
    if let Some(variants) = self.variants.as_mut() {
      for variant in variants.iter_mut() {
        variant.size = variant.size.trim().to_string();
        variant.color = variant.color.trim().to_string();
        variant.sku = variant.sku.trim().to_string();
        if variant.sku.is_empty() {
          variant.sku = format!("{}-{}-{}", slug, variant.size, variant.color)
            .to_uppercase()
            .replace(char::is_whitespace, "-");
        }
      }
    }
    self
  }
}

/// What happened to a product the admin asked to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductRemoval {
  Deleted,
  /// Orders reference it, so it was hidden instead of removed.
  Deactivated,
}
