// kloven_storefront/src/services/cart.rs

//! Client-side cart aggregate. Lines are kept as JSON under a single key of
//! an injected key-value store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{CheckoutLine, Product, ProductVariant};
use crate::services::pricing::{ShippingInfo, ShippingPolicy};

pub const CART_STORAGE_KEY: &str = "kloven_cart";

pub trait CartStorage {
  fn get(&self, key: &str) -> Option<String>;
  fn set(&mut self, key: &str, value: String);
  fn remove(&mut self, key: &str);
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCartStorage {
  entries: HashMap<String, String>,
}

impl CartStorage for MemoryCartStorage {
  fn get(&self, key: &str) -> Option<String> {
    self.entries.get(key).cloned()
  }

  fn set(&mut self, key: &str, value: String) {
    self.entries.insert(key.to_string(), value);
  }

  fn remove(&mut self, key: &str) {
    self.entries.remove(key);
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
  pub product: Product,
  pub variant: ProductVariant,
  pub quantity: i32,
}

#[derive(Debug)]
pub struct Cart<S: CartStorage> {
  storage: S,
  lines: Vec<CartLine>,
}

impl<S: CartStorage> Cart<S> {
  /// Restores the cart from `storage`. Unreadable contents start an empty cart.
  pub fn load(storage: S) -> Self {
    let lines = match storage.get(CART_STORAGE_KEY) {
      Some(raw) => serde_json::from_str::<Vec<CartLine>>(&raw).unwrap_or_else(|e| {
        warn!(error = %e, "Stored cart is unreadable, starting empty.");
        Vec::new()
      }),
      None => Vec::new(),
    };
    Self { storage, lines }
  }

  pub fn lines(&self) -> &[CartLine] {
    &self.lines
  }

  pub fn into_storage(self) -> S {
    self.storage
  }

  /// Adds one unit of `variant`, never beyond its stock.
  pub fn add(&mut self, product: Product, variant: ProductVariant) {
    if let Some(line) = self.lines.iter_mut().find(|l| l.variant.id == variant.id) {
      line.quantity = (line.quantity + 1).min(variant.stock);
      line.variant = variant;
    } else if variant.stock > 0 {
      self.lines.push(CartLine {
        product,
        variant,
        quantity: 1,
      });
    } else {
      debug!(variant_id = %variant.id, "Variant out of stock, not added.");
      return;
    }
    self.lines.retain(|l| l.quantity > 0);
    self.persist();
  }

  pub fn remove(&mut self, variant_id: Uuid) {
    self.lines.retain(|l| l.variant.id != variant_id);
    self.persist();
  }

  /// Sets the quantity of a line. Zero or less removes it; more than the
  /// variant's stock is clamped.
  pub fn update_quantity(&mut self, variant_id: Uuid, quantity: i32) {
    if quantity <= 0 {
      self.remove(variant_id);
      return;
    }
    if let Some(line) = self.lines.iter_mut().find(|l| l.variant.id == variant_id) {
      line.quantity = quantity.min(line.variant.stock);
      self.persist();
    }
  }

  pub fn clear(&mut self) {
    self.lines.clear();
    self.storage.remove(CART_STORAGE_KEY);
  }

  pub fn total_items(&self) -> i32 {
    self.lines.iter().map(|l| l.quantity).sum()
  }

  /// Display subtotal from the cached catalog prices; the server reprices
  /// at checkout.
  pub fn subtotal(&self) -> i64 {
    self
      .lines
      .iter()
      .map(|l| l.product.price * i64::from(l.quantity))
      .sum()
  }

  pub fn shipping_info(&self, policy: &ShippingPolicy) -> ShippingInfo {
    policy.info(self.subtotal())
  }

  pub fn checkout_lines(&self) -> Vec<CheckoutLine> {
    self
      .lines
      .iter()
      .map(|l| CheckoutLine {
        product_id: l.product.id,
        variant_id: l.variant.id,
        quantity: l.quantity,
      })
      .collect()
  }

  fn persist(&mut self) {
    match serde_json::to_string(&self.lines) {
      Ok(raw) => self.storage.set(CART_STORAGE_KEY, raw),
      Err(e) => warn!(error = %e, "Could not serialize cart."),
    }
  }
}
