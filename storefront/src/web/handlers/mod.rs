// kloven_storefront/src/web/handlers/mod.rs

pub mod admin_handlers;
pub mod checkout_handlers;
pub mod order_handlers;
pub mod product_handlers;
pub mod promo_handlers;
pub mod webhook_handlers;

use crate::errors::AppError;
use uuid::Uuid;

/// Accepts only the hyphenated form, the one order links and admin URLs carry.
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, AppError> {
  if raw.len() != 36 {
    return Err(AppError::Validation("ID invalido".to_string()));
  }
  Uuid::parse_str(raw).map_err(|_| AppError::Validation("ID invalido".to_string()))
}
