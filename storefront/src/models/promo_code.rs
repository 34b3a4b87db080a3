// kloven_storefront/src/models/promo_code.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PromoCode {
  pub id: Uuid,
  pub code: String,
  pub discount_percent: i32,
  /// 0 means unlimited.
  pub max_uses: i32,
  pub current_uses: i32,
  pub expires_at: Option<DateTime<Utc>>,
  pub active: bool,
  pub created_at: DateTime<Utc>,
}

impl PromoCode {
  /// Same predicate the store uses when it redeems a use.
  pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
    let not_expired = self.expires_at.map_or(true, |expires_at| expires_at >= now);
    let has_uses = self.max_uses == 0 || self.current_uses < self.max_uses;
    self.active && not_expired && has_uses
  }
}

/// Admin create payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPromoCode {
  pub code: String,
  pub discount_percent: i32,
  #[serde(default)]
  pub max_uses: i32,
  pub expires_at: Option<DateTime<Utc>>,
  #[serde(default = "default_active")]
  pub active: bool,
}

fn default_active() -> bool {
  true
}

impl NewPromoCode {
  pub fn normalized(mut self) -> Self {
    self.code = self.code.trim().to_uppercase();
    self
  }
}
