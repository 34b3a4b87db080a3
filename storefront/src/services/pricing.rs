// kloven_storefront/src/services/pricing.rs

//! Server-side cart pricing. Amounts are whole ARS.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingPolicy {
  pub free_threshold: i64,
  pub flat_fee: i64,
}

impl Default for ShippingPolicy {
  fn default() -> Self {
    Self {
      free_threshold: 50_000,
      flat_fee: 5_000,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShippingInfo {
  pub cost: i64,
  pub is_free: bool,
  pub free_threshold: i64,
  /// How much more would qualify for free shipping; 0 once it does.
  pub remaining: i64,
}

impl ShippingPolicy {
  /// `amount` is the subtotal after discount.
  pub fn cost(&self, amount: i64) -> i64 {
    if amount >= self.free_threshold {
      0
    } else {
      self.flat_fee
    }
  }

  pub fn info(&self, amount: i64) -> ShippingInfo {
    let cost = self.cost(amount);
    ShippingInfo {
      cost,
      is_free: cost == 0,
      free_threshold: self.free_threshold,
      remaining: (self.free_threshold - amount).max(0),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
  pub subtotal: i64,
  pub discount_amount: i64,
  pub shipping_cost: i64,
  pub total: i64,
}

/// `round(subtotal * percent / 100)`, halves rounding up.
pub fn discount_amount(subtotal: i64, discount_percent: i32) -> i64 {
  let percent = i64::from(discount_percent.clamp(0, 100));
  (subtotal * percent + 50).div_euclid(100)
}

/// Prices `(unit_price, quantity)` lines.
pub fn price_lines(lines: impl IntoIterator<Item = (i64, i32)>, discount_percent: i32, policy: ShippingPolicy) -> PriceBreakdown {
  let subtotal: i64 = lines
    .into_iter()
    .map(|(unit_price, quantity)| unit_price * i64::from(quantity))
    .sum();
  let discount_amount = discount_amount(subtotal, discount_percent);
  let after_discount = subtotal - discount_amount;
  let shipping_cost = policy.cost(after_discount);
  PriceBreakdown {
    subtotal,
    discount_amount,
    shipping_cost,
    total: after_discount + shipping_cost,
  }
}
