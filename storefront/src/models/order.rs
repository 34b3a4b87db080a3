// kloven_storefront/src/models/order.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::order_item::OrderItem;

/// Mirrors the payment provider's status vocabulary for the states we track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Pending,
  Approved,
  Rejected,
  InProcess,
  Cancelled,
  Refunded,
}

impl OrderStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Approved => "approved",
      OrderStatus::Rejected => "rejected",
      OrderStatus::InProcess => "in_process",
      OrderStatus::Cancelled => "cancelled",
      OrderStatus::Refunded => "refunded",
    }
  }

  /// Statuses whose reserved stock goes back on the shelf.
  pub fn releases_stock(&self) -> bool {
    matches!(self, OrderStatus::Rejected | OrderStatus::Cancelled)
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status '{0}'")]
pub struct UnknownOrderStatus(pub String);

impl FromStr for OrderStatus {
  type Err = UnknownOrderStatus;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pending" => Ok(OrderStatus::Pending),
      "approved" => Ok(OrderStatus::Approved),
      "rejected" => Ok(OrderStatus::Rejected),
      "in_process" => Ok(OrderStatus::InProcess),
      "cancelled" => Ok(OrderStatus::Cancelled),
      "refunded" => Ok(OrderStatus::Refunded),
      other => Err(UnknownOrderStatus(other.to_string())),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Order {
  pub id: Uuid,
  /// Loyalty account, when the buyer was signed in.
  pub user_id: Option<Uuid>,
  pub status: OrderStatus,
  pub mp_payment_id: Option<String>,
  pub mp_status: Option<String>,
  pub payer_name: String,
  pub payer_email: String,
  pub payer_phone: String,
  pub shipping_address: String,
  pub shipping_city: String,
  pub shipping_zip: String,
  pub subtotal: i64,
  pub shipping_cost: i64,
  pub discount_amount: i64,
  pub promo_code_used: Option<String>,
  pub total: i64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderWithItems {
  #[serde(flatten)]
  pub order: Order,
  pub order_items: Vec<OrderItem>,
}

/// Public polling view of an order: no phone or shipping address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSummary {
  pub id: Uuid,
  pub status: OrderStatus,
  pub payer_name: String,
  pub payer_email: String,
  pub subtotal: i64,
  pub shipping_cost: i64,
  pub discount_amount: i64,
  pub total: i64,
  pub created_at: DateTime<Utc>,
  pub order_items: Vec<OrderItemSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItemSummary {
  pub id: Uuid,
  pub product_name: String,
  pub size: String,
  pub color: String,
  pub quantity: i32,
  pub unit_price: i64,
}

impl From<OrderWithItems> for OrderSummary {
  fn from(full: OrderWithItems) -> Self {
    let OrderWithItems { order, order_items } = full;
    Self {
      id: order.id,
      status: order.status,
      payer_name: order.payer_name,
      payer_email: order.payer_email,
      subtotal: order.subtotal,
      shipping_cost: order.shipping_cost,
      discount_amount: order.discount_amount,
      total: order.total,
      created_at: order.created_at,
      order_items: order_items
        .into_iter()
        .map(|item| OrderItemSummary {
          id: item.id,
          product_name: item.product_name,
          size: item.size,
          color: item.color,
          quantity: item.quantity,
          unit_price: item.unit_price,
        })
        .collect(),
    }
  }
}

/// Everything the intake writes in its single transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
  pub user_id: Option<Uuid>,
  pub payer_name: String,
  pub payer_email: String,
  pub payer_phone: String,
  pub shipping_address: String,
  pub shipping_city: String,
  pub shipping_zip: String,
  pub subtotal: i64,
  pub shipping_cost: i64,
  pub discount_amount: i64,
  pub promo_code_used: Option<String>,
  pub total: i64,
  pub items: Vec<super::order_item::NewOrderItem>,
}
