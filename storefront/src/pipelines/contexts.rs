// kloven_storefront/src/pipelines/contexts.rs

//! Data carried by each flow. Handlers receive these wrapped in
//! `kloven_flow::ContextData`.

use actix_web::web::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{CheckoutRequest, OrderStatus, OrderWithItems, Product, ProductVariant, PromoCode};
use crate::services::payment_gateway::PaymentDetails;
use crate::services::pricing::PriceBreakdown;
use crate::state::AppState;

// --- Order intake ---

pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub request: CheckoutRequest,
  pub products: HashMap<Uuid, Product>,
  pub variants: HashMap<Uuid, ProductVariant>,
  /// Uppercased, trimmed code from the request; `None` when blank.
  pub promo_code: Option<String>,
  pub applied_promo: Option<PromoCode>,
  pub pricing: Option<PriceBreakdown>,
  pub order_id: Option<Uuid>,
  pub init_point: Option<String>,
}

impl CheckoutCtxData {
  pub fn new(app_state: AppState, request: CheckoutRequest) -> Self {
    let promo_code = request
      .promo_code
      .as_deref()
      .map(|c| c.trim().to_uppercase())
      .filter(|c| !c.is_empty());
    Self {
      app_state,
      request,
      products: HashMap::new(),
      variants: HashMap::new(),
      promo_code,
      applied_promo: None,
      pricing: None,
      order_id: None,
      init_point: None,
    }
  }
}

// --- Payment webhook ---

/// The subset of a provider notification we read. `data.id` arrives as a
/// string or a number depending on the notification kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentNotification {
  #[serde(rename = "type")]
  pub kind: Option<String>,
  pub data: Option<NotificationData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationData {
  pub id: Option<serde_json::Value>,
}

impl PaymentNotification {
  pub fn payment_id(&self) -> Option<String> {
    match self.data.as_ref()?.id.as_ref()? {
      serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
      serde_json::Value::Number(n) => Some(n.to_string()),
      _ => None,
    }
  }
}

pub struct PaymentWebhookCtxData {
  pub app_state: AppState,
  pub raw_payload: Bytes,
  pub notification: Option<PaymentNotification>,
  pub payment_id: Option<String>,
  pub payment: Option<PaymentDetails>,
  pub order_id: Option<Uuid>,
  pub status: Option<OrderStatus>,
  /// Status the order held before this notification was recorded.
  pub previous_status: Option<OrderStatus>,
}

impl PaymentWebhookCtxData {
  pub fn new(app_state: AppState, raw_payload: Bytes) -> Self {
    Self {
      app_state,
      raw_payload,
      notification: None,
      payment_id: None,
      payment: None,
      order_id: None,
      status: None,
      previous_status: None,
    }
  }
}

// --- Reconciliation sub-flows ---

pub struct ApprovedPaymentCtxData {
  pub app_state: AppState,
  pub order_id: Uuid,
  pub order: Option<OrderWithItems>,
  pub confirmation_sent: bool,
  pub points_awarded: Option<i64>,
}

pub struct RestockCtxData {
  pub app_state: AppState,
  pub order_id: Uuid,
  pub variants_restocked: u64,
}
