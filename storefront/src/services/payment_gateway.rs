// kloven_storefront/src/services/payment_gateway.rs

//! MercadoPago Checkout Pro: preference creation and payment lookup.

use async_trait::async_trait;
use mockall::automock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::errors::{AppError, Result as AppResult};

pub const CURRENCY_ID: &str = "ARS";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceItem {
  pub id: String,
  pub title: String,
  pub quantity: i32,
  pub unit_price: i64,
  pub currency_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferencePayer {
  pub email: String,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackUrls {
  pub success: String,
  pub failure: String,
  pub pending: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceRequest {
  pub items: Vec<PreferenceItem>,
  pub payer: PreferencePayer,
  pub external_reference: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notification_url: Option<String>,
  pub back_urls: BackUrls,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub auto_return: Option<String>,
}

impl PreferenceRequest {
  /// The provider refuses webhooks and auto-return to plain-HTTP hosts, so
  /// both are only set when `base_url` is HTTPS.
  pub fn new(order_id: Uuid, items: Vec<PreferenceItem>, payer: PreferencePayer, base_url: &str) -> Self {
    let base_url = base_url.trim_end_matches('/');
    let is_https = base_url.starts_with("https://");
    Self {
      items,
      payer,
      external_reference: order_id.to_string(),
      notification_url: is_https.then(|| format!("{}/api/webhooks/mercadopago", base_url)),
      back_urls: BackUrls {
        success: format!("{}/compra/exito", base_url),
        failure: format!("{}/compra/error", base_url),
        pending: format!("{}/compra/pendiente", base_url),
      },
      auto_return: is_https.then(|| "approved".to_string()),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PreferenceResponse {
  pub id: Option<String>,
  pub init_point: Option<String>,
}

/// The fields of a provider payment this service acts on.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PaymentDetails {
  pub status: Option<String>,
  pub external_reference: Option<String>,
}

#[automock]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn create_preference(&self, preference: PreferenceRequest) -> AppResult<PreferenceResponse>;

  /// Authoritative payment state; webhook bodies are never trusted for it.
  async fn get_payment(&self, payment_id: &str) -> AppResult<PaymentDetails>;
}

#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
  http: Client,
  api_base: String,
  access_token: String,
}

impl MercadoPagoClient {
  pub fn new(api_base: &str, access_token: &str) -> AppResult<Self> {
    let http = Client::builder()
      .timeout(Duration::from_secs(15))
      .build()
      .map_err(|e| AppError::Config(format!("Could not build payment HTTP client: {}", e)))?;
    Ok(Self {
      http,
      api_base: api_base.trim_end_matches('/').to_string(),
      access_token: access_token.to_string(),
    })
  }
}

async fn read_error_body(response: reqwest::Response) -> String {
  let status = response.status();
  let text = response.text().await.unwrap_or_default();
  format!("status {}: {}", status, text)
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
  #[instrument(name = "mercadopago::create_preference", skip_all, fields(external_reference = %preference.external_reference))]
  async fn create_preference(&self, preference: PreferenceRequest) -> AppResult<PreferenceResponse> {
    let url = format!("{}/checkout/preferences", self.api_base);
    let response = self
      .http
      .post(&url)
      .bearer_auth(&self.access_token)
      .json(&preference)
      .send()
      .await
      .map_err(|e| AppError::Gateway(format!("preference request failed: {}", e)))?;

    if !response.status().is_success() {
      let detail = read_error_body(response).await;
      warn!(%detail, "Preference creation rejected by provider.");
      return Err(AppError::Gateway(format!("preference creation failed with {}", detail)));
    }

    response
      .json::<PreferenceResponse>()
      .await
      .map_err(|e| AppError::Gateway(format!("unexpected preference response: {}", e)))
  }

  #[instrument(name = "mercadopago::get_payment", skip(self))]
  async fn get_payment(&self, payment_id: &str) -> AppResult<PaymentDetails> {
    let url = format!("{}/v1/payments/{}", self.api_base, payment_id);
    let response = self
      .http
      .get(&url)
      .bearer_auth(&self.access_token)
      .send()
      .await
      .map_err(|e| AppError::Gateway(format!("payment lookup failed: {}", e)))?;

    if !response.status().is_success() {
      let detail = read_error_body(response).await;
      warn!(%detail, "Payment lookup rejected by provider.");
      return Err(AppError::Gateway(format!("payment lookup failed with {}", detail)));
    }

    response
      .json::<PaymentDetails>()
      .await
      .map_err(|e| AppError::Gateway(format!("unexpected payment response: {}", e)))
  }
}
