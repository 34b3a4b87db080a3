// kloven_storefront/src/web/handlers/promo_handlers.rs

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidatePromoRequest {
  #[serde(default)]
  pub code: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatePromoResponse {
  pub valid: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub discount_percent: Option<i32>,
}

impl ValidatePromoResponse {
  fn invalid() -> Self {
    Self {
      valid: false,
      discount_percent: None,
    }
  }
}

/// UI feedback only; intake re-checks the code on its own. Any failure
/// answers `{valid: false}`.
#[instrument(name = "handler::validate_promo", skip_all)]
pub async fn validate_promo_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<ValidatePromoRequest>,
) -> HttpResponse {
  let code = payload.code.trim().to_uppercase();
  if code.is_empty() {
    return HttpResponse::Ok().json(ValidatePromoResponse::invalid());
  }

  let response = match app_state.store.find_active_promo(code.clone()).await {
    Ok(Some(promo)) if promo.is_redeemable(Utc::now()) => ValidatePromoResponse {
      valid: true,
      discount_percent: Some(promo.discount_percent),
    },
    Ok(_) => ValidatePromoResponse::invalid(),
    Err(e) => {
      warn!(promo_code = %code, error = %e, "Promo validation lookup failed.");
      ValidatePromoResponse::invalid()
    }
  };
  HttpResponse::Ok().json(response)
}
