// kloven_storefront/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpResponse};
use kloven_flow::ContextData;
use serde_json::json;
use tracing::{debug, instrument};

use crate::errors::AppError;
use crate::pipelines::contexts::PaymentWebhookCtxData;
use crate::state::AppState;

/// The raw body is taken as bytes: unreadable JSON is acknowledged, not
/// rejected, so the provider does not keep redelivering it.
#[instrument(name = "handler::mercadopago_webhook", skip_all, fields(bytes = body.len()))]
pub async fn mercadopago_webhook_handler(
  app_state: web::Data<AppState>,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let ctx_data = ContextData::new(PaymentWebhookCtxData::new(app_state.get_ref().clone(), body));
  let outcome = app_state.flows.run(ctx_data).await?;
  debug!(?outcome, "Webhook processed.");
  Ok(HttpResponse::Ok().json(json!({ "received": true })))
}
