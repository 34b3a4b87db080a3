// kloven_storefront/src/web/handlers/checkout_handlers.rs

use actix_web::{web, HttpResponse};
use kloven_flow::{ContextData, FlowOutcome};
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::models::{CheckoutRequest, CheckoutResponse};
use crate::pipelines::contexts::CheckoutCtxData;
use crate::state::AppState;

#[instrument(
    name = "handler::checkout",
    skip(app_state, payload),
    fields(items = payload.items.len(), promo = payload.promo_code.is_some())
)]
pub async fn checkout_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, AppError> {
  let ctx_data = ContextData::new(CheckoutCtxData::new(app_state.get_ref().clone(), payload.into_inner()));

  match app_state.flows.run(ctx_data.clone()).await? {
    FlowOutcome::Completed => {
      let (order_id, init_point) = ctx_data.read_with(|data| (data.order_id, data.init_point.clone()));
      let (Some(order_id), Some(init_point)) = (order_id, init_point) else {
        warn!("Order intake completed without an order or payment session.");
        return Err(AppError::PaymentInit(
          "No se pudo crear la preferencia de pago".to_string(),
        ));
      };
      info!(%order_id, "Checkout session created.");
      Ok(HttpResponse::Ok().json(CheckoutResponse { init_point, order_id }))
    }
    FlowOutcome::Stopped => {
      warn!("Order intake was stopped by a handler.");
      Err(AppError::Internal("order intake halted".to_string()))
    }
  }
}
