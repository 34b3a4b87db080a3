// kloven_storefront/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::instrument;

use super::parse_id;
use crate::errors::AppError;
use crate::models::OrderSummary;
use crate::state::AppState;

/// Polled by the post-payment page until the order leaves `pending`.
#[instrument(name = "handler::get_order", skip(app_state, path), fields(order_id = %path.as_str()))]
pub async fn get_order_handler(app_state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, AppError> {
  let order_id = parse_id(&path)?;
  let order = app_state
    .store
    .order_with_items(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Orden no encontrada".to_string()))?;
  Ok(HttpResponse::Ok().json(OrderSummary::from(order)))
}
