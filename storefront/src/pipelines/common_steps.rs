// kloven_storefront/src/pipelines/common_steps.rs

//! Steps of the reconciliation sub-flows.

use crate::errors::{AppError, Result as AppResult};
use crate::pipelines::contexts::{ApprovedPaymentCtxData, RestockCtxData};
use crate::services::email::order_confirmation_email;
use kloven_flow::{ContextData, StepControl};
use tracing::{info, instrument, warn};

#[instrument(name = "common_step::load_order", skip_all, err(Display))]
pub async fn load_order_step(ctx: ContextData<ApprovedPaymentCtxData>) -> AppResult<StepControl> {
  let (store, order_id) = ctx.read_with(|data| (data.app_state.store.clone(), data.order_id));
  let Some(order) = store.order_with_items(order_id).await? else {
    return Err(AppError::NotFound("Orden no encontrada".to_string()));
  };
  ctx.write().order = Some(order);
  Ok(StepControl::Continue)
}

#[instrument(name = "common_step::send_order_confirmation", skip_all, err(Display))]
pub async fn send_order_confirmation_step(ctx: ContextData<ApprovedPaymentCtxData>) -> AppResult<StepControl> {
  let (mailer, email) = ctx.read_with(|data| {
    let order = data
      .order
      .as_ref()
      .ok_or_else(|| AppError::Internal("confirmation requested before order load".to_string()))?;
    Ok::<_, AppError>((
      data.app_state.mailer.clone(),
      order_confirmation_email(order, &data.app_state.config.resend_from_email),
    ))
  })?;

  let recipient = email.to.clone();
  mailer.send(email).await?;
  info!(%recipient, "Order confirmation email sent.");
  ctx.write().confirmation_sent = true;
  Ok(StepControl::Continue)
}

/// One point per `loyalty_points_divisor` of the order total.
pub fn loyalty_points_for(total: i64, divisor: i64) -> i64 {
  if divisor <= 0 {
    return 0;
  }
  total.max(0) / divisor
}

#[instrument(name = "common_step::award_loyalty_points", skip_all, err(Display))]
pub async fn award_loyalty_points_step(ctx: ContextData<ApprovedPaymentCtxData>) -> AppResult<StepControl> {
  let (store, award) = ctx.read_with(|data| {
    let award = data.order.as_ref().and_then(|o| {
      let user_id = o.order.user_id?;
      let points = loyalty_points_for(o.order.total, data.app_state.config.loyalty_points_divisor);
      Some((user_id, o.order.id, points))
    });
    (data.app_state.store.clone(), award)
  });

  let Some((user_id, order_id, points)) = award else {
    return Ok(StepControl::Continue);
  };
  if points == 0 {
    info!(%order_id, "Order total below one loyalty point.");
    return Ok(StepControl::Continue);
  }

  store.award_loyalty_points(user_id, order_id, points).await?;
  info!(%user_id, %order_id, points, "Loyalty points awarded.");
  ctx.write().points_awarded = Some(points);
  Ok(StepControl::Continue)
}

#[instrument(name = "common_step::restore_stock", skip_all, err(Display))]
pub async fn restore_stock_step(ctx: ContextData<RestockCtxData>) -> AppResult<StepControl> {
  let (store, order_id) = ctx.read_with(|data| (data.app_state.store.clone(), data.order_id));
  let restocked = store.restore_stock(order_id).await?;
  if restocked == 0 {
    warn!(%order_id, "No order items to restock.");
  } else {
    info!(%order_id, variants = restocked, "Stock restored.");
  }
  ctx.write().variants_restocked = restocked;
  Ok(StepControl::Continue)
}
