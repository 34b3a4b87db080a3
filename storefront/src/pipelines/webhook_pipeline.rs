// kloven_storefront/src/pipelines/webhook_pipeline.rs

//! Payment webhook reconciliation. The notification body only tells us which
//! payment changed; its state is always re-read from the provider.
//!
//! Only a missing payment id and a failed status write fail the flow; the
//! latter makes the provider redeliver. Everything else stops the flow so the
//! caller acknowledges the notification.

use crate::errors::{AppError, Result as AppResult};
use crate::models::OrderStatus;
use crate::pipelines::common_steps;
use crate::pipelines::contexts::{ApprovedPaymentCtxData, PaymentNotification, PaymentWebhookCtxData, RestockCtxData};
use crate::services::{PaymentStatusUpdate, RecordOutcome};
use kloven_flow::{ContextData, Flow, FlowError, FlowRegistry, SkipCondition, StepControl};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const RECONCILE_STEP: &str = "reconcile_outcome";

pub fn register_payment_webhook_flow(flows: &FlowRegistry<AppError>) {
  let mut flow = Flow::<PaymentWebhookCtxData, AppError>::new(
    "payment_webhook",
    &[
      ("classify_notification", false, None),
      ("extract_payment_id", false, None),
      ("fetch_payment", false, None),
      ("resolve_order_reference", false, None),
      ("record_payment_status", false, None),
      (RECONCILE_STEP, true, None),
    ],
  );

  flow.on_step("classify_notification", |ctx: ContextData<PaymentWebhookCtxData>| async move {
    Ok::<_, AppError>(ctx.write_with(classify_notification))
  });
  flow.on_step("extract_payment_id", |ctx: ContextData<PaymentWebhookCtxData>| async move {
    let payment_id = ctx.read_with(|data| data.notification.as_ref().and_then(PaymentNotification::payment_id));
    let Some(payment_id) = payment_id else {
      return Err(AppError::MalformedWebhook("No payment ID".to_string()));
    };
    debug!(%payment_id, "Payment id extracted.");
    ctx.write().payment_id = Some(payment_id);
    Ok(StepControl::Continue)
  });
  flow.on_step("fetch_payment", fetch_payment);
  flow.on_step("resolve_order_reference", |ctx: ContextData<PaymentWebhookCtxData>| async move {
    Ok::<_, AppError>(ctx.write_with(resolve_order_reference))
  });
  flow.on_step("record_payment_status", record_payment_status);

  flow
    .branches_for_step(RECONCILE_STEP)
    .branch(approved_payment_flow(), extract_approved_ctx)
    .when(|ctx: ContextData<PaymentWebhookCtxData>| ctx.read().status == Some(OrderStatus::Approved))
    .branch(restock_flow(), extract_restock_ctx)
    .when(|ctx: ContextData<PaymentWebhookCtxData>| {
      let data = ctx.read();
      let releasing = data.status.is_some_and(|s| s.releases_stock());
      // Stock already went back when the order first left a stock-holding state.
      let already_released = data.previous_status.is_some_and(|s| s.releases_stock());
      releasing && !already_released
    })
    .otherwise(StepControl::Continue)
    .finalize(true);

  flows.register(flow);
}

fn approved_payment_flow() -> Arc<Flow<ApprovedPaymentCtxData, AppError>> {
  let no_loyalty_account: SkipCondition<ApprovedPaymentCtxData> =
    Arc::new(|ctx: ContextData<ApprovedPaymentCtxData>| {
      ctx.read().order.as_ref().map_or(true, |o| o.order.user_id.is_none())
    });

  let mut flow = Flow::<ApprovedPaymentCtxData, AppError>::new(
    "approved_payment",
    &[
      ("load_order", false, None),
      ("send_confirmation_email", true, None),
      ("award_loyalty_points", true, Some(no_loyalty_account)),
    ],
  );
  flow.on_step("load_order", common_steps::load_order_step);
  flow.on_step("send_confirmation_email", common_steps::send_order_confirmation_step);
  flow.on_step("award_loyalty_points", common_steps::award_loyalty_points_step);
  Arc::new(flow)
}

fn restock_flow() -> Arc<Flow<RestockCtxData, AppError>> {
  let mut flow = Flow::<RestockCtxData, AppError>::new("release_stock", &[("restore_stock", false, None)]);
  flow.on_step("restore_stock", common_steps::restore_stock_step);
  Arc::new(flow)
}

fn unresolved_order() -> FlowError {
  FlowError::ExtractorFailure {
    step_name: RECONCILE_STEP.to_string(),
    source: anyhow::anyhow!("order reference not resolved"),
  }
}

fn extract_approved_ctx(
  ctx: ContextData<PaymentWebhookCtxData>,
) -> Result<ContextData<ApprovedPaymentCtxData>, FlowError> {
  let data = ctx.read();
  let order_id = data.order_id.ok_or_else(unresolved_order)?;
  Ok(ContextData::new(ApprovedPaymentCtxData {
    app_state: data.app_state.clone(),
    order_id,
    order: None,
    confirmation_sent: false,
    points_awarded: None,
  }))
}

fn extract_restock_ctx(ctx: ContextData<PaymentWebhookCtxData>) -> Result<ContextData<RestockCtxData>, FlowError> {
  let data = ctx.read();
  let order_id = data.order_id.ok_or_else(unresolved_order)?;
  Ok(ContextData::new(RestockCtxData {
    app_state: data.app_state.clone(),
    order_id,
    variants_restocked: 0,
  }))
}

/// Non-payment topics and unreadable bodies are acknowledged untouched.
fn classify_notification(data: &mut PaymentWebhookCtxData) -> StepControl {
  let notification = match serde_json::from_slice::<PaymentNotification>(&data.raw_payload) {
    Ok(n) => n,
    Err(e) => {
      warn!(error = %e, bytes = data.raw_payload.len(), "Unreadable webhook body, acknowledging.");
      return StepControl::Stop;
    }
  };
  if notification.kind.as_deref() != Some("payment") {
    debug!(kind = ?notification.kind, "Ignoring non-payment notification.");
    return StepControl::Stop;
  }
  data.notification = Some(notification);
  StepControl::Continue
}

#[instrument(name = "webhook::fetch_payment", skip_all, err(Display))]
async fn fetch_payment(ctx: ContextData<PaymentWebhookCtxData>) -> AppResult<StepControl> {
  let (payments, payment_id) = ctx.read_with(|data| (data.app_state.payments.clone(), data.payment_id.clone()));
  let payment_id = payment_id.ok_or_else(|| AppError::MalformedWebhook("No payment ID".to_string()))?;
  let payment = match payments.get_payment(&payment_id).await {
    Ok(payment) => payment,
    Err(e) => {
      warn!(%payment_id, error = %e, "Payment lookup failed, acknowledging without changes.");
      return Ok(StepControl::Stop);
    }
  };
  info!(%payment_id, status = ?payment.status, external_reference = ?payment.external_reference, "Payment fetched.");
  ctx.write().payment = Some(payment);
  Ok(StepControl::Continue)
}

fn resolve_order_reference(data: &mut PaymentWebhookCtxData) -> StepControl {
  let Some(payment) = data.payment.as_ref() else {
    return StepControl::Stop;
  };

  let order_id = payment
    .external_reference
    .as_deref()
    .and_then(|r| Uuid::parse_str(r.trim()).ok());
  let Some(order_id) = order_id else {
    warn!(external_reference = ?payment.external_reference, "Payment carries no usable order reference, acknowledging.");
    return StepControl::Stop;
  };

  let status = match payment.status.as_deref().map(str::parse::<OrderStatus>) {
    Some(Ok(status)) => status,
    Some(Err(e)) => {
      warn!(%order_id, error = %e, "Unrecognised payment status, acknowledging without changes.");
      return StepControl::Stop;
    }
    None => {
      warn!(%order_id, "Payment has no status, acknowledging without changes.");
      return StepControl::Stop;
    }
  };

  data.order_id = Some(order_id);
  data.status = Some(status);
  StepControl::Continue
}

#[instrument(name = "webhook::record_payment_status", skip_all, err(Display))]
async fn record_payment_status(ctx: ContextData<PaymentWebhookCtxData>) -> AppResult<StepControl> {
  let (store, update) = ctx.read_with(|data| {
    let update = match (data.order_id, data.payment_id.clone(), data.status) {
      (Some(order_id), Some(payment_id), Some(status)) => Some(PaymentStatusUpdate {
        order_id,
        payment_id,
        status,
      }),
      _ => None,
    };
    (data.app_state.store.clone(), update)
  });
  let update = update.ok_or_else(|| AppError::Internal("payment status recorded before resolution".to_string()))?;
  let (order_id, status) = (update.order_id, update.status);

  match store.record_payment_status(update).await? {
    RecordOutcome::Recorded { previous } => {
      info!(%order_id, %previous, %status, "Order payment status updated.");
      ctx.write().previous_status = Some(previous);
      Ok(StepControl::Continue)
    }
    RecordOutcome::Duplicate => {
      info!(%order_id, %status, "Notification already applied, acknowledging.");
      Ok(StepControl::Stop)
    }
    RecordOutcome::OrderNotFound => {
      warn!(%order_id, "Payment references an unknown order, acknowledging.");
      Ok(StepControl::Stop)
    }
  }
}
