// tests/checkout_flow_tests.rs

mod common;

use chrono::{Duration, Utc};
use common::*;
use kloven_flow::{ContextData, FlowOutcome};
use kloven_storefront::errors::AppError;
use kloven_storefront::models::{CheckoutRequest, OrderStatus};
use kloven_storefront::pipelines::contexts::CheckoutCtxData;
use kloven_storefront::state::AppState;
use uuid::Uuid;

async fn run_checkout(state: &AppState, request: CheckoutRequest) -> Result<(Uuid, String), AppError> {
  let ctx = ContextData::new(CheckoutCtxData::new(state.clone(), request));
  let outcome = state.flows.run(ctx.clone()).await?;
  assert_eq!(outcome, FlowOutcome::Completed);
  let data = ctx.read();
  Ok((
    data.order_id.expect("order id set"),
    data.init_point.clone().expect("init point set"),
  ))
}

#[tokio::test]
async fn checkout_reserves_stock_and_opens_payment_session() {
  let h = harness();
  let (product, variant) = add_catalog_item(&h.store, "Remera Box Fit", 25_000, 3);

  let (order_id, init_point) = run_checkout(&h.state, checkout_request(&[(&variant, 1)], None))
    .await
    .expect("checkout succeeds");

  assert!(init_point.starts_with("https://www.mercadopago.com.ar/"));
  assert_eq!(h.store.stock(variant.id), 2);

  let order = h.store.order(order_id);
  assert_eq!(order.order.status, OrderStatus::Pending);
  assert_eq!(order.order.subtotal, 25_000);
  assert_eq!(order.order.discount_amount, 0);
  assert_eq!(order.order.shipping_cost, 5_000);
  assert_eq!(order.order.total, 30_000);
  assert_eq!(order.order_items.len(), 1);
  assert_eq!(order.order_items[0].unit_price, product.price);

  let preferences = h.gateway.preferences.lock();
  assert_eq!(preferences.len(), 1);
  assert_eq!(preferences[0].external_reference, order_id.to_string());
  assert_eq!(preferences[0].items[0].title, "Remera Box Fit (M/Negro)");
  assert_eq!(
    preferences[0].notification_url.as_deref(),
    Some("https://kloven.test/api/webhooks/mercadopago")
  );
}

#[tokio::test]
async fn client_prices_are_ignored_and_promo_discount_applies() {
  let h = harness();
  let (_, variant) = add_catalog_item(&h.store, "Remera Box Fit", 25_000, 5);
  add_promo(&h.store, "KLOVEN10", 10, 0, 0, None);

  let (order_id, _) = run_checkout(&h.state, checkout_request(&[(&variant, 1)], Some("  kloven10 ")))
    .await
    .expect("checkout succeeds");

  let order = h.store.order(order_id).order;
  assert_eq!(order.discount_amount, 2_500);
  assert_eq!(order.total, 27_500);
  assert_eq!(order.promo_code_used.as_deref(), Some("KLOVEN10"));
  assert_eq!(h.store.promo_uses("KLOVEN10"), 1);
}

#[tokio::test]
async fn free_shipping_above_threshold() {
  let h = harness();
  let (_, variant) = add_catalog_item(&h.store, "Buzo Oversize", 30_000, 5);

  let (order_id, _) = run_checkout(&h.state, checkout_request(&[(&variant, 2)], None))
    .await
    .expect("checkout succeeds");

  let order = h.store.order(order_id).order;
  assert_eq!(order.subtotal, 60_000);
  assert_eq!(order.shipping_cost, 0);
  assert_eq!(order.total, 60_000);
}

#[tokio::test]
async fn expired_or_exhausted_promo_gives_no_discount() {
  let h = harness();
  let (_, variant) = add_catalog_item(&h.store, "Remera Box Fit", 25_000, 5);
  add_promo(&h.store, "VENCIDO", 20, 0, 0, Some(Utc::now() - Duration::days(1)));
  add_promo(&h.store, "AGOTADO", 20, 3, 3, None);

  for code in ["VENCIDO", "AGOTADO", "NOEXISTE"] {
    let (order_id, _) = run_checkout(&h.state, checkout_request(&[(&variant, 1)], Some(code)))
      .await
      .expect("checkout succeeds");
    let order = h.store.order(order_id).order;
    assert_eq!(order.discount_amount, 0, "code {}", code);
    assert_eq!(order.promo_code_used, None, "code {}", code);
  }
  assert_eq!(h.store.promo_uses("VENCIDO"), 0);
  assert_eq!(h.store.promo_uses("AGOTADO"), 3);
}

#[tokio::test]
async fn promo_used_up_by_another_checkout_is_dropped_and_order_repriced() {
  let h = harness();
  let (_, variant) = add_catalog_item(&h.store, "Remera Box Fit", 25_000, 5);
  add_promo(&h.store, "ULTIMO", 20, 1, 1, None);
  h.store.state.lock().stale_promo_reads = true;

  let (order_id, _) = run_checkout(&h.state, checkout_request(&[(&variant, 2)], Some("ULTIMO")))
    .await
    .expect("checkout succeeds without the discount");

  let order = h.store.order(order_id).order;
  assert_eq!(order.subtotal, 50_000);
  assert_eq!(order.discount_amount, 0);
  assert_eq!(order.promo_code_used, None);
  assert_eq!(order.shipping_cost, 0);
  assert_eq!(order.total, 50_000);
  assert_eq!(h.store.promo_uses("ULTIMO"), 1);
  assert_eq!(h.store.stock(variant.id), 3);

  let preferences = h.gateway.preferences.lock();
  assert_eq!(preferences[0].items[0].unit_price, 25_000);
}

#[tokio::test]
async fn insufficient_stock_writes_nothing() {
  let h = harness();
  let (_, variant) = add_catalog_item(&h.store, "Remera Box Fit", 25_000, 1);

  let err = run_checkout(&h.state, checkout_request(&[(&variant, 2)], None))
    .await
    .unwrap_err();

  assert!(matches!(err, AppError::InsufficientStock { ref product, .. } if product == "Remera Box Fit"));
  assert_eq!(h.store.stock(variant.id), 1);
  assert_eq!(h.store.order_count(), 0);
  assert!(h.gateway.preferences.lock().is_empty());
}

#[tokio::test]
async fn duplicate_lines_are_summed_against_stock() {
  let h = harness();
  let (_, variant) = add_catalog_item(&h.store, "Remera Box Fit", 25_000, 3);

  let err = run_checkout(&h.state, checkout_request(&[(&variant, 2), (&variant, 2)], None))
    .await
    .unwrap_err();

  assert!(matches!(err, AppError::InsufficientStock { .. }));
  assert_eq!(h.store.stock(variant.id), 3);
  assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn quantities_past_i32_range_are_rejected_without_panicking() {
  let h = harness();
  let (_, variant) = add_catalog_item(&h.store, "Remera Box Fit", 25_000, 3);

  let err = run_checkout(&h.state, checkout_request(&[(&variant, i32::MAX), (&variant, i32::MAX)], None))
    .await
    .unwrap_err();

  assert!(matches!(err, AppError::InsufficientStock { .. }));
  assert_eq!(h.store.stock(variant.id), 3);
  assert_eq!(h.store.order_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_for_the_last_unit_sell_it_once() {
  let h = harness();
  let (_, variant) = add_catalog_item(&h.store, "Remera Box Fit", 25_000, 1);

  let tasks: Vec<_> = (0..8)
    .map(|_| {
      let state = h.state.clone();
      let request = checkout_request(&[(&variant, 1)], None);
      tokio::spawn(async move { run_checkout(&state, request).await })
    })
    .collect();

  let mut sold = 0;
  for task in tasks {
    match task.await.expect("task joins") {
      Ok(_) => sold += 1,
      Err(err) => assert!(matches!(err, AppError::InsufficientStock { .. }), "unexpected error: {}", err),
    }
  }

  assert_eq!(sold, 1);
  assert_eq!(h.store.stock(variant.id), 0);
  assert_eq!(h.store.order_count(), 1);
  assert_eq!(h.gateway.preferences.lock().len(), 1);
}

#[tokio::test]
async fn unknown_variant_is_a_catalog_error() {
  let h = harness();
  let (_, mut variant) = add_catalog_item(&h.store, "Remera Box Fit", 25_000, 3);
  variant.id = Uuid::new_v4();

  let err = run_checkout(&h.state, checkout_request(&[(&variant, 1)], None))
    .await
    .unwrap_err();

  assert!(matches!(err, AppError::CatalogNotFound(_)));
  assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn variant_of_another_product_is_rejected() {
  let h = harness();
  let (product, _) = add_catalog_item(&h.store, "Remera Box Fit", 25_000, 3);
  let (_, mut other_variant) = add_catalog_item(&h.store, "Gorra Logo", 1_000, 3);
  other_variant.product_id = product.id;

  let err = run_checkout(&h.state, checkout_request(&[(&other_variant, 1)], None))
    .await
    .unwrap_err();

  assert!(matches!(err, AppError::CatalogNotFound(ref m) if m == "Variante no encontrada"));
}

#[tokio::test]
async fn invalid_email_fails_before_touching_the_store() {
  let h = harness();
  let (_, variant) = add_catalog_item(&h.store, "Remera Box Fit", 25_000, 3);
  let mut request = checkout_request(&[(&variant, 1)], None);
  request.email = "ana-at-example".to_string();

  let err = run_checkout(&h.state, request).await.unwrap_err();

  assert!(matches!(err, AppError::Validation(ref m) if m == "Email invalido"));
  assert_eq!(h.store.stock(variant.id), 3);
}

#[tokio::test]
async fn payment_provider_failure_releases_the_reservation() {
  let h = harness_with(
    FakeGateway {
      fail_preference: true,
      ..FakeGateway::default()
    },
    FakeMailer::default(),
  );
  let (_, variant) = add_catalog_item(&h.store, "Remera Box Fit", 25_000, 3);
  add_promo(&h.store, "KLOVEN10", 10, 5, 0, None);

  let err = run_checkout(&h.state, checkout_request(&[(&variant, 2)], Some("KLOVEN10")))
    .await
    .unwrap_err();

  assert!(matches!(err, AppError::Gateway(_)));
  assert_eq!(h.store.stock(variant.id), 3);
  assert_eq!(h.store.promo_uses("KLOVEN10"), 0);

  let orders: Vec<_> = h.store.state.lock().orders.values().cloned().collect();
  assert_eq!(orders.len(), 1);
  assert_eq!(orders[0].order.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn missing_init_point_is_a_payment_init_error_and_is_compensated() {
  let h = harness_with(
    FakeGateway {
      init_point: None,
      ..FakeGateway::default()
    },
    FakeMailer::default(),
  );
  let (_, variant) = add_catalog_item(&h.store, "Remera Box Fit", 25_000, 3);

  let err = run_checkout(&h.state, checkout_request(&[(&variant, 1)], None))
    .await
    .unwrap_err();

  assert!(matches!(err, AppError::PaymentInit(ref m) if m == "No se pudo crear la preferencia de pago"));
  assert_eq!(h.store.stock(variant.id), 3);
  let statuses: Vec<_> = h.store.state.lock().orders.values().map(|o| o.order.status).collect();
  assert_eq!(statuses, vec![OrderStatus::Cancelled]);
}

#[tokio::test]
async fn loyalty_account_is_carried_onto_the_order() {
  let h = harness();
  let (_, variant) = add_catalog_item(&h.store, "Remera Box Fit", 25_000, 3);
  let user_id = Uuid::new_v4();
  let mut request = checkout_request(&[(&variant, 1)], None);
  request.user_id = Some(user_id);

  let (order_id, _) = run_checkout(&h.state, request).await.expect("checkout succeeds");

  assert_eq!(h.store.order(order_id).order.user_id, Some(user_id));
}
