// kloven_storefront/src/pipelines/checkout_pipeline.rs

//! Order intake: validate, reprice from the catalog, reserve stock in one
//! transaction and open a payment session. A failure after the order is
//! written releases it again through the `persist_order` compensator.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{CheckoutRequest, NewOrder, NewOrderItem};
use crate::pipelines::contexts::CheckoutCtxData;
use crate::services::payment_gateway::{PreferenceItem, PreferencePayer, PreferenceRequest, CURRENCY_ID};
use crate::services::pricing::price_lines;
use chrono::Utc;
use kloven_flow::{ContextData, Flow, FlowRegistry, SkipCondition, StepControl};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub fn register_checkout_flow(flows: &FlowRegistry<AppError>) {
  let no_promo_code: SkipCondition<CheckoutCtxData> =
    Arc::new(|ctx: ContextData<CheckoutCtxData>| ctx.read().promo_code.is_none());

  let mut flow = Flow::<CheckoutCtxData, AppError>::new(
    "order_intake",
    &[
      ("validate_checkout_request", false, None),
      ("load_catalog", false, None),
      ("verify_stock", false, None),
      ("resolve_promo_code", false, Some(no_promo_code)),
      ("price_cart", false, None),
      ("persist_order", false, None),
      ("create_payment_session", false, None),
    ],
  );

  flow.on_step("validate_checkout_request", |ctx: ContextData<CheckoutCtxData>| async move {
    ctx.read_with(|data| validate_request(&data.request))?;
    Ok::<_, AppError>(StepControl::Continue)
  });
  flow.on_step("load_catalog", load_catalog);
  flow.on_step("verify_stock", |ctx: ContextData<CheckoutCtxData>| async move {
    ctx.read_with(verify_stock)?;
    Ok::<_, AppError>(StepControl::Continue)
  });
  flow.on_step("resolve_promo_code", resolve_promo_code);
  flow.on_step("price_cart", |ctx: ContextData<CheckoutCtxData>| async move {
    ctx.write_with(price_cart);
    Ok::<_, AppError>(StepControl::Continue)
  });
  flow.on_step("persist_order", persist_order);
  flow.compensate_step("persist_order", abandon_order);
  flow.on_step("create_payment_session", create_payment_session);
  flow.after_step("create_payment_session", |ctx: ContextData<CheckoutCtxData>| async move {
    if ctx.read().init_point.is_none() {
      return Err(AppError::PaymentInit(
        "No se pudo crear la preferencia de pago".to_string(),
      ));
    }
    Ok(StepControl::Continue)
  });

  flows.register(flow);
}

static EMAIL_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

pub fn is_valid_email(email: &str) -> bool {
  EMAIL_PATTERN.as_ref().is_some_and(|re| re.is_match(email))
}

pub fn validate_request(request: &CheckoutRequest) -> AppResult<()> {
  if !is_valid_email(&request.email) {
    return Err(AppError::Validation("Email invalido".to_string()));
  }
  let required = [&request.name, &request.address, &request.city, &request.zip];
  if required.iter().any(|field| field.trim().is_empty()) {
    return Err(AppError::Validation("Todos los campos son obligatorios".to_string()));
  }
  if request.items.is_empty() {
    return Err(AppError::Validation("Carrito vacio".to_string()));
  }
  if request.items.iter().any(|line| line.quantity < 1) {
    return Err(AppError::Validation("Cantidad invalida".to_string()));
  }
  Ok(())
}

fn distinct(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
  let mut ids: Vec<Uuid> = ids.collect();
  ids.sort_unstable();
  ids.dedup();
  ids
}

#[instrument(name = "checkout::load_catalog", skip_all, err(Display))]
async fn load_catalog(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (store, product_ids, variant_ids) = ctx.read_with(|data| {
    (
      data.app_state.store.clone(),
      distinct(data.request.items.iter().map(|l| l.product_id)),
      distinct(data.request.items.iter().map(|l| l.variant_id)),
    )
  });

  let (products, variants) = tokio::try_join!(store.fetch_products(product_ids), store.fetch_variants(variant_ids))?;
  if products.is_empty() || variants.is_empty() {
    return Err(AppError::CatalogNotFound("Productos no encontrados".to_string()));
  }

  let products: HashMap<_, _> = products.into_iter().map(|p| (p.id, p)).collect();
  let variants: HashMap<_, _> = variants.into_iter().map(|v| (v.id, v)).collect();

  ctx.write_with(|data| {
    for line in &data.request.items {
      let Some(variant) = variants.get(&line.variant_id) else {
        return Err(AppError::CatalogNotFound("Variante no encontrada".to_string()));
      };
      if variant.product_id != line.product_id {
        return Err(AppError::CatalogNotFound("Variante no encontrada".to_string()));
      }
      if !products.contains_key(&line.product_id) {
        return Err(AppError::CatalogNotFound("Productos no encontrados".to_string()));
      }
    }
    info!(products = products.len(), variants = variants.len(), "Catalog loaded.");
    data.products = products;
    data.variants = variants;
    Ok(())
  })?;

  Ok(StepControl::Continue)
}

/// Lines on the same variant are summed before comparing with stock.
fn verify_stock(data: &CheckoutCtxData) -> AppResult<()> {
  let mut requested: HashMap<Uuid, i64> = HashMap::new();
  for line in &data.request.items {
    *requested.entry(line.variant_id).or_default() += i64::from(line.quantity);
  }

  for line in &data.request.items {
    let (Some(variant), Some(wanted)) = (data.variants.get(&line.variant_id), requested.get(&line.variant_id)) else {
      return Err(AppError::CatalogNotFound("Variante no encontrada".to_string()));
    };
    if i64::from(variant.stock) < *wanted {
      let product = data
        .products
        .get(&line.product_id)
        .map_or_else(|| "producto".to_string(), |p| p.name.clone());
      return Err(AppError::InsufficientStock {
        product,
        size: variant.size.clone(),
        color: variant.color.clone(),
      });
    }
  }
  Ok(())
}

/// A code that is unknown, expired or used up simply gives no discount.
#[instrument(name = "checkout::resolve_promo_code", skip_all)]
async fn resolve_promo_code(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (store, code) = ctx.read_with(|data| (data.app_state.store.clone(), data.promo_code.clone()));
  let Some(code) = code else {
    return Ok(StepControl::Continue);
  };

  match store.find_active_promo(code.clone()).await {
    Ok(Some(promo)) if promo.is_redeemable(Utc::now()) => {
      info!(promo_code = %code, discount_percent = promo.discount_percent, "Promo code applied.");
      ctx.write().applied_promo = Some(promo);
    }
    Ok(Some(_)) => info!(promo_code = %code, "Promo code expired or used up, ignoring."),
    Ok(None) => info!(promo_code = %code, "Unknown promo code, ignoring."),
    Err(e) => warn!(promo_code = %code, error = %e, "Promo lookup failed, continuing without discount."),
  }
  Ok(StepControl::Continue)
}

fn price_cart(data: &mut CheckoutCtxData) {
  let percent = data.applied_promo.as_ref().map_or(0, |p| p.discount_percent);
  let policy = data.app_state.config.shipping_policy();
  let lines = data
    .request
    .items
    .iter()
    .filter_map(|line| data.products.get(&line.product_id).map(|p| (p.price, line.quantity)));
  let breakdown = price_lines(lines, percent, policy);
  info!(?breakdown, "Cart priced.");
  data.pricing = Some(breakdown);
}

fn build_new_order(data: &CheckoutCtxData) -> AppResult<NewOrder> {
  let pricing = data
    .pricing
    .ok_or_else(|| AppError::Internal("order persisted before pricing".to_string()))?;

  let mut items = Vec::with_capacity(data.request.items.len());
  for line in &data.request.items {
    let (Some(product), Some(variant)) = (data.products.get(&line.product_id), data.variants.get(&line.variant_id))
    else {
      return Err(AppError::Internal("catalog entry vanished before persisting".to_string()));
    };
    items.push(NewOrderItem {
      product_id: product.id,
      variant_id: variant.id,
      product_name: product.name.clone(),
      size: variant.size.clone(),
      color: variant.color.clone(),
      quantity: line.quantity,
      unit_price: product.price,
    });
  }

  let req = &data.request;
  Ok(NewOrder {
    user_id: req.user_id,
    payer_name: req.name.trim().to_string(),
    payer_email: req.email.trim().to_string(),
    payer_phone: req.phone.trim().to_string(),
    shipping_address: req.address.trim().to_string(),
    shipping_city: req.city.trim().to_string(),
    shipping_zip: req.zip.trim().to_string(),
    subtotal: pricing.subtotal,
    shipping_cost: pricing.shipping_cost,
    discount_amount: pricing.discount_amount,
    promo_code_used: data.applied_promo.as_ref().map(|p| p.code.clone()),
    total: pricing.total,
    items,
  })
}

#[instrument(name = "checkout::persist_order", skip_all, err(Display))]
async fn persist_order(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (store, new_order) = ctx.read_with(|data| Ok::<_, AppError>((data.app_state.store.clone(), build_new_order(data)?)))?;
  let order_id = match store.create_order(new_order).await {
    Ok(order_id) => order_id,
    Err(AppError::PromoExhausted(code)) => {
      // Used up by a concurrent checkout since it was resolved: sell at full price.
      warn!(promo_code = %code, "Promo code ran out before the order was written, repricing without it.");
      let new_order = ctx.write_with(|data| {
        data.applied_promo = None;
        price_cart(data);
        build_new_order(data)
      })?;
      store.create_order(new_order).await?
    }
    Err(e) => return Err(e),
  };
  ctx.write().order_id = Some(order_id);
  Ok(StepControl::Continue)
}

#[instrument(name = "checkout::abandon_order", skip_all, err(Display))]
async fn abandon_order(ctx: ContextData<CheckoutCtxData>) -> AppResult<()> {
  let (store, order_id) = ctx.read_with(|data| (data.app_state.store.clone(), data.order_id));
  let Some(order_id) = order_id else {
    return Ok(());
  };
  if store.abandon_order(order_id).await? {
    warn!(%order_id, "Order abandoned after payment session failure.");
  }
  Ok(())
}

fn build_preference(data: &CheckoutCtxData) -> AppResult<PreferenceRequest> {
  let order_id = data
    .order_id
    .ok_or_else(|| AppError::Internal("payment session requested before order".to_string()))?;

  let items = data
    .request
    .items
    .iter()
    .filter_map(|line| {
      let product = data.products.get(&line.product_id)?;
      let variant = data.variants.get(&line.variant_id)?;
      Some(PreferenceItem {
        id: variant.id.to_string(),
        title: format!("{} ({}/{})", product.name, variant.size, variant.color),
        quantity: line.quantity,
        unit_price: product.price,
        currency_id: CURRENCY_ID.to_string(),
      })
    })
    .collect();

  let payer = PreferencePayer {
    email: data.request.email.trim().to_string(),
    name: data.request.name.trim().to_string(),
  };
  Ok(PreferenceRequest::new(order_id, items, payer, &data.app_state.config.app_base_url))
}

#[instrument(name = "checkout::create_payment_session", skip_all, err(Display))]
async fn create_payment_session(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (payments, preference) = ctx.read_with(|data| Ok::<_, AppError>((data.app_state.payments.clone(), build_preference(data)?)))?;
  let response = payments.create_preference(preference).await?;
  info!(preference_id = ?response.id, "Payment preference created.");
  ctx.write().init_point = response.init_point.filter(|p| !p.is_empty());
  Ok(StepControl::Continue)
}
