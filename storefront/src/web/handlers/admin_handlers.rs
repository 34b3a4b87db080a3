// kloven_storefront/src/web/handlers/admin_handlers.rs

//! Back-office endpoints behind the shared admin password.

use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use futures_util::future::{ready, Ready};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::parse_id;
use crate::errors::AppError;
use crate::models::{NewPromoCode, OrderStatus, ProductInput, ProductRemoval};
use crate::state::AppState;

/// Present only when the request carries `Authorization: Bearer <ADMIN_PASSWORD>`.
#[derive(Debug)]
pub struct AdminToken;

fn same_secret(expected: &str, provided: &str) -> bool {
  expected.len() == provided.len()
    && expected
      .bytes()
      .zip(provided.bytes())
      .fold(0u8, |diff, (a, b)| diff | (a ^ b))
      == 0
}

impl FromRequest for AdminToken {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
    let expected = req
      .app_data::<web::Data<AppState>>()
      .and_then(|state| state.config.admin_password.clone());
    let provided = req
      .headers()
      .get(header::AUTHORIZATION)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.strip_prefix("Bearer "));

    match (expected.as_deref(), provided) {
      (Some(expected), Some(provided)) if same_secret(expected, provided) => ready(Ok(AdminToken)),
      _ => {
        warn!(path = %req.path(), "Rejected admin request.");
        ready(Err(AppError::Unauthorized))
      }
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct AdminAuthRequest {
  #[serde(default)]
  pub password: String,
}

/// Trades the admin password for the bearer token the other admin routes
/// expect, which is the password itself.
#[instrument(name = "handler::admin_auth", skip_all)]
pub async fn auth_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<AdminAuthRequest>,
) -> Result<HttpResponse, AppError> {
  let Some(expected) = app_state.config.admin_password.as_deref() else {
    return Err(AppError::Config("ADMIN_PASSWORD no configurado".to_string()));
  };
  if !same_secret(expected, &payload.password) {
    warn!("Rejected admin login.");
    return Err(AppError::Unauthorized);
  }
  Ok(HttpResponse::Ok().json(json!({ "token": expected })))
}

#[instrument(name = "handler::admin_get_order", skip(app_state, _admin, path), fields(order_id = %path.as_str()))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  _admin: AdminToken,
  path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let order_id = parse_id(&path)?;
  let order = app_state
    .store
    .order_with_items(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Orden no encontrada".to_string()))?;
  Ok(HttpResponse::Ok().json(order))
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
  pub status: OrderStatus,
}

/// Manual override. Runs no reconciliation: stock and emails are untouched.
#[instrument(
    name = "handler::admin_update_order",
    skip(app_state, _admin, path, payload),
    fields(order_id = %path.as_str(), status = %payload.status)
)]
pub async fn update_order_handler(
  app_state: web::Data<AppState>,
  _admin: AdminToken,
  path: web::Path<String>,
  payload: web::Json<UpdateOrderStatusRequest>,
) -> Result<HttpResponse, AppError> {
  let order_id = parse_id(&path)?;
  let order = app_state
    .store
    .update_order_status(order_id, payload.status)
    .await?
    .ok_or_else(|| AppError::NotFound("Orden no encontrada".to_string()))?;
  info!("Order status overridden by admin.");
  Ok(HttpResponse::Ok().json(order))
}

pub async fn list_promo_codes_handler(
  app_state: web::Data<AppState>,
  _admin: AdminToken,
) -> Result<HttpResponse, AppError> {
  Ok(HttpResponse::Ok().json(app_state.store.list_promo_codes().await?))
}

fn validate_new_promo(promo: &NewPromoCode) -> Result<(), AppError> {
  if promo.code.is_empty() {
    return Err(AppError::Validation("El codigo es obligatorio".to_string()));
  }
  if !(1..=100).contains(&promo.discount_percent) {
    return Err(AppError::Validation("El descuento debe estar entre 1 y 100".to_string()));
  }
  if promo.max_uses < 0 {
    return Err(AppError::Validation("Usos maximos invalidos".to_string()));
  }
  Ok(())
}

#[instrument(name = "handler::admin_create_promo", skip_all)]
pub async fn create_promo_code_handler(
  app_state: web::Data<AppState>,
  _admin: AdminToken,
  payload: web::Json<NewPromoCode>,
) -> Result<HttpResponse, AppError> {
  let promo = payload.into_inner().normalized();
  validate_new_promo(&promo)?;
  let created = app_state.store.create_promo_code(promo).await?;
  info!(code = %created.code, "Promo code created.");
  Ok(HttpResponse::Created().json(created))
}

#[derive(Debug, Deserialize)]
pub struct TogglePromoRequest {
  pub id: Uuid,
  pub active: bool,
}

#[instrument(name = "handler::admin_toggle_promo", skip(app_state, _admin))]
pub async fn toggle_promo_code_handler(
  app_state: web::Data<AppState>,
  _admin: AdminToken,
  payload: web::Json<TogglePromoRequest>,
) -> Result<HttpResponse, AppError> {
  let promo = app_state
    .store
    .set_promo_active(payload.id, payload.active)
    .await?
    .ok_or_else(|| AppError::NotFound("Codigo no encontrado".to_string()))?;
  Ok(HttpResponse::Ok().json(promo))
}

fn validate_product(product: &ProductInput) -> Result<(), AppError> {
  if product.name.is_empty() || product.slug.is_empty() || product.category.is_empty() {
    return Err(AppError::Validation("Nombre, slug y categoria son obligatorios".to_string()));
  }
  if !product.slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
    return Err(AppError::Validation("Slug invalido".to_string()));
  }
  if product.price < 0 {
    return Err(AppError::Validation("Precio invalido".to_string()));
  }
  let mut seen = HashSet::new();
  for variant in product.variants.iter().flatten() {
    if variant.size.is_empty() || variant.color.is_empty() {
      return Err(AppError::Validation("Talle y color son obligatorios".to_string()));
    }
    if variant.stock < 0 {
      return Err(AppError::Validation("Stock invalido".to_string()));
    }
    if !seen.insert((variant.size.as_str(), variant.color.as_str())) {
      return Err(AppError::Validation("Variante duplicada".to_string()));
    }
  }
  Ok(())
}

pub async fn list_products_handler(
  app_state: web::Data<AppState>,
  _admin: AdminToken,
) -> Result<HttpResponse, AppError> {
  Ok(HttpResponse::Ok().json(app_state.store.admin_list_products().await?))
}

#[instrument(name = "handler::admin_create_product", skip_all)]
pub async fn create_product_handler(
  app_state: web::Data<AppState>,
  _admin: AdminToken,
  payload: web::Json<ProductInput>,
) -> Result<HttpResponse, AppError> {
  let product = payload.into_inner().normalized();
  validate_product(&product)?;
  let created = app_state.store.create_product(product).await?;
  info!(product_id = %created.product.id, slug = %created.product.slug, "Product created by admin.");
  Ok(HttpResponse::Created().json(created))
}

#[instrument(name = "handler::admin_get_product", skip(app_state, _admin, path), fields(product_id = %path.as_str()))]
pub async fn get_product_handler(
  app_state: web::Data<AppState>,
  _admin: AdminToken,
  path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let product_id = parse_id(&path)?;
  let product = app_state
    .store
    .admin_product(product_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Producto no encontrado".to_string()))?;
  Ok(HttpResponse::Ok().json(product))
}

#[instrument(
    name = "handler::admin_update_product",
    skip(app_state, _admin, path, payload),
    fields(product_id = %path.as_str())
)]
pub async fn update_product_handler(
  app_state: web::Data<AppState>,
  _admin: AdminToken,
  path: web::Path<String>,
  payload: web::Json<ProductInput>,
) -> Result<HttpResponse, AppError> {
  let product_id = parse_id(&path)?;
  let product = payload.into_inner().normalized();
  validate_product(&product)?;
  let updated = app_state
    .store
    .update_product(product_id, product)
    .await?
    .ok_or_else(|| AppError::NotFound("Producto no encontrado".to_string()))?;
  Ok(HttpResponse::Ok().json(updated))
}

#[instrument(name = "handler::admin_delete_product", skip(app_state, _admin, path), fields(product_id = %path.as_str()))]
pub async fn delete_product_handler(
  app_state: web::Data<AppState>,
  _admin: AdminToken,
  path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let product_id = parse_id(&path)?;
  let removal = app_state
    .store
    .delete_product(product_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Producto no encontrado".to_string()))?;
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "deactivated": removal == ProductRemoval::Deactivated,
  })))
}
