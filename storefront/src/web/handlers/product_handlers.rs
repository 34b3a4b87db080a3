// kloven_storefront/src/web/handlers/product_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::models::ProductFilter;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
  pub category: Option<String>,
  pub featured: Option<String>,
}

impl From<ListProductsQuery> for ProductFilter {
  fn from(query: ListProductsQuery) -> Self {
    ProductFilter {
      category: query.category.filter(|c| !c.trim().is_empty()),
      featured: query.featured.as_deref() == Some("true"),
    }
  }
}

#[instrument(name = "handler::list_products", skip(app_state))]
pub async fn list_products_handler(
  app_state: web::Data<AppState>,
  query: web::Query<ListProductsQuery>,
) -> Result<HttpResponse, AppError> {
  let products = app_state.store.list_products(query.into_inner().into()).await?;
  info!(count = products.len(), "Products listed.");
  Ok(HttpResponse::Ok().json(products))
}

#[instrument(name = "handler::get_product", skip(app_state, path), fields(slug = %path.as_str()))]
pub async fn get_product_handler(app_state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, AppError> {
  let product = app_state
    .store
    .product_by_slug(path.into_inner())
    .await?
    .ok_or_else(|| AppError::NotFound("Producto no encontrado".to_string()))?;
  Ok(HttpResponse::Ok().json(product))
}

#[derive(Debug, Deserialize)]
pub struct ShippingQuery {
  #[serde(default)]
  pub subtotal: i64,
}

pub async fn shipping_info_handler(app_state: web::Data<AppState>, query: web::Query<ShippingQuery>) -> HttpResponse {
  HttpResponse::Ok().json(app_state.config.shipping_policy().info(query.subtotal))
}

pub async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok().json(json!({ "status": "ok" }))
}
