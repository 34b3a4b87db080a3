// kloven_storefront/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use kloven_flow::FlowError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  /// Referenced products/variants missing at checkout. A client error there,
  /// unlike [`AppError::NotFound`] on direct reads.
  #[error("Catalog lookup failed: {0}")]
  CatalogNotFound(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Sin stock suficiente para {product} ({size}/{color})")]
  InsufficientStock { product: String, size: String, color: String },

  /// The promo code hit its usage cap between being resolved and the order
  /// being written. Carries the code.
  #[error("El codigo promocional {0} ya no esta disponible")]
  PromoExhausted(String),

  #[error("Malformed webhook: {0}")]
  MalformedWebhook(String),

  #[error("Unauthorized")]
  Unauthorized,

  #[error("Payment Init Error: {0}")]
  PaymentInit(String),

  #[error("Payment Provider Error: {0}")]
  Gateway(String),

  #[error("Email Provider Error: {0}")]
  Email(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Migration Error: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<AppError>() {
      Ok(app_err) => app_err,
      Err(err) => match err.downcast::<sqlx::Error>() {
        Ok(sqlx_err) => AppError::Sqlx(sqlx_err),
        Err(err) => AppError::Internal(err.to_string()),
      },
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_)
      | AppError::CatalogNotFound(_)
      | AppError::InsufficientStock { .. }
      | AppError::PromoExhausted(_)
      | AppError::MalformedWebhook(_) => StatusCode::BAD_REQUEST,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Unauthorized => StatusCode::UNAUTHORIZED,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, "Responding with client error");
    }

    // Server-side failures get a fixed message; details stay in the logs.
    let message = match self {
      AppError::Validation(m) | AppError::CatalogNotFound(m) | AppError::NotFound(m) | AppError::MalformedWebhook(m) => {
        m.clone()
      }
      AppError::InsufficientStock { .. } | AppError::PromoExhausted(_) => self.to_string(),
      AppError::Unauthorized => "No autorizado".to_string(),
      AppError::PaymentInit(m) => m.clone(),
      AppError::Gateway(_) => "Error del proveedor de pagos".to_string(),
      AppError::Email(_) => "Error del proveedor de email".to_string(),
      AppError::Sqlx(_) | AppError::Migration(_) => "Error de base de datos".to_string(),
      AppError::Config(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        "Error interno del servidor".to_string()
      }
    };

    HttpResponse::build(status).json(json!({ "error": message }))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
