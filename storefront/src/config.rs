// kloven_storefront/src/config.rs

use crate::errors::{AppError, Result};
use crate::services::pricing::ShippingPolicy;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  /// Public URL of the storefront. Payment back URLs and the webhook
  /// notification URL are built from it.
  pub app_base_url: String,

  pub mp_access_token: String,
  pub mp_api_base: String,

  pub resend_api_key: String,
  pub resend_from_email: String,

  /// Shared secret for the admin endpoints. Unset disables them (always 401).
  pub admin_password: Option<String>,

  pub shipping_free_threshold: i64,
  pub shipping_flat_fee: i64,
  /// One loyalty point per this many currency units of order total.
  pub loyalty_points_divisor: i64,

  pub run_migrations: bool,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = parse_env_or("SERVER_PORT", 8080u16)?;
    let database_url = get_env("DATABASE_URL")?;
    let app_base_url = get_env("APP_BASE_URL")
      .unwrap_or_else(|_| format!("http://{}:{}", server_host, server_port))
      .trim_end_matches('/')
      .to_string();

    let mp_access_token = get_env("MP_ACCESS_TOKEN").unwrap_or_default();
    let mp_api_base = get_env("MP_API_BASE")
      .unwrap_or_else(|_| "https://api.mercadopago.com".to_string())
      .trim_end_matches('/')
      .to_string();
    if mp_access_token.is_empty() {
      tracing::warn!("MP_ACCESS_TOKEN is not set; payment provider calls will be rejected.");
    }

    let resend_api_key = get_env("RESEND_API_KEY").unwrap_or_default();
    let resend_from_email =
      get_env("RESEND_FROM_EMAIL").unwrap_or_else(|_| "Kloven <onboarding@resend.dev>".to_string());

    let admin_password = get_env("ADMIN_PASSWORD").ok().filter(|p| !p.is_empty());

    let shipping_free_threshold = parse_env_or("SHIPPING_FREE_THRESHOLD", 50_000i64)?;
    let shipping_flat_fee = parse_env_or("SHIPPING_FLAT_FEE", 5_000i64)?;
    let loyalty_points_divisor = parse_env_or("LOYALTY_POINTS_DIVISOR", 100i64)?;
    if loyalty_points_divisor <= 0 {
      return Err(AppError::Config("LOYALTY_POINTS_DIVISOR must be positive".to_string()));
    }

    let run_migrations = parse_env_or("RUN_MIGRATIONS", false)?;

    tracing::info!("Application configuration loaded successfully.");

    Ok(Self {
      server_host,
      server_port,
      database_url,
      app_base_url,
      mp_access_token,
      mp_api_base,
      resend_api_key,
      resend_from_email,
      admin_password,
      shipping_free_threshold,
      shipping_flat_fee,
      loyalty_points_divisor,
      run_migrations,
    })
  }

  pub fn shipping_policy(&self) -> ShippingPolicy {
    ShippingPolicy {
      free_threshold: self.shipping_free_threshold,
      flat_fee: self.shipping_flat_fee,
    }
  }
}

fn parse_env_or<T>(var_name: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match env::var(var_name) {
    Ok(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {}: {}", var_name, e))),
    Err(_) => Ok(default),
  }
}
