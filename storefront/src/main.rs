// kloven_storefront/src/main.rs

use actix_web::{web as actix_data, App, HttpServer};
use anyhow::Context;
use kloven_flow::FlowRegistry;
use kloven_storefront::config::AppConfig;
use kloven_storefront::errors::AppError;
use kloven_storefront::pipelines;
use kloven_storefront::services::{MercadoPagoClient, PgOrderStore, ResendMailer};
use kloven_storefront::state::AppState;
use kloven_storefront::web::configure_app_routes;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  let subscriber = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::CLOSE);
  // LOG_FORMAT=json for the log collector in production.
  if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
    subscriber.json().init();
  } else {
    subscriber.init();
  }

  tracing::info!("Starting Kloven storefront server...");

  let app_config = Arc::new(AppConfig::from_env().context("loading configuration")?);

  let db_pool = PgPoolOptions::new()
    .max_connections(10)
    .connect(&app_config.database_url)
    .await
    .context("connecting to the database")?;
  tracing::info!("Connected to the database.");

  if app_config.run_migrations {
    sqlx::migrate!("./migrations")
      .run(&db_pool)
      .await
      .map_err(AppError::from)
      .context("running migrations")?;
    tracing::info!("Database migrations applied.");
  }

  let flows = Arc::new(FlowRegistry::<AppError>::new());
  pipelines::register_all_pipelines(&flows);

  let app_state = AppState {
    store: Arc::new(PgOrderStore::new(db_pool)),
    payments: Arc::new(MercadoPagoClient::new(&app_config.mp_api_base, &app_config.mp_access_token)?),
    mailer: Arc::new(ResendMailer::new(&app_config.resend_api_key)?),
    flows,
    config: app_config.clone(),
  };

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Binding server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await?;

  Ok(())
}
