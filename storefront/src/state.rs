// kloven_storefront/src/state.rs
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::{Mailer, OrderStore, PaymentGateway};
use kloven_flow::FlowRegistry;
use std::sync::Arc;

/// Shared by every request handler and carried inside flow contexts.
#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn OrderStore>,
  pub payments: Arc<dyn PaymentGateway>,
  pub mailer: Arc<dyn Mailer>,
  pub flows: Arc<FlowRegistry<AppError>>,
  pub config: Arc<AppConfig>,
}
