// kloven_storefront/src/pipelines/mod.rs

//! Business workflows, registered once at startup and run from handlers
//! through the shared `FlowRegistry`.

use crate::errors::AppError;
use kloven_flow::FlowRegistry;

pub mod checkout_pipeline;
pub mod common_steps;
pub mod contexts;
pub mod webhook_pipeline;

pub fn register_all_pipelines(flows: &FlowRegistry<AppError>) {
  tracing::info!("Registering flows...");
  checkout_pipeline::register_checkout_flow(flows);
  webhook_pipeline::register_payment_webhook_flow(flows);
  tracing::info!("All application flows registered.");
}
