// kloven_storefront/src/lib.rs

//! Kloven storefront service: order intake, payment webhook reconciliation
//! and the small read/admin surfaces around them.
//!
//! Checkout and webhook handling run as `kloven_flow` flows registered in
//! [`state::AppState::flows`]; the HTTP layer only builds their contexts and
//! maps outcomes to responses.

pub mod config;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod web;
