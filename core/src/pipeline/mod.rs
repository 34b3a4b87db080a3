// kloven_flow/src/pipeline/mod.rs

//! The [`Flow`] type: definition, handler registration and execution.

pub mod definition;
mod execution;
mod hooks;

pub use definition::Flow;
