// kloven_flow/src/lib.rs

//! Kloven Flow: an async workflow engine for multi-step business processes
//! whose intermediate writes must be undone when a later step fails.
//!
//! A [`Flow`] is an ordered list of named steps over a shared context
//! ([`ContextData`]). Each step has:
//!  - `on` handlers doing the work and `after` handlers checking its result,
//!  - an optional skip condition and an `optional` flag (errors in optional
//!    steps are logged and swallowed),
//!  - an optional compensator. When a step fails, the compensators of every
//!    step that already completed run in reverse order (saga rollback).
//!
//! A step can also host [branches](crate::branch): sub-flows over an
//! extracted sub-context, the first branch whose condition matches runs.
//!
//! Flows are registered in a [`FlowRegistry`] keyed by their context type and
//! dispatched with `registry.run(ContextData::new(ctx)).await`.

pub mod branch;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use crate::branch::BranchBuilder;
pub use crate::core::context::{Compensator, Handler};
pub use crate::core::context_data::ContextData;
pub use crate::core::control::{FlowOutcome, StepControl};
pub use crate::core::step::{SkipCondition, StepDef};
pub use crate::error::{FlowError, FlowResult};
pub use crate::pipeline::Flow;
pub use crate::registry::FlowRegistry;
