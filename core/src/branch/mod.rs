// kloven_flow/src/branch/mod.rs

//! Branch steps: a step whose work is delegated to one of several sub-flows.
//!
//! Each branch pairs a condition on the parent context with a sub-flow over
//! its own context type `SData`, and an extractor building that sub-context
//! from the parent. Branches are checked in registration order and the first
//! match runs. A sub-flow that completes lets the parent continue; a sub-flow
//! that stops also stops the parent.
//!
//! ```ignore
//! flow
//!   .branches_for_step("reconcile")
//!   .branch(approved_flow, |ctx| extract_approved(ctx))
//!   .when(|ctx| ctx.read().status == Status::Approved)
//!   .otherwise(StepControl::Continue)
//!   .finalize(true);
//! ```

pub mod builder;
mod scope;

pub use builder::{BranchBuilder, BranchConfigurator};
