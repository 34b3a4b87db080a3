// kloven_flow/src/core/context.rs

//! Boxed async callables stored by a [`crate::Flow`].

use crate::core::context_data::ContextData;
use crate::core::control::StepControl;
use std::future::Future;
use std::pin::Pin;

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A step handler. Receives a clone of the shared context and decides whether
/// the flow continues.
///
/// Lock guards taken from the context must be dropped before any `.await`.
pub type Handler<TData, Err> =
  Box<dyn Fn(ContextData<TData>) -> BoxFuture<Result<StepControl, Err>> + Send + Sync>;

/// Undo action for a step that completed before a later step failed.
///
/// Compensator errors are logged and never replace the error that triggered
/// the rollback.
pub type Compensator<TData, Err> = Box<dyn Fn(ContextData<TData>) -> BoxFuture<Result<(), Err>> + Send + Sync>;
