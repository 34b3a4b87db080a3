// kloven_flow/src/branch/scope.rs

use crate::core::context_data::ContextData;
use crate::core::control::{FlowOutcome, StepControl};
use crate::error::FlowError;
use crate::pipeline::Flow;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{event, instrument, Level};

pub(crate) type Extractor<TData, SData> =
  Arc<dyn Fn(ContextData<TData>) -> Result<ContextData<SData>, FlowError> + Send + Sync + 'static>;
pub(crate) type Condition<TData> = Arc<dyn Fn(ContextData<TData>) -> bool + Send + Sync + 'static>;

pub(crate) struct Branch<TData, SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) step_name: String,
  pub(crate) sub_flow: Arc<Flow<SData, Err>>,
  pub(crate) extractor: Extractor<TData, SData>,
  pub(crate) condition: Condition<TData>,
}

/// Erases `SData` so branches over different sub-context types can share a
/// step.
#[async_trait]
pub(crate) trait AnyBranch<TData, Err>: Send + Sync
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn matches(&self, ctx_data: ContextData<TData>) -> bool;

  async fn execute(&self, ctx_data: ContextData<TData>) -> Result<StepControl, Err>;
}

#[async_trait]
impl<TData, SData, Err> AnyBranch<TData, Err> for Branch<TData, SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn matches(&self, ctx_data: ContextData<TData>) -> bool {
    (self.condition)(ctx_data)
  }

  #[instrument(
        name = "Branch::execute",
        skip_all,
        fields(
            step_name = %self.step_name,
            sub_flow = %self.sub_flow.name(),
            sub_context_type = %std::any::type_name::<SData>(),
        ),
        err(Display)
    )]
  async fn execute(&self, ctx_data: ContextData<TData>) -> Result<StepControl, Err> {
    let sub_ctx = (self.extractor)(ctx_data).map_err(|e| {
      event!(Level::ERROR, error = %e, "Sub-context extractor failed.");
      let enriched = match e {
        FlowError::HandlerError { source } | FlowError::ExtractorFailure { source, .. } => FlowError::ExtractorFailure {
          step_name: self.step_name.clone(),
          source,
        },
        other => other,
      };
      Err::from(enriched)
    })?;

    match self.sub_flow.run(sub_ctx).await? {
      FlowOutcome::Completed => Ok(StepControl::Continue),
      FlowOutcome::Stopped => {
        event!(Level::INFO, "Sub-flow stopped, stopping parent.");
        Ok(StepControl::Stop)
      }
    }
  }
}
