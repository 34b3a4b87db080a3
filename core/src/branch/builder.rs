// kloven_flow/src/branch/builder.rs

use crate::branch::scope::{AnyBranch, Branch, Extractor};
use crate::core::context::Handler;
use crate::core::context_data::ContextData;
use crate::core::control::StepControl;
use crate::error::FlowError;
use crate::pipeline::Flow;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Collects the branches of one step. Obtained from
/// [`Flow::branches_for_step`]; nothing is installed until
/// [`finalize`](Self::finalize) is called.
pub struct BranchBuilder<'f, TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  flow: &'f mut Flow<TData, Err>,
  step_name: String,
  branches: Vec<Arc<dyn AnyBranch<TData, Err>>>,
  otherwise: StepControl,
}

impl<'f, TData, Err> BranchBuilder<'f, TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) fn new(flow: &'f mut Flow<TData, Err>, step_name: String) -> Self {
    Self {
      flow,
      step_name,
      branches: Vec::new(),
      otherwise: StepControl::Continue,
    }
  }

  /// Adds a branch running `sub_flow` over the context built by `extractor`.
  /// Call [`BranchConfigurator::when`] to give it a condition.
  pub fn branch<SData>(
    self,
    sub_flow: Arc<Flow<SData, Err>>,
    extractor: impl Fn(ContextData<TData>) -> Result<ContextData<SData>, FlowError> + Send + Sync + 'static,
  ) -> BranchConfigurator<'f, TData, SData, Err>
  where
    SData: 'static + Send + Sync,
  {
    BranchConfigurator {
      builder: self,
      sub_flow,
      extractor: Arc::new(extractor),
    }
  }

  /// What the step returns when no branch matches. Defaults to `Continue`.
  pub fn otherwise(mut self, control: StepControl) -> Self {
    self.otherwise = control;
    self
  }

  /// Installs the dispatcher as the step's only `on` handler and sets the
  /// step's `optional` flag.
  #[instrument(
        name = "BranchBuilder::finalize",
        skip_all,
        fields(step_name = %self.step_name, num_branches = self.branches.len())
    )]
  pub fn finalize(self, optional: bool) {
    let branches = Arc::new(self.branches);
    let otherwise = self.otherwise;
    let step_name = self.step_name.clone();

    let dispatcher: Handler<TData, Err> = Box::new(move |ctx_data: ContextData<TData>| {
      let branches = branches.clone();
      let step_name = step_name.clone();
      Box::pin(async move {
        for branch in branches.iter() {
          if branch.matches(ctx_data.clone()) {
            event!(Level::DEBUG, %step_name, "Branch matched.");
            return branch.execute(ctx_data.clone()).await;
          }
        }
        event!(Level::DEBUG, %step_name, ?otherwise, "No branch matched.");
        Ok(otherwise)
      })
    });

    self.flow.set_optional(&self.step_name, optional);
    self.flow.on.insert(self.step_name.clone(), vec![dispatcher]);
    event!(Level::DEBUG, step_name = %self.step_name, "Branch dispatcher installed.");
  }
}

/// A branch waiting for its condition.
pub struct BranchConfigurator<'f, TData, SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  builder: BranchBuilder<'f, TData, Err>,
  sub_flow: Arc<Flow<SData, Err>>,
  extractor: Extractor<TData, SData>,
}

impl<'f, TData, SData, Err> BranchConfigurator<'f, TData, SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub fn when(
    mut self,
    condition: impl Fn(ContextData<TData>) -> bool + Send + Sync + 'static,
  ) -> BranchBuilder<'f, TData, Err> {
    let branch = Branch {
      step_name: self.builder.step_name.clone(),
      sub_flow: self.sub_flow,
      extractor: self.extractor,
      condition: Arc::new(condition),
    };
    self.builder.branches.push(Arc::new(branch));
    self.builder
  }
}
