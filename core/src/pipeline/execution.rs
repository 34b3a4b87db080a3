// kloven_flow/src/pipeline/execution.rs

//! `Flow::run()`: step execution and saga rollback.

use crate::core::context_data::ContextData;
use crate::core::control::{FlowOutcome, StepControl};
use crate::core::step::StepDef;
use crate::error::FlowError;
use crate::pipeline::definition::Flow;
use tracing::{event, info_span, instrument, Instrument, Level};

enum StepOutcome {
  Skipped,
  Done,
  Stopped,
}

impl<TData, Err> Flow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Runs every step in order against `ctx_data`.
  ///
  /// On the first error from a non-optional step, the compensators of the
  /// steps that already completed run newest-first, then the error is
  /// returned. Errors from optional steps are logged and the run continues.
  #[instrument(
        name = "Flow::run",
        skip_all,
        fields(
            flow = %self.name,
            context_type = %std::any::type_name::<TData>(),
            num_steps = self.steps.len(),
        ),
        err(Display)
    )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<FlowOutcome, Err> {
    event!(Level::DEBUG, "Flow execution starting.");
    let mut completed: Vec<&str> = Vec::with_capacity(self.steps.len());

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_span = info_span!(
        "flow_step",
        step_name = step_def.name.as_str(),
        step_index = step_idx,
        optional = step_def.optional
      );

      match self.run_step(step_def, ctx_data.clone()).instrument(step_span).await {
        Ok(StepOutcome::Done) => completed.push(step_def.name.as_str()),
        Ok(StepOutcome::Skipped) => {}
        Ok(StepOutcome::Stopped) => {
          event!(Level::INFO, step_name = %step_def.name, "Flow stopped by handler.");
          return Ok(FlowOutcome::Stopped);
        }
        Err(e) if step_def.optional => {
          event!(Level::WARN, step_name = %step_def.name, error = %e, "Optional step failed, continuing.");
        }
        Err(e) => {
          event!(Level::ERROR, step_name = %step_def.name, error = %e, "Step failed.");
          self.compensate(&completed, ctx_data.clone()).await;
          return Err(e);
        }
      }
    }

    event!(Level::DEBUG, "Flow execution completed.");
    Ok(FlowOutcome::Completed)
  }

  async fn run_step(&self, step_def: &StepDef<TData>, ctx_data: ContextData<TData>) -> Result<StepOutcome, Err> {
    let step_name = step_def.name.as_str();

    if let Some(skip_if) = &step_def.skip_if {
      if skip_if(ctx_data.clone()) {
        event!(Level::INFO, "Step skipped by its condition.");
        return Ok(StepOutcome::Skipped);
      }
    }

    let on_handlers = self.on.get(step_name).filter(|h| !h.is_empty());
    let after_handlers = self.after.get(step_name).filter(|h| !h.is_empty());

    if on_handlers.is_none() && after_handlers.is_none() {
      if step_def.optional {
        event!(Level::DEBUG, "Optional step has no handlers, skipping.");
        return Ok(StepOutcome::Skipped);
      }
      return Err(Err::from(FlowError::HandlerMissing {
        step_name: step_name.to_string(),
      }));
    }

    for (phase, handlers) in [("on", on_handlers), ("after", after_handlers)] {
      let Some(handlers) = handlers else { continue };
      event!(Level::TRACE, phase, "Executing handlers.");
      for (handler_idx, handler_fn) in handlers.iter().enumerate() {
        match handler_fn(ctx_data.clone()).await {
          Ok(StepControl::Continue) => {}
          Ok(StepControl::Stop) => {
            event!(Level::DEBUG, phase, handler_index = handler_idx, "Handler requested stop.");
            return Ok(StepOutcome::Stopped);
          }
          Err(e) => {
            event!(Level::DEBUG, phase, handler_index = handler_idx, error = %e, "Handler returned error.");
            return Err(e);
          }
        }
      }
    }

    Ok(StepOutcome::Done)
  }

  async fn compensate(&self, completed: &[&str], ctx_data: ContextData<TData>) {
    for step_name in completed.iter().rev() {
      let Some(compensator) = self.compensators.get(*step_name) else {
        continue;
      };
      event!(Level::WARN, flow = %self.name, %step_name, "Compensating completed step.");
      if let Err(e) = compensator(ctx_data.clone()).await {
        // The triggering error is still the one returned to the caller.
        event!(Level::ERROR, flow = %self.name, %step_name, error = %e, "Compensation failed.");
      }
    }
  }
}
