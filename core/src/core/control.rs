// kloven_flow/src/core/control.rs

/// Returned by a handler to continue or halt the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
  Continue,
  /// Halt without error. No later handler runs and no compensation happens.
  Stop,
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
  Completed,
  Stopped,
}
