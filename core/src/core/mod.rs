pub mod context;
pub mod context_data;
pub mod control;
pub mod step;

pub use context::{Compensator, Handler};
pub use context_data::ContextData;
pub use control::{FlowOutcome, StepControl};
pub use step::StepDef;
