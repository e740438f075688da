//! Dependency-gated go-live checklist.

mod executor;
mod plan;
mod step;

pub use executor::{ChecklistExecutor, ChecklistOutcome, StepObserver, StepRunner, StepUpdate};
pub use plan::ChecklistPlan;
pub use step::{ChecklistStep, ItemState};
