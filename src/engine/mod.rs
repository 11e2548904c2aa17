//! Workflow engine: runs one artifact through a pipeline.
//!
//! A run is sequential by contract. The next stage never starts before the
//! previous one reaches a terminal state, and a stage reads only the accepted
//! outputs of strictly earlier stages. Independent artifacts may run in
//! parallel, each with its own [`ExecutionContext`].
mod audit;
mod cancel;
mod context;
mod deadline;
mod orchestrator;

pub use audit::{AttemptRecord, AuditTrail};
pub use cancel::CancelToken;
pub use context::{ExecutionContext, RunFailure, RunStatus, StepOutcome, StepState};
pub use orchestrator::{AttemptObserver, EngineSettings, Orchestrator};
