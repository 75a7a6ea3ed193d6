//! Decision loop primitives (runs, events, limits).

pub mod events;
pub mod runner;
pub mod types;

pub use events::{RunEvent, RunEventPayload, RunEventSink};
pub use runner::DecisionLoop;
pub use types::{LoopLimits, RunId, RunOutcome};
