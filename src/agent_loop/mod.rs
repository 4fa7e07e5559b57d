//! Agent loop: run engine, event translation, and approval gating.

pub mod approvals;
pub mod events;
pub mod items;
pub mod run_state;
pub mod runner;
pub mod translator;
pub mod types;

pub use approvals::{ApprovalBatch, ApprovalGate, PendingApproval};
pub use events::{pretty_input, AgentEvent, AgentEventEmitter, AgentEventSink, ApprovalItem};
pub use items::{StreamItem, ToolOutputStatus};
pub use run_state::{ApprovalVerdict, Interruption, RunState};
pub use runner::{RunCompletion, RunInput, Runner, StreamedRun};
pub use translator::EventTranslator;
pub use types::{TurnResult, TurnStatus};
