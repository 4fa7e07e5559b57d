//! Agent runtime: session state, configuration resolution, and the turn driver.

pub mod configuration;
pub mod runtime;
pub mod session;

pub use configuration::{AgentConfiguration, ConfigurationResolver};
pub use runtime::{AgentRuntime, AgentState};
pub use session::Session;
