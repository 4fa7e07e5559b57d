//! Tool system: capabilities the model may invoke.

pub mod arguments;
pub mod dynamic;
pub mod registry;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use dynamic::{DynamicTool, DynamicToolAdapter, DynamicToolProvider};
pub use registry::ToolRegistry;
pub use tool::{AgentTool, Tool, ToolExecutionContext};
pub use types::{AgentToolParameters, ParameterBuilder};
