//! Tollgate: an approval-gated execution controller for streaming,
//! tool-using agents.
//!
//! An [`AgentRuntime`](agent::AgentRuntime) drives one logical turn at a
//! time against a [`ModelProvider`](provider::ModelProvider). Tool calls that
//! require approval halt the run; the runtime surfaces them as events, waits
//! until every interruption of the batch has a verdict, and resumes.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tollgate::prelude::*;
//!
//! # async fn example(providers: ProviderRegistry) -> tollgate::error::Result<()> {
//! let settings = AgentSettings::load_default()?;
//! let resolver = Arc::new(ConfigurationResolver::new(settings, providers));
//! let sink: AgentEventSink = Arc::new(|event| println!("{event:?}"));
//! let agent = AgentRuntime::new(resolver, Some(sink));
//! let result = agent.run_turn("list the files in src").await?;
//! println!("{:?}", result.final_text());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agent_loop;
pub mod config;
pub mod error;
pub mod mcp;
pub mod prelude;
pub mod provider;
pub mod secrets;
pub mod tools;
pub mod types;
pub mod util;
