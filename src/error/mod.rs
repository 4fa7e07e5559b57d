//! Error types for Tollgate.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Turn limit exceeded: the agent used all {max_turns} model turns")]
    TurnLimitExceeded { max_turns: usize },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("External tool server '{server}' error: {message}")]
    ExternalServer { server: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Settings parse error: {0}")]
    SettingsParse(#[from] toml::de::Error),

    #[error("Settings write error: {0}")]
    SettingsWrite(#[from] toml::ser::Error),
}

impl TollgateError {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_)
            | Self::Authentication(_)
            | Self::ModelNotFound(_)
            | Self::SettingsParse(_)
            | Self::SettingsWrite(_) => ErrorCategory::Configuration,
            Self::TurnLimitExceeded { .. } => ErrorCategory::TurnLimit,
            Self::Stream(_) => ErrorCategory::Stream,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::ExternalServer { .. } => ErrorCategory::ExternalServer,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::InvalidArgument(_) | Self::InvalidState(_) | Self::Io(_) => {
                ErrorCategory::Unknown
            }
        }
    }

    /// Whether the caller can recover by resubmitting or adjusting limits,
    /// without changing settings.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::TurnLimit
                | ErrorCategory::Stream
                | ErrorCategory::ToolExecution
                | ErrorCategory::Cancelled
        )
    }

    /// Whether this error was a user-initiated abort rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::TurnLimit => RecoverySuggestion::RaiseTurnLimit,
            ErrorCategory::Stream => RecoverySuggestion::Resubmit,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            ErrorCategory::ExternalServer => RecoverySuggestion::CheckExternalServer,
            ErrorCategory::Cancelled => RecoverySuggestion::None,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TollgateError>;
