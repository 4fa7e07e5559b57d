//! Turn outcome types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::TollgateError;
use crate::types::{ModelMessage, TokenUsage};

/// Terminal status of one `run_turn` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    Cancelled,
    Failed,
}

/// Settled result of one logical turn.
#[derive(Debug)]
pub struct TurnResult {
    pub status: TurnStatus,
    /// Session history after the turn. Only a completed turn adds the
    /// assistant's response; the user message is always kept.
    pub history: Vec<ModelMessage>,
    /// Session token totals after the turn.
    pub usage: TokenUsage,
    pub error: Option<TollgateError>,
    pub finished_at: DateTime<Utc>,
}

impl TurnResult {
    pub fn is_completed(&self) -> bool {
        self.status == TurnStatus::Completed
    }

    /// Text of the last assistant message in the history.
    pub fn final_text(&self) -> Option<String> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == crate::types::Role::Assistant)
            .map(ModelMessage::text)
            .filter(|text| !text.is_empty())
    }
}
