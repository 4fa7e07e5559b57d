//! Resumable run state and the interruptions that halt a run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use super::events::pretty_input;
use crate::error::{Result, TollgateError};
use crate::types::{AgentToolCall, ModelMessage};

/// Human verdict on one gated tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalVerdict {
    Approved,
    Rejected,
}

/// Verdicts recorded against one run, keyed by interruption id.
#[derive(Clone, Default)]
pub(crate) struct VerdictLedger {
    verdicts: Arc<Mutex<HashMap<String, ApprovalVerdict>>>,
}

impl VerdictLedger {
    /// Record a verdict. The first verdict for an interruption is final.
    fn record(&self, interruption_id: &str, verdict: ApprovalVerdict) -> bool {
        let mut verdicts = self.verdicts.lock().unwrap_or_else(|e| e.into_inner());
        if verdicts.contains_key(interruption_id) {
            return false;
        }
        verdicts.insert(interruption_id.to_string(), verdict);
        true
    }

    fn verdict(&self, interruption_id: &str) -> Option<ApprovalVerdict> {
        self.verdicts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(interruption_id)
            .copied()
    }

    fn same_as(&self, other: &VerdictLedger) -> bool {
        Arc::ptr_eq(&self.verdicts, &other.verdicts)
    }
}

/// A tool call awaiting human authorization.
#[derive(Clone)]
pub struct Interruption {
    id: String,
    call: AgentToolCall,
    run_state_id: Uuid,
    ledger: VerdictLedger,
}

impl Interruption {
    pub(crate) fn new(call: AgentToolCall, run_state_id: Uuid, ledger: VerdictLedger) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            call,
            run_state_id,
            ledger,
        }
    }

    /// Caller-visible correlation id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tool_name(&self) -> &str {
        &self.call.name
    }

    pub fn arguments(&self) -> &serde_json::Value {
        &self.call.arguments
    }

    /// The model's tool call id.
    pub fn call_id(&self) -> Option<&str> {
        Some(self.call.id.as_str()).filter(|id| !id.is_empty())
    }

    pub fn pretty_input(&self) -> String {
        pretty_input(&self.call.arguments)
    }

    pub fn verdict(&self) -> Option<ApprovalVerdict> {
        self.ledger.verdict(&self.id)
    }

    pub(crate) fn call(&self) -> &AgentToolCall {
        &self.call
    }

    /// Apply a verdict to the owning run. Returns `false` when this
    /// interruption was already decided.
    pub(crate) fn apply(&self, verdict: ApprovalVerdict) -> bool {
        self.ledger.record(&self.id, verdict)
    }
}

impl std::fmt::Debug for Interruption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interruption")
            .field("id", &self.id)
            .field("tool_name", &self.call.name)
            .field("call_id", &self.call.id)
            .field("run_state_id", &self.run_state_id)
            .finish()
    }
}

/// Checkpoint of a halted run. Pass it back through `RunInput::Resume` to
/// continue where execution paused.
#[derive(Clone)]
pub struct RunState {
    id: Uuid,
    pub(crate) messages: Vec<ModelMessage>,
    pub(crate) turns: usize,
    pub(crate) pending: Vec<Interruption>,
    pub(crate) ledger: VerdictLedger,
}

impl RunState {
    pub(crate) fn new(messages: Vec<ModelMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            messages,
            turns: 0,
            pending: Vec::new(),
            ledger: VerdictLedger::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Interruptions that halted this run.
    pub fn interruptions(&self) -> &[Interruption] {
        &self.pending
    }

    /// Model round trips used so far in this logical turn.
    pub fn turns(&self) -> usize {
        self.turns
    }

    pub fn approve(&self, interruption: &Interruption) -> Result<()> {
        self.decide(interruption, ApprovalVerdict::Approved)
    }

    pub fn reject(&self, interruption: &Interruption) -> Result<()> {
        self.decide(interruption, ApprovalVerdict::Rejected)
    }

    fn decide(&self, interruption: &Interruption, verdict: ApprovalVerdict) -> Result<()> {
        if interruption.run_state_id != self.id || !interruption.ledger.same_as(&self.ledger) {
            return Err(TollgateError::InvalidArgument(format!(
                "interruption {} does not belong to run {}",
                interruption.id, self.id
            )));
        }
        interruption.apply(verdict);
        Ok(())
    }

    /// Whether every pending call has a verdict.
    pub fn is_decided(&self) -> bool {
        self.pending.iter().all(|i| i.verdict().is_some())
    }

    pub(crate) fn interrupt(&mut self, call: AgentToolCall) {
        let interruption = Interruption::new(call, self.id, self.ledger.clone());
        self.pending.push(interruption);
    }
}

impl std::fmt::Debug for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunState")
            .field("id", &self.id)
            .field("messages", &self.messages.len())
            .field("turns", &self.turns)
            .field("pending", &self.pending)
            .finish()
    }
}
