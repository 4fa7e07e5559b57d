//! AgentRuntime: single-flight driver for approval-gated agent turns.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::configuration::ConfigurationResolver;
use super::session::Session;
use crate::agent_loop::{
    AgentEvent, AgentEventEmitter, AgentEventSink, ApprovalGate, EventTranslator,
    PendingApproval, RunInput, Runner, TurnResult, TurnStatus,
};
use crate::config::AgentSettings;
use crate::error::{Result, TollgateError};
use crate::types::{ModelMessage, TokenUsage};

/// Agent runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentState {
    /// No turn in flight; `run_turn` may be called.
    Idle,
    /// Consuming a model/tool run.
    Streaming,
    /// Halted until every interruption of the current batch is resolved.
    AwaitingApproval,
    /// Cancel requested; waiting for the turn to settle.
    Cancelling,
}

/// Drives agent turns: resolves configuration, streams runs through the
/// event translator, and parks on the approval gate when a run halts.
pub struct AgentRuntime {
    resolver: Arc<ConfigurationResolver>,
    session: Mutex<Session>,
    gate: ApprovalGate,
    emitter: AgentEventEmitter,
    state_tx: watch::Sender<AgentState>,
    active_cancel: Mutex<Option<CancellationToken>>,
}

impl AgentRuntime {
    pub fn new(resolver: Arc<ConfigurationResolver>, sink: Option<AgentEventSink>) -> Self {
        let emitter = AgentEventEmitter::new(sink);
        let (state_tx, _) = watch::channel(AgentState::Idle);
        Self {
            resolver,
            session: Mutex::new(Session::new()),
            gate: ApprovalGate::new(emitter.clone()),
            emitter,
            state_tx,
            active_cancel: Mutex::new(None),
        }
    }

    /// Run one logical turn for `user_message` and settle it.
    ///
    /// Fails with [`TollgateError::InvalidState`] when another turn is still
    /// in flight. Every other failure is reported through the returned
    /// [`TurnResult`] and an `error` event.
    pub async fn run_turn(&self, user_message: impl Into<String>) -> Result<TurnResult> {
        let cancel = {
            let mut slot = lock(&self.active_cancel);
            self.begin()?;
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };
        tracing::debug!("turn started");

        self.session().push(ModelMessage::user(user_message));
        let outcome = self.drive(&cancel).await;
        let result = self.settle(outcome);

        self.gate.clear();
        {
            let mut slot = lock(&self.active_cancel);
            *slot = None;
            self.state_tx.send_replace(AgentState::Idle);
        }
        tracing::debug!(status = %result.status, "turn settled");
        Ok(result)
    }

    /// Request cancellation of the in-flight turn. Returns `false` when idle.
    pub fn cancel(&self) -> bool {
        let slot = lock(&self.active_cancel);
        let Some(token) = slot.as_ref() else {
            return false;
        };
        self.state_tx.send_replace(AgentState::Cancelling);
        token.cancel();
        drop(slot);
        self.gate.clear();
        tracing::debug!("turn cancellation requested");
        true
    }

    pub fn approve(&self, interruption_id: &str) -> bool {
        self.gate.approve(interruption_id)
    }

    pub fn reject(&self, interruption_id: &str) -> bool {
        self.gate.reject(interruption_id)
    }

    pub fn approve_group(&self, group_id: &str) -> usize {
        self.gate.approve_group(group_id)
    }

    pub fn reject_group(&self, group_id: &str) -> usize {
        self.gate.reject_group(group_id)
    }

    pub fn pending_approvals(&self) -> Vec<PendingApproval> {
        self.gate.pending()
    }

    pub fn history(&self) -> Vec<ModelMessage> {
        self.session().items().to_vec()
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.session().usage()
    }

    /// Cancel any in-flight turn, wait for it to settle, then empty the
    /// history and zero the token counters.
    pub async fn clear_history(&self) {
        self.cancel();
        self.wait_for_idle().await;
        self.session().clear();
    }

    pub fn state(&self) -> AgentState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<AgentState> {
        self.state_tx.subscribe()
    }

    /// Returns once no turn is in flight.
    pub async fn wait_for_idle(&self) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx.wait_for(|state| *state == AgentState::Idle).await;
    }

    /// Replace settings. The in-flight turn keeps the configuration it
    /// started with; the next turn resolves a fresh one.
    pub async fn update_settings(&self, settings: AgentSettings) {
        self.resolver.update_settings(settings).await;
    }

    pub fn resolver(&self) -> &Arc<ConfigurationResolver> {
        &self.resolver
    }

    // -- Internal helpers --

    fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }

    /// Atomically transition Idle → Streaming.
    fn begin(&self) -> Result<()> {
        let mut started = false;
        self.state_tx.send_if_modified(|state| {
            if *state != AgentState::Idle {
                return false;
            }
            *state = AgentState::Streaming;
            started = true;
            true
        });
        if started {
            Ok(())
        } else {
            Err(TollgateError::InvalidState(format!(
                "a turn is already in flight (state: {})",
                self.state()
            )))
        }
    }

    /// Move between Streaming and AwaitingApproval without overriding a
    /// pending cancellation.
    fn transition(&self, next: AgentState) {
        self.state_tx.send_if_modified(|state| {
            if *state == AgentState::Cancelling || *state == next {
                return false;
            }
            tracing::debug!(from = %state, to = %next, "agent state transition");
            *state = next;
            true
        });
    }

    async fn drive(&self, cancel: &CancellationToken) -> Result<Vec<ModelMessage>> {
        let configuration = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TollgateError::Cancelled),
            configuration = self.resolver.resolve() => configuration?,
        };
        let mut translator =
            EventTranslator::new(self.emitter.clone(), self.session().usage_tracker());
        let mut input = RunInput::History(self.history());

        loop {
            self.transition(AgentState::Streaming);
            let mut run = Runner::start(configuration.clone(), input, cancel.child_token());
            loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    item = run.next_item() => item,
                };
                let Some(item) = item else {
                    break;
                };
                translator.translate(item);
            }

            let completion = match run.finish().await {
                Ok(completion) if !cancel.is_cancelled() => completion,
                Ok(_) => return Err(TollgateError::Cancelled),
                Err(error) => {
                    translator.abandon();
                    return Err(error);
                }
            };
            if !completion.is_interrupted() {
                return Ok(completion.history);
            }
            let state = completion.state.ok_or_else(|| {
                TollgateError::InvalidState("halted run returned no resumable state".into())
            })?;

            self.transition(AgentState::AwaitingApproval);
            let batch = self.gate.request_approval(completion.interruptions);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TollgateError::Cancelled),
                resolved = batch.wait() => resolved?,
            }
            tracing::debug!(run = %state.id(), "approvals resolved, resuming run");
            input = RunInput::Resume(state);
        }
    }

    fn settle(&self, outcome: Result<Vec<ModelMessage>>) -> TurnResult {
        let (status, error) = match outcome {
            Ok(history) => {
                self.session().commit(history);
                (TurnStatus::Completed, None)
            }
            Err(TollgateError::Cancelled) => (TurnStatus::Cancelled, None),
            Err(error) => {
                tracing::debug!(%error, category = %error.category(), "turn failed");
                self.emitter.emit(AgentEvent::error(&error));
                (TurnStatus::Failed, Some(error))
            }
        };
        let session = self.session();
        TurnResult {
            status,
            history: session.items().to_vec(),
            usage: session.usage(),
            error,
            finished_at: Utc::now(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("state", &self.state())
            .field("history", &self.session().len())
            .finish()
    }
}
