//! Approval gate: tracks pending interruptions and signals when the current
//! batch is fully resolved.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::oneshot;
use uuid::Uuid;

use super::events::{AgentEvent, AgentEventEmitter, ApprovalItem};
use super::run_state::{ApprovalVerdict, Interruption};
use crate::error::{Result, TollgateError};

/// A pending approval as seen by callers.
#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub interruption: Interruption,
    pub group_id: Option<String>,
}

struct PendingEntry {
    approval: PendingApproval,
    batch: u64,
    seq: u64,
}

struct Batch {
    id: u64,
    remaining: HashSet<String>,
    done: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct GateState {
    pending: HashMap<String, PendingEntry>,
    batch: Option<Batch>,
    next_batch: u64,
    next_seq: u64,
}

/// Completes once every interruption of its batch has a verdict.
pub struct ApprovalBatch {
    done: oneshot::Receiver<()>,
}

impl ApprovalBatch {
    /// Wait for the batch. Fails with [`TollgateError::Cancelled`] when the
    /// gate was cleared first.
    pub async fn wait(self) -> Result<()> {
        self.done.await.map_err(|_| TollgateError::Cancelled)
    }
}

/// Registers interruptions, surfaces them as events, and applies verdicts.
pub struct ApprovalGate {
    state: Mutex<GateState>,
    emitter: AgentEventEmitter,
}

impl ApprovalGate {
    pub fn new(emitter: AgentEventEmitter) -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            emitter,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new batch, superseding any earlier one. A single
    /// interruption is offered on its own; more than one is always grouped.
    pub fn request_approval(&self, interruptions: Vec<Interruption>) -> ApprovalBatch {
        let (done_tx, done_rx) = oneshot::channel();
        let group_id = (interruptions.len() > 1).then(|| format!("group-{}", Uuid::new_v4()));

        let event = {
            let mut state = self.lock();
            let stale = state.pending.len();
            state.pending.clear();
            if stale > 0 {
                tracing::debug!(stale, "discarding approvals from a superseded batch");
            }

            let batch_id = state.next_batch;
            state.next_batch += 1;
            let mut remaining = HashSet::with_capacity(interruptions.len());
            for interruption in &interruptions {
                let seq = state.next_seq;
                state.next_seq += 1;
                remaining.insert(interruption.id().to_string());
                state.pending.insert(
                    interruption.id().to_string(),
                    PendingEntry {
                        approval: PendingApproval {
                            interruption: interruption.clone(),
                            group_id: group_id.clone(),
                        },
                        batch: batch_id,
                        seq,
                    },
                );
            }

            if remaining.is_empty() {
                let _ = done_tx.send(());
                state.batch = None;
            } else {
                state.batch = Some(Batch {
                    id: batch_id,
                    remaining,
                    done: Some(done_tx),
                });
            }
            approval_event(&interruptions, group_id)
        };

        if let Some(event) = event {
            self.emitter.emit(event);
        }
        ApprovalBatch { done: done_rx }
    }

    /// Resolve one interruption. Unknown ids are ignored and return `false`.
    pub fn resolve(&self, interruption_id: &str, verdict: ApprovalVerdict) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.pending.remove(interruption_id) else {
            tracing::warn!(interruption_id, %verdict, "ignoring verdict for unknown interruption");
            return false;
        };
        entry.approval.interruption.apply(verdict);
        tracing::debug!(
            interruption_id,
            tool = entry.approval.interruption.tool_name(),
            %verdict,
            "interruption resolved"
        );

        if let Some(batch) = state.batch.as_mut().filter(|b| b.id == entry.batch) {
            batch.remaining.remove(interruption_id);
            if batch.remaining.is_empty() {
                if let Some(done) = batch.done.take() {
                    let _ = done.send(());
                }
                state.batch = None;
            }
        }
        true
    }

    pub fn approve(&self, interruption_id: &str) -> bool {
        self.resolve(interruption_id, ApprovalVerdict::Approved)
    }

    pub fn reject(&self, interruption_id: &str) -> bool {
        self.resolve(interruption_id, ApprovalVerdict::Rejected)
    }

    /// Apply `verdict` to every still-pending interruption of a group.
    /// Returns how many were resolved.
    pub fn resolve_group(&self, group_id: &str, verdict: ApprovalVerdict) -> usize {
        let ids: Vec<String> = {
            let state = self.lock();
            let mut members: Vec<_> = state
                .pending
                .iter()
                .filter(|(_, entry)| entry.approval.group_id.as_deref() == Some(group_id))
                .map(|(id, entry)| (entry.seq, id.clone()))
                .collect();
            members.sort();
            members.into_iter().map(|(_, id)| id).collect()
        };
        if ids.is_empty() {
            tracing::warn!(group_id, %verdict, "ignoring verdict for unknown approval group");
        }
        ids.iter().filter(|id| self.resolve(id, verdict)).count()
    }

    pub fn approve_group(&self, group_id: &str) -> usize {
        self.resolve_group(group_id, ApprovalVerdict::Approved)
    }

    pub fn reject_group(&self, group_id: &str) -> usize {
        self.resolve_group(group_id, ApprovalVerdict::Rejected)
    }

    /// Pending approvals in the order they were surfaced.
    pub fn pending(&self) -> Vec<PendingApproval> {
        let state = self.lock();
        let mut entries: Vec<_> = state.pending.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|e| e.approval.clone()).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    /// Drop every pending approval. A batch being waited on fails with
    /// [`TollgateError::Cancelled`].
    pub fn clear(&self) {
        let mut state = self.lock();
        state.pending.clear();
        state.batch = None;
    }
}

fn approval_event(interruptions: &[Interruption], group_id: Option<String>) -> Option<AgentEvent> {
    match (interruptions, group_id) {
        ([], _) => None,
        ([single], None) => Some(AgentEvent::ToolApprovalRequired {
            interruption_id: single.id().to_string(),
            tool_name: single.tool_name().to_string(),
            input: single.pretty_input(),
            call_id: single.call_id().map(str::to_string),
        }),
        (many, group_id) => Some(AgentEvent::GroupedApprovalRequired {
            group_id: group_id.unwrap_or_else(|| format!("group-{}", Uuid::new_v4())),
            approvals: many
                .iter()
                .map(|i| ApprovalItem {
                    interruption_id: i.id().to_string(),
                    tool_name: i.tool_name().to_string(),
                    input: i.pretty_input(),
                })
                .collect(),
        }),
    }
}
