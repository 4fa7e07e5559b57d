//! Translates low-level run items into agent events.

use chrono::Utc;
use uuid::Uuid;

use super::events::{pretty_input, AgentEvent, AgentEventEmitter};
use super::items::{StreamItem, ToolOutputStatus};
use crate::util::UsageTracker;

struct OpenMessage {
    id: String,
    content: String,
}

/// Stateful translator for one logical turn.
///
/// Messages open lazily on the first text fragment and close on
/// `MessageOutput` (or, failing that, on `ResponseCompleted`).
pub struct EventTranslator {
    emitter: AgentEventEmitter,
    usage: UsageTracker,
    open: Option<OpenMessage>,
}

impl EventTranslator {
    pub fn new(emitter: AgentEventEmitter, usage: UsageTracker) -> Self {
        Self {
            emitter,
            usage,
            open: None,
        }
    }

    pub fn translate(&mut self, item: StreamItem) {
        match item {
            StreamItem::OutputTextDelta { delta } => self.chunk(&delta),
            StreamItem::MessageOutput { content } => {
                if self.open.is_none() && !content.is_empty() {
                    self.chunk(&content);
                }
                self.complete();
            }
            StreamItem::ToolCalled { call } => self.emitter.emit(AgentEvent::ToolCallStart {
                call_id: call.id,
                tool_name: call.name,
                input: pretty_input(&call.arguments),
            }),
            StreamItem::ToolOutput {
                call_id,
                tool_name,
                output,
                status,
            } => self.emitter.emit(AgentEvent::ToolCallComplete {
                call_id,
                tool_name,
                output: stringify(output),
                is_error: status == ToolOutputStatus::Incomplete,
            }),
            StreamItem::ResponseCompleted { usage } => {
                self.complete();
                let total = self.usage.record(&usage);
                self.emitter.emit(AgentEvent::TokenUsageChanged {
                    input_tokens: total.input_tokens,
                    output_tokens: total.output_tokens,
                });
            }
            StreamItem::ResponseStarted | StreamItem::Unknown => {}
        }
    }

    /// Forget an in-flight message without completing it.
    pub fn abandon(&mut self) {
        if let Some(open) = self.open.take() {
            tracing::debug!(message_id = %open.id, "abandoning open message");
        }
    }

    fn chunk(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        if self.open.is_none() {
            let id = new_message_id();
            self.emitter.emit(AgentEvent::MessageStart {
                message_id: id.clone(),
            });
            self.open = Some(OpenMessage {
                id,
                content: String::new(),
            });
        }
        let Some(open) = self.open.as_mut() else {
            return;
        };
        open.content.push_str(fragment);
        self.emitter.emit(AgentEvent::MessageChunk {
            message_id: open.id.clone(),
            chunk: fragment.to_string(),
            content: open.content.clone(),
        });
    }

    fn complete(&mut self) {
        if let Some(open) = self.open.take() {
            self.emitter.emit(AgentEvent::MessageComplete {
                message_id: open.id,
                content: open.content,
            });
        }
    }
}

/// `msg-<unix nanos>-<random suffix>`.
fn new_message_id() -> String {
    let nanos = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros().saturating_mul(1_000));
    let suffix = Uuid::new_v4().simple().to_string();
    format!("msg-{nanos}-{}", &suffix[..8])
}

fn stringify(output: serde_json::Value) -> String {
    match output {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    }
}
