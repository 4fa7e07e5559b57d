//! Low-level run engine: streams model responses, executes tools, and halts
//! on tool calls that need a human verdict.

mod tooling;


use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::items::StreamItem;
use super::run_state::{ApprovalVerdict, Interruption, RunState};
use crate::agent::AgentConfiguration;
use crate::error::{Result, TollgateError};
use crate::provider::{DeltaStream, ProviderRequest, ToolDefinition};
use crate::tools::ToolArguments;
use crate::types::{AgentToolCall, ModelMessage, StreamEventType, TokenUsage};

use tooling::{execute_tool_call, rejected_tool_result, ToolExecutionOutcome};

/// Where a run starts from.
#[derive(Debug, Clone)]
pub enum RunInput {
    /// Start fresh from a conversation history (system prompt excluded).
    History(Vec<ModelMessage>),
    /// Continue a halted run once its interruptions have verdicts.
    Resume(RunState),
}

/// Settled outcome of one run invocation.
#[derive(Debug, Clone)]
pub struct RunCompletion {
    /// Conversation history including everything this run produced.
    pub history: Vec<ModelMessage>,
    /// Gated tool calls that halted the run; empty when the run finished.
    pub interruptions: Vec<Interruption>,
    /// Checkpoint to resume from when `interruptions` is non-empty.
    pub state: Option<RunState>,
    /// Text of the last assistant response when the run finished.
    pub final_output: Option<String>,
}

impl RunCompletion {
    pub fn is_interrupted(&self) -> bool {
        !self.interruptions.is_empty()
    }

    fn finished(history: Vec<ModelMessage>, final_output: String) -> Self {
        Self {
            history,
            interruptions: Vec::new(),
            state: None,
            final_output: Some(final_output),
        }
    }

    fn halted(state: RunState) -> Self {
        Self {
            history: state.messages.clone(),
            interruptions: state.pending.clone(),
            state: Some(state),
            final_output: None,
        }
    }
}

/// A run in flight. Drain [`StreamedRun::next_item`] then call
/// [`StreamedRun::finish`].
pub struct StreamedRun {
    items: mpsc::UnboundedReceiver<StreamItem>,
    completion: oneshot::Receiver<Result<RunCompletion>>,
}

impl StreamedRun {
    /// Next streamed item, or `None` once the run has settled.
    pub async fn next_item(&mut self) -> Option<StreamItem> {
        self.items.recv().await
    }

    pub async fn finish(self) -> Result<RunCompletion> {
        self.completion.await.unwrap_or_else(|_| {
            Err(TollgateError::Stream(
                "run task ended without a result".into(),
            ))
        })
    }
}

/// Starts runs against a resolved [`AgentConfiguration`].
pub struct Runner;

impl Runner {
    /// Spawn a run. Cancelling `cancel` stops it at the next suspension point
    /// and settles it with [`TollgateError::Cancelled`].
    pub fn start(
        configuration: Arc<AgentConfiguration>,
        input: RunInput,
        cancel: CancellationToken,
    ) -> StreamedRun {
        let (items_tx, items_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = oneshot::channel();
        tokio::spawn(async move {
            let engine = Engine {
                configuration,
                cancel,
                items: items_tx,
            };
            let result = engine.run(input).await;
            if let Err(error) = &result {
                tracing::debug!(%error, "run settled with error");
            }
            let _ = completion_tx.send(result);
        });
        StreamedRun {
            items: items_rx,
            completion: completion_rx,
        }
    }
}

struct Engine {
    configuration: Arc<AgentConfiguration>,
    cancel: CancellationToken,
    items: mpsc::UnboundedSender<StreamItem>,
}

/// Text and tool calls collected from one streamed model response.
#[derive(Default)]
struct ModelResponse {
    text: String,
    calls: Vec<AgentToolCall>,
    usage: TokenUsage,
}

impl Engine {
    async fn run(&self, input: RunInput) -> Result<RunCompletion> {
        let mut state = match input {
            RunInput::History(history) => RunState::new(history),
            RunInput::Resume(state) => {
                if !state.is_decided() {
                    tracing::debug!(run = %state.id(), "resume requested before every interruption was decided");
                    return Ok(RunCompletion::halted(state));
                }
                let mut state = state;
                self.resolve_pending(&mut state).await?;
                state
            }
        };

        loop {
            if state.turns >= self.configuration.max_turns {
                return Err(TollgateError::TurnLimitExceeded {
                    max_turns: self.configuration.max_turns,
                });
            }
            state.turns += 1;

            let response = self.stream_response(&state.messages).await?;
            if response.text.is_empty() && response.calls.is_empty() {
                return Ok(RunCompletion::finished(state.messages, response.text));
            }
            state.messages.push(ModelMessage::assistant_with_tool_calls(
                &response.text,
                &response.calls,
            ));
            if response.calls.is_empty() {
                return Ok(RunCompletion::finished(state.messages, response.text));
            }

            for call in response.calls {
                if self.needs_verdict(&call) {
                    state.interrupt(call);
                    continue;
                }
                let outcome = self.execute(&call).await?;
                self.record(&mut state, outcome);
            }

            if !state.pending.is_empty() {
                tracing::debug!(run = %state.id(), pending = state.pending.len(), "run halted for approval");
                return Ok(RunCompletion::halted(state));
            }
        }
    }

    /// Execute approved calls and reject the rest, in the order they were
    /// requested.
    async fn resolve_pending(&self, state: &mut RunState) -> Result<()> {
        let pending = std::mem::take(&mut state.pending);
        for interruption in pending {
            let call = interruption.call().clone();
            let outcome = match interruption.verdict() {
                Some(ApprovalVerdict::Approved) => self.execute(&call).await?,
                _ => ToolExecutionOutcome {
                    result: rejected_tool_result(&call),
                    call,
                },
            };
            self.record(state, outcome);
        }
        Ok(())
    }

    /// Every gated call in a fresh response gets its own interruption, even
    /// when an earlier response used the same call id.
    fn needs_verdict(&self, call: &AgentToolCall) -> bool {
        self.configuration
            .tools
            .get(&call.name)
            .is_some_and(|tool| {
                tool.requires_approval(&ToolArguments::new(call.arguments.clone()))
            })
    }

    async fn execute(&self, call: &AgentToolCall) -> Result<ToolExecutionOutcome> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TollgateError::Cancelled),
            outcome = execute_tool_call(&self.configuration.tools, call) => Ok(outcome),
        }
    }

    fn record(&self, state: &mut RunState, outcome: ToolExecutionOutcome) {
        self.emit(outcome.item());
        state
            .messages
            .push(ModelMessage::tool_result(outcome.result));
    }

    async fn stream_response(&self, history: &[ModelMessage]) -> Result<ModelResponse> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ModelMessage::system(self.configuration.instructions.clone()));
        messages.extend_from_slice(history);
        let request = ProviderRequest::builder()
            .messages(messages)
            .settings(self.configuration.settings.clone())
            .maybe_tools(ToolDefinition::from_registry(&self.configuration.tools))
            .build();

        let stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(TollgateError::Cancelled),
            stream = self.configuration.provider.stream_text(&request) => {
                stream.map_err(into_stream_error)?
            }
        };
        let mut stream = cancellable(stream, self.cancel.clone());

        self.emit(StreamItem::ResponseStarted);
        let mut response = ModelResponse::default();
        while let Some(delta) = stream.next().await {
            let delta = delta.map_err(into_stream_error)?;
            match delta.event_type {
                StreamEventType::TextDelta => {
                    if !delta.text.is_empty() {
                        response.text.push_str(&delta.text);
                        self.emit(StreamItem::OutputTextDelta { delta: delta.text });
                    }
                }
                StreamEventType::ToolCallDelta => {
                    let Some(mut call) = delta.tool_call else {
                        continue;
                    };
                    if call.id.is_empty() {
                        call.id = format!("call-{}", Uuid::new_v4());
                        response.calls.push(call);
                        continue;
                    }
                    match response.calls.iter_mut().find(|c| c.id == call.id) {
                        Some(existing) => *existing = call,
                        None => response.calls.push(call),
                    }
                }
                StreamEventType::Done => {
                    if let Some(usage) = delta.usage {
                        response.usage.merge(&usage);
                    }
                }
                StreamEventType::Error => return Err(TollgateError::Stream(delta.text)),
                StreamEventType::Start => {}
            }
        }

        if !response.text.is_empty() {
            self.emit(StreamItem::MessageOutput {
                content: response.text.clone(),
            });
        }
        for call in &response.calls {
            self.emit(StreamItem::ToolCalled { call: call.clone() });
        }
        self.emit(StreamItem::ResponseCompleted {
            usage: response.usage,
        });
        Ok(response)
    }

    fn emit(&self, item: StreamItem) {
        // A dropped receiver means nobody is translating; the run still settles.
        let _ = self.items.send(item);
    }
}

/// Wrap a provider stream so each poll first observes `cancel`.
fn cancellable(mut inner: DeltaStream, cancel: CancellationToken) -> DeltaStream {
    async_stream::stream! {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    yield Err(TollgateError::Cancelled);
                    break;
                }
                next = inner.next() => match next {
                    Some(delta) => yield delta,
                    None => break,
                },
            }
        }
    }
    .boxed()
}

fn into_stream_error(error: TollgateError) -> TollgateError {
    match error {
        TollgateError::Stream(_) | TollgateError::Cancelled => error,
        other => TollgateError::Stream(other.to_string()),
    }
}
