//! Shared test helpers: scripted provider, factory, and event capture.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use tollgate::agent::{AgentRuntime, ConfigurationResolver};
use tollgate::agent_loop::{AgentEvent, AgentEventSink};
use tollgate::config::{AgentSettings, ProviderSettings};
use tollgate::error::{Result, TollgateError};
use tollgate::provider::{
    DeltaStream, ModelProvider, ProviderConfig, ProviderFactory, ProviderRegistry,
    ProviderRequest,
};
use tollgate::tools::{AgentTool, AgentToolParameters, ToolRegistry};
use tollgate::types::{AgentToolCall, TextStreamDelta, TokenUsage};

pub const PROVIDER: &str = "scripted";
pub const REJECTED: &str = "Tool execution was not approved.";

/// What the provider does on one call.
#[derive(Clone)]
pub enum Script {
    /// Stream these deltas, then end.
    Deltas(Vec<TextStreamDelta>),
    /// Fail before streaming anything.
    Fail(String),
    /// Stream these deltas, then never finish.
    Hang(Vec<TextStreamDelta>),
}

/// Replays one script per call index; past the end it answers "done".
pub struct ScriptedProvider {
    scripts: Vec<Script>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().expect("request lock").clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        PROVIDER
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn stream_text(&self, request: &ProviderRequest) -> Result<DeltaStream> {
        self.requests
            .lock()
            .expect("request lock")
            .push(request.clone());
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .get(index)
            .cloned()
            .unwrap_or_else(|| Script::Deltas(text_response("done", 1, 1)));
        match script {
            Script::Deltas(deltas) => Ok(stream::iter(deltas.into_iter().map(Ok)).boxed()),
            Script::Fail(message) => Err(TollgateError::Stream(message)),
            Script::Hang(deltas) => Ok(stream::iter(deltas.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
        }
    }
}

/// Factory handing out one shared [`ScriptedProvider`].
pub struct ScriptedFactory {
    keys: Vec<&'static str>,
    provider: Arc<ScriptedProvider>,
    requires_credential: bool,
    configs: Mutex<Vec<ProviderConfig>>,
}

impl ScriptedFactory {
    pub fn new(provider: Arc<ScriptedProvider>) -> Self {
        Self {
            keys: vec![PROVIDER],
            provider,
            requires_credential: false,
            configs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_keys(mut self, keys: Vec<&'static str>) -> Self {
        self.keys = keys;
        self
    }

    pub fn requiring_credential(mut self) -> Self {
        self.requires_credential = true;
        self
    }

    /// Every config passed to `create`, in order.
    pub fn configs(&self) -> Vec<ProviderConfig> {
        self.configs.lock().expect("config lock").clone()
    }
}

impl ProviderFactory for ScriptedFactory {
    fn provider_keys(&self) -> &[&str] {
        &self.keys
    }

    fn requires_credential(&self, _provider_key: &str) -> bool {
        self.requires_credential
    }

    fn default_model(&self, _provider_key: &str) -> Option<&str> {
        Some("scripted-model")
    }

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn ModelProvider>> {
        self.configs
            .lock()
            .expect("config lock")
            .push(config.clone());
        Ok(self.provider.clone())
    }
}

pub fn registry_with(factory: Arc<ScriptedFactory>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(factory);
    registry
}

pub fn settings(max_turns: Option<usize>) -> AgentSettings {
    let mut settings = AgentSettings {
        default_provider: Some(PROVIDER.into()),
        ..Default::default()
    };
    settings.providers.insert(
        PROVIDER.into(),
        ProviderSettings {
            model: Some("scripted-model".into()),
            max_turns,
            ..Default::default()
        },
    );
    settings
}

pub fn text_response(text: &str, input: u64, output: u64) -> Vec<TextStreamDelta> {
    vec![
        TextStreamDelta::text(text),
        TextStreamDelta::done(Some(TokenUsage::new(input, output))),
    ]
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> TextStreamDelta {
    TextStreamDelta::tool_call(AgentToolCall::new(id, name, arguments))
}

/// `list_files` (approval required), `echo`, and `broken` (always fails).
pub fn tools() -> ToolRegistry {
    let list_files = AgentTool::new(
        "list_files",
        "List files in a directory",
        AgentToolParameters::object()
            .string("path", "Directory to list", true)
            .build(),
        |args, _ctx| async move {
            let path = args.get_str_opt("path").unwrap_or(".").to_string();
            Ok(serde_json::json!(format!("{path}/Cargo.toml\n{path}/src")))
        },
    )
    .with_approval();
    let echo = AgentTool::new(
        "echo",
        "Echo the input",
        AgentToolParameters::empty(),
        |args, _ctx| async move { Ok(args.raw().clone()) },
    );
    let broken = AgentTool::new(
        "broken",
        "Always fails",
        AgentToolParameters::empty(),
        |_args, _ctx| async {
            Err(TollgateError::ToolExecution {
                tool_name: "broken".into(),
                message: "permission denied".into(),
            })
        },
    );
    ToolRegistry::new()
        .with(Arc::new(list_files))
        .with(Arc::new(echo))
        .with(Arc::new(broken))
}

pub type Events = Arc<Mutex<Vec<AgentEvent>>>;

pub fn capture_events() -> (AgentEventSink, Events) {
    let events = Arc::new(Mutex::new(Vec::<AgentEvent>::new()));
    let sink_events = events.clone();
    let sink: AgentEventSink = Arc::new(move |event| {
        if let Ok(mut guard) = sink_events.lock() {
            guard.push(event);
        }
    });
    (sink, events)
}

pub fn snapshot(events: &Events) -> Vec<AgentEvent> {
    events.lock().expect("events lock").clone()
}

/// Wait until an event matching `predicate` has been captured.
pub async fn wait_for_event<F>(events: &Events, predicate: F) -> AgentEvent
where
    F: Fn(&AgentEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let found = snapshot(events).into_iter().find(|event| predicate(event));
            if let Some(event) = found {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("event should arrive")
}

/// Runtime wired to `provider` with the standard test tools.
pub struct Harness {
    pub agent: Arc<AgentRuntime>,
    pub events: Events,
    pub provider: Arc<ScriptedProvider>,
}

pub fn harness(scripts: Vec<Script>, max_turns: Option<usize>) -> Harness {
    let provider = ScriptedProvider::new(scripts);
    let factory = Arc::new(ScriptedFactory::new(provider.clone()));
    let resolver = ConfigurationResolver::new(settings(max_turns), registry_with(factory))
        .with_tools(tools());
    let (sink, events) = capture_events();
    Harness {
        agent: Arc::new(AgentRuntime::new(Arc::new(resolver), Some(sink))),
        events,
        provider,
    }
}
