//! Process-scoped runtime: the single context object a front door talks to.
//!
//! Startup opens every configured tool source (failures are logged and the
//! source is skipped), builds the registry snapshot from local tools plus the
//! healthy sources, and wires the decision loop to the memory store. Each
//! inbound message locks its thread for the whole run, so turns on one thread
//! are linearized while other threads proceed in parallel.
//!
//! Shutdown cancels the runtime token and closes sessions in reverse order.

use std::sync::Arc;

use bon::Builder;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent_loop::{DecisionLoop, LoopLimits, RunEventSink};
use crate::config::{AppConfig, CheckpointMode, SourceDescriptor};
use crate::error::{ErrorCategory, ParleyError};
use crate::intent::IntentClassifier;
use crate::memory::{Checkpointer, ConversationStore, JsonFileCheckpointer, NoopCheckpointer};
use crate::provider::{create_provider, ModelProvider, ModelSettings};
use crate::sessions::{SessionConnector, SessionManager, SessionTimeouts, SourceHealth};
use crate::tools::builtin::default_tools;
use crate::tools::registry::ToolRegistry;
use crate::tools::tool::Tool;
use crate::types::{AgentResponse, InboundMessage, Reply, DEFAULT_THREAD_ID};

fn default_connector() -> Arc<dyn SessionConnector> {
    #[cfg(feature = "mcp")]
    {
        Arc::new(crate::mcp::McpConnector::new())
    }
    #[cfg(not(feature = "mcp"))]
    {
        Arc::new(crate::sessions::UnsupportedConnector)
    }
}

fn default_checkpointer() -> Arc<dyn Checkpointer> {
    Arc::new(NoopCheckpointer)
}

/// Everything needed to assemble an [`AgentRuntime`].
#[derive(Builder)]
pub struct RuntimeOptions {
    pub provider: Arc<dyn ModelProvider>,
    #[builder(default = default_connector())]
    pub connector: Arc<dyn SessionConnector>,
    #[builder(default)]
    pub sources: Vec<SourceDescriptor>,
    /// Local tools, in priority order. They shadow remote tools of the same name.
    #[builder(default)]
    pub local_tools: Vec<Arc<dyn Tool>>,
    #[builder(default = default_checkpointer())]
    pub checkpointer: Arc<dyn Checkpointer>,
    #[builder(default)]
    pub limits: LoopLimits,
    #[builder(default)]
    pub session_timeouts: SessionTimeouts,
    #[builder(into)]
    pub system_prompt: Option<String>,
    #[builder(default)]
    pub settings: ModelSettings,
    #[builder(default)]
    pub classifier: IntentClassifier,
    #[builder(default = DEFAULT_THREAD_ID.to_string(), into)]
    pub default_thread_id: String,
    pub event_sink: Option<RunEventSink>,
}

pub struct AgentRuntime {
    sessions: Arc<SessionManager>,
    local_tools: Vec<Arc<dyn Tool>>,
    registry: RwLock<Arc<ToolRegistry>>,
    health: RwLock<Vec<SourceHealth>>,
    store: Arc<ConversationStore>,
    decision_loop: DecisionLoop,
    classifier: IntentClassifier,
    default_thread_id: String,
    shutdown: CancellationToken,
}

impl AgentRuntime {
    /// Build the runtime from application config.
    pub async fn start(config: AppConfig) -> Result<Self, ParleyError> {
        Self::start_with_events(config, None).await
    }

    /// Like [`start`](Self::start), with run events delivered to `event_sink`.
    pub async fn start_with_events(
        config: AppConfig,
        event_sink: Option<RunEventSink>,
    ) -> Result<Self, ParleyError> {
        config.validate()?;
        let provider: Arc<dyn ModelProvider> = Arc::from(create_provider(&config.model)?);
        let checkpointer: Arc<dyn Checkpointer> = match config.memory.checkpoint {
            CheckpointMode::None => Arc::new(NoopCheckpointer),
            CheckpointMode::File => Arc::new(JsonFileCheckpointer::new(
                config.memory.resolved_checkpoint_dir(),
            )?),
        };

        let options = RuntimeOptions::builder()
            .provider(provider)
            .sources(config.sources.clone())
            .local_tools(default_tools(&config.tools))
            .checkpointer(checkpointer)
            .limits(LoopLimits::from(&config.agent))
            .session_timeouts(SessionTimeouts {
                connect: config.agent.connect_timeout(),
                call: config.agent.tool_timeout(),
            })
            .system_prompt(config.agent.system_prompt.clone())
            .classifier(IntentClassifier::from(&config.intent))
            .default_thread_id(config.agent.default_thread_id.clone())
            .maybe_event_sink(event_sink)
            .build();
        Self::from_options(options).await
    }

    pub async fn from_options(options: RuntimeOptions) -> Result<Self, ParleyError> {
        if options.default_thread_id.trim().is_empty() {
            return Err(ParleyError::Configuration(
                "default thread id must not be empty".into(),
            ));
        }
        if options.limits.max_iterations == 0 {
            return Err(ParleyError::Configuration(
                "max_iterations must be at least 1".into(),
            ));
        }

        let sessions = Arc::new(SessionManager::new(
            options.connector,
            options.session_timeouts,
        ));
        let health = sessions.open_all(&options.sources).await;
        let registry = ToolRegistry::build(options.local_tools.clone(), sessions.collect_tools().await);
        info!(
            tools = registry.len(),
            sources = health.iter().filter(|h| h.is_ready()).count(),
            failed = health.iter().filter(|h| !h.is_ready()).count(),
            "agent runtime ready"
        );

        let mut decision_loop =
            DecisionLoop::new(options.provider, options.limits).with_settings(options.settings);
        if let Some(prompt) = options.system_prompt {
            decision_loop = decision_loop.with_system_prompt(prompt);
        }
        if let Some(sink) = options.event_sink {
            decision_loop = decision_loop.with_event_sink(sink);
        }

        Ok(Self {
            sessions,
            local_tools: options.local_tools,
            registry: RwLock::new(Arc::new(registry)),
            health: RwLock::new(health),
            store: Arc::new(ConversationStore::new(options.checkpointer)),
            decision_loop,
            classifier: options.classifier,
            default_thread_id: options.default_thread_id,
            shutdown: CancellationToken::new(),
        })
    }

    /// Answer one inbound message.
    pub async fn handle(&self, inbound: InboundMessage) -> Result<AgentResponse, ParleyError> {
        if self.shutdown.is_cancelled() {
            return Err(ParleyError::InvalidState("runtime is shut down".into()));
        }
        if inbound.message.trim().is_empty() {
            return Err(ParleyError::InvalidArgument(
                "message must not be empty".into(),
            ));
        }
        let thread_id = inbound
            .thread_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| self.default_thread_id.clone());

        if let Err(err) = self.store.restore(&thread_id).await {
            warn!(%thread_id, error = %err, "could not restore thread checkpoint");
        }

        let mut thread = self.store.lock(&thread_id).await;
        let registry = self.tools().await;
        let outcome = self
            .decision_loop
            .run(&mut thread, &registry, &inbound.message)
            .await;
        drop(thread);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                if let ParleyError::SessionUnavailable { source_name, .. } = &err {
                    warn!(%thread_id, source = %source_name, "tool session lost, dropping its tools until reconnect");
                    self.refresh_tools().await;
                }
                return Err(err);
            }
        };

        let intent = self.classifier.classify(&outcome.final_text);
        Ok(AgentResponse {
            response: intent.raw_text,
            tools: outcome.last_tool,
            end_interaction: intent.end_conversation,
            connect_live_agent: intent.connect_live_agent,
        })
    }

    /// [`handle`](Self::handle) folded into the wire reply.
    ///
    /// Failures are logged in full here; the reply only names their category.
    pub async fn respond(&self, inbound: InboundMessage) -> Reply {
        let result = self.handle(inbound).await;
        if let Err(err) = &result {
            match err.category() {
                ErrorCategory::InvalidRequest | ErrorCategory::LoopExhausted => {
                    warn!(kind = %err.category(), error = %err, "request failed")
                }
                _ => error!(kind = %err.category(), error = %err, "request failed"),
            }
        }
        Reply::from(result)
    }

    /// Current registry snapshot.
    pub async fn tools(&self) -> Arc<ToolRegistry> {
        self.registry.read().await.clone()
    }

    /// Rebuild the registry from local tools and the sessions now open.
    /// Runs already in flight keep the snapshot they started with.
    pub async fn refresh_tools(&self) -> Arc<ToolRegistry> {
        let registry = Arc::new(ToolRegistry::build(
            self.local_tools.clone(),
            self.sessions.collect_tools().await,
        ));
        *self.registry.write().await = registry.clone();
        info!(tools = registry.len(), "tool registry refreshed");
        registry
    }

    /// Reopen one source and refresh the registry.
    ///
    /// Works for sources that failed at startup as well as lost sessions.
    pub async fn reconnect(&self, source_name: &str) -> Result<Arc<ToolRegistry>, ParleyError> {
        if !self.sessions.is_known(source_name).await {
            return Err(ParleyError::Configuration(format!(
                "Unknown tool source '{source_name}'"
            )));
        }
        let result = self.sessions.reconnect(source_name).await;
        {
            let mut health = self.health.write().await;
            if let Some(entry) = health.iter_mut().find(|h| h.name == source_name) {
                entry.error = result.as_ref().err().map(|e| e.to_string());
            }
        }
        result?;
        Ok(self.refresh_tools().await)
    }

    /// Startup result of every configured source.
    pub async fn health(&self) -> Vec<SourceHealth> {
        self.health.read().await.clone()
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn default_thread_id(&self) -> &str {
        &self.default_thread_id
    }

    /// Token cancelled when the runtime shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Refuse new messages and close every session. Idempotent.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.sessions.shutdown().await;
        info!("agent runtime stopped");
    }
}
