//! The decide → act → observe loop.
//!
//! A run stages every message it produces and commits them to the thread only
//! when the model gives a final answer. Exhaustion, timeouts, provider errors
//! and lost sessions discard the staged turn.

use std::sync::Arc;

use futures::future;
use uuid::Uuid;

use crate::error::ParleyError;
use crate::memory::ThreadGuard;
use crate::provider::{ModelDecision, ModelProvider, ModelSettings, ProviderRequest};
use crate::tools::arguments::ToolArguments;
use crate::tools::registry::ToolRegistry;
use crate::tools::tool::ToolExecutionContext;
use crate::types::{Message, ToolCall, ToolResult};
use crate::util::with_timeout;

use super::events::{RunEventEmitter, RunEventPayload, RunEventSink};
use super::types::{LoopLimits, RunOutcome};

/// Turn built up during a run, not yet visible in the thread.
struct StagedTurn {
    messages: Vec<Message>,
    final_text: String,
    last_tool: Option<String>,
    iterations: usize,
}

/// Drives one model against a registry snapshot.
pub struct DecisionLoop {
    provider: Arc<dyn ModelProvider>,
    limits: LoopLimits,
    system_prompt: Option<String>,
    settings: ModelSettings,
    event_sink: Option<RunEventSink>,
}

impl DecisionLoop {
    pub fn new(provider: Arc<dyn ModelProvider>, limits: LoopLimits) -> Self {
        Self {
            provider,
            limits,
            system_prompt: None,
            settings: ModelSettings::default(),
            event_sink: None,
        }
    }

    /// Prompt prepended to every request. Never stored in the thread.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_event_sink(mut self, sink: RunEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn limits(&self) -> LoopLimits {
        self.limits
    }

    /// Run one user turn on a locked thread.
    ///
    /// On success the whole turn (user message, tool exchanges, final answer)
    /// is appended to the thread and checkpointed. On any error the thread is
    /// left untouched.
    pub async fn run(
        &self,
        thread: &mut ThreadGuard,
        registry: &ToolRegistry,
        user_message: &str,
    ) -> Result<RunOutcome, ParleyError> {
        let run_id = Uuid::new_v4();
        let emitter = RunEventEmitter::new(run_id, self.event_sink.clone());
        let thread_id = thread.thread_id().to_string();
        emitter.emit(RunEventPayload::RunStarted {
            thread_id: thread_id.clone(),
        });

        let staged = with_timeout(
            self.limits.run_timeout,
            self.drive(&emitter, &thread_id, thread.history(), registry, user_message),
        )
        .await;

        let staged = match staged {
            Ok(staged) => staged,
            Err(err) => {
                emitter.emit(RunEventPayload::RunFailed {
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        thread.append(staged.messages.clone());
        // A failed checkpoint is logged by the guard; the answer still stands.
        let _ = thread.checkpoint().await;

        emitter.emit(RunEventPayload::RunCompleted {
            iterations: staged.iterations,
            last_tool: staged.last_tool.clone(),
        });
        Ok(RunOutcome {
            run_id,
            turn: staged.messages,
            final_text: staged.final_text,
            last_tool: staged.last_tool,
            iterations: staged.iterations,
        })
    }

    async fn drive(
        &self,
        emitter: &RunEventEmitter,
        thread_id: &str,
        history: &[Message],
        registry: &ToolRegistry,
        user_message: &str,
    ) -> Result<StagedTurn, ParleyError> {
        let mut turn = vec![Message::user(user_message)];
        let tools = registry.specs();
        let mut last_tool = None;

        for iteration in 1..=self.limits.max_iterations {
            emitter.emit(RunEventPayload::DecideStarted { iteration });
            let request = ProviderRequest {
                messages: self.compose(history, &turn),
                tools: tools.clone(),
                settings: self.settings.clone(),
            };

            match self.provider.decide(&request).await? {
                ModelDecision::Final { text } => {
                    turn.push(Message::assistant(text.clone()));
                    return Ok(StagedTurn {
                        messages: turn,
                        final_text: text,
                        last_tool,
                        iterations: iteration,
                    });
                }
                ModelDecision::ToolCalls { text, calls } => {
                    let results = self.act(emitter, thread_id, registry, &calls).await?;
                    if let Some(call) = calls
                        .iter()
                        .rev()
                        .find(|call| registry.resolve(&call.name).is_some())
                    {
                        last_tool = Some(call.name.clone());
                    }
                    turn.push(Message::assistant_tool_calls(text, calls));
                    turn.extend(results.iter().map(Message::tool_result));
                }
            }
        }

        Err(ParleyError::LoopExhausted {
            iterations: self.limits.max_iterations,
        })
    }

    fn compose(&self, history: &[Message], turn: &[Message]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + turn.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend_from_slice(history);
        messages.extend_from_slice(turn);
        messages
    }

    /// Execute one step's calls concurrently; results keep call order.
    async fn act(
        &self,
        emitter: &RunEventEmitter,
        thread_id: &str,
        registry: &ToolRegistry,
        calls: &[ToolCall],
    ) -> Result<Vec<ToolResult>, ParleyError> {
        let outcomes = future::join_all(
            calls
                .iter()
                .map(|call| self.execute_call(emitter, thread_id, registry, call)),
        )
        .await;
        outcomes.into_iter().collect()
    }

    async fn execute_call(
        &self,
        emitter: &RunEventEmitter,
        thread_id: &str,
        registry: &ToolRegistry,
        call: &ToolCall,
    ) -> Result<ToolResult, ParleyError> {
        emitter.emit(RunEventPayload::ToolCallStarted {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
        });

        let result = match registry.resolve(&call.name) {
            None => ToolResult::error(call, ParleyError::UnknownTool(call.name.clone()).to_string()),
            Some(definition) => {
                let args = ToolArguments::new(call.arguments.clone());
                let ctx = ToolExecutionContext {
                    thread_id: Some(thread_id.to_string()),
                    tool_call_id: Some(call.id.clone()),
                };
                match with_timeout(
                    self.limits.tool_timeout,
                    definition.handle().execute(&args, &ctx),
                )
                .await
                {
                    Ok(output) => ToolResult::success(call, output),
                    Err(err) if err.aborts_run() => return Err(err),
                    Err(err) => ToolResult::error(call, err.to_string()),
                }
            }
        };

        emitter.emit(RunEventPayload::ToolCallFinished {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            is_error: result.is_error,
        });
        Ok(result)
    }
}
