//! Agent Core
//!
//! One user turn moves `Idle -> AwaitingModel -> (ExecutingTools ->
//! AwaitingModel)* -> Idle`:
//!
//! 1. Append the user message to working memory
//! 2. Send system prompt + context prefix + history to the provider with the tool catalog
//! 3. No tool calls: the content is the answer (empty content is an error)
//! 4. Tool calls: run each one in order, append one result per call, loop
//!
//! # Limits
//!
//! - Max 10 iterations per turn, then `MaxIterationsReached`
//! - Provider failures abort the turn without retry

use std::sync::Arc;

use async_trait::async_trait;
use sdk::errors::EngineError;
use tracing::{debug, error, info, warn};

use super::WorkingMemory;
use crate::llm::{LLMProvider, Message, Usage};
use crate::tools::ToolRegistry;

/// Maximum number of model round-trips per user turn
pub const MAX_ITERATIONS: usize = 10;

/// Past this many iterations the turn is probably looping
const LOOP_WARNING_THRESHOLD: usize = 5;

const PREVIEW_CHARS: usize = 200;

/// Notified after every tool execution
#[async_trait]
pub trait ToolObserver: Send + Sync {
    async fn on_tool_executed(&self, name: &str, arguments: &str, result: &str);
}

/// Outcome of a completed turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    /// Final answer from the model
    pub answer: String,

    /// Number of provider calls made
    pub iterations: usize,

    /// Number of tool calls executed
    pub tool_calls: usize,

    /// Usage summed over every provider call of the turn
    pub usage: Usage,
}

/// Agent Core that orchestrates the agent loop
pub struct AgentCore {
    provider: Arc<dyn LLMProvider>,
    model: String,
    tools: Arc<ToolRegistry>,
    memory: WorkingMemory,
    system_prompt: String,
    observer: Option<Arc<dyn ToolObserver>>,
    max_iterations: usize,
}

impl AgentCore {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            tools,
            memory: WorkingMemory::new(),
            system_prompt: system_prompt.into(),
            observer: None,
            max_iterations: MAX_ITERATIONS,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ToolObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Use `model` for every later provider call. History is kept.
    pub fn set_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        info!("Switching model {} -> {}", self.model, model);
        self.model = model;
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn memory(&self) -> &WorkingMemory {
        &self.memory
    }

    /// Forget the conversation so far
    pub fn clear_history(&mut self) {
        self.memory.clear();
    }

    /// Full request for the next provider call.
    ///
    /// The context prefix becomes a second system message only when it has
    /// content.
    pub fn build_request(&self, context_prefix: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.memory.len() + 2);
        messages.push(Message::system(&self.system_prompt));
        if !context_prefix.trim().is_empty() {
            messages.push(Message::system(format!(
                "The user has added these files to the conversation context:\n\n{}",
                context_prefix
            )));
        }
        messages.extend_from_slice(self.memory.messages());
        messages
    }

    /// Process one user message through the agent loop
    ///
    /// # Errors
    ///
    /// - `Transport` when the provider fails
    /// - `MalformedResponse` when the response has no choices
    /// - `EmptyModelResponse` when the model returns neither content nor tool calls
    /// - `MaxIterationsReached` when the model is still calling tools after the cap
    pub async fn process_message(
        &mut self,
        input: &str,
        context_prefix: &str,
    ) -> Result<TurnResult, EngineError> {
        info!("Starting turn: {}", preview(input));
        debug!(event = "user_message", content = %input);

        self.memory.add_message(Message::user(input));
        let schemas = self.tools.schemas();

        let mut usage = Usage::default();
        let mut executed = 0;

        for iteration in 1..=self.max_iterations {
            debug!("Iteration {}/{}", iteration, self.max_iterations);
            if iteration == LOOP_WARNING_THRESHOLD + 1 {
                warn!(
                    "Turn has run {} iterations, the model may be looping",
                    LOOP_WARNING_THRESHOLD
                );
            }

            let request = self.build_request(context_prefix);
            let response = self
                .provider
                .chat(&request, &self.model, Some(schemas.as_slice()))
                .await
                .map_err(|e| {
                    error!(event = "error", "LLM call failed: {}", e);
                    EngineError::Transport(e.to_string())
                })?;

            if let Some(u) = response.usage {
                usage += u;
            }

            let Some(choice) = response.choices.into_iter().next() else {
                error!(event = "error", "Provider response contained no choices");
                return Err(EngineError::MalformedResponse(
                    "response contained no choices".to_string(),
                ));
            };

            let finish_reason = choice
                .finish_reason
                .unwrap_or_else(|| "unknown".to_string());
            let message = choice.message;
            let calls = message.tool_calls.unwrap_or_default();

            debug!(
                event = "model_response",
                content = %preview(message.content.as_deref().unwrap_or_default()),
                tool_calls = calls.len(),
                finish_reason = %finish_reason
            );

            if calls.is_empty() {
                let answer = message.content.unwrap_or_default();
                if answer.trim().is_empty() {
                    warn!("Model returned no content and no tool calls");
                    return Err(EngineError::EmptyModelResponse(finish_reason));
                }

                self.memory.add_message(Message::assistant(answer.clone()));
                info!(
                    "Turn completed after {} iteration(s), {} tool call(s)",
                    iteration, executed
                );
                return Ok(TurnResult {
                    answer,
                    iterations: iteration,
                    tool_calls: executed,
                    usage,
                });
            }

            self.memory
                .add_message(Message::assistant_tool_calls(message.content, calls.clone()));

            // Sequential: later calls may depend on earlier file changes
            for call in &calls {
                debug!(
                    event = "tool_call",
                    tool = %call.name(),
                    args = %call.arguments(),
                    id = %call.id
                );

                let result = self.tools.dispatch(call.name(), call.arguments()).await;

                debug!(
                    event = "tool_result",
                    tool = %call.name(),
                    len = result.len(),
                    preview = %preview(&result)
                );

                if let Some(observer) = &self.observer {
                    observer
                        .on_tool_executed(call.name(), call.arguments(), &result)
                        .await;
                }

                self.memory
                    .add_message(Message::tool_result(result, call.id.clone()));
                executed += 1;
            }
        }

        error!(
            event = "error",
            "Turn exceeded max iterations ({})", self.max_iterations
        );
        Err(EngineError::MaxIterationsReached(self.max_iterations))
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}
