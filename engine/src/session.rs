//! Session wiring
//!
//! One conversation: orchestrator, context, tool catalog and the editor
//! bridge, all scoped to a single working directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sdk::errors::{EngineError, EngineErrorExt};
use tracing::{debug, info, warn};

use crate::agent::{prompt, AgentCore, ToolObserver, TurnResult};
use crate::bridge::{BridgeSession, BridgeSettings, StatusLevel};
use crate::config::Config;
use crate::context::{extract_mentions, ContextAssembler};
use crate::llm::openai::OpenAICompatibleProvider;
use crate::llm::LLMProvider;
use crate::permission::PermissionGate;
use crate::tokens::TokenCounter;
use crate::tools::{ToolContext, ToolRegistry};

/// Result of resolving one `@mention` or `/add` argument
#[derive(Debug)]
pub enum AddOutcome {
    File { path: PathBuf, tokens: usize },
    Folder(crate::context::FolderReport),
}

pub struct Session {
    pub agent: AgentCore,
    pub context: ContextAssembler,
    pub bridge: Arc<BridgeSession>,
    work_dir: PathBuf,
}

impl Session {
    /// Build a session talking to the configured OpenAI-compatible endpoint.
    pub fn from_config(
        config: &Config,
        work_dir: PathBuf,
        permission: Arc<dyn PermissionGate>,
        observer: Option<Arc<dyn ToolObserver>>,
    ) -> Result<Self, EngineError> {
        let provider = OpenAICompatibleProvider::from_config(&config.llm)?;
        Self::with_provider(config, work_dir, Arc::new(provider), permission, observer)
    }

    pub fn with_provider(
        config: &Config,
        work_dir: PathBuf,
        provider: Arc<dyn LLMProvider>,
        permission: Arc<dyn PermissionGate>,
        observer: Option<Arc<dyn ToolObserver>>,
    ) -> Result<Self, EngineError> {
        let settings = BridgeSettings::from_config(&config.bridge);
        let bridge = Arc::new(if config.bridge.enabled {
            BridgeSession::new(settings)
        } else {
            BridgeSession::disabled(settings)
        });

        let tool_ctx = ToolContext::from_config(
            config,
            work_dir.clone(),
            permission,
            Some(Arc::clone(&bridge)),
        )?;
        let tools = Arc::new(ToolRegistry::with_default_tools(Arc::new(tool_ctx)));

        let mut agent = AgentCore::new(
            provider,
            config.llm.model.clone(),
            tools,
            prompt::system_prompt(&work_dir),
        );
        if let Some(observer) = observer {
            agent = agent.with_observer(observer);
        }

        let counter = TokenCounter::new(&config.context.encoding)?;
        let context = ContextAssembler::new(counter, config.context.token_budget, work_dir.clone());

        info!(
            "Session ready in {} (model {}, {} tools)",
            work_dir.display(),
            agent.model(),
            agent.tools().len()
        );

        Ok(Self {
            agent,
            context,
            bridge,
            work_dir,
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Add a file or, for a directory, every file under it.
    pub async fn add_path(&mut self, path: &str) -> Result<AddOutcome, EngineError> {
        let candidate = self.work_dir.join(path);
        if candidate.is_dir() || Path::new(path).is_dir() {
            let report = self.context.add_folder(path, None).await?;
            return Ok(AddOutcome::Folder(report));
        }
        let entry = self.context.add(path).await?;
        Ok(AddOutcome::File {
            path: entry.path.clone(),
            tokens: entry.token_count,
        })
    }

    /// Pull every `@mention` in `input` into context.
    ///
    /// Failures are returned per mention and never abort the others.
    pub async fn resolve_mentions(
        &mut self,
        input: &str,
    ) -> Vec<(String, Result<AddOutcome, EngineError>)> {
        let mut results = Vec::new();
        for mention in extract_mentions(input) {
            let outcome = self.add_path(&mention).await;
            if let Err(e) = &outcome {
                warn!("Could not add @{}: {}", mention, e);
            }
            results.push((mention, outcome));
        }
        results
    }

    /// Tokens held by the conversation history, counted with the context encoding.
    pub fn history_tokens(&self) -> usize {
        self.agent.memory().token_count(self.context.counter())
    }

    /// Run one user turn with the current context as prefix.
    pub async fn run_turn(&mut self, input: &str) -> Result<TurnResult, EngineError> {
        let prefix = self.context.render();
        debug!(
            "Turn with {} context file(s), {} tokens",
            self.context.len(),
            self.context.total_tokens()
        );

        self.status("Working...", StatusLevel::Info).await;
        let result = self.agent.process_message(input, &prefix).await;
        match &result {
            Ok(_) => self.status("Done", StatusLevel::Info).await,
            Err(e) => self.status(&e.to_string(), failure_level(e)).await,
        }
        result
    }

    /// Status lines are best effort.
    async fn status(&self, message: &str, level: StatusLevel) {
        if self.bridge.is_connected() {
            if let Err(e) = self.bridge.send_status(message, level).await {
                debug!("Bridge status not delivered: {}", e);
            }
        }
    }

    pub async fn close(&self) {
        self.bridge.close().await;
    }
}

/// A failed turn the user can simply retry is a warning.
fn failure_level(error: &EngineError) -> StatusLevel {
    if error.is_recoverable() {
        StatusLevel::Warning
    } else {
        StatusLevel::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_level() {
        assert_eq!(
            failure_level(&EngineError::Transport("connection refused".into())),
            StatusLevel::Warning
        );
        assert_eq!(
            failure_level(&EngineError::MaxIterationsReached(10)),
            StatusLevel::Warning
        );
        assert_eq!(
            failure_level(&EngineError::Config("bad key".into())),
            StatusLevel::Error
        );
    }
}
