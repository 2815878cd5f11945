//! Stdio JSON mode
//!
//! Editor extensions drive a session over the process pipes. Each line on
//! stdin is one JSON object and each line written to stdout is one event.
//!
//! Inbound:
//!
//! - `{"content": "..."}` runs a turn
//! - `{"approved": true|false}` answers a pending `permission` event
//!
//! Outbound, tagged by `type`: `status`, `response`, `error`, `tool` and
//! `permission`. Logs never go to stdout.

use std::sync::Arc;

use async_trait::async_trait;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::agent::ToolObserver;
use crate::permission::PermissionGate;
use crate::session::Session;

pub const READY: &str = "Ready";
pub const PROCESSING: &str = "Processing request...";

/// Event written to stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StdioEvent {
    Status {
        activity: String,
    },
    Response {
        content: String,
    },
    Error {
        error: String,
    },
    Tool {
        tool: String,
        arguments: Value,
        result: String,
    },
    Permission {
        operation: String,
        details: String,
    },
}

impl StdioEvent {
    pub fn status(activity: impl Into<String>) -> Self {
        Self::Status {
            activity: activity.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }
}

/// Message read from stdin
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Prompt { content: String },
    Permission { approved: bool },
}

/// One read from the inbound side
#[derive(Debug, PartialEq)]
pub enum Incoming {
    Message(ClientMessage),
    Invalid(String),
    Closed,
}

type Reader = Box<dyn AsyncBufRead + Unpin + Send>;
type Writer = Box<dyn AsyncWrite + Unpin + Send>;

/// Line-oriented JSON channel shared by the serve loop, the gate and the observer.
pub struct StdioChannel {
    lines: Mutex<Lines<Reader>>,
    out: Mutex<Writer>,
}

impl StdioChannel {
    pub fn new(
        reader: impl AsyncBufRead + Unpin + Send + 'static,
        writer: impl AsyncWrite + Unpin + Send + 'static,
    ) -> Self {
        let reader: Reader = Box::new(reader);
        let writer: Writer = Box::new(writer);
        Self {
            lines: Mutex::new(reader.lines()),
            out: Mutex::new(writer),
        }
    }

    /// The process stdin and stdout
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }

    /// Write one event as a single line and flush it.
    pub async fn send(&self, event: &StdioEvent) -> Result<(), EngineError> {
        let mut line = serde_json::to_string(event).map_err(std::io::Error::from)?;
        line.push('\n');

        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }

    /// Next non-blank inbound line.
    pub async fn receive(&self) -> Result<Incoming, EngineError> {
        let mut lines = self.lines.lock().await;
        loop {
            let Some(line) = lines.next_line().await? else {
                return Ok(Incoming::Closed);
            };
            if line.trim().is_empty() {
                continue;
            }
            debug!("stdin: {}", line);
            return Ok(match serde_json::from_str::<ClientMessage>(&line) {
                Ok(message) => Incoming::Message(message),
                Err(e) => Incoming::Invalid(e.to_string()),
            });
        }
    }
}

/// Asks the editor through a `permission` event and waits for `{"approved": ..}`.
pub struct StdioPermissionGate {
    channel: Arc<StdioChannel>,
}

impl StdioPermissionGate {
    pub fn new(channel: Arc<StdioChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl PermissionGate for StdioPermissionGate {
    async fn request(&self, operation: &str, details: &str) -> bool {
        let event = StdioEvent::Permission {
            operation: operation.to_string(),
            details: details.to_string(),
        };
        if let Err(e) = self.channel.send(&event).await {
            warn!("Permission request not delivered: {}", e);
            return false;
        }

        loop {
            let reply = match self.channel.receive().await {
                Ok(Incoming::Message(ClientMessage::Permission { approved })) => approved,
                Ok(Incoming::Message(ClientMessage::Prompt { .. })) => {
                    self.reject("A permission answer is pending: send {\"approved\": true|false}")
                        .await;
                    continue;
                }
                Ok(Incoming::Invalid(e)) => {
                    self.reject(&format!("Invalid JSON: {}", e)).await;
                    continue;
                }
                Ok(Incoming::Closed) => false,
                Err(e) => {
                    warn!("Failed to read permission answer: {}", e);
                    false
                }
            };
            info!(
                "Permission {} for {}",
                if reply { "granted" } else { "denied" },
                operation
            );
            return reply;
        }
    }
}

impl StdioPermissionGate {
    async fn reject(&self, message: &str) {
        if let Err(e) = self.channel.send(&StdioEvent::error(message)).await {
            debug!("Error event not delivered: {}", e);
        }
    }
}

/// Emits a `tool` event after every tool execution.
pub struct StdioObserver {
    channel: Arc<StdioChannel>,
}

impl StdioObserver {
    pub fn new(channel: Arc<StdioChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ToolObserver for StdioObserver {
    async fn on_tool_executed(&self, name: &str, arguments: &str, result: &str) {
        let arguments = serde_json::from_str(arguments)
            .unwrap_or_else(|_| Value::String(arguments.to_string()));
        let event = StdioEvent::Tool {
            tool: name.to_string(),
            arguments,
            result: result.to_string(),
        };
        if let Err(e) = self.channel.send(&event).await {
            warn!("Tool event not delivered: {}", e);
        }
    }
}

/// Serve requests until stdin closes.
///
/// Turn failures are reported as `error` events and never end the loop.
/// Only a broken channel does.
pub async fn serve(channel: &StdioChannel, session: &mut Session) -> Result<(), EngineError> {
    channel.send(&StdioEvent::status(READY)).await?;

    loop {
        let content = match channel.receive().await? {
            Incoming::Closed => break,
            Incoming::Invalid(e) => {
                channel
                    .send(&StdioEvent::error(format!("Invalid JSON: {}", e)))
                    .await?;
                continue;
            }
            Incoming::Message(ClientMessage::Permission { .. }) => {
                channel
                    .send(&StdioEvent::error("No permission request is pending"))
                    .await?;
                continue;
            }
            Incoming::Message(ClientMessage::Prompt { content }) => content,
        };

        for (mention, outcome) in session.resolve_mentions(&content).await {
            if let Err(e) = outcome {
                channel
                    .send(&StdioEvent::error(format!("Could not add @{}: {}", mention, e)))
                    .await?;
            }
        }

        channel.send(&StdioEvent::status(PROCESSING)).await?;
        let event = match session.run_turn(&content).await {
            Ok(turn) => StdioEvent::Response {
                content: turn.answer,
            },
            Err(e) => StdioEvent::error(format!("Error processing message: {}", e)),
        };
        channel.send(&event).await?;
        channel.send(&StdioEvent::status(READY)).await?;
    }

    info!("stdin closed, leaving stdio mode");
    Ok(())
}
