//! External Editor Bridge
//!
//! Optional connection to a live editor that renders proposed edits as
//! reviewable decorations. The session moves through
//! `Disconnected -> Connecting -> Connected -> Disconnected` and connects at
//! most once; any send failure drops it back to `Disconnected` for good and
//! callers fall back to plain filesystem writes.
//!
//! # Discovery
//!
//! The port is read from an environment variable (default `CLIO_IDE_PORT`)
//! and otherwise from a lock file (default `~/.clio/ide/bridge.json`)
//! containing `{"port": N}`.

pub mod pending;
pub mod protocol;

pub use pending::{EditRange, PendingEdit, PendingEdits, Position};
pub use protocol::{InboundMessage, OutboundMessage, StatusLevel};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures::{FutureExt, SinkExt, StreamExt};
use sdk::errors::EngineError;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection settings for a bridge session
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub port_env: String,
    pub lock_file: PathBuf,
    pub handshake_timeout: Duration,
    pub diff_timeout: Duration,
}

impl BridgeSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            port_env: config.port_env.clone(),
            lock_file: config.lock_file.clone(),
            handshake_timeout: Duration::from_secs(config.handshake_timeout_secs),
            diff_timeout: Duration::from_secs(config.diff_timeout_secs),
        }
    }

    /// Port from the environment variable, else from the lock file.
    pub fn discover_port(&self) -> Option<u16> {
        if let Ok(raw) = std::env::var(&self.port_env) {
            match raw.trim().parse::<u16>() {
                Ok(port) if port != 0 => return Some(port),
                _ => warn!("Ignoring invalid {}={:?}", self.port_env, raw),
            }
        }

        #[derive(Deserialize)]
        struct LockFile {
            port: u16,
        }

        let text = std::fs::read_to_string(&self.lock_file).ok()?;
        match serde_json::from_str::<LockFile>(&text) {
            Ok(lock) if lock.port != 0 => Some(lock.port),
            _ => {
                warn!("Ignoring malformed lock file {}", self.lock_file.display());
                None
            }
        }
    }
}

#[derive(Debug)]
struct Status {
    state: BridgeState,
    port: Option<u16>,
    ide_name: Option<String>,
}

/// One editor connection, shared by the tools and the interactive session.
pub struct BridgeSession {
    settings: BridgeSettings,
    attempted: AtomicBool,
    status: Mutex<Status>,
    stream: tokio::sync::Mutex<Option<WsStream>>,
    pending: Mutex<PendingEdits>,
}

impl BridgeSession {
    pub fn new(settings: BridgeSettings) -> Self {
        Self {
            settings,
            attempted: AtomicBool::new(false),
            status: Mutex::new(Status {
                state: BridgeState::Disconnected,
                port: None,
                ide_name: None,
            }),
            stream: tokio::sync::Mutex::new(None),
            pending: Mutex::new(PendingEdits::new()),
        }
    }

    /// A session that never connects.
    pub fn disabled(settings: BridgeSettings) -> Self {
        let session = Self::new(settings);
        session.attempted.store(true, Ordering::SeqCst);
        session
    }

    pub fn state(&self) -> BridgeState {
        self.status().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == BridgeState::Connected
    }

    pub fn port(&self) -> Option<u16> {
        self.status().port
    }

    pub fn ide_name(&self) -> Option<String> {
        self.status().ide_name.clone()
    }

    fn status(&self) -> std::sync::MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, PendingEdits> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: BridgeState) {
        self.status().state = state;
    }

    /// Discover the editor and perform the handshake.
    ///
    /// Only the first call does any work; a failed attempt is never retried.
    /// Returns whether the bridge is connected.
    pub async fn connect(&self) -> bool {
        if self.attempted.swap(true, Ordering::SeqCst) {
            return self.is_connected();
        }

        let Some(port) = self.settings.discover_port() else {
            info!("No editor bridge found, using direct file writes");
            return false;
        };

        {
            let mut status = self.status();
            status.port = Some(port);
            status.state = BridgeState::Connecting;
        }

        let url = format!("ws://127.0.0.1:{}", port);
        debug!("Connecting to editor bridge at {}", url);

        match tokio::time::timeout(self.settings.handshake_timeout, handshake(&url)).await {
            Ok(Ok((ws, ide_name))) => {
                info!(
                    "Connected to editor bridge {} on port {}",
                    ide_name.as_deref().unwrap_or("IDE"),
                    port
                );
                *self.stream.lock().await = Some(ws);
                let mut status = self.status();
                status.ide_name = ide_name;
                status.state = BridgeState::Connected;
                true
            }
            Ok(Err(e)) => {
                warn!("Editor bridge handshake failed: {}", e);
                self.set_state(BridgeState::Disconnected);
                false
            }
            Err(_) => {
                warn!(
                    "Editor bridge handshake timed out after {}s",
                    self.settings.handshake_timeout.as_secs()
                );
                self.set_state(BridgeState::Disconnected);
                false
            }
        }
    }

    /// Record an edit already written to `file` so it joins the file's batch.
    pub fn record_edit(
        &self,
        file: &Path,
        live: &str,
        offset: usize,
        old_text: &str,
        new_text: &str,
    ) {
        self.pending()
            .record(file, live, offset, old_text, new_text);
    }

    /// Current pending batch for `file`.
    pub fn pending_for(&self, file: &Path) -> Vec<PendingEdit> {
        self.pending().get(file).to_vec()
    }

    /// Relocate the file's pending batch against `live` and propose all of it.
    ///
    /// Returns the number of edits sent. The batch is discarded when the
    /// proposal cannot be delivered.
    pub async fn propose_pending(
        &self,
        file: &Path,
        live: &str,
        description: &str,
    ) -> Result<usize, EngineError> {
        self.drain_inbound().await;
        if !self.is_connected() {
            self.pending().clear(file);
            return Err(EngineError::Transport("editor bridge not connected".into()));
        }

        let edits = self.pending().refresh(file, live);
        if edits.is_empty() {
            return Ok(0);
        }
        let count = edits.len();
        if let Err(e) = self.propose_diff(file, edits, description).await {
            self.pending().clear(file);
            return Err(e);
        }
        Ok(count)
    }

    /// Ask the editor to decorate `edits`. Does not wait for a decision.
    pub async fn propose_diff(
        &self,
        file: &Path,
        edits: Vec<PendingEdit>,
        description: &str,
    ) -> Result<(), EngineError> {
        self.send(&OutboundMessage::ProposeDiff {
            file: file.display().to_string(),
            edits,
            description: description.to_string(),
        })
        .await
    }

    /// Show a full-file diff and wait for the user's decision.
    ///
    /// Returns `true` only on `diffAccepted`; rejection, timeout and
    /// transport failure all return `false`. The file's pending batch is
    /// cleared once a decision (or timeout) is reached.
    pub async fn open_diff(&self, file: &Path, before: &str, after: &str, description: &str) -> bool {
        let file_str = file.display().to_string();
        let sent = self
            .send(&OutboundMessage::OpenDiff {
                file: file_str.clone(),
                before: before.to_string(),
                after: after.to_string(),
                description: description.to_string(),
            })
            .await;
        if sent.is_err() {
            return false;
        }

        let mut guard = self.stream.lock().await;
        let Some(ws) = guard.as_mut() else {
            return false;
        };

        let wait = async {
            while let Some(frame) = ws.next().await {
                let text = match frame {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) => return None,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Editor bridge read failed: {}", e);
                        return None;
                    }
                };
                match serde_json::from_str::<InboundMessage>(&text) {
                    Ok(InboundMessage::DiffAccepted { file })
                        if file.as_deref().map_or(true, |f| f == file_str) =>
                    {
                        return Some(true)
                    }
                    Ok(InboundMessage::DiffRejected { file })
                        if file.as_deref().map_or(true, |f| f == file_str) =>
                    {
                        return Some(false)
                    }
                    Ok(other) => self.handle_inbound(other),
                    Err(e) => debug!("Ignoring unparseable bridge message: {}", e),
                }
            }
            None
        };

        let outcome = tokio::time::timeout(self.settings.diff_timeout, wait).await;
        let accepted = match outcome {
            Ok(Some(accepted)) => accepted,
            Ok(None) => {
                *guard = None;
                drop(guard);
                self.set_state(BridgeState::Disconnected);
                false
            }
            Err(_) => {
                warn!(
                    "No diff decision for {} within {}s, treating as rejected",
                    file_str,
                    self.settings.diff_timeout.as_secs()
                );
                false
            }
        };

        self.pending().clear(file);
        accepted
    }

    /// Push a whole-file overwrite into the editor's buffer.
    ///
    /// The editor still holds `before`, so the single edit spans all of it.
    /// Any pending batch for the file refers to replaced content and is dropped.
    pub async fn sync_overwrite(&self, file: &Path, before: &str, after: &str) -> Result<(), EngineError> {
        self.pending().clear(file);
        let edit = PendingEdit {
            file_path: file.to_path_buf(),
            range: EditRange {
                start: Position {
                    line: 0,
                    character: 0,
                },
                end: pending::position_at(before, before.len()),
            },
            old_text: before.to_string(),
            new_text: after.to_string(),
            anchor: 0,
        };
        self.apply_diff(file, vec![edit]).await
    }

    /// Apply `edits` to the editor's buffer without review.
    pub async fn apply_diff(&self, file: &Path, edits: Vec<PendingEdit>) -> Result<(), EngineError> {
        self.send(&OutboundMessage::ApplyDiff {
            file: file.display().to_string(),
            edits,
        })
        .await
    }

    pub async fn send_status(&self, message: &str, level: StatusLevel) -> Result<(), EngineError> {
        self.send(&OutboundMessage::Status {
            message: message.to_string(),
            level,
        })
        .await
    }

    /// Say goodbye, close the socket and forget all pending edits.
    pub async fn close(&self) {
        let mut guard = self.stream.lock().await;
        if let Some(mut ws) = guard.take() {
            if let Ok(json) = serde_json::to_string(&OutboundMessage::Close) {
                let _ = ws.send(WsMessage::Text(json)).await;
            }
            let _ = ws.close(None).await;
            info!("Editor bridge disconnected");
        }
        drop(guard);

        self.set_state(BridgeState::Disconnected);
        self.pending().clear_all();
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), EngineError> {
        let mut guard = self.stream.lock().await;
        let Some(ws) = guard.as_mut() else {
            return Err(EngineError::Transport("editor bridge not connected".into()));
        };

        let json = serde_json::to_string(message)
            .map_err(|e| EngineError::Transport(format!("failed to encode message: {}", e)))?;

        if let Err(e) = ws.send(WsMessage::Text(json)).await {
            warn!("Editor bridge send failed, falling back to direct writes: {}", e);
            *guard = None;
            drop(guard);
            self.drop_connection();
            return Err(EngineError::Transport(e.to_string()));
        }
        Ok(())
    }

    /// Process whatever the editor already sent, without waiting.
    async fn drain_inbound(&self) {
        let mut guard = self.stream.lock().await;
        let Some(ws) = guard.as_mut() else {
            return;
        };

        let mut closed = false;
        while let Some(frame) = ws.next().now_or_never() {
            match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<InboundMessage>(&text) {
                        Ok(message) => self.handle_inbound(message),
                        Err(e) => debug!("Ignoring unparseable bridge message: {}", e),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    closed = true;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Editor bridge read failed: {}", e);
                    closed = true;
                    break;
                }
            }
        }

        if closed {
            *guard = None;
            drop(guard);
            self.drop_connection();
        }
    }

    /// The editor is gone; nothing is left to review the pending batches.
    fn drop_connection(&self) {
        self.set_state(BridgeState::Disconnected);
        self.pending().clear_all();
    }

    fn handle_inbound(&self, message: InboundMessage) {
        match message {
            InboundMessage::DiffAccepted { file } | InboundMessage::DiffRejected { file } => {
                match file {
                    Some(f) => self.pending().clear(Path::new(&f)),
                    None => self.pending().clear_all(),
                }
            }
            InboundMessage::Error { message } => warn!("Editor reported an error: {}", message),
            InboundMessage::Connected { .. } | InboundMessage::Unknown => {}
        }
    }
}

async fn handshake(url: &str) -> Result<(WsStream, Option<String>), EngineError> {
    let (mut ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| EngineError::Transport(e.to_string()))?;

    let hello = serde_json::to_string(&OutboundMessage::Connect {
        client_version: CLIENT_VERSION.to_string(),
    })
    .map_err(|e| EngineError::Transport(e.to_string()))?;
    ws.send(WsMessage::Text(hello))
        .await
        .map_err(|e| EngineError::Transport(e.to_string()))?;

    loop {
        match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                return match serde_json::from_str::<InboundMessage>(&text) {
                    Ok(InboundMessage::Connected { ide_name }) => Ok((ws, ide_name)),
                    Ok(other) => Err(EngineError::Transport(format!(
                        "unexpected handshake reply: {:?}",
                        other
                    ))),
                    Err(e) => Err(EngineError::Transport(format!(
                        "invalid handshake reply: {}",
                        e
                    ))),
                };
            }
            Some(Ok(WsMessage::Close(_))) | None => {
                return Err(EngineError::Transport("connection closed during handshake".into()))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(EngineError::Transport(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(env: &str, lock: PathBuf) -> BridgeSettings {
        BridgeSettings {
            port_env: env.to_string(),
            lock_file: lock,
            handshake_timeout: Duration::from_secs(2),
            diff_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_discover_from_lock_file() {
        let temp = TempDir::new().unwrap();
        let lock = temp.path().join("bridge.json");
        std::fs::write(&lock, r#"{"port": 48123}"#).unwrap();

        let s = settings("CLIO_TEST_UNSET_PORT_A", lock);
        assert_eq!(s.discover_port(), Some(48123));
    }

    #[test]
    fn test_env_takes_priority() {
        let temp = TempDir::new().unwrap();
        let lock = temp.path().join("bridge.json");
        std::fs::write(&lock, r#"{"port": 48123}"#).unwrap();

        std::env::set_var("CLIO_TEST_PORT_PRIORITY", "50001");
        let s = settings("CLIO_TEST_PORT_PRIORITY", lock);
        assert_eq!(s.discover_port(), Some(50001));
        std::env::remove_var("CLIO_TEST_PORT_PRIORITY");
    }

    #[test]
    fn test_discover_nothing() {
        let temp = TempDir::new().unwrap();
        let s = settings("CLIO_TEST_UNSET_PORT_B", temp.path().join("missing.json"));
        assert_eq!(s.discover_port(), None);

        std::fs::write(temp.path().join("bad.json"), "not json").unwrap();
        let s = settings("CLIO_TEST_UNSET_PORT_B", temp.path().join("bad.json"));
        assert_eq!(s.discover_port(), None);
    }

    #[tokio::test]
    async fn test_no_port_stays_disconnected() {
        let temp = TempDir::new().unwrap();
        let bridge = BridgeSession::new(settings(
            "CLIO_TEST_UNSET_PORT_C",
            temp.path().join("missing.json"),
        ));
        assert!(!bridge.connect().await);
        assert_eq!(bridge.state(), BridgeState::Disconnected);
        assert!(bridge.port().is_none());
    }

    #[tokio::test]
    async fn test_disabled_never_connects() {
        let temp = TempDir::new().unwrap();
        let lock = temp.path().join("bridge.json");
        std::fs::write(&lock, r#"{"port": 1}"#).unwrap();

        let bridge = BridgeSession::disabled(settings("CLIO_TEST_UNSET_PORT_D", lock));
        assert!(!bridge.connect().await);
        assert!(bridge.port().is_none());
    }

    #[tokio::test]
    async fn test_send_without_connection_is_transport_error() {
        let temp = TempDir::new().unwrap();
        let bridge = BridgeSession::new(settings(
            "CLIO_TEST_UNSET_PORT_E",
            temp.path().join("missing.json"),
        ));
        let err = bridge
            .send_status("hello", StatusLevel::Info)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));
        assert!(!bridge.open_diff(Path::new("/p/a"), "a", "b", "").await);
    }

    #[tokio::test]
    async fn test_undeliverable_proposal_discards_batch() {
        let temp = TempDir::new().unwrap();
        let bridge = BridgeSession::new(settings(
            "CLIO_TEST_UNSET_PORT_F",
            temp.path().join("missing.json"),
        ));
        let file = temp.path().join("a.rs");

        bridge.record_edit(&file, "let x = 2;", 8, "1", "2");
        assert_eq!(bridge.pending_for(&file).len(), 1);

        let err = bridge
            .propose_pending(&file, "let x = 2;", "Edit a.rs")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));
        assert!(bridge.pending_for(&file).is_empty());
    }
}
