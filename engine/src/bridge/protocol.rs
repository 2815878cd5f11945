//! Wire messages exchanged with the editor peer.
//!
//! Every frame is a single JSON object with a `type` discriminator.

use serde::{Deserialize, Serialize};

use super::pending::PendingEdit;

/// Messages sent by Clio to the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Handshake, answered by `connected`.
    Connect {
        #[serde(rename = "clientVersion")]
        client_version: String,
    },
    /// Inline decorations for a batch of edits. No reply expected.
    ProposeDiff {
        file: String,
        edits: Vec<PendingEdit>,
        description: String,
    },
    /// Full-file diff view, answered by `diffAccepted` or `diffRejected`.
    OpenDiff {
        file: String,
        before: String,
        after: String,
        description: String,
    },
    ApplyDiff {
        file: String,
        edits: Vec<PendingEdit>,
    },
    Status {
        message: String,
        level: StatusLevel,
    },
    Close,
}

/// Messages received from the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    Connected {
        #[serde(default, rename = "ideName", skip_serializing_if = "Option::is_none")]
        ide_name: Option<String>,
    },
    DiffAccepted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },
    DiffRejected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}
