//! Permission gate
//!
//! The single seam through which a host can require confirmation before a
//! mutating tool runs. Tools call the gate after static safety checks and
//! before any effect; a `false` answer becomes `PermissionDenied`.

use async_trait::async_trait;
use tracing::debug;

/// Async confirmation predicate over `(operation, details)`.
///
/// `operation` is the tool name (`write_file`, `execute_shell`, ...) and
/// `details` a one-line human readable description of the effect.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn request(&self, operation: &str, details: &str) -> bool;
}

/// Approves everything. Used when no gate is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl PermissionGate for AutoApprove {
    async fn request(&self, operation: &str, details: &str) -> bool {
        debug!("Auto-approved {}: {}", operation, details);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_auto_approve() {
        let gate: Arc<dyn PermissionGate> = Arc::new(AutoApprove);
        assert!(gate.request("write_file", "Write 3 bytes to a.txt").await);
    }
}
