//! Collaborators the arbiter drives: the wallet runtime and the focus host.

use async_trait::async_trait;
use serde_json::Value;

use super::types::GrantOptions;

/// Errors reported by a collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    #[error("Runtime call failed: {0}")]
    Runtime(String),

    #[error("Focus host error: {0}")]
    Focus(String),
}

/// Wallet runtime that raised the requests and performs the actual
/// grant/deny operations.
#[async_trait]
pub trait WalletRuntime: Send + Sync {
    async fn grant_permission(
        &self,
        request_id: &str,
        options: &GrantOptions,
    ) -> Result<(), HostError>;

    async fn deny_permission(&self, request_id: &str) -> Result<(), HostError>;

    async fn grant_grouped_permission(
        &self,
        request_id: &str,
        granted: &Value,
    ) -> Result<(), HostError>;

    async fn deny_grouped_permission(&self, request_id: &str) -> Result<(), HostError>;

    /// Resolve a group request that was suppressed without showing UI.
    async fn dismiss_grouped_permission(&self, request_id: &str) -> Result<(), HostError>;
}

/// Host window focus control.
#[async_trait]
pub trait FocusHost: Send + Sync {
    async fn is_focused(&self) -> Result<bool, HostError>;

    /// Bring the review window forward. Best effort.
    async fn request_focus(&self) -> Result<(), HostError>;

    /// Hand focus back to whatever the user was doing. Best effort.
    async fn relinquish_focus(&self) -> Result<(), HostError>;
}
