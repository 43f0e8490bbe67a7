//! In-memory collaborators.
//!
//! `RecordingRuntime` stands in for the wallet runtime and `ScriptedFocusHost`
//! for the host window. The replay binary drives the arbiter with them, and
//! tests use them to observe exactly which calls the arbiter made.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::arbiter::{FocusHost, GrantOptions, HostError, WalletRuntime};

/// A call the arbiter made on the wallet runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum RuntimeCall {
    Grant {
        #[serde(rename = "requestID")]
        request_id: String,
        options: GrantOptions,
    },
    Deny {
        #[serde(rename = "requestID")]
        request_id: String,
    },
    GrantGroup {
        #[serde(rename = "requestID")]
        request_id: String,
        granted: Value,
    },
    DenyGroup {
        #[serde(rename = "requestID")]
        request_id: String,
    },
    DismissGroup {
        #[serde(rename = "requestID")]
        request_id: String,
    },
}

/// Wallet runtime that records every call and can be told to fail them.
#[derive(Debug, Default)]
pub struct RecordingRuntime {
    calls: Mutex<Vec<RuntimeCall>>,
    fail: AtomicBool,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls return an error (they are still recorded).
    pub fn fail_calls(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: RuntimeCall) -> Result<(), HostError> {
        debug!(?call, "Runtime call");
        self.calls.lock().await.push(call);
        if self.fail.load(Ordering::SeqCst) {
            return Err(HostError::Runtime("rejected by recording runtime".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl WalletRuntime for RecordingRuntime {
    async fn grant_permission(
        &self,
        request_id: &str,
        options: &GrantOptions,
    ) -> Result<(), HostError> {
        self.record(RuntimeCall::Grant {
            request_id: request_id.to_string(),
            options: options.clone(),
        })
        .await
    }

    async fn deny_permission(&self, request_id: &str) -> Result<(), HostError> {
        self.record(RuntimeCall::Deny {
            request_id: request_id.to_string(),
        })
        .await
    }

    async fn grant_grouped_permission(
        &self,
        request_id: &str,
        granted: &Value,
    ) -> Result<(), HostError> {
        self.record(RuntimeCall::GrantGroup {
            request_id: request_id.to_string(),
            granted: granted.clone(),
        })
        .await
    }

    async fn deny_grouped_permission(&self, request_id: &str) -> Result<(), HostError> {
        self.record(RuntimeCall::DenyGroup {
            request_id: request_id.to_string(),
        })
        .await
    }

    async fn dismiss_grouped_permission(&self, request_id: &str) -> Result<(), HostError> {
        self.record(RuntimeCall::DismissGroup {
            request_id: request_id.to_string(),
        })
        .await
    }
}

/// A call the arbiter made on the focus host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FocusCall {
    IsFocused,
    RequestFocus,
    RelinquishFocus,
}

/// Focus host whose state is set by the caller.
///
/// `request_focus` focuses the window and `relinquish_focus` unfocuses it,
/// mirroring what a real window does.
#[derive(Debug, Default)]
pub struct ScriptedFocusHost {
    focused: AtomicBool,
    fail_query: AtomicBool,
    hang_query: AtomicBool,
    calls: Mutex<Vec<FocusCall>>,
}

impl ScriptedFocusHost {
    pub fn new(focused: bool) -> Self {
        Self {
            focused: AtomicBool::new(focused),
            ..Self::default()
        }
    }

    pub fn set_focused(&self, focused: bool) {
        self.focused.store(focused, Ordering::SeqCst);
    }

    pub fn focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    /// Make `is_focused` return an error.
    pub fn fail_queries(&self, fail: bool) {
        self.fail_query.store(fail, Ordering::SeqCst);
    }

    /// Make `is_focused` never resolve.
    pub fn hang_queries(&self, hang: bool) {
        self.hang_query.store(hang, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> Vec<FocusCall> {
        self.calls.lock().await.clone()
    }

    /// Calls other than `IsFocused`.
    pub async fn focus_changes(&self) -> Vec<FocusCall> {
        self.calls
            .lock()
            .await
            .iter()
            .copied()
            .filter(|c| *c != FocusCall::IsFocused)
            .collect()
    }
}

#[async_trait]
impl FocusHost for ScriptedFocusHost {
    async fn is_focused(&self) -> Result<bool, HostError> {
        self.calls.lock().await.push(FocusCall::IsFocused);
        if self.hang_query.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_query.load(Ordering::SeqCst) {
            return Err(HostError::Focus("window handle lost".to_string()));
        }
        Ok(self.focused())
    }

    async fn request_focus(&self) -> Result<(), HostError> {
        self.calls.lock().await.push(FocusCall::RequestFocus);
        self.set_focused(true);
        Ok(())
    }

    async fn relinquish_focus(&self) -> Result<(), HostError> {
        self.calls.lock().await.push(FocusCall::RelinquishFocus);
        self.set_focused(false);
        Ok(())
    }
}
