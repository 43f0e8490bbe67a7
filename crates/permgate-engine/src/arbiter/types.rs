//! Arbiter types.

use serde::{Deserialize, Serialize};

use permgate_core::{Request, RequestKind};

use super::gate::GateStatus;

/// Options forwarded to the runtime with a single-request grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GrantOptions {
    /// Grant for this use only instead of persisting it.
    pub ephemeral: bool,
    /// Approved amount for spending requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
}

/// Where an inbound request ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Appended to its typed queue.
    Queued,
    /// Held in the deferral buffer behind a pending group.
    Deferred,
    /// Group request dismissed by cooldown, never queued.
    Suppressed { cooldown_key: String },
}

/// Notifications for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ArbiterEvent {
    QueueOpened { kind: RequestKind },
    QueueChanged { kind: RequestKind },
    QueueDrained { kind: RequestKind },
    GateChanged { status: GateStatus },
    Released { covered: usize, resurfaced: usize },
    Suppressed {
        #[serde(rename = "requestID")]
        request_id: String,
        cooldown_key: String,
    },
    /// A runtime call failed; the queue advanced anyway.
    RuntimeFailure {
        #[serde(rename = "requestID")]
        request_id: String,
        message: String,
    },
}

/// Read-only view of every queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub basket: Vec<Request>,
    pub certificate: Vec<Request>,
    pub protocol: Vec<Request>,
    pub spending: Vec<Request>,
    pub counterparty: Vec<Request>,
    pub group: Vec<Request>,
    pub deferred: usize,
    pub gate: GateStatus,
}

impl QueueSnapshot {
    pub fn queue(&self, kind: RequestKind) -> &[Request] {
        match kind {
            RequestKind::Basket => &self.basket,
            RequestKind::Certificate => &self.certificate,
            RequestKind::Protocol => &self.protocol,
            RequestKind::Spending => &self.spending,
            RequestKind::Counterparty => &self.counterparty,
            RequestKind::Group => &self.group,
        }
    }
}

/// Arbiter errors.
#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    #[error("Permission request not found: {request_id}")]
    RequestNotFound { request_id: String },

    #[error("Duplicate permission request: {request_id}")]
    DuplicateRequest { request_id: String },

    #[error("Request {request_id} is a {actual} request, expected {expected}")]
    WrongKind {
        request_id: String,
        expected: &'static str,
        actual: RequestKind,
    },
}
