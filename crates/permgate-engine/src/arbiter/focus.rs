//! Focus arbitration.
//!
//! Queue transitions collected under the state lock are turned into host
//! calls after the lock is released. Every host failure is logged and
//! swallowed; a failed or slow focus query counts as "already focused" so it
//! can never cause a focus steal.

use std::time::Duration;

use tracing::{debug, warn};

use permgate_core::RequestKind;

use super::host::FocusHost;
use super::queue::{Drained, Opened};

/// Focus follow-ups owed after a state mutation.
#[derive(Debug, Default)]
pub(super) struct FocusWork {
    pub opened: Vec<Opened>,
    pub relinquish: Vec<RequestKind>,
}

impl FocusWork {
    pub fn record_opened(&mut self, opened: Option<Opened>) {
        self.opened.extend(opened);
    }

    pub fn record_drained(&mut self, drained: Option<Drained>) {
        if let Some(d) = drained.filter(|d| d.relinquish) {
            self.relinquish.push(d.kind);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.relinquish.is_empty()
    }
}

/// Ask the host whether it is focused, bounded by `timeout`.
pub(super) async fn query_focus(host: &dyn FocusHost, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, host.is_focused()).await {
        Ok(Ok(focused)) => focused,
        Ok(Err(e)) => {
            warn!(error = %e, "Focus query failed; assuming focused");
            true
        }
        Err(_) => {
            warn!(
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "Focus query timed out; assuming focused"
            );
            true
        }
    }
}

pub(super) async fn request_focus(host: &dyn FocusHost, kind: RequestKind) {
    debug!(%kind, "Requesting focus for review");
    if let Err(e) = host.request_focus().await {
        warn!(%kind, error = %e, "Focus request failed");
    }
}

pub(super) async fn relinquish_focus(host: &dyn FocusHost, kind: RequestKind) {
    debug!(%kind, "Relinquishing borrowed focus");
    if let Err(e) = host.relinquish_focus().await {
        warn!(%kind, error = %e, "Focus relinquish failed");
    }
}
