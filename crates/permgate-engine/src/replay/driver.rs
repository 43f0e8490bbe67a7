//! Drives an arbiter through a parsed scenario.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use permgate_core::ArbiterSettings;

use crate::arbiter::{Arbiter, ArbiterError, QueueSnapshot};
use crate::testing::{FocusCall, RecordingRuntime, RuntimeCall, ScriptedFocusHost};

use super::script::ScriptOp;

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySnapshot {
    /// 1-based index of the op that requested it.
    pub step: usize,
    pub queues: QueueSnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub snapshots: Vec<ReplaySnapshot>,
    pub final_state: QueueSnapshot,
    /// Ops the arbiter rejected; replay continues past them.
    pub errors: Vec<String>,
    pub runtime_calls: Vec<RuntimeCall>,
    pub focus_calls: Vec<FocusCall>,
}

/// Arbiter wired to in-memory collaborators.
pub struct Replayer {
    arbiter: Arbiter,
    runtime: Arc<RecordingRuntime>,
    focus: Arc<ScriptedFocusHost>,
}

impl Replayer {
    pub fn new(settings: ArbiterSettings, focused: bool) -> Self {
        let runtime = Arc::new(RecordingRuntime::new());
        let focus = Arc::new(ScriptedFocusHost::new(focused));
        let arbiter = Arbiter::new(runtime.clone(), focus.clone(), settings);
        Self {
            arbiter,
            runtime,
            focus,
        }
    }

    pub const fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    /// Apply every op in order.
    pub async fn run(&self, ops: Vec<ScriptOp>) -> ReplayReport {
        let mut snapshots = Vec::new();
        let mut errors = Vec::new();

        for (i, op) in ops.into_iter().enumerate() {
            let step = i + 1;
            match self.apply(op).await {
                Ok(Some(queues)) => snapshots.push(ReplaySnapshot { step, queues }),
                Ok(None) => {}
                Err(e) => {
                    warn!(step, error = %e, "Scenario op rejected");
                    errors.push(format!("step {step}: {e}"));
                }
            }
        }

        self.arbiter.shutdown().await;
        let report = ReplayReport {
            snapshots,
            final_state: self.arbiter.snapshot_all().await,
            errors,
            runtime_calls: self.runtime.calls().await,
            focus_calls: self.focus.calls().await,
        };
        info!(
            runtime_calls = report.runtime_calls.len(),
            errors = report.errors.len(),
            "Replay finished"
        );
        report
    }

    async fn apply(&self, op: ScriptOp) -> Result<Option<QueueSnapshot>, ArbiterError> {
        let arbiter = &self.arbiter;
        match op {
            ScriptOp::Request { request } => {
                arbiter.submit(request).await?;
            }
            ScriptOp::Grant {
                request_id,
                options,
            } => arbiter.grant(&request_id, options).await?,
            ScriptOp::Deny { request_id } => arbiter.deny(&request_id).await?,
            ScriptOp::GrantGroup {
                request_id,
                granted,
            } => arbiter.grant_group(&request_id, granted).await?,
            ScriptOp::DenyGroup { request_id } => arbiter.deny_group(&request_id).await?,
            ScriptOp::DismissGroup { request_id } => arbiter.dismiss_group(&request_id).await?,
            ScriptOp::Advance { kind } => {
                arbiter.advance(kind).await;
            }
            ScriptOp::Sleep { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
            ScriptOp::Focus { focused } => self.focus.set_focused(focused),
            ScriptOp::Snapshot => return Ok(Some(arbiter.snapshot_all().await)),
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::replay::parse_script;
    use permgate_core::RequestKind;

    #[tokio::test]
    async fn replays_covered_basket() {
        let ops = parse_script(
            r#"{"op":"request","request":{"kind":"group","requestID":"g1","originator":"app.example","permissions":{"basketAccess":[{"basket":"invoices"}]}}}
{"op":"request","request":{"kind":"basket","requestID":"b1","originator":"app.example","basket":"invoices"}}
{"op":"request","request":{"kind":"basket","requestID":"b2","originator":"app.example","basket":"receipts"}}
{"op":"snapshot"}
{"op":"grantGroup","requestID":"g1","granted":{"basketAccess":[{"basket":"invoices"}]}}
{"op":"deny","requestID":"nope"}"#,
        )
        .unwrap();

        let replayer = Replayer::new(ArbiterSettings::default(), true);
        let report = replayer.run(ops).await;

        assert_eq!(report.snapshots.len(), 1);
        assert_eq!(report.snapshots[0].step, 4);
        assert_eq!(report.snapshots[0].queues.deferred, 2);

        let baskets = report.final_state.queue(RequestKind::Basket);
        assert_eq!(baskets.len(), 1);
        assert_eq!(baskets[0].request_id(), "b2");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.runtime_calls.len(), 1);
    }
}
