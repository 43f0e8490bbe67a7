//! Group gate state machine.
//!
//! `Idle` lets narrow requests through to their queues; `Pending` diverts
//! them into the deferral buffer while the group request at the front of the
//! group queue is negotiated. Each pending episode owns at most one grace
//! timer, identified by the episode's epoch.

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Idle,
    Pending,
}

#[derive(Debug)]
enum GateState {
    Idle,
    Pending { request_id: String, epoch: u64 },
}

#[derive(Debug)]
pub struct GroupGate {
    state: GateState,
    epoch: u64,
    /// Group request that owned the most recent episode, while it is still
    /// queued. A group gets one episode, however long it stays at the front.
    last_owner: Option<String>,
    timer: Option<JoinHandle<()>>,
}

impl Default for GroupGate {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupGate {
    pub const fn new() -> Self {
        Self {
            state: GateState::Idle,
            epoch: 0,
            last_owner: None,
            timer: None,
        }
    }

    pub const fn status(&self) -> GateStatus {
        match self.state {
            GateState::Idle => GateStatus::Idle,
            GateState::Pending { .. } => GateStatus::Pending,
        }
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self.state, GateState::Pending { .. })
    }

    pub fn pending_request(&self) -> Option<&str> {
        match &self.state {
            GateState::Pending { request_id, .. } => Some(request_id),
            GateState::Idle => None,
        }
    }

    /// Epoch of the current episode if `request_id` owns it.
    pub fn episode_of(&self, request_id: &str) -> Option<u64> {
        match &self.state {
            GateState::Pending {
                request_id: owner,
                epoch,
            } if owner == request_id => Some(*epoch),
            _ => None,
        }
    }

    pub const fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Whether `request_id` may open a new pending episode.
    pub fn can_begin(&self, request_id: &str) -> bool {
        !self.is_pending() && self.last_owner.as_deref() != Some(request_id)
    }

    /// `idle -> pending` for `request_id`. Returns the episode epoch.
    pub fn begin(&mut self, request_id: &str) -> u64 {
        self.cancel_timer();
        self.epoch += 1;
        self.last_owner = Some(request_id.to_string());
        self.state = GateState::Pending {
            request_id: request_id.to_string(),
            epoch: self.epoch,
        };
        self.epoch
    }

    /// Attach the grace timer for `epoch`. A handle for a stale epoch is
    /// aborted immediately.
    pub fn arm(&mut self, epoch: u64, handle: JoinHandle<()>) {
        match self.state {
            GateState::Pending { epoch: current, .. }
                if current == epoch && self.timer.is_none() =>
            {
                self.timer = Some(handle);
            }
            _ => handle.abort(),
        }
    }

    /// `pending -> idle` from a decision or bare advance. The timer is
    /// cancelled before anything else. Returns the group that owned the
    /// episode, or `None` if the gate was already idle.
    pub fn release(&mut self) -> Option<String> {
        self.cancel_timer();
        match std::mem::replace(&mut self.state, GateState::Idle) {
            GateState::Pending { request_id, .. } => Some(request_id),
            GateState::Idle => None,
        }
    }

    /// `pending -> idle` from the grace timer of `epoch`. No-op when that
    /// episode already ended. The handle is detached, not aborted, since the
    /// caller is running inside it.
    pub fn expire(&mut self, epoch: u64) -> Option<String> {
        match &self.state {
            GateState::Pending { epoch: current, .. } if *current == epoch => {
                self.timer.take();
                self.release()
            }
            _ => None,
        }
    }

    /// Forget a group that left the queue so a later request reusing its ID
    /// gets a fresh episode.
    pub fn forget(&mut self, request_id: &str) {
        if self.last_owner.as_deref() == Some(request_id) {
            self.last_owner = None;
        }
    }

    /// Abort the grace timer without changing state.
    pub fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sleeper() -> JoinHandle<()> {
        tokio::spawn(tokio::time::sleep(Duration::from_secs(3600)))
    }

    #[tokio::test]
    async fn begin_and_release() {
        let mut gate = GroupGate::new();
        assert_eq!(gate.status(), GateStatus::Idle);
        assert!(gate.can_begin("g1"));

        let epoch = gate.begin("g1");
        gate.arm(epoch, sleeper());
        assert_eq!(gate.pending_request(), Some("g1"));
        assert_eq!(gate.episode_of("g1"), Some(epoch));
        assert_eq!(gate.episode_of("g2"), None);
        assert!(gate.is_armed());
        assert!(!gate.can_begin("g2"));

        assert_eq!(gate.release().as_deref(), Some("g1"));
        assert!(!gate.is_armed());
        assert_eq!(gate.status(), GateStatus::Idle);
        assert!(gate.release().is_none());
    }

    #[tokio::test]
    async fn one_episode_per_group() {
        let mut gate = GroupGate::new();
        gate.begin("g1");
        gate.release();
        assert!(!gate.can_begin("g1"));
        assert!(gate.can_begin("g2"));

        gate.forget("g1");
        assert!(gate.can_begin("g1"));
    }

    #[tokio::test]
    async fn stale_expiry_is_ignored() {
        let mut gate = GroupGate::new();
        let first = gate.begin("g1");
        gate.release();
        let second = gate.begin("g2");

        assert!(gate.expire(first).is_none());
        assert!(gate.is_pending());
        assert_eq!(gate.expire(second).as_deref(), Some("g2"));
        assert!(!gate.is_pending());
    }

    #[tokio::test]
    async fn stale_handle_is_aborted() {
        let mut gate = GroupGate::new();
        let epoch = gate.begin("g1");
        gate.release();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            let _ = tx.send(());
        });
        gate.arm(epoch, handle);
        assert!(!gate.is_armed());
        assert!(rx.await.is_err(), "aborted timer drops its sender");
    }
}
