//! The arbiter: single owner of queues, deferral buffer, gate and cooldowns.
//!
//! All state sits behind one mutex. Host and runtime calls are made only
//! after the lock is dropped, so a slow window manager or wallet runtime never
//! blocks unrelated callbacks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use permgate_core::request::{
    BasketRequest, CertificateRequest, CounterpartyRequest, GroupRequest, ProtocolRequest,
    SpendingRequest,
};
use permgate_core::{
    ArbiterSettings, CooldownTracker, GroupDecision, Request, RequestKind, build_decision,
    cooldown_key, is_covered,
};

use super::deferral::DeferralBuffer;
use super::focus::{self, FocusWork};
use super::gate::{GateStatus, GroupGate};
use super::host::{FocusHost, HostError, WalletRuntime};
use super::queue::{Drained, TypedQueue};
use super::types::{Admission, ArbiterError, ArbiterEvent, GrantOptions, QueueSnapshot};

/// How a group request was resolved by the user.
enum GroupResolution {
    Grant(Value),
    Deny,
    Dismiss,
}

struct ArbiterState {
    queues: [TypedQueue; 6],
    deferred: DeferralBuffer,
    gate: GroupGate,
    cooldowns: CooldownTracker,
    /// Cooldown key of each queued group request, computed on arrival.
    cooldown_keys: HashMap<String, String>,
}

impl ArbiterState {
    fn new(settings: &ArbiterSettings) -> Self {
        Self {
            queues: RequestKind::ALL.map(TypedQueue::new),
            deferred: DeferralBuffer::new(),
            gate: GroupGate::new(),
            cooldowns: CooldownTracker::new(settings.cooldown),
            cooldown_keys: HashMap::new(),
        }
    }

    fn queue(&self, kind: RequestKind) -> &TypedQueue {
        &self.queues[kind.index()]
    }

    fn queue_mut(&mut self, kind: RequestKind) -> &mut TypedQueue {
        &mut self.queues[kind.index()]
    }

    fn locate(&self, request_id: &str) -> Option<RequestKind> {
        self.queues
            .iter()
            .find(|q| q.contains(request_id))
            .map(TypedQueue::kind)
    }

    fn contains(&self, request_id: &str) -> bool {
        self.locate(request_id).is_some() || self.deferred.contains(request_id)
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            basket: self.queue(RequestKind::Basket).snapshot(),
            certificate: self.queue(RequestKind::Certificate).snapshot(),
            protocol: self.queue(RequestKind::Protocol).snapshot(),
            spending: self.queue(RequestKind::Spending).snapshot(),
            counterparty: self.queue(RequestKind::Counterparty).snapshot(),
            group: self.queue(RequestKind::Group).snapshot(),
            deferred: self.deferred.len(),
            gate: self.gate.status(),
        }
    }
}

struct Inner {
    state: Mutex<ArbiterState>,
    runtime: Arc<dyn WalletRuntime>,
    focus: Arc<dyn FocusHost>,
    settings: ArbiterSettings,
    events: broadcast::Sender<ArbiterEvent>,
}

/// Permission request arbiter. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Arbiter {
    inner: Arc<Inner>,
}

impl Arbiter {
    /// Create an arbiter driving `runtime` and `focus`.
    pub fn new(
        runtime: Arc<dyn WalletRuntime>,
        focus: Arc<dyn FocusHost>,
        settings: ArbiterSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ArbiterState::new(&settings)),
                runtime,
                focus,
                settings,
                events,
            }),
        }
    }

    pub fn settings(&self) -> ArbiterSettings {
        self.inner.settings
    }

    /// Subscribe to queue and gate notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ArbiterEvent> {
        self.inner.events.subscribe()
    }

    // -- Inbound callbacks from the wallet runtime --

    pub async fn on_basket_request(
        &self,
        request: BasketRequest,
    ) -> Result<Admission, ArbiterError> {
        self.submit(request.into()).await
    }

    pub async fn on_certificate_request(
        &self,
        request: CertificateRequest,
    ) -> Result<Admission, ArbiterError> {
        self.submit(request.into()).await
    }

    pub async fn on_protocol_request(
        &self,
        request: ProtocolRequest,
    ) -> Result<Admission, ArbiterError> {
        self.submit(request.into()).await
    }

    pub async fn on_spending_request(
        &self,
        request: SpendingRequest,
    ) -> Result<Admission, ArbiterError> {
        self.submit(request.into()).await
    }

    pub async fn on_counterparty_request(
        &self,
        request: CounterpartyRequest,
    ) -> Result<Admission, ArbiterError> {
        self.submit(request.into()).await
    }

    pub async fn on_group_request(
        &self,
        request: GroupRequest,
    ) -> Result<Admission, ArbiterError> {
        self.submit(request.into()).await
    }

    /// Admit a request: queue it, defer it behind a pending group, or (for
    /// groups under cooldown) dismiss it without showing anything.
    pub async fn submit(&self, request: Request) -> Result<Admission, ArbiterError> {
        let now = now();
        let request_id = request.request_id().to_string();
        let mut work = FocusWork::default();

        let admission = {
            let mut st = self.inner.state.lock().await;
            if st.contains(&request_id) {
                warn!(request_id, "Rejecting duplicate permission request");
                return Err(ArbiterError::DuplicateRequest { request_id });
            }

            if let Request::Group(group) = &request {
                let key = cooldown_key(&group.meta.originator, &group.permissions);
                st.cooldowns.prune(now);
                if st.cooldowns.is_suppressed(&key, now) {
                    let remaining_ms = st
                        .cooldowns
                        .remaining(&key, now)
                        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
                    info!(
                        request_id,
                        cooldown_key = %key,
                        remaining_ms,
                        "Group request suppressed by cooldown"
                    );
                    Admission::Suppressed { cooldown_key: key }
                } else {
                    st.cooldown_keys.insert(request_id.clone(), key);
                    self.enqueue(&mut st, request, &mut work);
                    self.maybe_begin_episode(&mut st);
                    Admission::Queued
                }
            } else if st.gate.is_pending() {
                debug!(
                    request_id,
                    kind = %request.kind(),
                    "Deferring request behind pending group"
                );
                if let Err(request) = st.deferred.push(request) {
                    self.enqueue(&mut st, request, &mut work);
                }
                Admission::Deferred
            } else {
                self.enqueue(&mut st, request, &mut work);
                Admission::Queued
            }
        };

        if let Admission::Suppressed { cooldown_key } = &admission {
            if let Err(e) = self
                .inner
                .runtime
                .dismiss_grouped_permission(&request_id)
                .await
            {
                self.runtime_failure(&request_id, &e);
            }
            self.emit(ArbiterEvent::Suppressed {
                request_id,
                cooldown_key: cooldown_key.clone(),
            });
        }

        self.settle_focus(work).await;
        Ok(admission)
    }

    // -- UI surface --

    /// Ordered contents of one queue, front first.
    pub async fn snapshot(&self, kind: RequestKind) -> Vec<Request> {
        self.inner.state.lock().await.queue(kind).snapshot()
    }

    pub async fn snapshot_all(&self) -> QueueSnapshot {
        self.inner.state.lock().await.snapshot()
    }

    pub async fn gate_status(&self) -> GateStatus {
        self.inner.state.lock().await.gate.status()
    }

    pub async fn deferred_len(&self) -> usize {
        self.inner.state.lock().await.deferred.len()
    }

    /// Pop the front of a queue without telling the runtime anything.
    ///
    /// For the group queue this ends the pending episode with no decision:
    /// every deferred request is re-surfaced.
    pub async fn advance(&self, kind: RequestKind) -> Option<Request> {
        let mut work = FocusWork::default();
        let popped = {
            let mut st = self.inner.state.lock().await;
            let (request, drained) = st.queue_mut(kind).pop_front()?;
            debug!(request_id = request.request_id(), %kind, "Advanced queue");
            if kind == RequestKind::Group {
                let request_id = request.request_id();
                st.cooldown_keys.remove(request_id);
                let owns_episode = st.gate.pending_request() == Some(request_id);
                self.after_group_removed(
                    &mut st,
                    request_id,
                    owns_episode,
                    None,
                    drained,
                    &mut work,
                );
            } else {
                self.note_removed(kind, drained, &mut work);
            }
            request
        };
        self.settle_focus(work).await;
        Some(popped)
    }

    /// Grant a single (non-group) request and advance its queue.
    pub async fn grant(&self, request_id: &str, options: GrantOptions) -> Result<(), ArbiterError> {
        self.resolve_single(request_id, Some(options)).await
    }

    /// Deny a single (non-group) request and advance its queue.
    pub async fn deny(&self, request_id: &str) -> Result<(), ArbiterError> {
        self.resolve_single(request_id, None).await
    }

    /// Grant a group request. `granted` is the runtime's grant payload; the
    /// deferred requests it covers are dropped.
    pub async fn grant_group(&self, request_id: &str, granted: Value) -> Result<(), ArbiterError> {
        self.resolve_group(request_id, GroupResolution::Grant(granted))
            .await
    }

    pub async fn deny_group(&self, request_id: &str) -> Result<(), ArbiterError> {
        self.resolve_group(request_id, GroupResolution::Deny).await
    }

    pub async fn dismiss_group(&self, request_id: &str) -> Result<(), ArbiterError> {
        self.resolve_group(request_id, GroupResolution::Dismiss)
            .await
    }

    /// End the pending episode (if any) and release the deferral buffer
    /// against `decision`. A no-op when idle with nothing deferred.
    pub async fn release(&self, decision: Option<GroupDecision>) {
        let mut work = FocusWork::default();
        {
            let mut st = self.inner.state.lock().await;
            self.release_locked(&mut st, decision.as_ref(), &mut work);
            self.maybe_begin_episode(&mut st);
        }
        self.settle_focus(work).await;
    }

    /// Disarm the grace timer. Queues are left as they are.
    pub async fn shutdown(&self) {
        self.inner.state.lock().await.gate.cancel_timer();
        info!("Arbiter shut down");
    }

    // -- Resolution paths --

    async fn resolve_single(
        &self,
        request_id: &str,
        options: Option<GrantOptions>,
    ) -> Result<(), ArbiterError> {
        let kind = {
            let st = self.inner.state.lock().await;
            match st.locate(request_id) {
                Some(RequestKind::Group) => {
                    return Err(ArbiterError::WrongKind {
                        request_id: request_id.to_string(),
                        expected: "non-group",
                        actual: RequestKind::Group,
                    });
                }
                Some(kind) => kind,
                None => {
                    return Err(ArbiterError::RequestNotFound {
                        request_id: request_id.to_string(),
                    });
                }
            }
        };

        let granted = options.is_some();
        let outcome = match &options {
            Some(options) => {
                self.inner
                    .runtime
                    .grant_permission(request_id, options)
                    .await
            }
            None => self.inner.runtime.deny_permission(request_id).await,
        };
        if let Err(e) = outcome {
            self.runtime_failure(request_id, &e);
        }

        let mut work = FocusWork::default();
        {
            let mut st = self.inner.state.lock().await;
            let Some((_, drained)) = st.queue_mut(kind).remove(request_id) else {
                debug!(request_id, "Request already resolved");
                return Ok(());
            };
            info!(request_id, %kind, granted, "Permission request resolved");
            self.note_removed(kind, drained, &mut work);
        }
        self.settle_focus(work).await;
        Ok(())
    }

    async fn resolve_group(
        &self,
        request_id: &str,
        resolution: GroupResolution,
    ) -> Result<(), ArbiterError> {
        // The grace timer stays armed while the runtime is consulted; the
        // epoch tells us afterwards whether this decision still owns the
        // episode.
        let (episode, cooldown_key) = {
            let mut st = self.inner.state.lock().await;
            match st.locate(request_id) {
                Some(RequestKind::Group) => {}
                Some(actual) => {
                    return Err(ArbiterError::WrongKind {
                        request_id: request_id.to_string(),
                        expected: "group",
                        actual,
                    });
                }
                None => {
                    return Err(ArbiterError::RequestNotFound {
                        request_id: request_id.to_string(),
                    });
                }
            }
            (
                st.gate.episode_of(request_id),
                st.cooldown_keys.remove(request_id),
            )
        };

        let runtime = &self.inner.runtime;
        let outcome = match &resolution {
            GroupResolution::Grant(granted) => {
                runtime.grant_grouped_permission(request_id, granted).await
            }
            GroupResolution::Deny => runtime.deny_grouped_permission(request_id).await,
            GroupResolution::Dismiss => runtime.dismiss_grouped_permission(request_id).await,
        };
        let delivered = match outcome {
            Ok(()) => true,
            Err(e) => {
                self.runtime_failure(request_id, &e);
                false
            }
        };

        // A grant the runtime rejected covers nothing.
        let decision = match &resolution {
            GroupResolution::Grant(granted) if delivered => Some(build_decision(granted)),
            GroupResolution::Grant(_) | GroupResolution::Deny | GroupResolution::Dismiss => None,
        };

        let now = now();
        let mut work = FocusWork::default();
        {
            let mut st = self.inner.state.lock().await;
            // The runtime has the decision, so the originator cools down even
            // if the request left its queue meanwhile.
            if let Some(key) = cooldown_key {
                debug!(request_id, cooldown_key = %key, "Starting group cooldown");
                st.cooldowns.start(key, now);
            }
            let Some((_, drained)) = st.queue_mut(RequestKind::Group).remove(request_id) else {
                debug!(request_id, "Group request already resolved");
                return Ok(());
            };
            let owns_episode = episode.is_some() && st.gate.episode_of(request_id) == episode;
            info!(
                request_id,
                granted = decision.is_some(),
                delivered,
                late = !owns_episode,
                "Group permission request resolved"
            );
            self.after_group_removed(
                &mut st,
                request_id,
                owns_episode,
                decision.as_ref(),
                drained,
                &mut work,
            );
        }
        self.settle_focus(work).await;
        Ok(())
    }

    // -- Locked helpers --

    fn enqueue(&self, st: &mut ArbiterState, request: Request, work: &mut FocusWork) {
        let kind = request.kind();
        debug!(request_id = request.request_id(), %kind, "Queued permission request");
        let opened = st.queue_mut(kind).push(request);
        if opened.is_some() {
            self.emit(ArbiterEvent::QueueOpened { kind });
        }
        self.emit(ArbiterEvent::QueueChanged { kind });
        work.record_opened(opened);
    }

    fn note_removed(&self, kind: RequestKind, drained: Option<Drained>, work: &mut FocusWork) {
        self.emit(ArbiterEvent::QueueChanged { kind });
        if drained.is_some() {
            self.emit(ArbiterEvent::QueueDrained { kind });
        }
        work.record_drained(drained);
    }

    fn after_group_removed(
        &self,
        st: &mut ArbiterState,
        request_id: &str,
        owns_episode: bool,
        decision: Option<&GroupDecision>,
        drained: Option<Drained>,
        work: &mut FocusWork,
    ) {
        if owns_episode {
            self.release_locked(st, decision, work);
        }
        st.gate.forget(request_id);
        self.note_removed(RequestKind::Group, drained, work);
        self.maybe_begin_episode(st);
    }

    /// Start a pending episode for the front group if it has not had one.
    fn maybe_begin_episode(&self, st: &mut ArbiterState) {
        let Some(front) = st
            .queue(RequestKind::Group)
            .front()
            .map(|r| r.request_id().to_string())
        else {
            return;
        };
        if !st.gate.can_begin(&front) {
            return;
        }
        let epoch = st.gate.begin(&front);
        info!(request_id = %front, epoch, "Group gate idle -> pending");
        self.emit(ArbiterEvent::GateChanged {
            status: GateStatus::Pending,
        });
        let handle = self.spawn_grace_timer(epoch);
        st.gate.arm(epoch, handle);
    }

    fn spawn_grace_timer(&self, epoch: u64) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let grace = self.inner.settings.grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = weak.upgrade() {
                Arbiter { inner }.expire_grace(epoch).await;
            }
        })
    }

    async fn expire_grace(&self, epoch: u64) {
        let mut work = FocusWork::default();
        {
            let mut st = self.inner.state.lock().await;
            let Some(owner) = st.gate.expire(epoch) else {
                return;
            };
            let grace_ms =
                u64::try_from(self.inner.settings.grace_period.as_millis()).unwrap_or(u64::MAX);
            warn!(
                request_id = %owner,
                grace_ms,
                "Group grace period expired; releasing deferred requests"
            );
            self.partition_deferred(&mut st, None, Some(owner), &mut work);
            self.maybe_begin_episode(&mut st);
        }
        self.settle_focus(work).await;
    }

    /// End the episode (timer first) and release the buffer.
    fn release_locked(
        &self,
        st: &mut ArbiterState,
        decision: Option<&GroupDecision>,
        work: &mut FocusWork,
    ) {
        let ended = st.gate.release();
        self.partition_deferred(st, decision, ended, work);
    }

    /// Drop deferred requests covered by `decision` and re-queue the rest.
    fn partition_deferred(
        &self,
        st: &mut ArbiterState,
        decision: Option<&GroupDecision>,
        ended: Option<String>,
        work: &mut FocusWork,
    ) {
        let deferred = st.deferred.drain_all();
        if ended.is_none() && deferred.is_empty() {
            return;
        }
        if let Some(owner) = &ended {
            info!(request_id = %owner, "Group gate pending -> idle");
            self.emit(ArbiterEvent::GateChanged {
                status: GateStatus::Idle,
            });
        }

        let mut covered = 0;
        let mut resurfaced = 0;
        for request in deferred {
            if is_covered(decision, &request) {
                debug!(
                    request_id = request.request_id(),
                    kind = %request.kind(),
                    "Deferred request covered by group grant; dropping"
                );
                covered += 1;
            } else {
                resurfaced += 1;
                self.enqueue(st, request, work);
            }
        }
        info!(covered, resurfaced, "Released deferred requests");
        self.emit(ArbiterEvent::Released {
            covered,
            resurfaced,
        });
    }

    // -- Unlocked helpers --

    async fn settle_focus(&self, work: FocusWork) {
        if work.is_empty() {
            return;
        }
        let host = self.inner.focus.as_ref();
        for kind in work.relinquish {
            focus::relinquish_focus(host, kind).await;
        }
        for opened in work.opened {
            let focused = focus::query_focus(host, self.inner.settings.focus_query_timeout).await;
            let borrow = {
                let mut st = self.inner.state.lock().await;
                st.queue_mut(opened.kind).record_focus(opened.episode, focused) && !focused
            };
            if borrow {
                focus::request_focus(host, opened.kind).await;
            }
        }
    }

    fn runtime_failure(&self, request_id: &str, error: &HostError) {
        warn!(request_id, error = %error, "Wallet runtime call failed; advancing anyway");
        self.emit(ArbiterEvent::RuntimeFailure {
            request_id: request_id.to_string(),
            message: error.to_string(),
        });
    }

    fn emit(&self, event: ArbiterEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
