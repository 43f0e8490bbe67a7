//! Cooldown keys and suppression tracking for group prompts.
//!
//! After a group request is resolved its originator (optionally narrowed to a
//! single counterparty) may not raise another group prompt until the cooldown
//! elapses. Time is passed in explicitly so callers decide which clock to use.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::request::GroupedPermissions;

/// Normalize an originator for keying.
///
/// Trims, lowercases, and strips an `http(s)://` scheme, default ports and
/// trailing slashes, so `https://App.example:443/` and `app.example` collide.
pub fn normalize_originator(originator: &str) -> String {
    let lowered = originator.trim().to_ascii_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let trimmed = without_scheme.trim_end_matches('/');
    let host = trimmed
        .strip_suffix(":443")
        .or_else(|| trimmed.strip_suffix(":80"))
        .unwrap_or(trimmed);
    host.to_string()
}

/// Compute the cooldown key for a group request.
///
/// The key is `originator|counterparty` when the group holds only level-2
/// protocol permissions against one counterparty, and the bare normalized
/// originator otherwise.
pub fn cooldown_key(originator: &str, permissions: &GroupedPermissions) -> String {
    let origin = normalize_originator(originator);
    match single_counterparty(permissions) {
        Some(counterparty) => format!("{origin}|{counterparty}"),
        None => origin,
    }
}

fn single_counterparty(permissions: &GroupedPermissions) -> Option<&str> {
    if permissions.spending_authorization.is_some()
        || !permissions.basket_access.is_empty()
        || !permissions.certificate_access.is_empty()
    {
        return None;
    }
    let mut counterparty: Option<&str> = None;
    for p in &permissions.protocol_permissions {
        if p.security_level != 2 {
            return None;
        }
        let cp = p.counterparty.as_deref().filter(|c| !c.is_empty())?;
        match counterparty {
            Some(seen) if seen != cp => return None,
            _ => counterparty = Some(cp),
        }
    }
    counterparty
}

/// Per-key suppression deadlines.
///
/// A deadline of `None` means the cooldown outlasts anything an `Instant`
/// can represent.
#[derive(Debug)]
pub struct CooldownTracker {
    duration: Duration,
    until: HashMap<String, Option<Instant>>,
}

impl CooldownTracker {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            until: HashMap::new(),
        }
    }

    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// True while `now` is before the key's deadline.
    pub fn is_suppressed(&self, key: &str, now: Instant) -> bool {
        self.until
            .get(key)
            .is_some_and(|deadline| deadline.is_none_or(|d| now < d))
    }

    /// Time left on a key's cooldown, if any.
    pub fn remaining(&self, key: &str, now: Instant) -> Option<Duration> {
        match self.until.get(key)? {
            Some(deadline) => deadline
                .checked_duration_since(now)
                .filter(|d| !d.is_zero()),
            None => Some(Duration::MAX),
        }
    }

    /// Start (or restart) the cooldown for `key`.
    pub fn start(&mut self, key: impl Into<String>, now: Instant) {
        if self.duration.is_zero() {
            return;
        }
        self.until.insert(key.into(), now.checked_add(self.duration));
    }

    /// Forget expired deadlines. Returns how many were dropped.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.until.len();
        self.until
            .retain(|_, deadline| deadline.is_none_or(|d| now < d));
        before - self.until.len()
    }

    pub fn len(&self) -> usize {
        self.until.len()
    }

    pub fn is_empty(&self) -> bool {
        self.until.is_empty()
    }
}
