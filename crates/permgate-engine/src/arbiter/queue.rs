//! Per-kind FIFO review queue.
//!
//! A queue is "open" (its review surface is showing) exactly while it holds
//! items. Each empty -> non-empty transition starts a new focus episode that
//! remembers whether the host was already focused when it began.

use std::collections::VecDeque;

use permgate_core::{Request, RequestKind};

/// A queue transitioned from empty to non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opened {
    pub kind: RequestKind,
    pub episode: u64,
}

/// A queue transitioned from non-empty to empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drained {
    pub kind: RequestKind,
    /// Focus was borrowed for this episode and should be handed back.
    pub relinquish: bool,
}

#[derive(Debug)]
pub struct TypedQueue {
    kind: RequestKind,
    items: VecDeque<Request>,
    open: bool,
    episode: u64,
    originally_focused: Option<bool>,
}

impl TypedQueue {
    pub const fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            items: VecDeque::new(),
            open: false,
            episode: 0,
            originally_focused: None,
        }
    }

    pub const fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub const fn is_open(&self) -> bool {
        self.open
    }

    pub fn front(&self) -> Option<&Request> {
        self.items.front()
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.items.iter().any(|r| r.request_id() == request_id)
    }

    pub fn get(&self, request_id: &str) -> Option<&Request> {
        self.items.iter().find(|r| r.request_id() == request_id)
    }

    /// Ordered copy, front first.
    pub fn snapshot(&self) -> Vec<Request> {
        self.items.iter().cloned().collect()
    }

    /// Append to the back. Returns the new episode if the queue just opened.
    pub fn push(&mut self, request: Request) -> Option<Opened> {
        debug_assert_eq!(request.kind(), self.kind);
        self.items.push_back(request);
        if self.open {
            return None;
        }
        self.open = true;
        self.episode += 1;
        self.originally_focused = None;
        Some(Opened {
            kind: self.kind,
            episode: self.episode,
        })
    }

    /// Remove the front item.
    pub fn pop_front(&mut self) -> Option<(Request, Option<Drained>)> {
        let request = self.items.pop_front()?;
        Some((request, self.close_if_drained()))
    }

    /// Remove a specific item wherever it sits.
    pub fn remove(&mut self, request_id: &str) -> Option<(Request, Option<Drained>)> {
        let index = self
            .items
            .iter()
            .position(|r| r.request_id() == request_id)?;
        let request = self.items.remove(index)?;
        Some((request, self.close_if_drained()))
    }

    /// Record the focus state observed when `episode` began.
    ///
    /// Returns `false` if the episode is no longer current (the queue drained
    /// or reopened while the host was being asked).
    pub fn record_focus(&mut self, episode: u64, focused: bool) -> bool {
        if !self.open || self.episode != episode {
            return false;
        }
        self.originally_focused = Some(focused);
        true
    }

    fn close_if_drained(&mut self) -> Option<Drained> {
        if !self.items.is_empty() {
            return None;
        }
        self.open = false;
        // An unanswered focus query counts as "was focused": never hand back
        // focus that was not borrowed.
        let relinquish = self.originally_focused.take() == Some(false);
        Some(Drained {
            kind: self.kind,
            relinquish,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use permgate_core::request::{BasketRequest, RequestMeta};

    fn basket(id: &str) -> Request {
        Request::Basket(BasketRequest {
            meta: RequestMeta::new(id, "app.example"),
            basket: Some("invoices".to_string()),
        })
    }

    #[test]
    fn fifo_order() {
        let mut queue = TypedQueue::new(RequestKind::Basket);
        for id in ["a", "b", "c"] {
            queue.push(basket(id));
        }
        let order: Vec<String> = std::iter::from_fn(|| queue.pop_front())
            .map(|(r, _)| r.request_id().to_string())
            .collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn opens_once_per_episode() {
        let mut queue = TypedQueue::new(RequestKind::Basket);
        let first = queue.push(basket("a")).unwrap();
        assert!(queue.push(basket("b")).is_none());
        assert!(queue.is_open());

        queue.pop_front();
        let (_, drained) = queue.pop_front().unwrap();
        assert!(drained.is_some());
        assert!(!queue.is_open());

        let second = queue.push(basket("c")).unwrap();
        assert_eq!(second.episode, first.episode + 1);
    }

    #[test]
    fn relinquish_only_when_focus_was_borrowed() {
        let mut queue = TypedQueue::new(RequestKind::Basket);

        let opened = queue.push(basket("a")).unwrap();
        assert!(queue.record_focus(opened.episode, false));
        let (_, drained) = queue.pop_front().unwrap();
        assert!(drained.unwrap().relinquish);

        let opened = queue.push(basket("b")).unwrap();
        assert!(queue.record_focus(opened.episode, true));
        let (_, drained) = queue.pop_front().unwrap();
        assert!(!drained.unwrap().relinquish);

        queue.push(basket("c"));
        let (_, drained) = queue.pop_front().unwrap();
        assert!(!drained.unwrap().relinquish, "unknown focus must not relinquish");
    }

    #[test]
    fn stale_focus_answer_is_ignored() {
        let mut queue = TypedQueue::new(RequestKind::Basket);
        let opened = queue.push(basket("a")).unwrap();
        queue.pop_front();
        assert!(!queue.record_focus(opened.episode, false));

        let reopened = queue.push(basket("b")).unwrap();
        assert!(!queue.record_focus(opened.episode, false));
        assert!(queue.record_focus(reopened.episode, false));
    }

    #[test]
    fn remove_from_middle() {
        let mut queue = TypedQueue::new(RequestKind::Basket);
        queue.push(basket("a"));
        queue.push(basket("b"));
        queue.push(basket("c"));

        let (removed, drained) = queue.remove("b").unwrap();
        assert_eq!(removed.request_id(), "b");
        assert!(drained.is_none());
        assert!(queue.remove("zzz").is_none());
        assert_eq!(queue.front().unwrap().request_id(), "a");
    }
}
