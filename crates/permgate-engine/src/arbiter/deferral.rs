//! Holding area for requests that arrive while a group negotiation is pending.

use std::collections::VecDeque;

use permgate_core::{Request, RequestKind};

/// One FIFO list per deferrable kind.
#[derive(Debug, Default)]
pub struct DeferralBuffer {
    lists: [VecDeque<Request>; 5],
}

impl DeferralBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `request` until the next release. Group requests are never
    /// deferred and are handed back.
    pub fn push(&mut self, request: Request) -> Result<(), Request> {
        match request.kind() {
            RequestKind::Group => Err(request),
            kind => {
                self.lists[kind.index()].push_back(request);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lists.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(VecDeque::is_empty)
    }

    pub fn len_of(&self, kind: RequestKind) -> usize {
        self.lists.get(kind.index()).map_or(0, VecDeque::len)
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.lists
            .iter()
            .flatten()
            .any(|r| r.request_id() == request_id)
    }

    /// Empty every list, yielding requests kind by kind in arrival order.
    pub fn drain_all(&mut self) -> Vec<Request> {
        let mut drained = Vec::with_capacity(self.len());
        for list in &mut self.lists {
            drained.extend(list.drain(..));
        }
        drained
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use permgate_core::request::{BasketRequest, GroupRequest, RequestMeta, SpendingRequest};

    fn basket(id: &str) -> Request {
        Request::Basket(BasketRequest {
            meta: RequestMeta::new(id, "app.example"),
            basket: None,
        })
    }

    fn spending(id: &str) -> Request {
        Request::Spending(SpendingRequest {
            meta: RequestMeta::new(id, "app.example"),
            authorization_amount: 1,
            line_items: Vec::new(),
        })
    }

    #[test]
    fn rejects_group_requests() {
        let mut buffer = DeferralBuffer::new();
        let group = Request::Group(GroupRequest {
            meta: RequestMeta::new("g", "app.example"),
            permissions: Default::default(),
        });
        assert!(buffer.push(group).is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn drain_empties_every_list() {
        let mut buffer = DeferralBuffer::new();
        buffer.push(spending("s1")).unwrap();
        buffer.push(basket("b1")).unwrap();
        buffer.push(basket("b2")).unwrap();

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.len_of(RequestKind::Basket), 2);
        assert!(buffer.contains("s1"));

        let ids: Vec<String> = buffer
            .drain_all()
            .iter()
            .map(|r| r.request_id().to_string())
            .collect();
        assert_eq!(ids, ["b1", "b2", "s1"]);
        assert!(buffer.is_empty());
    }
}
