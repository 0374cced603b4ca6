//! The request queue, `spec.md` §4.3: a mailbox-local FIFO of user/system
//! originated work, drained by the worker before each Sync turn.

use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::Mutex;

use crate::model::MailboxId;

#[derive(Debug, Clone)]
pub enum Request {
    AttachmentLoad {
        attachment_id: i64,
        dest_path: Option<String>,
        content_uri: Option<String>,
    },
    MeetingResponse {
        message_id: i64,
        response: MeetingResponseKind,
    },
    MessageMove {
        message_id: i64,
        target_mailbox_id: MailboxId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingResponseKind {
    Accept,
    Tentative,
    Decline,
}

struct Inner {
    queue: VecDeque<Request>,
    request_time: Option<Instant>,
}

/// A single mailbox's FIFO, guarded by a lock per `spec.md` §4.3 ("a
/// mailbox-local FIFO guarded by a lock").
pub struct RequestQueue {
    inner: Mutex<Inner>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                request_time: None,
            }),
        }
    }

    /// Enqueue and bump `requestTime` to now, `spec.md` §4.3.
    pub fn push(&self, request: Request) {
        let mut inner = self.inner.lock();
        inner.queue.push_back(request);
        inner.request_time = Some(Instant::now());
    }

    pub fn pop(&self) -> Option<Request> {
        self.inner.lock().queue.pop_front()
    }

    /// Drain all pending requests in FIFO order, for the worker to process
    /// synchronously ahead of a Sync turn (`spec.md` §4.2.6).
    pub fn drain(&self) -> Vec<Request> {
        self.inner.lock().queue.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    pub fn request_time(&self) -> Option<Instant> {
        self.inner.lock().request_time
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_fifo_order() {
        let queue = RequestQueue::new();
        queue.push(Request::MessageMove {
            message_id: 1,
            target_mailbox_id: 10,
        });
        queue.push(Request::MessageMove {
            message_id: 2,
            target_mailbox_id: 10,
        });

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        match &drained[0] {
            Request::MessageMove { message_id, .. } => assert_eq!(*message_id, 1),
            _ => panic!("unexpected request"),
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn push_updates_request_time() {
        let queue = RequestQueue::new();
        assert!(queue.request_time().is_none());
        queue.push(Request::MeetingResponse {
            message_id: 1,
            response: MeetingResponseKind::Accept,
        });
        assert!(queue.request_time().is_some());
    }
}
