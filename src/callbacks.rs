//! The broadcast callback surface, `spec.md` §6: attachment load status,
//! send-message status, mailbox-list sync status, mailbox sync status —
//! delivered to any number of subscribers. Grounded in the teacher's
//! `watch_mailboxes.rs`/`watch_threads.rs` style of exposing DB changes as a
//! `tokio::sync::broadcast` stream to websocket clients.

use crate::model::{AccountId, CallbackStatus, MailboxId};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum Callback {
    AttachmentStatus {
        message_id: i64,
        attachment_id: i64,
        status: CallbackStatus,
        progress: u8,
    },
    SendStatus {
        message_id: i64,
        status: CallbackStatus,
    },
    MailboxListStatus {
        account_id: AccountId,
        status: CallbackStatus,
    },
    MailboxSyncStatus {
        mailbox_id: MailboxId,
        status: CallbackStatus,
        progress: u8,
    },
}

/// Fan-out broadcast hub. Cloning is cheap (an `Arc`-backed sender); every
/// subscriber gets every event from the point of subscription onward.
#[derive(Clone)]
pub struct CallbackHub {
    sender: broadcast::Sender<Callback>,
}

impl CallbackHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Callback> {
        self.sender.subscribe()
    }

    pub fn emit(&self, callback: Callback) {
        // No subscribers is a normal state (e.g. headless sync with no UI
        // attached); `send` returning an error just means that.
        let _ = self.sender.send(callback);
    }

    pub fn mailbox_sync_status(&self, mailbox_id: MailboxId, status: CallbackStatus, progress: u8) {
        self.emit(Callback::MailboxSyncStatus {
            mailbox_id,
            status,
            progress,
        });
    }

    pub fn mailbox_list_status(&self, account_id: AccountId, status: CallbackStatus) {
        self.emit(Callback::MailboxListStatus { account_id, status });
    }

    pub fn attachment_status(&self, message_id: i64, attachment_id: i64, status: CallbackStatus, progress: u8) {
        self.emit(Callback::AttachmentStatus {
            message_id,
            attachment_id,
            status,
            progress,
        });
    }

    pub fn send_status(&self, message_id: i64, status: CallbackStatus) {
        self.emit(Callback::SendStatus { message_id, status });
    }
}

impl Default for CallbackHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_events() {
        let hub = CallbackHub::new();
        let mut rx = hub.subscribe();
        hub.mailbox_sync_status(7, CallbackStatus::InProgress, 0);

        let received = rx.recv().await.unwrap();
        match received {
            Callback::MailboxSyncStatus { mailbox_id, status, .. } => {
                assert_eq!(mailbox_id, 7);
                assert_eq!(status, CallbackStatus::InProgress);
            }
            _ => panic!("unexpected callback variant"),
        }
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let hub = CallbackHub::new();
        hub.mailbox_list_status(1, CallbackStatus::Success);
    }
}
