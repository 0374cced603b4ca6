//! In-memory `Store` fake used by orchestrator/driver unit tests, modeled on
//! the same table shape as `sqlite::SqliteStore` but backed by `parking_lot`
//! guarded maps instead of a pool — no database file, no migrations.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::model::{Account, AccountId, ExitStatus, Mailbox, MailboxId, MailboxType, SyncInterval};
use crate::wbxml::documents::FolderUpdate;

use super::{AttachmentRef, DirtyMessageRow, MessageRowState, Store, StoreEvent};

#[derive(Default, Clone)]
struct MessageRow {
    mailbox_id: MailboxId,
    send_failed: bool,
    attachments_loaded: bool,
    row_state: Option<MessageRowState>,
}

#[derive(Clone)]
struct AttachmentRow {
    message_id: i64,
    server_location: String,
    content_uri: Option<String>,
    mime_type: Option<String>,
    not_found: bool,
}

struct Inner {
    accounts: HashMap<AccountId, Account>,
    mailboxes: HashMap<MailboxId, Mailbox>,
    messages: HashMap<i64, MessageRow>,
    attachments: HashMap<i64, AttachmentRow>,
    next_mailbox_id: MailboxId,
    next_message_id: i64,
    next_attachment_id: i64,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    changes: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new(accounts: Vec<Account>) -> Self {
        let (changes, _) = broadcast::channel(32);
        let accounts = accounts.into_iter().map(|a| (a.id, a)).collect();
        Self {
            inner: Mutex::new(Inner {
                accounts,
                mailboxes: HashMap::new(),
                messages: HashMap::new(),
                attachments: HashMap::new(),
                next_mailbox_id: 1,
                next_message_id: 1,
                next_attachment_id: 1,
            }),
            changes,
        }
    }

    /// Test helper: seed a mailbox directly, bypassing FolderSync.
    pub fn insert_mailbox(&self, mut mailbox: Mailbox) -> MailboxId {
        let mut inner = self.inner.lock();
        let id = inner.next_mailbox_id;
        inner.next_mailbox_id += 1;
        mailbox.id = id;
        inner.mailboxes.insert(id, mailbox);
        id
    }

    /// Test helper: seed an outbox message row.
    pub fn insert_message(&self, mailbox_id: MailboxId, send_failed: bool, attachments_loaded: bool) -> i64 {
        let mut inner = self.inner.lock();
        let id = inner.next_message_id;
        inner.next_message_id += 1;
        inner.messages.insert(
            id,
            MessageRow {
                mailbox_id,
                send_failed,
                attachments_loaded,
                row_state: None,
            },
        );
        id
    }

    /// Test helper: mark a message row dirty for the upsync alarm to find.
    pub fn mark_message_dirty(&self, message_id: i64, state: MessageRowState) {
        let mut inner = self.inner.lock();
        if let Some(row) = inner.messages.get_mut(&message_id) {
            row.row_state = Some(state);
        }
    }

    /// Test helper: seed a pending attachment.
    pub fn insert_attachment(&self, message_id: i64, server_location: &str) -> i64 {
        let mut inner = self.inner.lock();
        let id = inner.next_attachment_id;
        inner.next_attachment_id += 1;
        inner.attachments.insert(
            id,
            AttachmentRow {
                message_id,
                server_location: server_location.to_string(),
                content_uri: None,
                mime_type: None,
                not_found: false,
            },
        );
        id
    }

    fn notify(&self, tables: &[&'static str]) {
        let _ = self.changes.send(StoreEvent {
            tables: std::sync::Arc::from(tables),
        });
    }
}

impl Store for MemoryStore {
    async fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.inner.lock().accounts.values().cloned().collect())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.inner.lock().accounts.get(&id).cloned())
    }

    async fn set_account_protocol_version(&self, id: AccountId, version: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account {id} not found"))?;
        account.protocol_version = Some(version.to_string());
        drop(inner);
        self.notify(&["accounts"]);
        Ok(())
    }

    async fn set_account_sync_key(&self, id: AccountId, key: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account {id} not found"))?;
        account.sync_key = key.to_string();
        drop(inner);
        self.notify(&["accounts"]);
        Ok(())
    }

    async fn set_account_security_hold(&self, id: AccountId, held: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account {id} not found"))?;
        account.flags.security_hold = held;
        drop(inner);
        self.notify(&["accounts"]);
        Ok(())
    }

    async fn list_mailboxes(&self, account_id: AccountId) -> Result<Vec<Mailbox>> {
        Ok(self
            .inner
            .lock()
            .mailboxes
            .values()
            .filter(|m| m.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn get_mailbox(&self, id: MailboxId) -> Result<Option<Mailbox>> {
        Ok(self.inner.lock().mailboxes.get(&id).cloned())
    }

    async fn find_mailbox_by_server_id(&self, account_id: AccountId, server_id: &str) -> Result<Option<Mailbox>> {
        Ok(self
            .inner
            .lock()
            .mailboxes
            .values()
            .find(|m| m.account_id == account_id && m.server_id.as_deref() == Some(server_id))
            .cloned())
    }

    async fn apply_folder_sync(&self, account_id: AccountId, updates: Vec<FolderUpdate>, deleted: Vec<String>) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut touched = false;

        for update in updates {
            if let Some(existing) = inner
                .mailboxes
                .values_mut()
                .find(|m| m.account_id == account_id && m.server_id.as_deref() == Some(update.server_id.as_str()))
            {
                existing.display_name = update.display_name;
                existing.mailbox_type = update.folder_type;
                touched = true;
            } else {
                let id = inner.next_mailbox_id;
                inner.next_mailbox_id += 1;
                inner.mailboxes.insert(
                    id,
                    Mailbox {
                        id,
                        account_id,
                        server_id: Some(update.server_id),
                        display_name: update.display_name,
                        mailbox_type: update.folder_type,
                        sync_interval: SyncInterval::Never,
                        sync_key: Mailbox::NEVER_SYNCED_KEY.to_string(),
                        last_sync_time: None,
                        sync_status: None,
                    },
                );
                touched = true;
            }
        }

        if !deleted.is_empty() {
            let before = inner.mailboxes.len();
            inner
                .mailboxes
                .retain(|_, m| !(m.account_id == account_id && m.server_id.as_deref().is_some_and(|s| deleted.contains(&s.to_string()))));
            touched |= inner.mailboxes.len() != before;
        }

        drop(inner);
        if touched {
            self.notify(&["mailboxes"]);
        }
        Ok(())
    }

    async fn set_mailbox_interval(&self, id: MailboxId, interval: SyncInterval) -> Result<()> {
        let mut inner = self.inner.lock();
        let mailbox = inner
            .mailboxes
            .get_mut(&id)
            .ok_or_else(|| anyhow!("mailbox {id} not found"))?;
        mailbox.sync_interval = interval;
        drop(inner);
        self.notify(&["mailboxes"]);
        Ok(())
    }

    async fn set_mailbox_sync_key(&self, id: MailboxId, key: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let mailbox = inner
            .mailboxes
            .get_mut(&id)
            .ok_or_else(|| anyhow!("mailbox {id} not found"))?;
        mailbox.sync_key = key.to_string();
        drop(inner);
        self.notify(&["mailboxes"]);
        Ok(())
    }

    async fn set_mailbox_sync_status(&self, id: MailboxId, mailbox_type: MailboxType, exit: ExitStatus, change_count: u32) -> Result<()> {
        let status = Mailbox::format_sync_status(mailbox_type, exit, change_count);
        let mut inner = self.inner.lock();
        let mailbox = inner
            .mailboxes
            .get_mut(&id)
            .ok_or_else(|| anyhow!("mailbox {id} not found"))?;
        mailbox.sync_status = Some(status);
        drop(inner);
        self.notify(&["mailboxes"]);
        Ok(())
    }

    async fn touch_mailbox_last_sync(&self, id: MailboxId) -> Result<()> {
        let mut inner = self.inner.lock();
        let mailbox = inner
            .mailboxes
            .get_mut(&id)
            .ok_or_else(|| anyhow!("mailbox {id} not found"))?;
        mailbox.last_sync_time = Some(chrono::Utc::now());
        drop(inner);
        self.notify(&["mailboxes"]);
        Ok(())
    }

    async fn release_push_holds(&self, account_id: AccountId) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut touched = false;
        for mailbox in inner.mailboxes.values_mut() {
            if mailbox.account_id == account_id && mailbox.sync_interval == SyncInterval::PushHold {
                mailbox.sync_interval = SyncInterval::Push;
                touched = true;
            }
        }
        drop(inner);
        if touched {
            self.notify(&["mailboxes"]);
        }
        Ok(())
    }

    async fn hold_pushable_mailboxes(&self, account_id: AccountId) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut touched = false;
        for mailbox in inner.mailboxes.values_mut() {
            if mailbox.account_id == account_id && matches!(mailbox.sync_interval, SyncInterval::Push | SyncInterval::Ping) {
                mailbox.sync_interval = SyncInterval::PushHold;
                touched = true;
            }
        }
        drop(inner);
        if touched {
            self.notify(&["mailboxes"]);
        }
        Ok(())
    }

    async fn outbox_has_sendable_message(&self, mailbox_id: MailboxId) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .messages
            .values()
            .any(|m| m.mailbox_id == mailbox_id && !m.send_failed && m.attachments_loaded))
    }

    async fn clear_send_failed_marker(&self, mailbox_id: MailboxId) -> Result<()> {
        let mut inner = self.inner.lock();
        for row in inner.messages.values_mut() {
            if row.mailbox_id == mailbox_id {
                row.send_failed = false;
            }
        }
        Ok(())
    }

    async fn drain_dirty_message_rows(&self) -> Result<Vec<DirtyMessageRow>> {
        let mut inner = self.inner.lock();
        let mut dirty = Vec::new();
        for row in inner.messages.values_mut() {
            if let Some(state) = row.row_state.take() {
                dirty.push(DirtyMessageRow {
                    mailbox_id: row.mailbox_id,
                    state,
                });
            }
        }
        Ok(dirty)
    }

    async fn get_attachment(&self, id: i64) -> Result<Option<AttachmentRef>> {
        Ok(self.inner.lock().attachments.get(&id).map(|row| AttachmentRef {
            message_id: row.message_id,
            server_location: row.server_location.clone(),
        }))
    }

    async fn set_attachment_downloaded(&self, id: i64, content_uri: &str, mime_type: Option<&str>) -> Result<()> {
        let mut inner = self.inner.lock();
        let attachment = inner
            .attachments
            .get_mut(&id)
            .ok_or_else(|| anyhow!("attachment {id} not found"))?;
        attachment.content_uri = Some(content_uri.to_string());
        attachment.mime_type = mime_type.map(str::to_string);
        Ok(())
    }

    async fn mark_attachment_not_found(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        let attachment = inner
            .attachments
            .get_mut(&id)
            .ok_or_else(|| anyhow!("attachment {id} not found"))?;
        attachment.not_found = true;
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StoreEvent> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountFlags, Credentials, SyncLookback};

    fn account(id: AccountId) -> Account {
        Account {
            id,
            display_name: "Work".into(),
            email_address: "user@example.com".into(),
            host: "mail.example.com".into(),
            credentials: Credentials {
                username: "user".into(),
                password: "hunter2".into(),
            },
            protocol_version: None,
            sync_key: Mailbox::NEVER_SYNCED_KEY.to_string(),
            sync_lookback: SyncLookback::OneWeek,
            flags: AccountFlags::default(),
        }
    }

    #[tokio::test]
    async fn outbox_sendability_requires_loaded_attachments() {
        let store = MemoryStore::new(vec![account(1)]);
        let mailbox_id = store.insert_mailbox(Mailbox {
            id: 0,
            account_id: 1,
            server_id: Some("5".into()),
            display_name: "Outbox".into(),
            mailbox_type: MailboxType::Outbox,
            sync_interval: SyncInterval::Push,
            sync_key: "1".into(),
            last_sync_time: None,
            sync_status: None,
        });

        assert!(!store.outbox_has_sendable_message(mailbox_id).await.unwrap());

        store.insert_message(mailbox_id, false, false);
        assert!(!store.outbox_has_sendable_message(mailbox_id).await.unwrap());

        store.insert_message(mailbox_id, false, true);
        assert!(store.outbox_has_sendable_message(mailbox_id).await.unwrap());
    }

    #[tokio::test]
    async fn push_hold_round_trips_through_folder_list_update() {
        let store = MemoryStore::new(vec![account(1)]);
        let mailbox_id = store.insert_mailbox(Mailbox {
            id: 0,
            account_id: 1,
            server_id: Some("5".into()),
            display_name: "Inbox".into(),
            mailbox_type: MailboxType::Inbox,
            sync_interval: SyncInterval::Push,
            sync_key: "1".into(),
            last_sync_time: None,
            sync_status: None,
        });

        store.hold_pushable_mailboxes(1).await.unwrap();
        assert_eq!(
            store.get_mailbox(mailbox_id).await.unwrap().unwrap().sync_interval,
            SyncInterval::PushHold
        );

        store.release_push_holds(1).await.unwrap();
        assert_eq!(
            store.get_mailbox(mailbox_id).await.unwrap().unwrap().sync_interval,
            SyncInterval::Push
        );
    }

    #[tokio::test]
    async fn drain_dirty_rows_clears_state() {
        let store = MemoryStore::new(vec![account(1)]);
        let mailbox_id = store.insert_mailbox(Mailbox {
            id: 0,
            account_id: 1,
            server_id: Some("5".into()),
            display_name: "Inbox".into(),
            mailbox_type: MailboxType::Inbox,
            sync_interval: SyncInterval::Push,
            sync_key: "1".into(),
            last_sync_time: None,
            sync_status: None,
        });
        let message_id = store.insert_message(mailbox_id, false, true);
        store.mark_message_dirty(message_id, MessageRowState::Updated);

        let dirty = store.drain_dirty_message_rows().await.unwrap();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].mailbox_id, mailbox_id);

        assert!(store.drain_dirty_message_rows().await.unwrap().is_empty());
    }
}
