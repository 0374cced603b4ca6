//! The store abstraction, `spec.md` §3/§9: "the on-disk message/mailbox/
//! account store (a relational content provider)" is treated as an external
//! collaborator specified only by the interface the core consumes. This
//! module is that interface plus the one concrete backend (`sqlite`) the
//! binary actually runs, following the teacher's `repo/` layer
//! (`sqlx`-backed, `tokio::sync::broadcast` change notifications). A
//! `memory` backend exists purely for orchestrator/driver unit tests, the
//! way `ferrex-config`'s tests avoid touching a real service.

pub mod memory;
pub mod sqlite;

use crate::model::{Account, AccountId, ExitStatus, Mailbox, MailboxId, MailboxType, SyncInterval};
use crate::wbxml::documents::FolderUpdate;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Emitted whenever a store table changes; the orchestrator's observer
/// fan-in (`spec.md` §4.1.5) subscribes to this instead of Android
/// `ContentObserver` callbacks.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub tables: Arc<[&'static str]>,
}

impl StoreEvent {
    pub fn touches(&self, table: &str) -> bool {
        self.tables.iter().any(|t| *t == table)
    }
}

/// A message row touched by the "synced"/"all" message observers of
/// `spec.md` §4.1.5, enumerated by the upsync alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRowState {
    Updated,
    Deleted,
}

pub struct DirtyMessageRow {
    pub mailbox_id: MailboxId,
    pub state: MessageRowState,
}

/// What `GetAttachment` needs to address the server and report back,
/// `spec.md` §4.2.6/§4.3.
pub struct AttachmentRef {
    pub message_id: i64,
    pub server_location: String,
}

/// The store interface every orchestrator/driver operation is written
/// against. Implemented by `sqlite::SqliteStore` (the real backend) and
/// `memory::MemoryStore` (tests).
pub trait Store: Send + Sync + 'static {
    // -- Accounts -----------------------------------------------------------
    fn list_accounts(&self) -> impl Future<Output = Result<Vec<Account>>> + Send;
    fn get_account(&self, id: AccountId) -> impl Future<Output = Result<Option<Account>>> + Send;
    fn set_account_protocol_version(
        &self,
        id: AccountId,
        version: &str,
    ) -> impl Future<Output = Result<()>> + Send;
    fn set_account_sync_key(&self, id: AccountId, key: &str) -> impl Future<Output = Result<()>> + Send;
    fn set_account_security_hold(&self, id: AccountId, held: bool) -> impl Future<Output = Result<()>> + Send;

    // -- Mailboxes ------------------------------------------------------------
    fn list_mailboxes(&self, account_id: AccountId) -> impl Future<Output = Result<Vec<Mailbox>>> + Send;
    fn get_mailbox(&self, id: MailboxId) -> impl Future<Output = Result<Option<Mailbox>>> + Send;
    fn find_mailbox_by_server_id(
        &self,
        account_id: AccountId,
        server_id: &str,
    ) -> impl Future<Output = Result<Option<Mailbox>>> + Send;

    /// Apply the folder list diff from a successful FolderSync: insert/update
    /// folders, create an account-mailbox-owned hierarchy as needed.
    /// `spec.md` §3: "a hidden, non-visible mailbox of type ACCOUNT".
    fn apply_folder_sync(
        &self,
        account_id: AccountId,
        updates: Vec<FolderUpdate>,
        deleted: Vec<String>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn set_mailbox_interval(
        &self,
        id: MailboxId,
        interval: SyncInterval,
    ) -> impl Future<Output = Result<()>> + Send;
    fn set_mailbox_sync_key(&self, id: MailboxId, key: &str) -> impl Future<Output = Result<()>> + Send;
    fn set_mailbox_sync_status(
        &self,
        id: MailboxId,
        mailbox_type: MailboxType,
        exit: ExitStatus,
        change_count: u32,
    ) -> impl Future<Output = Result<()>> + Send;
    fn touch_mailbox_last_sync(&self, id: MailboxId) -> impl Future<Output = Result<()>> + Send;

    /// Flip every PUSH_HOLD mailbox of an account to PUSH, `spec.md` §4.2.2.
    fn release_push_holds(&self, account_id: AccountId) -> impl Future<Output = Result<()>> + Send;
    /// Flip every PUSH/PING mailbox of an account to PUSH_HOLD, `spec.md` §4.1
    /// `updateFolderList`.
    fn hold_pushable_mailboxes(&self, account_id: AccountId) -> impl Future<Output = Result<()>> + Send;

    // -- Outbox -----------------------------------------------------------------
    /// `spec.md` §4.1.2: "query whether any message lacks the send-failed
    /// marker and has all attachments loaded".
    fn outbox_has_sendable_message(&self, mailbox_id: MailboxId) -> impl Future<Output = Result<bool>> + Send;
    /// `spec.md` §4.1: `startSync` on OUTBOX clears the send-failed marker.
    fn clear_send_failed_marker(&self, mailbox_id: MailboxId) -> impl Future<Output = Result<()>> + Send;

    // -- Upsync -------------------------------------------------------------
    /// Enumerate and clear `DELETED`/`UPDATED` message rows for the upsync
    /// alarm, `spec.md` §4.1.5.
    fn drain_dirty_message_rows(&self) -> impl Future<Output = Result<Vec<DirtyMessageRow>>> + Send;

    // -- Attachments ----------------------------------------------------------
    /// Look up the EAS `server_location` a queued `AttachmentLoad` request
    /// needs to issue `GetAttachment`, `spec.md` §4.2.6/§4.3.
    fn get_attachment(&self, id: i64) -> impl Future<Output = Result<Option<AttachmentRef>>> + Send;
    /// Persist a successful download's destination and MIME type, `spec.md`
    /// §4.2.6.
    fn set_attachment_downloaded(&self, id: i64, content_uri: &str, mime_type: Option<&str>) -> impl Future<Output = Result<()>> + Send;
    /// The server reported the attachment missing; `spec.md` §6's
    /// `MESSAGE_NOT_FOUND` callback status.
    fn mark_attachment_not_found(&self, id: i64) -> impl Future<Output = Result<()>> + Send;

    // -- Change notification --------------------------------------------------
    fn subscribe_changes(&self) -> broadcast::Receiver<StoreEvent>;
}
