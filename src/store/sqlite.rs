//! `sqlx`-backed `Store` implementation, following the teacher's
//! `repo::Repository`: a `SqlitePool` plus a `broadcast::Sender` for change
//! notification, `sqlx::migrate!` run on construction.

use anyhow::Context;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteQueryResult};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::model::{Account, AccountFlags, AccountId, Credentials, ExitStatus, Mailbox, MailboxId, MailboxType, SyncInterval, SyncLookback};
use crate::wbxml::documents::FolderUpdate;

use super::{AttachmentRef, DirtyMessageRow, MessageRowState, Store, StoreEvent};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub struct SqliteStore {
    pool: SqlitePool,
    changes: broadcast::Sender<StoreEvent>,
}

impl SqliteStore {
    pub async fn new(database_file: &str) -> anyhow::Result<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(database_file)
                .create_if_missing(true),
        )
        .await
        .context("failed to connect to the store database")?;

        MIGRATOR
            .run(&pool)
            .await
            .context("failed to run store migrations")?;

        let (changes, _) = broadcast::channel(32);
        Ok(Self { pool, changes })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn notify(&self, tables: &[&'static str]) {
        let _ = self.changes.send(StoreEvent {
            tables: Arc::from(tables),
        });
    }

    fn notify_if_affected(&self, result: SqliteQueryResult, tables: &[&'static str]) {
        if result.rows_affected() > 0 {
            self.notify(tables);
        }
    }
}

fn mailbox_type_to_int(t: MailboxType) -> i64 {
    match t {
        MailboxType::Account => 0,
        MailboxType::Inbox => 1,
        MailboxType::Outbox => 2,
        MailboxType::Drafts => 3,
        MailboxType::Trash => 4,
        MailboxType::Contacts => 5,
        MailboxType::Calendar => 6,
        MailboxType::Sent => 7,
        MailboxType::Other => 8,
    }
}

fn int_to_mailbox_type(v: i64) -> MailboxType {
    match v {
        0 => MailboxType::Account,
        1 => MailboxType::Inbox,
        2 => MailboxType::Outbox,
        3 => MailboxType::Drafts,
        4 => MailboxType::Trash,
        5 => MailboxType::Contacts,
        6 => MailboxType::Calendar,
        7 => MailboxType::Sent,
        _ => MailboxType::Other,
    }
}

fn lookback_to_int(l: SyncLookback) -> i64 {
    match l {
        SyncLookback::All => 0,
        SyncLookback::OneDay => 1,
        SyncLookback::ThreeDays => 2,
        SyncLookback::OneWeek => 3,
        SyncLookback::TwoWeeks => 4,
        SyncLookback::OneMonth => 5,
    }
}

fn int_to_lookback(v: i64) -> SyncLookback {
    match v {
        0 => SyncLookback::All,
        1 => SyncLookback::OneDay,
        2 => SyncLookback::ThreeDays,
        4 => SyncLookback::TwoWeeks,
        5 => SyncLookback::OneMonth,
        _ => SyncLookback::OneWeek,
    }
}

impl Store for SqliteStore {
    async fn list_accounts(&self) -> anyhow::Result<Vec<Account>> {
        let rows = sqlx::query!(
            "SELECT id, display_name, email_address, host, username, password,
                    protocol_version, sync_key, sync_lookback, flags
             FROM accounts"
        )
        .fetch_all(self.pool())
        .await
        .context("querying accounts")?;

        Ok(rows
            .into_iter()
            .map(|r| Account {
                id: r.id,
                display_name: r.display_name,
                email_address: r.email_address,
                host: r.host,
                credentials: Credentials {
                    username: r.username,
                    password: r.password,
                },
                protocol_version: r.protocol_version,
                sync_key: r.sync_key,
                sync_lookback: int_to_lookback(r.sync_lookback),
                flags: AccountFlags::from_bits(r.flags),
            })
            .collect())
    }

    async fn get_account(&self, id: AccountId) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query!(
            "SELECT id, display_name, email_address, host, username, password,
                    protocol_version, sync_key, sync_lookback, flags
             FROM accounts WHERE id = ?",
            id
        )
        .fetch_optional(self.pool())
        .await
        .context("querying account")?;

        Ok(row.map(|r| Account {
            id: r.id,
            display_name: r.display_name,
            email_address: r.email_address,
            host: r.host,
            credentials: Credentials {
                username: r.username,
                password: r.password,
            },
            protocol_version: r.protocol_version,
            sync_key: r.sync_key,
            sync_lookback: int_to_lookback(r.sync_lookback),
            flags: AccountFlags::from_bits(r.flags),
        }))
    }

    async fn set_account_protocol_version(&self, id: AccountId, version: &str) -> anyhow::Result<()> {
        sqlx::query!("UPDATE accounts SET protocol_version = ? WHERE id = ?", version, id)
            .execute(self.pool())
            .await
            .context("updating account protocol version")?;
        self.notify(&["accounts"]);
        Ok(())
    }

    async fn set_account_sync_key(&self, id: AccountId, key: &str) -> anyhow::Result<()> {
        sqlx::query!("UPDATE accounts SET sync_key = ? WHERE id = ?", key, id)
            .execute(self.pool())
            .await
            .context("updating account sync key")?;
        self.notify(&["accounts"]);
        Ok(())
    }

    async fn set_account_security_hold(&self, id: AccountId, held: bool) -> anyhow::Result<()> {
        // SECURITY_HOLD is bit 0x2 of the flags bitset.
        sqlx::query!(
            "UPDATE accounts SET flags = CASE WHEN ? THEN flags | 2 ELSE flags & ~2 END WHERE id = ?",
            held,
            id
        )
        .execute(self.pool())
        .await
        .context("updating account security hold")?;
        self.notify(&["accounts"]);
        Ok(())
    }

    async fn list_mailboxes(&self, account_id: AccountId) -> anyhow::Result<Vec<Mailbox>> {
        let rows = sqlx::query!(
            "SELECT id, account_id, server_id, display_name, type, sync_interval,
                    sync_key, last_sync_time, sync_status
             FROM mailboxes WHERE account_id = ?",
            account_id
        )
        .fetch_all(self.pool())
        .await
        .context("querying mailboxes")?;

        Ok(rows
            .into_iter()
            .map(|r| Mailbox {
                id: r.id,
                account_id: r.account_id,
                server_id: r.server_id,
                display_name: r.display_name,
                mailbox_type: int_to_mailbox_type(r.r#type),
                sync_interval: SyncInterval::from_raw(r.sync_interval).unwrap_or(SyncInterval::Never),
                sync_key: r.sync_key,
                last_sync_time: r.last_sync_time.and_then(|ms| chrono::DateTime::from_timestamp_millis(ms)),
                sync_status: r.sync_status,
            })
            .collect())
    }

    async fn get_mailbox(&self, id: MailboxId) -> anyhow::Result<Option<Mailbox>> {
        let row = sqlx::query!(
            "SELECT id, account_id, server_id, display_name, type, sync_interval,
                    sync_key, last_sync_time, sync_status
             FROM mailboxes WHERE id = ?",
            id
        )
        .fetch_optional(self.pool())
        .await
        .context("querying mailbox")?;

        Ok(row.map(|r| Mailbox {
            id: r.id,
            account_id: r.account_id,
            server_id: r.server_id,
            display_name: r.display_name,
            mailbox_type: int_to_mailbox_type(r.r#type),
            sync_interval: SyncInterval::from_raw(r.sync_interval).unwrap_or(SyncInterval::Never),
            sync_key: r.sync_key,
            last_sync_time: r.last_sync_time.and_then(|ms| chrono::DateTime::from_timestamp_millis(ms)),
            sync_status: r.sync_status,
        }))
    }

    async fn find_mailbox_by_server_id(&self, account_id: AccountId, server_id: &str) -> anyhow::Result<Option<Mailbox>> {
        let row = sqlx::query!(
            "SELECT id, account_id, server_id, display_name, type, sync_interval,
                    sync_key, last_sync_time, sync_status
             FROM mailboxes WHERE account_id = ? AND server_id = ?",
            account_id,
            server_id
        )
        .fetch_optional(self.pool())
        .await
        .context("querying mailbox by server id")?;

        Ok(row.map(|r| Mailbox {
            id: r.id,
            account_id: r.account_id,
            server_id: r.server_id,
            display_name: r.display_name,
            mailbox_type: int_to_mailbox_type(r.r#type),
            sync_interval: SyncInterval::from_raw(r.sync_interval).unwrap_or(SyncInterval::Never),
            sync_key: r.sync_key,
            last_sync_time: r.last_sync_time.and_then(|ms| chrono::DateTime::from_timestamp_millis(ms)),
            sync_status: r.sync_status,
        }))
    }

    async fn apply_folder_sync(&self, account_id: AccountId, updates: Vec<FolderUpdate>, deleted: Vec<String>) -> anyhow::Result<()> {
        let mut tx = self.pool().begin().await?;
        let mut touched = false;

        for update in &updates {
            let type_code = mailbox_type_to_int(update.folder_type);
            let result = sqlx::query!(
                "INSERT INTO mailboxes (account_id, server_id, display_name, type, sync_interval, sync_key)
                 VALUES (?, ?, ?, ?, -1, '0')
                 ON CONFLICT (account_id, server_id) DO UPDATE
                    SET display_name = excluded.display_name, type = excluded.type",
                account_id,
                update.server_id,
                update.display_name,
                type_code,
            )
            .execute(&mut *tx)
            .await
            .context("upserting mailbox from folder sync")?;
            touched |= result.rows_affected() > 0;
        }

        if !deleted.is_empty() {
            let ids = serde_json::to_string(&deleted).context("serializing deleted folder ids")?;
            let result = sqlx::query!(
                "DELETE FROM mailboxes WHERE account_id = ? AND server_id IN (SELECT value FROM json_each(?))",
                account_id,
                ids
            )
            .execute(&mut *tx)
            .await
            .context("deleting folders removed upstream")?;
            touched |= result.rows_affected() > 0;
        }

        tx.commit().await?;
        if touched {
            self.notify(&["mailboxes"]);
        }
        Ok(())
    }

    async fn set_mailbox_interval(&self, id: MailboxId, interval: SyncInterval) -> anyhow::Result<()> {
        let raw = interval.to_raw();
        let result = sqlx::query!("UPDATE mailboxes SET sync_interval = ? WHERE id = ?", raw, id)
            .execute(self.pool())
            .await
            .context("updating mailbox sync interval")?;
        self.notify_if_affected(result, &["mailboxes"]);
        Ok(())
    }

    async fn set_mailbox_sync_key(&self, id: MailboxId, key: &str) -> anyhow::Result<()> {
        sqlx::query!("UPDATE mailboxes SET sync_key = ? WHERE id = ?", key, id)
            .execute(self.pool())
            .await
            .context("updating mailbox sync key")?;
        self.notify(&["mailboxes"]);
        Ok(())
    }

    async fn set_mailbox_sync_status(&self, id: MailboxId, mailbox_type: MailboxType, exit: ExitStatus, change_count: u32) -> anyhow::Result<()> {
        let status = Mailbox::format_sync_status(mailbox_type, exit, change_count);
        sqlx::query!("UPDATE mailboxes SET sync_status = ? WHERE id = ?", status, id)
            .execute(self.pool())
            .await
            .context("updating mailbox sync status")?;
        self.notify(&["mailboxes"]);
        Ok(())
    }

    async fn touch_mailbox_last_sync(&self, id: MailboxId) -> anyhow::Result<()> {
        let now_millis = chrono::Utc::now().timestamp_millis();
        sqlx::query!("UPDATE mailboxes SET last_sync_time = ? WHERE id = ?", now_millis, id)
            .execute(self.pool())
            .await
            .context("touching mailbox last sync time")?;
        self.notify(&["mailboxes"]);
        Ok(())
    }

    async fn release_push_holds(&self, account_id: AccountId) -> anyhow::Result<()> {
        let push = SyncInterval::Push.to_raw();
        let push_hold = SyncInterval::PushHold.to_raw();
        let result = sqlx::query!(
            "UPDATE mailboxes SET sync_interval = ? WHERE account_id = ? AND sync_interval = ?",
            push,
            account_id,
            push_hold
        )
        .execute(self.pool())
        .await
        .context("releasing push holds")?;
        self.notify_if_affected(result, &["mailboxes"]);
        Ok(())
    }

    async fn hold_pushable_mailboxes(&self, account_id: AccountId) -> anyhow::Result<()> {
        let push = SyncInterval::Push.to_raw();
        let ping = SyncInterval::Ping.to_raw();
        let push_hold = SyncInterval::PushHold.to_raw();
        let result = sqlx::query!(
            "UPDATE mailboxes SET sync_interval = ? WHERE account_id = ? AND sync_interval IN (?, ?)",
            push_hold,
            account_id,
            push,
            ping
        )
        .execute(self.pool())
        .await
        .context("holding pushable mailboxes")?;
        self.notify_if_affected(result, &["mailboxes"]);
        Ok(())
    }

    async fn outbox_has_sendable_message(&self, mailbox_id: MailboxId) -> anyhow::Result<bool> {
        let row = sqlx::query!(
            "SELECT COUNT(*) AS count FROM messages
             WHERE mailbox_id = ? AND send_failed = 0 AND attachments_loaded = 1",
            mailbox_id
        )
        .fetch_one(self.pool())
        .await
        .context("querying sendable outbox messages")?;
        Ok(row.count > 0)
    }

    async fn clear_send_failed_marker(&self, mailbox_id: MailboxId) -> anyhow::Result<()> {
        sqlx::query!("UPDATE messages SET send_failed = 0 WHERE mailbox_id = ?", mailbox_id)
            .execute(self.pool())
            .await
            .context("clearing send-failed marker")?;
        Ok(())
    }

    async fn drain_dirty_message_rows(&self) -> anyhow::Result<Vec<DirtyMessageRow>> {
        let rows = sqlx::query!("SELECT mailbox_id, row_state FROM messages WHERE row_state != 0")
            .fetch_all(self.pool())
            .await
            .context("querying dirty message rows")?;

        let dirty = rows
            .into_iter()
            .map(|r| DirtyMessageRow {
                mailbox_id: r.mailbox_id,
                state: if r.row_state == 2 {
                    MessageRowState::Deleted
                } else {
                    MessageRowState::Updated
                },
            })
            .collect();

        sqlx::query!("UPDATE messages SET row_state = 0 WHERE row_state != 0")
            .execute(self.pool())
            .await
            .context("clearing dirty message rows")?;

        Ok(dirty)
    }

    async fn get_attachment(&self, id: i64) -> anyhow::Result<Option<AttachmentRef>> {
        let row = sqlx::query!("SELECT message_id, server_location FROM attachments WHERE id = ?", id)
            .fetch_optional(self.pool())
            .await
            .context("querying attachment")?;

        Ok(row.map(|r| AttachmentRef {
            message_id: r.message_id,
            server_location: r.server_location,
        }))
    }

    async fn set_attachment_downloaded(&self, id: i64, content_uri: &str, mime_type: Option<&str>) -> anyhow::Result<()> {
        sqlx::query!(
            "UPDATE attachments SET content_uri = ?, mime_type = ? WHERE id = ?",
            content_uri,
            mime_type,
            id
        )
        .execute(self.pool())
        .await
        .context("persisting attachment download")?;
        Ok(())
    }

    async fn mark_attachment_not_found(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query!("UPDATE attachments SET not_found = 1 WHERE id = ?", id)
            .execute(self.pool())
            .await
            .context("marking attachment not found")?;
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StoreEvent> {
        self.changes.subscribe()
    }
}
