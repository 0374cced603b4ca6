//! The orchestrator, `spec.md` §4.1: the single scheduling loop plus the
//! public operations that route user/system requests to per-mailbox
//! workers. Built last, per the dependency order in `spec.md` §2 (Store →
//! WBXML → HTTP → EAS driver → Request queue → Orchestrator), since it's the
//! only component that depends on all the others.
//!
//! Per `spec.md` §9 REDESIGN FLAGS there is no global singleton: one
//! `Arc<OrchestratorInner>` is built once in `main.rs` and cloned into every
//! task, mirroring the teacher's `ApiState`/`Repository` sharing pattern.

pub mod connectivity;
mod loop_;
mod observers;
pub mod registry;
pub mod sync_error;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::callbacks::CallbackHub;
use crate::credentials::AuthContext;
use crate::eas::{self, ping::PingReadiness, ping::PingStatusSource, WorkerKind};
use crate::http::HttpTransport;
use crate::model::{
    Account, AccountId, CallbackStatus, ExitStatus, Mailbox, MailboxId, MailboxType, SyncLookback, SyncReason,
};
use crate::request::{MeetingResponseKind, Request, RequestQueue};
use crate::store::Store;

use self::connectivity::Connectivity;
use self::registry::{WakeLockSet, WorkerRegistry};
use self::sync_error::SyncErrorMap;

/// Stand-ins for the Android platform flags `spec.md` §4.1.2 checks
/// (master/authority auto-sync, calendar events, background data). There's
/// no platform settings provider here, so these are process-wide and come
/// from `Config`.
#[derive(Debug, Clone, Copy)]
pub struct SyncPolicy {
    pub master_auto_sync: bool,
    pub contacts_auto_sync: bool,
    pub calendar_auto_sync: bool,
    pub calendar_events_enabled: bool,
    pub background_data: bool,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            master_auto_sync: true,
            contacts_auto_sync: true,
            calendar_auto_sync: true,
            calendar_events_enabled: true,
            background_data: true,
        }
    }
}

pub(crate) struct OrchestratorInner<S: Store> {
    store: Arc<S>,
    http: Arc<HttpTransport>,
    callbacks: CallbackHub,
    device_id: String,
    registry: WorkerRegistry,
    wake_locks: WakeLockSet,
    sync_errors: SyncErrorMap,
    connectivity: Connectivity,
    policy: SyncPolicy,
    kick_notify: Notify,
    account_cache: Mutex<HashMap<AccountId, SyncLookback>>,
}

/// Cheap to clone: an `Arc` around the shared state, `spec.md` §9.
pub struct Orchestrator<S: Store> {
    pub(crate) inner: Arc<OrchestratorInner<S>>,
}

impl<S: Store> Clone for Orchestrator<S> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<S: Store> Orchestrator<S> {
    pub fn new(store: Arc<S>, http: Arc<HttpTransport>, callbacks: CallbackHub, device_id: String, policy: SyncPolicy) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                store,
                http,
                callbacks,
                device_id,
                registry: WorkerRegistry::new(),
                wake_locks: WakeLockSet::new(),
                sync_errors: SyncErrorMap::new(),
                connectivity: Connectivity::new(),
                policy,
                kick_notify: Notify::new(),
                account_cache: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn callbacks(&self) -> &CallbackHub {
        &self.inner.callbacks
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.inner.connectivity
    }

    /// Spawn the scheduling loop and the observer fan-in as independent
    /// tasks, `spec.md` §4.1.1/§4.1.5.
    pub fn spawn_background_tasks(&self) -> (JoinHandle<()>, JoinHandle<()>) {
        let loop_handle = tokio::spawn(loop_::run(self.clone()));
        let observer_handle = observers::spawn(self.clone());
        (loop_handle, observer_handle)
    }

    fn auth_context(&self, account: &Account) -> AuthContext {
        AuthContext::new(&account.host, true, &account.credentials, &self.inner.device_id)
    }

    // -- Public operations, `spec.md` §4.1 --------------------------------

    #[instrument(skip(self))]
    pub async fn start_sync(&self, mailbox_id: MailboxId, reason: SyncReason) -> Result<()> {
        let Some(mailbox) = self.inner.store.get_mailbox(mailbox_id).await? else {
            return Ok(());
        };

        match mailbox.mailbox_type {
            MailboxType::Outbox => {
                self.inner.store.clear_send_failed_marker(mailbox_id).await?;
                self.kick();
            }
            MailboxType::Drafts | MailboxType::Trash => {
                self.inner.callbacks.mailbox_sync_status(mailbox_id, CallbackStatus::InProgress, 0);
                self.inner.callbacks.mailbox_sync_status(mailbox_id, CallbackStatus::Success, 100);
            }
            _ => {
                self.inner.sync_errors.remove(mailbox_id);
                self.request_worker(&mailbox, reason).await?;
            }
        }
        Ok(())
    }

    pub fn stop_sync(&self, mailbox_id: MailboxId) {
        self.inner.registry.stop(mailbox_id);
    }

    pub async fn load_attachment(
        &self,
        mailbox_id: MailboxId,
        attachment_id: i64,
        dest_path: Option<String>,
        content_uri: Option<String>,
    ) -> Result<()> {
        self.ensure_worker(mailbox_id).await?;
        if let Some(queue) = self.inner.registry.queue_of(mailbox_id) {
            queue.push(Request::AttachmentLoad {
                attachment_id,
                dest_path,
                content_uri,
            });
        }
        Ok(())
    }

    pub async fn move_message(&self, mailbox_id: MailboxId, message_id: i64, target_mailbox_id: MailboxId) -> Result<()> {
        self.ensure_worker(mailbox_id).await?;
        if let Some(queue) = self.inner.registry.queue_of(mailbox_id) {
            queue.push(Request::MessageMove { message_id, target_mailbox_id });
        }
        Ok(())
    }

    pub async fn send_meeting_response(&self, mailbox_id: MailboxId, message_id: i64, response: MeetingResponseKind) -> Result<()> {
        self.ensure_worker(mailbox_id).await?;
        if let Some(queue) = self.inner.registry.queue_of(mailbox_id) {
            queue.push(Request::MeetingResponse { message_id, response });
        }
        Ok(())
    }

    async fn ensure_worker(&self, mailbox_id: MailboxId) -> Result<()> {
        if self.inner.registry.exists(mailbox_id) {
            return Ok(());
        }
        let mailbox = self.inner.store.get_mailbox(mailbox_id).await?.context("mailbox not found")?;
        self.request_worker(&mailbox, SyncReason::UserRequest).await
    }

    #[instrument(skip(self))]
    pub async fn update_folder_list(&self, account_id: AccountId) -> Result<()> {
        let mailboxes = self.inner.store.list_mailboxes(account_id).await?;
        let ids: Vec<_> = mailboxes.iter().map(|m| m.id).collect();
        match mailboxes.iter().find(|m| m.mailbox_type == MailboxType::Account) {
            Some(account_mailbox) => self.inner.registry.stop_collection_workers_of_account(account_mailbox.id, &ids),
            None => self.inner.registry.stop_all_of_account(&ids),
        }
        self.inner.store.hold_pushable_mailboxes(account_id).await?;
        self.kick();
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn host_changed(&self, account_id: AccountId) -> Result<()> {
        self.inner.sync_errors.clear_fatal_for_account(account_id);
        let mailboxes = self.inner.store.list_mailboxes(account_id).await?;
        let ids: Vec<_> = mailboxes.iter().map(|m| m.id).collect();
        self.inner.registry.stop_all_of_account(&ids);
        self.kick();
        Ok(())
    }

    pub fn kick(&self) {
        self.inner.kick_notify.notify_waiters();
    }

    // -- Account reconciliation, `spec.md` §4.1.5 --------------------------

    pub(crate) async fn reconcile_accounts(&self) {
        let accounts = match self.inner.store.list_accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                tracing::error!(?err, "reconcile_accounts: list_accounts failed");
                return;
            }
        };

        let previous = self.inner.account_cache.lock().clone();
        let current_ids: std::collections::HashSet<AccountId> = accounts.iter().map(|a| a.id).collect();

        for &account_id in previous.keys() {
            if !current_ids.contains(&account_id) {
                tracing::info!(account_id, "account removed; stopping its workers");
                if let Ok(mailboxes) = self.inner.store.list_mailboxes(account_id).await {
                    let ids: Vec<_> = mailboxes.iter().map(|m| m.id).collect();
                    self.inner.registry.stop_all_of_account(&ids);
                }
                self.inner.sync_errors.release_holds(None, Some(account_id));
            }
        }

        for account in &accounts {
            match previous.get(&account.id) {
                None => tracing::info!(account_id = account.id, "new account observed"),
                Some(previous_lookback) if *previous_lookback != account.sync_lookback => {
                    tracing::info!(account_id = account.id, "account lookback changed; restarting its workers");
                    if let Ok(mailboxes) = self.inner.store.list_mailboxes(account.id).await {
                        let ids: Vec<_> = mailboxes.iter().map(|m| m.id).collect();
                        self.inner.registry.stop_all_of_account(&ids);
                    }
                }
                _ => {}
            }
        }

        *self.inner.account_cache.lock() = accounts.iter().map(|a| (a.id, a.sync_lookback)).collect();
        self.kick();
    }

    /// The debounced upsync alarm, `spec.md` §4.1.5: enumerate dirty message
    /// rows, collect mailbox ids, `serviceRequest(mailboxId, UPSYNC)` each.
    pub(crate) async fn fire_upsync_alarm(&self) {
        match self.inner.store.drain_dirty_message_rows().await {
            Ok(rows) => {
                let mailbox_ids: std::collections::HashSet<MailboxId> = rows.into_iter().map(|r| r.mailbox_id).collect();
                for mailbox_id in mailbox_ids {
                    if let Err(err) = self.start_sync(mailbox_id, SyncReason::Upsync).await {
                        tracing::error!(?err, mailbox_id, "upsync start_sync failed");
                    }
                }
            }
            Err(err) => tracing::error!(?err, "drain_dirty_message_rows failed"),
        }
    }

    // -- Worker lifecycle, `spec.md` §4.1.3 --------------------------------

    async fn request_worker(&self, mailbox: &Mailbox, reason: SyncReason) -> Result<()> {
        if !self.inner.connectivity.is_online() {
            return Ok(());
        }
        if self.inner.registry.exists(mailbox.id) {
            return Ok(());
        }

        let account = self.inner.store.get_account(mailbox.account_id).await?.context("account missing for mailbox")?;
        self.inner.sync_errors.remember_account(mailbox.id, mailbox.account_id);

        let kind = if mailbox.mailbox_type == MailboxType::Account {
            WorkerKind::AccountMailbox
        } else if mailbox.mailbox_type == MailboxType::Outbox {
            WorkerKind::Outbox
        } else {
            WorkerKind::Collection
        };

        tracing::info!(mailbox_id = mailbox.id, reason = %reason, kind = ?kind, "starting worker");
        self.inner.wake_locks.run_awake(mailbox.id);

        let cancel = CancellationToken::new();
        let queue = Arc::new(RequestQueue::new());
        let orchestrator = self.clone();
        let mailbox_owned = mailbox.clone();
        let cancel_for_task = cancel.clone();
        let queue_for_task = queue.clone();
        let join = tokio::spawn(async move {
            orchestrator.run_worker(kind, account, mailbox_owned, cancel_for_task, queue_for_task).await;
        });

        self.inner.registry.insert(mailbox.id, cancel, join, queue);

        if kind != WorkerKind::AccountMailbox {
            // §4.1.3 says to interrupt the account-mailbox worker's Ping so it
            // picks up the new folder immediately. That would need the Ping
            // loop's in-flight HTTP call to be individually cancellable, which
            // it isn't; kicking the scheduling loop is the closest available
            // signal, and the new folder is otherwise picked up on the account
            // worker's next Ping enumeration (see `DESIGN.md`).
            self.kick();
        }
        Ok(())
    }

    #[instrument(skip_all, fields(mailbox_id = mailbox.id, kind = ?kind))]
    async fn run_worker(&self, kind: WorkerKind, account: Account, mailbox: Mailbox, cancel: CancellationToken, queue: Arc<RequestQueue>) {
        let auth = self.auth_context(&account);
        let client = self.inner.http.client().clone();

        let exit = match kind {
            WorkerKind::AccountMailbox => {
                let mut heartbeat = eas::heartbeat::HeartbeatController::new();
                loop {
                    if cancel.is_cancelled() {
                        break ExitStatus::Done;
                    }
                    match eas::run_account_mailbox(
                        &client,
                        &auth,
                        self.inner.store.as_ref(),
                        &self.inner.callbacks,
                        self,
                        &cancel,
                        account.id,
                        &mut heartbeat,
                    )
                    .await
                    {
                        Ok(ExitStatus::Done) => {
                            if cancel.is_cancelled() {
                                break ExitStatus::Done;
                            }
                            continue;
                        }
                        Ok(other) => break other,
                        Err(err) => {
                            tracing::error!(?err, "account-mailbox worker failed");
                            break ExitStatus::Exception;
                        }
                    }
                }
            }
            WorkerKind::Collection => match eas::run_collection(&client, &auth, self.inner.store.as_ref(), &self.inner.callbacks, &queue, &cancel, &mailbox).await {
                Ok(exit) => exit,
                Err(err) => {
                    tracing::error!(?err, "collection worker failed");
                    ExitStatus::Exception
                }
            },
            WorkerKind::Outbox => match eas::run_outbox(self.inner.store.as_ref(), &self.inner.callbacks, mailbox.id).await {
                Ok(exit) => exit,
                Err(err) => {
                    tracing::error!(?err, "outbox worker failed");
                    ExitStatus::Exception
                }
            },
        };

        self.record_worker_exit(mailbox.id, exit);
    }

    /// `spec.md` §4.1.4's SyncError table, applied on worker completion.
    fn record_worker_exit(&self, mailbox_id: MailboxId, exit: ExitStatus) {
        self.inner.sync_errors.on_worker_exit(mailbox_id, exit);
        if exit == ExitStatus::Done {
            self.inner.http.reset_shutdown_count();
        }
        self.inner.registry.remove(mailbox_id);
        self.inner.wake_locks.run_asleep(mailbox_id);
        tracing::info!(mailbox_id, exit = %exit, "worker exited");
        self.kick();
    }
}

impl<S: Store> PingStatusSource for Orchestrator<S> {
    fn ping_status(&self, mailbox_id: MailboxId) -> PingReadiness {
        if self.inner.registry.exists(mailbox_id) {
            return PingReadiness::Running;
        }
        if let Some(err) = self.inner.sync_errors.get(mailbox_id) {
            if err.fatal {
                return PingReadiness::Unable;
            }
            if let Some(hold_end) = err.hold_end_time {
                if Instant::now() < hold_end {
                    return PingReadiness::Waiting;
                }
            }
        }
        PingReadiness::Ok
    }

    fn start_manual_sync(&self, mailbox_id: MailboxId) {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            if let Err(err) = orchestrator.start_sync(mailbox_id, SyncReason::Ping).await {
                tracing::error!(?err, mailbox_id, "start_manual_sync failed");
            }
        });
    }

    fn kick(&self) {
        Orchestrator::kick(self);
    }
}
