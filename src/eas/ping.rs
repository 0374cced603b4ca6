//! Adaptive Ping loop, `spec.md` §4.2.3–§4.2.5. Runs inside the
//! account-mailbox worker with a 30 minute outer deadline per iteration.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::callbacks::CallbackHub;
use crate::credentials::AuthContext;
use crate::error::is_reset_by_peer;
use crate::model::{AccountId, CallbackStatus, MailboxId, MailboxType, SyncInterval};
use crate::store::Store;
use crate::wbxml::documents::{build_ping_request, parse_ping_response, PingFolderRef, PingStatus};

use super::heartbeat::HeartbeatController;

const OUTER_DEADLINE: Duration = Duration::from_secs(30 * 60);
const NOT_READY_RETRY: Duration = Duration::from_secs(10);
const IDLE_SLEEP: Duration = Duration::from_secs(30 * 60);

/// What the orchestrator's worker registry reports for a candidate mailbox
/// when the Ping loop asks whether to include it, `spec.md` §4.2.3 step 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingReadiness {
    Running,
    Waiting,
    Ok,
    Unable,
}

/// The driver's view into the orchestrator it's otherwise decoupled from:
/// implemented by the orchestrator's registry, consumed here so the EAS
/// driver doesn't depend on orchestrator internals.
pub trait PingStatusSource: Send + Sync {
    fn ping_status(&self, mailbox_id: MailboxId) -> PingReadiness;
    /// `startManualSync(mailboxId, PING)`, `spec.md` §4.2.4.
    fn start_manual_sync(&self, mailbox_id: MailboxId);
    /// Wake the loop, used by the spurious-change defense after re-scheduling
    /// a folder's interval, `spec.md` §4.2.5.
    fn kick(&self);
}

pub enum PingLoopOutcome {
    DeadlineReached,
    LoginFailure,
    IoError,
    Stopped,
}

struct SpuriousDefense {
    zero_change_counts: HashMap<MailboxId, u32>,
}

impl SpuriousDefense {
    fn new() -> Self {
        Self {
            zero_change_counts: HashMap::new(),
        }
    }

    /// Returns `true` if this mailbox should be backed off.
    fn observe(&mut self, mailbox_id: MailboxId, sync_status: Option<&str>) -> bool {
        let zero_change = crate::model::Mailbox::parse_sync_status(sync_status.unwrap_or_default())
            .map(|(_, _, count)| count == 0)
            .unwrap_or(false);

        if zero_change {
            let counter = self.zero_change_counts.entry(mailbox_id).or_insert(0);
            *counter += 1;
            *counter > 1
        } else {
            self.zero_change_counts.remove(&mailbox_id);
            false
        }
    }
}

#[instrument(skip_all, fields(account_id))]
pub async fn run_ping_loop<S: Store>(
    client: &Client,
    auth: &AuthContext,
    store: &S,
    callbacks: &CallbackHub,
    status_source: &dyn PingStatusSource,
    cancel: &CancellationToken,
    account_id: AccountId,
    heartbeat: &mut HeartbeatController,
) -> Result<PingLoopOutcome> {
    let deadline = Instant::now() + OUTER_DEADLINE;
    let mut defense = SpuriousDefense::new();

    while Instant::now() < deadline {
        if cancel.is_cancelled() {
            return Ok(PingLoopOutcome::Stopped);
        }

        let mailboxes = store.list_mailboxes(account_id).await?;
        let candidates: Vec<_> = mailboxes
            .iter()
            .filter(|m| {
                matches!(m.sync_interval, SyncInterval::Push | SyncInterval::Ping) && m.mailbox_type != MailboxType::Account
            })
            .collect();

        let mut push_count = 0usize;
        let mut ready_folders = Vec::new();
        for mailbox in &candidates {
            match status_source.ping_status(mailbox.id) {
                PingReadiness::Running => push_count += 1,
                PingReadiness::Waiting => {}
                PingReadiness::Unable => {
                    tracing::warn!(mailbox_id = mailbox.id, "mailbox unable to Ping; skipping this cycle");
                }
                PingReadiness::Ok => {
                    push_count += 1;
                    if mailbox.sync_key != crate::model::Mailbox::NEVER_SYNCED_KEY {
                        if let Some(class) = mailbox.mailbox_type.collection_class() {
                            if let Some(server_id) = mailbox.server_id.as_deref() {
                                ready_folders.push((mailbox.id, server_id.to_string(), class));
                            }
                        }
                    }
                }
            }
        }

        let can_push_count = ready_folders.len();

        if can_push_count == push_count && push_count > 0 {
            let folder_refs: Vec<PingFolderRef> = ready_folders
                .iter()
                .map(|(_, server_id, class)| PingFolderRef {
                    server_id,
                    class,
                })
                .collect();
            let body = build_ping_request(heartbeat.heartbeat_secs(), &folder_refs);

            let result = tokio::time::timeout(
                heartbeat.read_timeout(),
                client
                    .post(auth.command_url("Ping"))
                    .header(reqwest::header::AUTHORIZATION, &auth.authorization_header)
                    .header(reqwest::header::CONTENT_TYPE, "application/vnd.ms-sync.wbxml")
                    .body(body)
                    .send(),
            )
            .await;

            let response = match result {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    if is_reset_by_peer(&anyhow::Error::new(err)) {
                        heartbeat.on_reset_by_peer();
                        continue;
                    }
                    return Err(anyhow::anyhow!("Ping request failed"));
                }
                Err(_timeout) => {
                    // A plain read-timeout elapsing carries no "reset by
                    // peer" message, so it isn't the NAT-timeout case of
                    // `spec.md` §4.2.3 step 6 and must propagate as a real
                    // failure rather than being absorbed into a heartbeat
                    // drop.
                    return Ok(PingLoopOutcome::IoError);
                }
            };

            let status = response.status().as_u16();
            if status == 401 || status == 403 {
                return Ok(PingLoopOutcome::LoginFailure);
            }
            if status != 200 {
                return Ok(PingLoopOutcome::IoError);
            }

            let bytes = response.bytes().await.context("reading Ping response body")?;
            if bytes.is_empty() {
                return Ok(PingLoopOutcome::IoError);
            }

            let parsed = parse_ping_response(&bytes)?;
            match parsed.status {
                PingStatus::Completed => {
                    heartbeat.on_completed();
                }
                PingStatus::ChangesFound => {
                    for server_id in &parsed.changed_folder_ids {
                        if let Some((mailbox_id, _, _)) = ready_folders.iter().find(|(_, sid, _)| sid == server_id) {
                            let mailbox = mailboxes.iter().find(|m| m.id == *mailbox_id);
                            let back_off = defense.observe(*mailbox_id, mailbox.and_then(|m| m.sync_status.as_deref()));
                            if back_off {
                                let minutes = if mailbox.map(|m| m.mailbox_type) == Some(MailboxType::Inbox) { 5 } else { 30 };
                                store
                                    .set_mailbox_interval(*mailbox_id, SyncInterval::Minutes(minutes))
                                    .await?;
                                status_source.kick();
                            } else {
                                status_source.start_manual_sync(*mailbox_id);
                                callbacks.mailbox_sync_status(*mailbox_id, CallbackStatus::InProgress, 0);
                            }
                        }
                    }
                }
                PingStatus::Other(code) => {
                    tracing::warn!(code, "unexpected Ping status code");
                }
            }
        } else if push_count > 0 {
            tokio::select! {
                _ = tokio::time::sleep(NOT_READY_RETRY) => {}
                _ = cancel.cancelled() => return Ok(PingLoopOutcome::Stopped),
            }
        } else {
            tokio::select! {
                _ = tokio::time::sleep(IDLE_SLEEP) => {}
                _ = cancel.cancelled() => return Ok(PingLoopOutcome::Stopped),
            }
        }
    }

    Ok(PingLoopOutcome::DeadlineReached)
}
