//! The single scheduling loop and `checkMailboxes`, `spec.md` §4.1.1/§4.1.2.

use std::time::{Duration, Instant};

use anyhow::Result;

use crate::model::{MailboxType, Mailbox, SyncInterval, SyncReason};
use crate::store::Store;

use super::Orchestrator;

const MIN_SHRINK: Duration = Duration::from_millis(250);
const MAX_SHRINK: Duration = Duration::from_secs(11 * 60);
const IDLE_WAIT: Duration = Duration::from_secs(10 * 60);
const ALARM_LEAD: Duration = Duration::from_secs(3);
/// How overdue a worker alarm must be before `checkMailboxes` concludes the
/// worker is wedged on a stuck socket rather than merely busy, and reaches
/// for the `spec.md` §4.5 "break glass" transport shutdown.
const ALARM_WEDGED_GRACE: Duration = Duration::from_secs(2 * 60);

pub struct CheckResult {
    pub next_wait: Duration,
    pub reason: String,
}

fn shrink(next_wait: &mut Duration, reason: &mut String, candidate: Duration, candidate_reason: impl Into<String>) {
    let candidate = candidate.clamp(MIN_SHRINK, MAX_SHRINK);
    if candidate < *next_wait {
        *next_wait = candidate;
        *reason = candidate_reason.into();
    }
}

/// `spec.md` §4.1.2. Iterates every EAS mailbox with interval ≠ NEVER plus
/// all OUTBOXes, ordered by id, deciding what must run, what may sleep, and
/// for how long.
pub async fn check_mailboxes<S: Store>(orchestrator: &Orchestrator<S>) -> Result<CheckResult> {
    let accounts = orchestrator.inner.store.list_accounts().await?;
    let mut mailboxes: Vec<Mailbox> = Vec::new();
    for account in &accounts {
        mailboxes.extend(orchestrator.inner.store.list_mailboxes(account.id).await?);
    }
    mailboxes.sort_by_key(|m| m.id);

    let mut next_wait = IDLE_WAIT;
    let mut reason = "idle".to_string();

    for mailbox in &mailboxes {
        if mailbox.sync_interval == SyncInterval::Never && mailbox.mailbox_type != MailboxType::Outbox {
            continue;
        }

        if orchestrator.inner.registry.exists(mailbox.id) {
            if orchestrator.inner.registry.reap_if_dead(mailbox.id) {
                shrink(&mut next_wait, &mut reason, Duration::from_secs(3), "clean up dead thread(s)");
                continue;
            }
            if let Some(request_time) = orchestrator.inner.registry.request_time(mailbox.id) {
                let now = Instant::now();
                if request_time <= now {
                    if now.duration_since(request_time) >= ALARM_WEDGED_GRACE {
                        tracing::warn!(mailbox_id = mailbox.id, "worker alarm unhonored past grace period; forcing HTTP transport shutdown");
                        orchestrator.inner.http.shutdown();
                    }
                    shrink(&mut next_wait, &mut reason, MIN_SHRINK, "fire worker alarm");
                } else {
                    shrink(&mut next_wait, &mut reason, request_time - now, "worker alarm pending");
                }
            }
            continue;
        }

        match mailbox.mailbox_type {
            MailboxType::Contacts => {
                if !(orchestrator.inner.policy.master_auto_sync && orchestrator.inner.policy.contacts_auto_sync) {
                    continue;
                }
            }
            MailboxType::Calendar => {
                if !(orchestrator.inner.policy.master_auto_sync
                    && orchestrator.inner.policy.calendar_auto_sync
                    && orchestrator.inner.policy.calendar_events_enabled)
                {
                    continue;
                }
            }
            _ => {}
        }

        if !orchestrator.inner.policy.background_data && mailbox.mailbox_type != MailboxType::Outbox {
            continue;
        }

        if let Some(err) = orchestrator.inner.sync_errors.get(mailbox.id) {
            if err.fatal {
                continue;
            }
            if let Some(hold_end) = err.hold_end_time {
                let now = Instant::now();
                if now < hold_end {
                    shrink(&mut next_wait, &mut reason, hold_end - now, "Release hold");
                    continue;
                }
            }
            orchestrator.inner.sync_errors.clear_hold_end_time(mailbox.id);
        }

        if mailbox.sync_interval == SyncInterval::Push {
            orchestrator.request_worker(mailbox, SyncReason::Push).await?;
            continue;
        }

        if mailbox.mailbox_type == MailboxType::Outbox {
            if orchestrator.inner.store.outbox_has_sendable_message(mailbox.id).await? {
                orchestrator.request_worker(mailbox, SyncReason::Scheduled).await?;
            }
            continue;
        }

        if let SyncInterval::Minutes(interval_minutes) = mailbox.sync_interval {
            let interval = chrono::Duration::minutes(interval_minutes as i64);
            match mailbox.last_sync_time {
                None => {
                    orchestrator.request_worker(mailbox, SyncReason::Scheduled).await?;
                }
                Some(last) => {
                    let elapsed = chrono::Utc::now().signed_duration_since(last);
                    if elapsed >= interval {
                        orchestrator.request_worker(mailbox, SyncReason::Scheduled).await?;
                    } else if let Ok(delta) = (interval - elapsed).to_std() {
                        shrink(&mut next_wait, &mut reason, delta, format!("Scheduled sync, {}", mailbox.display_name));
                    }
                }
            }
        }
    }

    Ok(CheckResult { next_wait, reason })
}

/// `spec.md` §4.1.1: the single scheduling loop, spawned once from `main.rs`.
pub async fn run<S: Store>(orchestrator: Orchestrator<S>) {
    loop {
        if !orchestrator.inner.connectivity.is_online() {
            tracing::info!("connectivity lost; stopping all workers and waiting to reconnect");
            orchestrator.inner.registry.stop_all();
            orchestrator.inner.connectivity.wait_for_reconnect().await;
            let released = orchestrator.inner.sync_errors.release_holds(Some(super::sync_error::SyncErrorReason::Io), None);
            if !released.is_empty() {
                tracing::info!(count = released.len(), "released IO-error holds on reconnect");
            }
            continue;
        }

        let check = match check_mailboxes(&orchestrator).await {
            Ok(check) => check,
            Err(err) => {
                tracing::error!(?err, "checkMailboxes failed");
                CheckResult {
                    next_wait: Duration::from_secs(30),
                    reason: "checkMailboxes error".to_string(),
                }
            }
        };

        tracing::info!(next_wait_secs = check.next_wait.as_secs(), reason = %check.reason, "scheduling loop");

        let wait = if check.next_wait > Duration::from_secs(10) {
            check.next_wait + ALARM_LEAD
        } else {
            check.next_wait
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = orchestrator.inner.kick_notify.notified() => {
                tracing::debug!("scheduling loop kicked");
            }
        }
    }
}
