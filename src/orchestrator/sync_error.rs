//! SyncError map and escalation policy, `spec.md` §4.1.4.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::model::{AccountId, ExitStatus, MailboxId};

const INITIAL_HOLD: Duration = Duration::from_secs(15);
const MAX_HOLD: Duration = Duration::from_secs(4 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorReason {
    Io,
    Security,
    Login,
    Exception,
}

impl SyncErrorReason {
    fn from_exit_status(status: ExitStatus) -> Option<Self> {
        match status {
            ExitStatus::Done => None,
            ExitStatus::IoError => Some(Self::Io),
            ExitStatus::SecurityFailure => Some(Self::Security),
            ExitStatus::LoginFailure => Some(Self::Login),
            ExitStatus::Exception => Some(Self::Exception),
        }
    }

    fn is_fatal(self) -> bool {
        matches!(self, Self::Security | Self::Login | Self::Exception)
    }
}

#[derive(Debug, Clone)]
pub struct SyncError {
    pub reason: SyncErrorReason,
    pub fatal: bool,
    pub hold_delay: Duration,
    pub hold_end_time: Option<Instant>,
}

/// Per-mailbox failure bookkeeping, owned exclusively by the orchestrator
/// (`spec.md` §3 ownership rules).
pub struct SyncErrorMap {
    errors: Mutex<HashMap<MailboxId, SyncError>>,
    account_of: Mutex<HashMap<MailboxId, AccountId>>,
}

impl SyncErrorMap {
    pub fn new() -> Self {
        Self {
            errors: Mutex::new(HashMap::new()),
            account_of: Mutex::new(HashMap::new()),
        }
    }

    pub fn remember_account(&self, mailbox_id: MailboxId, account_id: AccountId) {
        self.account_of.lock().insert(mailbox_id, account_id);
    }

    /// Apply `spec.md` §4.1.4's table on worker completion.
    pub fn on_worker_exit(&self, mailbox_id: MailboxId, exit: ExitStatus) {
        let Some(reason) = SyncErrorReason::from_exit_status(exit) else {
            self.errors.lock().remove(&mailbox_id);
            return;
        };

        let mut errors = self.errors.lock();
        match errors.get_mut(&mailbox_id) {
            None => {
                errors.insert(
                    mailbox_id,
                    SyncError {
                        reason,
                        fatal: reason.is_fatal(),
                        hold_delay: INITIAL_HOLD,
                        hold_end_time: if reason.is_fatal() { None } else { Some(Instant::now() + INITIAL_HOLD) },
                    },
                );
            }
            Some(existing) if existing.reason == reason && !reason.is_fatal() => {
                existing.hold_delay = (existing.hold_delay * 2).min(MAX_HOLD);
                existing.hold_end_time = Some(Instant::now() + existing.hold_delay);
            }
            Some(existing) => {
                existing.reason = reason;
                existing.fatal = reason.is_fatal();
                existing.hold_delay = INITIAL_HOLD;
                existing.hold_end_time = if reason.is_fatal() { None } else { Some(Instant::now() + INITIAL_HOLD) };
            }
        }
    }

    pub fn get(&self, mailbox_id: MailboxId) -> Option<SyncError> {
        self.errors.lock().get(&mailbox_id).cloned()
    }

    /// Clear the hold end-time but retain the record, `spec.md` §4.1.2: "else
    /// clear the end-time but retain the error record."
    pub fn clear_hold_end_time(&self, mailbox_id: MailboxId) {
        if let Some(err) = self.errors.lock().get_mut(&mailbox_id) {
            err.hold_end_time = None;
        }
    }

    pub fn remove(&self, mailbox_id: MailboxId) {
        self.errors.lock().remove(&mailbox_id);
    }

    /// `releaseSyncHolds(reason, account?)`, `spec.md` §4.1.4.
    pub fn release_holds(&self, reason: Option<SyncErrorReason>, account_id: Option<AccountId>) -> Vec<MailboxId> {
        let account_of = self.account_of.lock();
        let mut errors = self.errors.lock();
        let mut released = Vec::new();

        errors.retain(|mailbox_id, err| {
            let reason_matches = reason.map(|r| r == err.reason).unwrap_or(true);
            let account_matches = account_id
                .map(|a| account_of.get(mailbox_id) == Some(&a))
                .unwrap_or(true);
            if reason_matches && account_matches {
                released.push(*mailbox_id);
                false
            } else {
                true
            }
        });
        released
    }

    /// `hostChanged(accountId)`: clear fatal flags and hold end-times for
    /// SyncErrors belonging to the account, `spec.md` §4.1 public operations.
    pub fn clear_fatal_for_account(&self, account_id: AccountId) {
        let account_of = self.account_of.lock();
        let mut errors = self.errors.lock();
        for (mailbox_id, err) in errors.iter_mut() {
            if account_of.get(mailbox_id) == Some(&account_id) {
                err.fatal = false;
                err.hold_end_time = None;
            }
        }
    }
}

impl Default for SyncErrorMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_escalates_hold_delay_exponentially() {
        let map = SyncErrorMap::new();
        map.on_worker_exit(1, ExitStatus::IoError);
        assert_eq!(map.get(1).unwrap().hold_delay, INITIAL_HOLD);

        map.on_worker_exit(1, ExitStatus::IoError);
        assert_eq!(map.get(1).unwrap().hold_delay, INITIAL_HOLD * 2);

        for _ in 0..10 {
            map.on_worker_exit(1, ExitStatus::IoError);
        }
        assert_eq!(map.get(1).unwrap().hold_delay, MAX_HOLD);
    }

    #[test]
    fn fatal_statuses_are_not_retried_and_have_no_hold_end_time() {
        let map = SyncErrorMap::new();
        map.on_worker_exit(2, ExitStatus::LoginFailure);
        let err = map.get(2).unwrap();
        assert!(err.fatal);
        assert!(err.hold_end_time.is_none());
    }

    #[test]
    fn done_removes_any_existing_entry() {
        let map = SyncErrorMap::new();
        map.on_worker_exit(3, ExitStatus::IoError);
        assert!(map.get(3).is_some());
        map.on_worker_exit(3, ExitStatus::Done);
        assert!(map.get(3).is_none());
    }

    #[test]
    fn host_changed_clears_fatal_flag_for_its_account_only() {
        let map = SyncErrorMap::new();
        map.remember_account(1, 100);
        map.remember_account(2, 200);
        map.on_worker_exit(1, ExitStatus::LoginFailure);
        map.on_worker_exit(2, ExitStatus::LoginFailure);

        map.clear_fatal_for_account(100);
        assert!(!map.get(1).unwrap().fatal);
        assert!(map.get(2).unwrap().fatal);
    }
}
