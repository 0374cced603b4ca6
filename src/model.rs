//! Core domain types shared by the store, the EAS driver and the orchestrator.
//!
//! See `spec.md` §3 (DATA MODEL) and §6 (Configuration enumeration).

use serde::{Deserialize, Serialize};
use std::fmt;

pub type AccountId = i64;
pub type MailboxId = i64;

/// Account flags bitset (`spec.md` §3: "flags (incomplete, security-hold)").
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFlags {
    pub incomplete: bool,
    pub security_hold: bool,
}

impl AccountFlags {
    pub fn from_bits(bits: i64) -> Self {
        Self {
            incomplete: bits & 0x1 != 0,
            security_hold: bits & 0x2 != 0,
        }
    }

    pub fn to_bits(self) -> i64 {
        let mut bits = 0;
        if self.incomplete {
            bits |= 0x1;
        }
        if self.security_hold {
            bits |= 0x2;
        }
        bits
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// How often a mailbox's lookback window should reach back, `spec.md` §4.2.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncLookback {
    OneDay,
    ThreeDays,
    OneWeek,
    TwoWeeks,
    OneMonth,
    All,
}

impl SyncLookback {
    /// `FilterType` value per the lookback mapping table in `spec.md` §4.2.6.
    pub fn filter_type(self) -> &'static str {
        match self {
            Self::OneDay => "1",
            Self::ThreeDays => "2",
            Self::OneWeek => "3",
            Self::TwoWeeks => "4",
            Self::OneMonth => "5",
            Self::All => "0",
        }
    }
}

impl Default for SyncLookback {
    fn default() -> Self {
        // "default '3'" in the lookback mapping table.
        Self::OneWeek
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub display_name: String,
    pub email_address: String,
    pub host: String,
    pub credentials: Credentials,
    pub protocol_version: Option<String>,
    pub sync_key: String,
    pub sync_lookback: SyncLookback,
    pub flags: AccountFlags,
}

impl Account {
    pub fn is_security_held(&self) -> bool {
        self.flags.security_hold
    }
}

/// `spec.md` §3: mailbox type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MailboxType {
    Account,
    Inbox,
    Outbox,
    Drafts,
    Trash,
    Contacts,
    Calendar,
    Sent,
    Other,
}

impl MailboxType {
    /// Type character used by the `S<type>:<exit>:<count>` sync status string,
    /// `spec.md` §6.
    pub fn type_char(self) -> char {
        match self {
            Self::Account => 'A',
            Self::Inbox => 'I',
            Self::Outbox => 'O',
            Self::Drafts => 'D',
            Self::Trash => 'T',
            Self::Contacts => 'C',
            Self::Calendar => 'L',
            Self::Sent => 'S',
            Self::Other => 'X',
        }
    }

    pub fn from_type_char(c: char) -> Option<Self> {
        Some(match c {
            'A' => Self::Account,
            'I' => Self::Inbox,
            'O' => Self::Outbox,
            'D' => Self::Drafts,
            'T' => Self::Trash,
            'C' => Self::Contacts,
            'L' => Self::Calendar,
            'S' => Self::Sent,
            'X' => Self::Other,
            _ => return None,
        })
    }

    /// EAS `<Class>` element value for collection-mode Sync, `spec.md` §4.2.6.
    pub fn collection_class(self) -> Option<&'static str> {
        match self {
            Self::Contacts => Some("Contacts"),
            Self::Calendar => Some("Calendar"),
            Self::Account | Self::Outbox => None,
            _ => Some("Email"),
        }
    }

    pub fn is_pim(self) -> bool {
        matches!(self, Self::Contacts | Self::Calendar)
    }
}

/// `spec.md` §6: recognized sync intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncInterval {
    Never,
    Push,
    Ping,
    PushHold,
    Minutes(u16),
}

impl SyncInterval {
    pub const NEVER: i64 = -1;
    pub const PUSH: i64 = -2;
    pub const PING: i64 = -3;
    pub const PUSH_HOLD: i64 = -4;

    pub fn from_raw(value: i64) -> Option<Self> {
        Some(match value {
            Self::NEVER => Self::Never,
            Self::PUSH => Self::Push,
            Self::PING => Self::Ping,
            Self::PUSH_HOLD => Self::PushHold,
            v if v > 0 && v <= 1440 => Self::Minutes(v as u16),
            _ => return None,
        })
    }

    pub fn to_raw(self) -> i64 {
        match self {
            Self::Never => Self::NEVER,
            Self::Push => Self::PUSH,
            Self::Ping => Self::PING,
            Self::PushHold => Self::PUSH_HOLD,
            Self::Minutes(m) => m as i64,
        }
    }

    pub fn is_push_eligible(self) -> bool {
        matches!(self, Self::Push)
    }
}

#[derive(Debug, Clone)]
pub struct Mailbox {
    pub id: MailboxId,
    pub account_id: AccountId,
    pub server_id: Option<String>,
    pub display_name: String,
    pub mailbox_type: MailboxType,
    pub sync_interval: SyncInterval,
    pub sync_key: String,
    pub last_sync_time: Option<chrono::DateTime<chrono::Utc>>,
    pub sync_status: Option<String>,
}

impl Mailbox {
    pub const NEVER_SYNCED_KEY: &'static str = "0";

    pub fn is_never_synced(&self) -> bool {
        self.sync_key == Self::NEVER_SYNCED_KEY
    }

    /// `spec.md` §3: "a mailbox is a candidate for Ping if its sync interval
    /// is PUSH, its type is not ACCOUNT, and its sync key is not '0'."
    pub fn is_ping_candidate(&self) -> bool {
        self.sync_interval.is_push_eligible()
            && self.mailbox_type != MailboxType::Account
            && !self.is_never_synced()
    }

    /// Build the `S<type>:<exit>:<count>` status string, `spec.md` §6.
    pub fn format_sync_status(mailbox_type: MailboxType, exit: ExitStatus, change_count: u32) -> String {
        format!("S{}:{}:{}", mailbox_type.type_char(), exit.status_char(), change_count)
    }

    /// Parse a sync status string. Per `spec.md` §6: "parsers must read type
    /// from index 1, exit from index 3, change-count starting at index 5."
    pub fn parse_sync_status(status: &str) -> Option<(MailboxType, ExitStatus, u32)> {
        let bytes = status.as_bytes();
        if bytes.len() < 6 {
            return None;
        }
        let mailbox_type = MailboxType::from_type_char(bytes[1] as char)?;
        let exit = ExitStatus::from_status_char(bytes[3] as char)?;
        let change_count: u32 = status[5..].parse().ok()?;
        Some((mailbox_type, exit, change_count))
    }
}

/// `spec.md` §3 (Worker) / §7: terminal state of a worker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    Done,
    IoError,
    LoginFailure,
    SecurityFailure,
    Exception,
}

impl ExitStatus {
    pub fn status_char(self) -> char {
        match self {
            Self::Done => 'D',
            Self::IoError => 'I',
            Self::LoginFailure => 'L',
            Self::SecurityFailure => 'S',
            Self::Exception => 'E',
        }
    }

    pub fn from_status_char(c: char) -> Option<Self> {
        Some(match c {
            'D' => Self::Done,
            'I' => Self::IoError,
            'L' => Self::LoginFailure,
            'S' => Self::SecurityFailure,
            'E' => Self::Exception,
            _ => return None,
        })
    }

    pub fn is_fatal(self) -> bool {
        matches!(self, Self::LoginFailure | Self::SecurityFailure | Self::Exception)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Done => "DONE",
            Self::IoError => "IO_ERROR",
            Self::LoginFailure => "LOGIN_FAILURE",
            Self::SecurityFailure => "SECURITY_FAILURE",
            Self::Exception => "EXCEPTION",
        })
    }
}

/// Reason a worker start/sync was requested, used only for logging —
/// mirrors the `reason` strings threaded through `spec.md` §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReason {
    UserRequest,
    Push,
    Scheduled,
    Ping,
    Upsync,
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UserRequest => "user request",
            Self::Push => "push",
            Self::Scheduled => "scheduled",
            Self::Ping => "ping",
            Self::Upsync => "upsync",
        })
    }
}

/// Callback status codes, `spec.md` §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackStatus {
    InProgress,
    Success,
    ConnectionError,
    LoginFailed,
    MessageNotFound,
    AccountUninitialized,
    RemoteException,
}
