//! Runtime configuration, `spec.md` §4.6 ambient additions: a `clap` derive
//! struct populated from environment variables (optionally via a `.env` file
//! loaded by `dotenvy`), mirroring the teacher's `main.rs` env-var reads.

use std::time::Duration;

use clap::Parser;

use crate::orchestrator::SyncPolicy;

#[derive(Debug, Parser)]
#[command(name = "eas-sync-core")]
pub struct Config {
    /// SQLite database path, or `:memory:` for an ephemeral store.
    #[arg(long, env = "DATABASE_FILE", default_value = ":memory:")]
    pub database_file: String,

    /// Address the API router binds to.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8080")]
    pub bind_addr: String,

    #[arg(long, env = "HTTP_CONNECT_TIMEOUT_SECS", default_value_t = 15)]
    pub http_connect_timeout_secs: u64,

    /// Debug escape hatch for self-signed `httpts` deployments, `spec.md` §4.5.
    #[arg(long, env = "ALLOW_INVALID_CERTS", default_value_t = false)]
    pub allow_invalid_certs: bool,

    #[arg(long, env = "MASTER_AUTO_SYNC", default_value_t = true)]
    pub master_auto_sync: bool,

    #[arg(long, env = "CONTACTS_AUTO_SYNC", default_value_t = true)]
    pub contacts_auto_sync: bool,

    #[arg(long, env = "CALENDAR_AUTO_SYNC", default_value_t = true)]
    pub calendar_auto_sync: bool,

    #[arg(long, env = "CALENDAR_EVENTS_ENABLED", default_value_t = true)]
    pub calendar_events_enabled: bool,

    #[arg(long, env = "BACKGROUND_DATA", default_value_t = true)]
    pub background_data: bool,

    /// Directory holding the persisted device id, `spec.md` §4.4.
    #[arg(long, env = "STATE_DIR", default_value = "./state")]
    pub state_dir: String,
}

impl Config {
    pub fn http_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http_connect_timeout_secs)
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy {
            master_auto_sync: self.master_auto_sync,
            contacts_auto_sync: self.contacts_auto_sync,
            calendar_auto_sync: self.calendar_auto_sync,
            calendar_events_enabled: self.calendar_events_enabled,
            background_data: self.background_data,
        }
    }
}
