use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::model::{AccountId, MailboxId, SyncReason};
use crate::store::Store;
use crate::util::http_error::{AnyhowHttpError, HttpResult};

use super::ApiState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartSyncReason {
    UserRequest,
    Push,
    Scheduled,
    Ping,
    Upsync,
}

impl From<StartSyncReason> for SyncReason {
    fn from(reason: StartSyncReason) -> Self {
        match reason {
            StartSyncReason::UserRequest => SyncReason::UserRequest,
            StartSyncReason::Push => SyncReason::Push,
            StartSyncReason::Scheduled => SyncReason::Scheduled,
            StartSyncReason::Ping => SyncReason::Ping,
            StartSyncReason::Upsync => SyncReason::Upsync,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct StartSyncBody {
    reason: Option<StartSyncReason>,
}

pub async fn start_sync<S: Store>(
    Path((_account_id, mailbox_id)): Path<(AccountId, MailboxId)>,
    State(state): State<ApiState<S>>,
    body: Option<Json<StartSyncBody>>,
) -> HttpResult<()> {
    let reason = body.and_then(|b| b.0.reason).map(Into::into).unwrap_or(SyncReason::UserRequest);
    state
        .orchestrator
        .start_sync(mailbox_id, reason)
        .await
        .into_internal_error_result()
}

pub async fn stop_sync<S: Store>(Path((_account_id, mailbox_id)): Path<(AccountId, MailboxId)>, State(state): State<ApiState<S>>) {
    state.orchestrator.stop_sync(mailbox_id);
}
