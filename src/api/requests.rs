use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::model::{AccountId, MailboxId};
use crate::request::MeetingResponseKind;
use crate::store::Store;
use crate::util::http_error::{AnyhowHttpError, HttpResult};

use super::ApiState;

#[derive(Debug, Deserialize)]
pub struct LoadAttachmentBody {
    mailbox_id: MailboxId,
    dest_path: Option<String>,
    content_uri: Option<String>,
}

pub async fn load_attachment<S: Store>(
    Path((_account_id, attachment_id)): Path<(AccountId, i64)>,
    State(state): State<ApiState<S>>,
    Json(body): Json<LoadAttachmentBody>,
) -> HttpResult<()> {
    state
        .orchestrator
        .load_attachment(body.mailbox_id, attachment_id, body.dest_path, body.content_uri)
        .await
        .into_internal_error_result()
}

#[derive(Debug, Deserialize)]
pub struct MoveMessageBody {
    mailbox_id: MailboxId,
    message_id: i64,
    target_mailbox_id: MailboxId,
}

pub async fn move_message<S: Store>(
    Path(_account_id): Path<AccountId>,
    State(state): State<ApiState<S>>,
    Json(body): Json<MoveMessageBody>,
) -> HttpResult<()> {
    state
        .orchestrator
        .move_message(body.mailbox_id, body.message_id, body.target_mailbox_id)
        .await
        .into_internal_error_result()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingResponseBody {
    Accept,
    Tentative,
    Decline,
}

impl From<MeetingResponseBody> for MeetingResponseKind {
    fn from(body: MeetingResponseBody) -> Self {
        match body {
            MeetingResponseBody::Accept => Self::Accept,
            MeetingResponseBody::Tentative => Self::Tentative,
            MeetingResponseBody::Decline => Self::Decline,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMeetingResponseBody {
    mailbox_id: MailboxId,
    message_id: i64,
    response: MeetingResponseBody,
}

pub async fn send_meeting_response<S: Store>(
    Path(_account_id): Path<AccountId>,
    State(state): State<ApiState<S>>,
    Json(body): Json<SendMeetingResponseBody>,
) -> HttpResult<()> {
    state
        .orchestrator
        .send_meeting_response(body.mailbox_id, body.message_id, body.response.into())
        .await
        .into_internal_error_result()
}
