//! Collection-mode Sync turn, `spec.md` §4.2.6: drain requests, then Sync
//! the collection, repeating while the server reports "more available".

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::instrument;

use crate::callbacks::CallbackHub;
use crate::credentials::AuthContext;
use crate::eas::attachment::{self, AttachmentDownload, AttachmentOutcome};
use crate::model::{CallbackStatus, Mailbox};
use crate::request::{MeetingResponseKind, Request, RequestQueue};
use crate::store::Store;
use crate::wbxml::documents::{
    build_meeting_response, build_move_items, build_sync_request, parse_meeting_response_response,
    parse_move_items_response, parse_sync_response, MeetingUserResponse, SyncCollectionRequest, SyncTurnResult,
};

const EMAIL_WINDOW_SIZE: u16 = 5;
const PIM_WINDOW_SIZE: u16 = 20;

pub enum SyncTurnOutcome {
    Done,
    LoginFailure,
    IoError,
}

#[instrument(skip(client, auth, store, callbacks, queue), fields(mailbox_id = mailbox.id))]
pub async fn run_sync_turn<S: Store>(
    client: &Client,
    auth: &AuthContext,
    store: &S,
    callbacks: &CallbackHub,
    queue: &RequestQueue,
    mailbox: &Mailbox,
) -> Result<SyncTurnOutcome> {
    drain_requests(client, auth, store, callbacks, queue, mailbox).await?;

    let Some(class) = mailbox.mailbox_type.collection_class() else {
        return Ok(SyncTurnOutcome::Done);
    };
    let server_id = match mailbox.server_id.as_deref() {
        Some(id) => id,
        None => return Ok(SyncTurnOutcome::Done),
    };

    let account = store
        .get_account(mailbox.account_id)
        .await?
        .context("account disappeared mid Sync turn")?;
    let window_size = if class == "Email" { EMAIL_WINDOW_SIZE } else { PIM_WINDOW_SIZE };
    let version_at_least_12 = account.protocol_version.as_deref() == Some("12.0");

    let mut sync_key = mailbox.sync_key.clone();
    let mut total_changes: u32 = 0;
    loop {
        let req = SyncCollectionRequest {
            class,
            sync_key: &sync_key,
            collection_id: server_id,
            window_size,
            lookback: (!mailbox.mailbox_type.is_pim()).then_some(account.sync_lookback),
            // Body preference is HTML for Email, plain text otherwise, `spec.md` §4.2.6.
            body_preference_html: version_at_least_12.then_some(class == "Email"),
        };
        let body = build_sync_request(&req);

        let response = client
            .post(auth.command_url("Sync"))
            .header(reqwest::header::AUTHORIZATION, &auth.authorization_header)
            .header(reqwest::header::CONTENT_TYPE, "application/vnd.ms-sync.wbxml")
            .body(body)
            .send()
            .await
            .context("sending Sync request")?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Ok(SyncTurnOutcome::LoginFailure);
        }
        if status != 200 {
            tracing::warn!(status, "Sync turn returned non-200");
            return Ok(SyncTurnOutcome::IoError);
        }

        let bytes = response.bytes().await.context("reading Sync response body")?;
        let SyncTurnResult {
            new_sync_key,
            more_available,
            added,
            changed,
            deleted,
        } = parse_sync_response(&bytes)?;

        total_changes += (added + changed + deleted) as u32;
        store.set_mailbox_sync_key(mailbox.id, &new_sync_key).await?;
        store.touch_mailbox_last_sync(mailbox.id).await?;
        callbacks.mailbox_sync_status(mailbox.id, CallbackStatus::InProgress, 100);

        sync_key = new_sync_key;

        if !more_available {
            store
                .set_mailbox_sync_status(mailbox.id, mailbox.mailbox_type, crate::model::ExitStatus::Done, total_changes)
                .await?;
            callbacks.mailbox_sync_status(mailbox.id, CallbackStatus::Success, 100);
            return Ok(SyncTurnOutcome::Done);
        }
    }
}

async fn drain_requests<S: Store>(
    client: &Client,
    auth: &AuthContext,
    store: &S,
    callbacks: &CallbackHub,
    queue: &RequestQueue,
    mailbox: &Mailbox,
) -> Result<()> {
    for request in queue.drain() {
        match request {
            Request::MessageMove {
                message_id,
                target_mailbox_id,
            } => {
                let body = build_move_items(&message_id.to_string(), &mailbox.id.to_string(), &target_mailbox_id.to_string());
                let response = client
                    .post(auth.command_url("MoveItems"))
                    .header(reqwest::header::AUTHORIZATION, &auth.authorization_header)
                    .header(reqwest::header::CONTENT_TYPE, "application/vnd.ms-sync.wbxml")
                    .body(body)
                    .send()
                    .await
                    .context("sending MoveItems request")?;
                if response.status() == reqwest::StatusCode::OK {
                    let bytes = response.bytes().await.context("reading MoveItems response")?;
                    let _ = parse_move_items_response(&bytes);
                }
            }
            Request::MeetingResponse { message_id, response: kind } => {
                let eas_response = match kind {
                    MeetingResponseKind::Accept => MeetingUserResponse::Accept,
                    MeetingResponseKind::Tentative => MeetingUserResponse::Tentative,
                    MeetingResponseKind::Decline => MeetingUserResponse::Decline,
                };
                let body = build_meeting_response(&message_id.to_string(), &mailbox.id.to_string(), eas_response);
                let response = client
                    .post(auth.command_url("MeetingResponse"))
                    .header(reqwest::header::AUTHORIZATION, &auth.authorization_header)
                    .header(reqwest::header::CONTENT_TYPE, "application/vnd.ms-sync.wbxml")
                    .body(body)
                    .send()
                    .await
                    .context("sending MeetingResponse request")?;
                if response.status() == reqwest::StatusCode::OK {
                    let bytes = response.bytes().await.context("reading MeetingResponse response")?;
                    let _ = parse_meeting_response_response(&bytes);
                }
            }
            Request::AttachmentLoad {
                attachment_id,
                dest_path,
                content_uri,
            } => {
                let Some(attachment_ref) = store.get_attachment(attachment_id).await? else {
                    continue;
                };
                // `contentUri` is the caller's alternate way of naming a
                // destination (`spec.md` §4.1 `loadAttachment`); `destPath`
                // wins when both are supplied.
                let req = AttachmentDownload {
                    message_id: attachment_ref.message_id,
                    attachment_id,
                    server_location: attachment_ref.server_location,
                    dest_path: dest_path.or(content_uri).map(std::path::PathBuf::from),
                };
                match attachment::load_attachment(client, auth, callbacks, req).await {
                    Ok(AttachmentOutcome::Success { content_uri, mime_type }) => {
                        store.set_attachment_downloaded(attachment_id, &content_uri, mime_type.as_deref()).await?;
                    }
                    Ok(AttachmentOutcome::NotFound) => {
                        store.mark_attachment_not_found(attachment_id).await?;
                        callbacks.attachment_status(attachment_ref.message_id, attachment_id, CallbackStatus::MessageNotFound, 0);
                    }
                    Err(err) => {
                        tracing::warn!(?err, attachment_id, "attachment download failed");
                    }
                }
            }
        }
    }
    Ok(())
}
