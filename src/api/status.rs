//! Streams `MailboxSyncStatus` callback events over a websocket, grounded in
//! the teacher's `watch_mailboxes.rs` (a websocket fed by a broadcast
//! channel of store changes); here the channel is `CallbackHub` instead of
//! database change notifications.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use serde::Serialize;

use crate::callbacks::Callback;
use crate::model::{AccountId, CallbackStatus, MailboxId};
use crate::store::Store;

use super::ApiState;

#[derive(Serialize)]
struct MailboxStatusEvent {
    mailbox_id: MailboxId,
    status: CallbackStatus,
    progress: u8,
}

pub async fn watch_mailbox_status<S: Store>(
    Path((_account_id, mailbox_id)): Path<(AccountId, MailboxId)>,
    State(state): State<ApiState<S>>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    let mut rx = state.orchestrator.callbacks().subscribe();
    upgrade.on_upgrade(move |socket| async move { stream_status(socket, &mut rx, mailbox_id).await })
}

async fn stream_status(mut socket: WebSocket, rx: &mut tokio::sync::broadcast::Receiver<Callback>, mailbox_id: MailboxId) {
    loop {
        let callback = match rx.recv().await {
            Ok(callback) => callback,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        };

        let Callback::MailboxSyncStatus { mailbox_id: id, status, progress } = callback else {
            continue;
        };
        if id != mailbox_id {
            continue;
        }

        let event = MailboxStatusEvent { mailbox_id: id, status, progress };
        let Ok(text) = serde_json::to_string(&event) else { continue };
        if socket.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }
}
