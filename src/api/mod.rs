//! RPC surface, `spec.md` §6: one route per orchestrator public operation
//! plus a status-streaming websocket, grounded in the teacher's
//! `api/mod.rs` (`ApiState`, `Router<ApiState>`) and `watch_mailboxes.rs`
//! (websocket-over-broadcast-channel).

mod accounts;
mod requests;
mod status;
mod sync;

use axum::routing::{get, post};
use axum::Router;

use crate::orchestrator::Orchestrator;
use crate::store::Store;

#[derive(Clone)]
pub struct ApiState<S: Store> {
    pub orchestrator: Orchestrator<S>,
}

pub fn build_api_router<S: Store>() -> Router<ApiState<S>> {
    Router::new()
        .route("/accounts/{account_id}/mailboxes/{mailbox_id}/sync", post(sync::start_sync))
        .route("/accounts/{account_id}/mailboxes/{mailbox_id}/stop", post(sync::stop_sync))
        .route("/accounts/{account_id}/mailboxes/{mailbox_id}/status", get(status::watch_mailbox_status))
        .route("/accounts/{account_id}/attachments/{attachment_id}", post(requests::load_attachment))
        .route("/accounts/{account_id}/move", post(requests::move_message))
        .route("/accounts/{account_id}/meeting-response", post(requests::send_meeting_response))
        .route("/accounts/{account_id}/folders/update", post(accounts::update_folder_list))
        .route("/accounts/{account_id}/host-changed", post(accounts::host_changed))
}
