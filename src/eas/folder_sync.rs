//! FolderSync, `spec.md` §4.2.2.

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::instrument;

use crate::credentials::AuthContext;
use crate::model::AccountId;
use crate::store::Store;
use crate::wbxml::documents::{build_folder_sync, parse_folder_sync_response};

pub enum FolderSyncOutcome {
    Synced,
    LoginFailure,
    /// Non-fatal protocol error: "log and continue to Ping" per `spec.md`.
    Deferred,
}

#[instrument(skip(client, auth, store), fields(account_id))]
pub async fn run_folder_sync<S: Store>(
    client: &Client,
    auth: &AuthContext,
    store: &S,
    account_id: AccountId,
) -> Result<FolderSyncOutcome> {
    loop {
        let account = store
            .get_account(account_id)
            .await?
            .context("account disappeared mid FolderSync")?;

        let body = build_folder_sync(&account.sync_key);
        let response = client
            .post(auth.command_url("FolderSync"))
            .header(reqwest::header::AUTHORIZATION, &auth.authorization_header)
            .header(reqwest::header::CONTENT_TYPE, "application/vnd.ms-sync.wbxml")
            .body(body)
            .send()
            .await
            .context("sending FolderSync request")?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Ok(FolderSyncOutcome::LoginFailure);
        }
        if status != 200 {
            tracing::warn!(status, "FolderSync returned non-200; deferring to Ping");
            return Ok(FolderSyncOutcome::Deferred);
        }

        let bytes = response.bytes().await.context("reading FolderSync response body")?;
        let parsed = match parse_folder_sync_response(&bytes) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = ?err, "malformed FolderSync response; deferring to Ping");
                return Ok(FolderSyncOutcome::Deferred);
            }
        };

        if parsed.needs_resync {
            continue;
        }

        store.set_account_sync_key(account_id, &parsed.sync_key).await?;
        store
            .apply_folder_sync(account_id, parsed.updated_folders, Vec::new())
            .await?;
        // "After a successful FolderSync, flip all PUSH_HOLD mailboxes in
        // this account to PUSH."
        store.release_push_holds(account_id).await?;

        return Ok(FolderSyncOutcome::Synced);
    }
}
