//! Document builders and parsers for the three commands the driver issues:
//! FolderSync, Sync and Ping. Shapes follow `spec.md` §4.2.2, §4.2.3/§4.2.4
//! and §4.2.6 exactly.

use anyhow::{Context, Result};

use crate::model::{MailboxType, SyncLookback};

use super::codec::{parse, Node, Writer};
use super::tags::*;

// ---- FolderSync ------------------------------------------------------------

pub fn build_folder_sync(account_sync_key: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.open(FOLDER_SYNC);
    w.text_element(FOLDER_SYNC_KEY, account_sync_key);
    w.close();
    w.finish()
}

pub struct FolderSyncResult {
    pub sync_key: String,
    /// `true` if the server reports a sync-key mismatch that must be retried
    /// (`spec.md` §4.2.2: "needs re-sync (sync-key churn)").
    pub needs_resync: bool,
    pub updated_folders: Vec<FolderUpdate>,
}

pub struct FolderUpdate {
    pub server_id: String,
    pub display_name: String,
    pub folder_type: MailboxType,
}

pub fn parse_folder_sync_response(data: &[u8]) -> Result<FolderSyncResult> {
    let root = parse(data).context("parsing FolderSync response")?;
    let doc = root.find(FOLDER_SYNC).context("missing FolderSync element")?;
    let sync_key = doc
        .find(FOLDER_SYNC_KEY)
        .and_then(Node::text)
        .unwrap_or("0")
        .to_string();

    // Status 3 ("invalid sync key") is the documented re-sync trigger; any
    // other non-1 status is surfaced as a protocol error by the caller.
    let needs_resync = doc.find(STATUS).and_then(Node::text) == Some("3");

    let mut updated_folders = Vec::new();
    if let Some(changes) = doc.find(FOLDERS) {
        for folder in changes.find_all(FOLDER) {
            let server_id = folder.find(FOLDER_ID).and_then(Node::text).unwrap_or_default();
            let display_name = folder.find(DISPLAY_NAME).and_then(Node::text).unwrap_or_default();
            let folder_type = folder
                .find(FOLDER_TYPE)
                .and_then(Node::text)
                .and_then(map_eas_folder_type)
                .unwrap_or(MailboxType::Other);
            updated_folders.push(FolderUpdate {
                server_id: server_id.to_string(),
                display_name: display_name.to_string(),
                folder_type,
            });
        }
    }

    Ok(FolderSyncResult {
        sync_key,
        needs_resync,
        updated_folders,
    })
}

fn map_eas_folder_type(code: &str) -> Option<MailboxType> {
    // EAS folder type codes, abbreviated to the ones this crate's mailbox
    // model cares about.
    Some(match code {
        "1" | "2" => MailboxType::Other, // generic user-created / default
        "3" => MailboxType::Inbox,
        "4" => MailboxType::Drafts,
        "5" => MailboxType::Outbox,
        "6" => MailboxType::Sent,
        "7" => MailboxType::Trash,
        "8" => MailboxType::Calendar,
        "9" => MailboxType::Contacts,
        _ => return None,
    })
}

// ---- Sync (collection mode) ------------------------------------------------

pub struct SyncCollectionRequest<'a> {
    pub class: &'a str,
    pub sync_key: &'a str,
    pub collection_id: &'a str,
    pub window_size: u16,
    pub lookback: Option<SyncLookback>,
    pub body_preference_html: Option<bool>,
}

pub fn build_sync_request(req: &SyncCollectionRequest<'_>) -> Vec<u8> {
    let mut w = Writer::new();
    w.open(SYNC);
    w.open(COLLECTIONS);
    w.open(COLLECTION);
    w.text_element(CLASS, req.class);
    w.text_element(SYNC_KEY, req.sync_key);
    w.text_element(COLLECTION_ID, req.collection_id);
    w.empty_element(DELETES_AS_MOVES);
    if req.sync_key != "0" {
        w.empty_element(GET_CHANGES);
    }
    w.text_element(WINDOW_SIZE, &req.window_size.to_string());

    if req.lookback.is_some() || req.body_preference_html.is_some() {
        w.open(OPTIONS);
        if let Some(lookback) = req.lookback {
            w.text_element(FILTER_TYPE, lookback.filter_type());
        }
        if let Some(html) = req.body_preference_html {
            w.open(BODY_PREFERENCE);
            w.text_element(BODY_TYPE, if html { "2" } else { "1" });
            w.close();
        }
        w.close();
    }

    w.close(); // Collection
    w.close(); // Collections
    w.close(); // Sync
    w.finish()
}

pub struct SyncTurnResult {
    pub new_sync_key: String,
    pub more_available: bool,
    pub added: usize,
    pub changed: usize,
    pub deleted: usize,
}

pub fn parse_sync_response(data: &[u8]) -> Result<SyncTurnResult> {
    let root = parse(data).context("parsing Sync response")?;
    let doc = root.find(SYNC).context("missing Sync element")?;
    let collections = doc.find(COLLECTIONS).context("missing Collections element")?;
    let collection = collections
        .find(COLLECTION)
        .context("missing Collection element")?;

    let new_sync_key = collection
        .find(SYNC_KEY)
        .and_then(Node::text)
        .unwrap_or("0")
        .to_string();
    let more_available = collection.find(MORE_AVAILABLE).is_some();

    let (mut added, mut changed, mut deleted) = (0, 0, 0);
    if let Some(commands) = collection.find(COMMANDS) {
        added = commands.find_all(ADD).count();
        changed = commands.find_all(CHANGE).count();
        deleted = commands.find_all(DELETE).count();
    }

    Ok(SyncTurnResult {
        new_sync_key,
        more_available,
        added,
        changed,
        deleted,
    })
}

// ---- Ping -------------------------------------------------------------------

pub struct PingFolderRef<'a> {
    pub server_id: &'a str,
    pub class: &'a str,
}

pub fn build_ping_request(heartbeat_secs: u32, folders: &[PingFolderRef<'_>]) -> Vec<u8> {
    let mut w = Writer::new();
    w.open(PING);
    w.text_element(PING_HEARTBEAT_INTERVAL, &heartbeat_secs.to_string());
    w.open(PING_FOLDERS);
    for folder in folders {
        w.open(PING_FOLDER);
        w.text_element(PING_SERVER_ID, folder.server_id);
        w.text_element(PING_CLASS, folder.class);
        w.close();
    }
    w.close();
    w.close();
    w.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingStatus {
    /// Status 1: no changes, heartbeat elapsed cleanly.
    Completed,
    /// Status 2: one or more folders reported changes.
    ChangesFound,
    Other(u8),
}

pub struct PingResult {
    pub status: PingStatus,
    pub changed_folder_ids: Vec<String>,
}

pub fn parse_ping_response(data: &[u8]) -> Result<PingResult> {
    let root = parse(data).context("parsing Ping response")?;
    let doc = root.find(PING).context("missing Ping element")?;
    let status = doc
        .find(PING_STATUS)
        .and_then(Node::text)
        .and_then(|s| s.parse::<u8>().ok())
        .context("missing or invalid Ping Status")?;

    let status = match status {
        1 => PingStatus::Completed,
        2 => PingStatus::ChangesFound,
        other => PingStatus::Other(other),
    };

    let mut changed_folder_ids = Vec::new();
    if let Some(folders) = doc.find(PING_FOLDERS) {
        for folder in folders.find_all(PING_FOLDER) {
            if let Some(id) = folder.find(PING_SERVER_ID).and_then(Node::text) {
                changed_folder_ids.push(id.to_string());
            }
        }
    }

    Ok(PingResult {
        status,
        changed_folder_ids,
    })
}

// ---- MoveItems ---------------------------------------------------------

pub fn build_move_items(src_msg_id: &str, src_folder_id: &str, dst_folder_id: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.open(MOVE_ITEMS);
    w.open(MOVE);
    w.text_element(MOVE_SRC_MSG_ID, src_msg_id);
    w.text_element(MOVE_SRC_FLD_ID, src_folder_id);
    w.text_element(MOVE_DST_FLD_ID, dst_folder_id);
    w.close();
    w.close();
    w.finish()
}

/// `true` if the move succeeded (status "3" per EAS, the common case for this
/// narrow subset).
pub fn parse_move_items_response(data: &[u8]) -> Result<bool> {
    let root = parse(data).context("parsing MoveItems response")?;
    let doc = root.find(MOVE_ITEMS).context("missing MoveItems element")?;
    let status = doc
        .find(MOVE_RESPONSE)
        .and_then(|r| r.find(MOVE_STATUS))
        .and_then(Node::text);
    Ok(status == Some("3"))
}

// ---- MeetingResponse -----------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingUserResponse {
    Accept,
    Tentative,
    Decline,
}

impl MeetingUserResponse {
    fn code(self) -> &'static str {
        match self {
            Self::Accept => "1",
            Self::Tentative => "2",
            Self::Decline => "3",
        }
    }
}

pub fn build_meeting_response(request_id: &str, collection_id: &str, response: MeetingUserResponse) -> Vec<u8> {
    let mut w = Writer::new();
    w.open(MEETING_RESPONSE);
    w.open(MEETING_REQUESTS);
    w.open(MEETING_REQUEST);
    w.text_element(MEETING_USER_RESPONSE, response.code());
    w.text_element(MEETING_COLLECTION_ID, collection_id);
    w.text_element(MEETING_REQUEST_ID, request_id);
    w.close();
    w.close();
    w.close();
    w.finish()
}

pub fn parse_meeting_response_response(data: &[u8]) -> Result<bool> {
    let root = parse(data).context("parsing MeetingResponse response")?;
    let doc = root.find(MEETING_RESPONSE).context("missing MeetingResponse element")?;
    let status = doc
        .find(MEETING_RESULT)
        .and_then(|r| r.find(MEETING_STATUS))
        .and_then(Node::text);
    Ok(status == Some("1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_request_omits_get_changes_on_initial_sync() {
        let req = SyncCollectionRequest {
            class: "Email",
            sync_key: "0",
            collection_id: "5",
            window_size: 5,
            lookback: Some(SyncLookback::OneWeek),
            body_preference_html: Some(true),
        };
        let bytes = build_sync_request(&req);
        let root = parse(&bytes).unwrap();
        let collection = root
            .find(SYNC)
            .unwrap()
            .find(COLLECTIONS)
            .unwrap()
            .find(COLLECTION)
            .unwrap();
        assert!(collection.find(GET_CHANGES).is_none());
        assert_eq!(
            collection.find(SYNC_KEY).and_then(Node::text),
            Some("0")
        );
    }

    #[test]
    fn sync_request_includes_get_changes_on_subsequent_sync() {
        let req = SyncCollectionRequest {
            class: "Email",
            sync_key: "17",
            collection_id: "5",
            window_size: 5,
            lookback: None,
            body_preference_html: None,
        };
        let bytes = build_sync_request(&req);
        let root = parse(&bytes).unwrap();
        let collection = root
            .find(SYNC)
            .unwrap()
            .find(COLLECTIONS)
            .unwrap()
            .find(COLLECTION)
            .unwrap();
        assert!(collection.find(GET_CHANGES).is_some());
        assert!(collection.find(OPTIONS).is_none());
    }

    #[test]
    fn ping_round_trips_folder_list() {
        let folders = vec![
            PingFolderRef { server_id: "5", class: "Email" },
            PingFolderRef { server_id: "9", class: "Calendar" },
        ];
        let bytes = build_ping_request(470, &folders);
        let root = parse(&bytes).unwrap();
        let ping = root.find(PING).unwrap();
        assert_eq!(
            ping.find(PING_HEARTBEAT_INTERVAL).and_then(Node::text),
            Some("470")
        );
        let folder_list = ping.find(PING_FOLDERS).unwrap();
        assert_eq!(folder_list.find_all(PING_FOLDER).count(), 2);
    }

    #[test]
    fn move_items_round_trips_ids() {
        let bytes = build_move_items("42", "5", "9");
        let root = parse(&bytes).unwrap();
        let move_el = root.find(MOVE_ITEMS).unwrap().find(MOVE).unwrap();
        assert_eq!(move_el.find(MOVE_SRC_MSG_ID).and_then(Node::text), Some("42"));
        assert_eq!(move_el.find(MOVE_DST_FLD_ID).and_then(Node::text), Some("9"));
    }

    #[test]
    fn meeting_response_encodes_user_choice() {
        let bytes = build_meeting_response("17", "5", MeetingUserResponse::Tentative);
        let root = parse(&bytes).unwrap();
        let req = root
            .find(MEETING_RESPONSE)
            .unwrap()
            .find(MEETING_REQUESTS)
            .unwrap()
            .find(MEETING_REQUEST)
            .unwrap();
        assert_eq!(req.find(MEETING_USER_RESPONSE).and_then(Node::text), Some("2"));
    }
}
