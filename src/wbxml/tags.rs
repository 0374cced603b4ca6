//! EAS WBXML code pages, `spec.md` §6.
//!
//! This is a deliberately small subset of the real EAS tag tables — just
//! enough tokens to build and parse the documents this crate's driver
//! actually sends (FolderSync, Sync, Ping and their responses). A full
//! client would carry every code page; content parsing of email/calendar/
//! contact bodies is explicitly out of scope (`spec.md` §1 Non-goals).

/// Code page switch byte values, `spec.md` §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePage {
    AirSync = 0x00,
    Email = 0x02,
    Calendar = 0x04,
    Move = 0x05,
    Folder = 0x07,
    MeetingResponse = 0x0B,
    Ping = 0x0D,
    Gal = 0x10,
    AirSyncBase = 0x11,
}

/// A tag known to a code page, with its WBXML token (low 6 bits; bit 0x40 is
/// the "has content" flag applied by the writer, not part of the token
/// identity here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub page: CodePage,
    pub token: u8,
    pub name: &'static str,
}

macro_rules! tag {
    ($name:ident, $page:expr, $token:expr, $str:expr) => {
        pub const $name: Tag = Tag {
            page: $page,
            token: $token,
            name: $str,
        };
    };
}

// AirSync code page (0x00) — FolderSync/Sync wrapper elements.
tag!(SYNC, CodePage::AirSync, 0x05, "Sync");
tag!(RESPONSES, CodePage::AirSync, 0x06, "Responses");
tag!(ADD, CodePage::AirSync, 0x07, "Add");
tag!(CHANGE, CodePage::AirSync, 0x08, "Change");
tag!(DELETE, CodePage::AirSync, 0x09, "Delete");
tag!(FOLDER, CodePage::AirSync, 0x0E, "Folder");
tag!(SYNC_KEY, CodePage::AirSync, 0x0B, "SyncKey");
tag!(CLIENT_ID, CodePage::AirSync, 0x0C, "ClientId");
tag!(STATUS, CodePage::AirSync, 0x0D, "Status");
tag!(COLLECTION, CodePage::AirSync, 0x0F, "Collection");
tag!(CLASS, CodePage::AirSync, 0x10, "Class");
tag!(COLLECTION_ID, CodePage::AirSync, 0x12, "CollectionId");
tag!(GET_CHANGES, CodePage::AirSync, 0x13, "GetChanges");
tag!(MORE_AVAILABLE, CodePage::AirSync, 0x14, "MoreAvailable");
tag!(WINDOW_SIZE, CodePage::AirSync, 0x15, "WindowSize");
tag!(COMMANDS, CodePage::AirSync, 0x16, "Commands");
tag!(OPTIONS, CodePage::AirSync, 0x17, "Options");
tag!(FILTER_TYPE, CodePage::AirSync, 0x18, "FilterType");
tag!(DELETES_AS_MOVES, CodePage::AirSync, 0x1A, "DeletesAsMoves");
tag!(COLLECTIONS, CodePage::AirSync, 0x1C, "Collections");
tag!(APPLICATION_DATA, CodePage::AirSync, 0x1D, "ApplicationData");

// Folder code page (0x07) — FolderSync.
tag!(FOLDERS, CodePage::Folder, 0x0C, "Folders");
tag!(FOLDER_SYNC, CodePage::Folder, 0x16, "FolderSync");
tag!(FOLDER_SYNC_KEY, CodePage::Folder, 0x09, "SyncKey");
tag!(FOLDER_ID, CodePage::Folder, 0x0B, "ServerId");
tag!(PARENT_ID, CodePage::Folder, 0x0D, "ParentId");
tag!(DISPLAY_NAME, CodePage::Folder, 0x0E, "DisplayName");
tag!(FOLDER_TYPE, CodePage::Folder, 0x0F, "Type");

// Ping code page (0x0D).
tag!(PING, CodePage::Ping, 0x05, "Ping");
tag!(PING_HEARTBEAT_INTERVAL, CodePage::Ping, 0x09, "HeartbeatInterval");
tag!(PING_FOLDERS, CodePage::Ping, 0x06, "Folders");
tag!(PING_FOLDER, CodePage::Ping, 0x07, "Folder");
tag!(PING_SERVER_ID, CodePage::Ping, 0x08, "ServerId");
tag!(PING_STATUS, CodePage::Ping, 0x0A, "Status");
tag!(PING_CLASS, CodePage::Ping, 0x11, "Class");

// AirSyncBase code page (0x11) — body preference.
tag!(BODY_PREFERENCE, CodePage::AirSyncBase, 0x0E, "BodyPreference");
tag!(BODY_TYPE, CodePage::AirSyncBase, 0x0F, "Type");

// Move code page (0x05) — MoveItems.
tag!(MOVE_ITEMS, CodePage::Move, 0x05, "MoveItems");
tag!(MOVE, CodePage::Move, 0x06, "Move");
tag!(MOVE_SRC_MSG_ID, CodePage::Move, 0x07, "SrcMsgId");
tag!(MOVE_SRC_FLD_ID, CodePage::Move, 0x08, "SrcFldId");
tag!(MOVE_DST_FLD_ID, CodePage::Move, 0x09, "DstFldId");
tag!(MOVE_RESPONSE, CodePage::Move, 0x0A, "Response");
tag!(MOVE_STATUS, CodePage::Move, 0x0B, "Status");

// MeetingResponse code page (0x0B).
tag!(MEETING_RESPONSE, CodePage::MeetingResponse, 0x05, "MeetingResponse");
tag!(MEETING_REQUESTS, CodePage::MeetingResponse, 0x06, "Requests");
tag!(MEETING_REQUEST, CodePage::MeetingResponse, 0x07, "Request");
tag!(MEETING_USER_RESPONSE, CodePage::MeetingResponse, 0x08, "UserResponse");
tag!(MEETING_COLLECTION_ID, CodePage::MeetingResponse, 0x09, "CollectionId");
tag!(MEETING_REQUEST_ID, CodePage::MeetingResponse, 0x0A, "RequestId");
tag!(MEETING_RESULT, CodePage::MeetingResponse, 0x0C, "Result");
tag!(MEETING_STATUS, CodePage::MeetingResponse, 0x0D, "Status");
