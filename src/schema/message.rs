use serde::{Deserialize, Serialize};

/// Stored message row. The primary key is the provider-supplied message id;
/// `remote_jid` points at the chat and `owner` at the instance name.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub remote_jid: String,
    pub participant: Option<String>,
    pub push_name: Option<String>,
    pub message_type: Option<String>,
    pub message_timestamp: Option<i64>,
    pub owner: String,
    pub source: Option<String>,
    pub content: Option<String>,
    pub media_type: Option<String>,
    pub media_filename: Option<String>,
    pub media_path: Option<String>,
    pub media_size: Option<i64>,
    pub media_mimetype: Option<String>,
    pub media_caption: Option<String>,
    pub media_downloaded: bool,
    pub raw_payload: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Result of a successful media download: everything the dashboard needs to
/// reference the file. Only the web-relative path is persisted, never the
/// on-disk location.
#[derive(Debug, Clone, Serialize)]
pub struct MediaDescriptor {
    pub media_type: String,
    pub file_name: String,
    pub web_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub caption: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: String,
    pub remote_jid: String,
    pub participant: Option<String>,
    pub push_name: Option<String>,
    pub message_type: Option<String>,
    pub message_timestamp: Option<i64>,
    pub owner: String,
    pub source: Option<String>,
    pub content: Option<String>,
    pub media: Option<MediaDescriptor>,
    pub raw_payload: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub remote_jid: Option<String>,
    pub participant: Option<String>,
    pub push_name: Option<String>,
    pub message_type: Option<String>,
    pub message_timestamp: Option<i64>,
    pub owner: Option<String>,
    pub source: Option<String>,
    pub content: Option<String>,
    pub raw_payload: Option<String>,
}
