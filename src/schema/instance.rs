use serde::{Deserialize, Serialize};

/// Connection state as reported by the provider's `connectionState` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum InstanceStatus {
    Unknown,
    Created,
    Open,
    Close,
    Connecting,
}

impl InstanceStatus {
    /// Anything the provider reports outside the known set maps to `Unknown`.
    pub fn from_provider(state: &str) -> Self {
        match state {
            "created" => Self::Created,
            "open" => Self::Open,
            "close" => Self::Close,
            "connecting" => Self::Connecting,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Instance {
    pub id: i64,
    pub name: String,
    pub user_id: Option<i64>,
    pub status: InstanceStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Listing row for the admin dashboard: owner name plus dependent-row counts.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InstanceWithStats {
    pub id: i64,
    pub name: String,
    pub user_id: Option<i64>,
    pub status: InstanceStatus,
    pub owner_name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub chat_count: i64,
    pub message_count: i64,
    pub contact_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewInstance {
    pub name: String,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct InstancePatch {
    pub name: Option<String>,
    pub user_id: Option<i64>,
    pub status: Option<InstanceStatus>,
}
