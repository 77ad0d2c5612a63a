use serde::{Deserialize, Serialize};

/// Primary key is the provider contact id; `owner` is the instance name.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contact {
    pub id: String,
    pub push_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub owner: String,
    pub raw_payload: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewContact {
    pub id: String,
    pub push_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub owner: String,
    pub raw_payload: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactPatch {
    pub push_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub owner: Option<String>,
    pub raw_payload: Option<String>,
}
