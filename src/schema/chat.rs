use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chat {
    pub id: String,
    pub owner: String,
    pub raw_payload: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewChat {
    pub id: String,
    pub owner: String,
    pub raw_payload: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ChatPatch {
    pub owner: Option<String>,
    pub raw_payload: Option<String>,
}
