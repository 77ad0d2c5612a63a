use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::repos::{ChatRepo, ContactRepo, MessageRepo};
use crate::routes::AppState;
use crate::routes::auth::AuthUser;

fn default_length() -> i64 {
    10
}

/// DataTables request shape. The grid sends the search box under the literal
/// key `search[value]`.
#[derive(Debug, Deserialize)]
pub struct TableQuery {
    #[serde(default)]
    pub draw: i64,
    #[serde(default)]
    pub start: i64,
    #[serde(default = "default_length")]
    pub length: i64,
    pub instance: Option<String>,
    #[serde(default, rename = "search[value]", alias = "search.value")]
    pub search: String,
}

#[derive(Debug, Serialize)]
pub struct TableResponse {
    pub draw: i64,
    #[serde(rename = "recordsTotal")]
    pub records_total: i64,
    #[serde(rename = "recordsFiltered")]
    pub records_filtered: i64,
    pub data: Value,
}

pub async fn table(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(kind): Path<String>,
    Query(query): Query<TableQuery>,
) -> Result<Json<TableResponse>> {
    let owner = query.instance.as_deref().filter(|i| !i.is_empty());
    let search = query.search.trim();
    let limit = if query.length > 0 { query.length } else { default_length() };
    let offset = query.start.max(0);

    let (total, filtered, data) = match kind.as_str() {
        "messages" => {
            let repo = MessageRepo::new(&state.db);
            (
                repo.count(owner).await?,
                repo.count_filtered(owner, search).await?,
                serde_json::json!(repo.page(owner, search, limit, offset).await?),
            )
        }
        "contacts" => {
            let repo = ContactRepo::new(&state.db);
            (
                repo.count(owner).await?,
                repo.count_filtered(owner, search).await?,
                serde_json::json!(repo.page(owner, search, limit, offset).await?),
            )
        }
        "chats" => {
            let repo = ChatRepo::new(&state.db);
            (
                repo.count(owner).await?,
                repo.count_filtered(owner, search).await?,
                serde_json::json!(repo.page(owner, search, limit, offset).await?),
            )
        }
        _ => {
            return Err(AppError::BadRequest("Tipo de datos no válido.".to_string()));
        }
    };

    Ok(Json(TableResponse {
        draw: query.draw,
        records_total: total,
        records_filtered: filtered,
        data,
    }))
}
