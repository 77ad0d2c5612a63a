use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::error::Result;
use crate::ingest::Ingestor;
use crate::routes::AppState;

/// Provider deliveries always get a 200 once dispatched; per-item failures
/// are logged inside the ingestor and never bubble up here.
pub async fn receive(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>> {
    let ingestor = Ingestor::new(
        &state.db,
        state.media.as_ref(),
        state.evolution.as_ref(),
        &state.notifier,
        state.seed_user_id,
    );
    ingestor.process(&payload).await?;

    Ok(Json(json!({
        "message": "Webhook recibido y procesado correctamente."
    })))
}
