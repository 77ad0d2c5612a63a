use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::repos::InstanceRepo;
use crate::routes::AppState;
use crate::routes::auth::AdminUser;
use crate::schema::{InstanceWithStats, NewInstance};

/// Each listed instance carries the provider's live connection state; the
/// refreshed value is also written back so the stored status converges.
pub async fn list(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Vec<InstanceWithStats>>> {
    let repo = InstanceRepo::new(&state.db);
    let mut rows = repo.all_with_stats().await?;

    for row in &mut rows {
        let status = state.evolution.connection_state(&row.name).await;
        if status != row.status {
            repo.update_status_by_name(&row.name, status).await?;
            row.status = status;
        }
    }

    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct CreateInstanceRequest {
    pub name: Option<String>,
    pub user_id: Option<i64>,
}

/// Provider first, then the local row; a provider failure leaves no local
/// residue.
pub async fn create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(body): Json<CreateInstanceRequest>,
) -> Result<Json<Value>> {
    let Some(name) = body.name.filter(|n| !n.trim().is_empty()) else {
        return Err(AppError::BadRequest(
            "El nombre de la instancia es obligatorio.".to_string(),
        ));
    };
    let name = name.trim().to_string();

    let repo = InstanceRepo::new(&state.db);
    if repo.get_by_name(&name).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "Ya existe una instancia con el nombre '{name}'."
        )));
    }

    let provider_response = state
        .evolution
        .create_instance(&name)
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    let instance = repo
        .create(&NewInstance {
            name,
            user_id: body.user_id.or(Some(admin.id)),
        })
        .await?;

    Ok(Json(json!({
        "message": "Instancia creada correctamente.",
        "instance": instance,
        "provider": provider_response,
    })))
}

/// Provider deletion is attempted first but a failure there does not keep
/// the local row alive; stale provider-side instances are better than
/// undeletable local ones.
pub async fn remove(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let repo = InstanceRepo::new(&state.db);
    let Some(instance) = repo.get_by_name(&name).await? else {
        return Err(AppError::NotFound("Instancia no encontrada.".to_string()));
    };

    if let Err(e) = state.evolution.delete_instance(&name).await {
        tracing::warn!(instance = %name, error = %e, "provider-side instance delete failed");
    }
    repo.delete(instance.id).await?;

    Ok(Json(json!({
        "message": "Instancia eliminada correctamente."
    })))
}

pub async fn qrcode(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let repo = InstanceRepo::new(&state.db);
    if repo.get_by_name(&name).await?.is_none() {
        return Err(AppError::NotFound("Instancia no encontrada.".to_string()));
    }

    let qr = state
        .evolution
        .connect_qr(&name)
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;
    Ok(Json(qr))
}
