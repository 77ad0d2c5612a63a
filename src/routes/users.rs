use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::repos::UserRepo;
use crate::routes::AppState;
use crate::routes::auth::AdminUser;
use crate::schema::{NewUser, Role, User, UserPatch};

pub async fn list(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Vec<User>>> {
    Ok(Json(UserRepo::new(&state.db).all().await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
}

pub async fn create(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Json(body): Json<CreateUserRequest>,
) -> Result<Json<Value>> {
    let (Some(email), Some(password), Some(name)) = (
        body.email.filter(|e| !e.is_empty()),
        body.password.filter(|p| !p.is_empty()),
        body.name.filter(|n| !n.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Por favor, complete todos los campos.".to_string(),
        ));
    };

    let repo = UserRepo::new(&state.db);
    if repo.get_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "Ya existe un usuario con el correo '{email}'."
        )));
    }

    let user = repo
        .create(&NewUser {
            email,
            password,
            name,
            role: body.role.unwrap_or(Role::Client),
        })
        .await?;

    Ok(Json(json!({
        "message": "Usuario creado correctamente.",
        "user": user,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
}

/// Empty strings from the form mean "leave unchanged", same as absence.
pub async fn update(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<Value>> {
    let patch = UserPatch {
        email: body.email.filter(|e| !e.is_empty()),
        password: body.password.filter(|p| !p.is_empty()),
        name: body.name.filter(|n| !n.is_empty()),
        role: body.role,
    };

    let user = UserRepo::new(&state.db)
        .update(id, &patch)
        .await?
        .ok_or_else(|| AppError::NotFound("Usuario no encontrado.".to_string()))?;

    Ok(Json(json!({
        "message": "Usuario actualizado correctamente.",
        "user": user,
    })))
}

pub async fn remove(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    if id == admin.id {
        return Err(AppError::BadRequest(
            "No puedes eliminarte a ti mismo.".to_string(),
        ));
    }

    let deleted = UserRepo::new(&state.db).delete(id).await?;
    if !deleted {
        return Err(AppError::NotFound("Usuario no encontrado.".to_string()));
    }

    Ok(Json(json!({
        "message": "Usuario eliminado correctamente."
    })))
}
