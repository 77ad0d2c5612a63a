use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::extract::{FromRequestParts, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::repos::UserRepo;
use crate::routes::AppState;
use crate::schema::{Role, User};

pub const SESSION_COOKIE: &str = "evoadmin_session";

/// What a session remembers about its user. Role changes made after login
/// take effect on the next login.
#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
        }
    }
}

/// In-memory session store; sessions do not survive a restart.
#[derive(Clone, Default)]
pub struct Sessions(Arc<Mutex<HashMap<String, SessionUser>>>);

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: SessionUser) -> String {
        let token = Uuid::new_v4().to_string();
        self.lock().insert(token.clone(), user);
        token
    }

    pub fn get(&self, token: &str) -> Option<SessionUser> {
        self.lock().get(token).cloned()
    }

    pub fn remove(&self, token: &str) -> bool {
        self.lock().remove(token).is_some()
    }

    // the map stays consistent across a poisoned lock, no operation leaves
    // a partial write behind
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionUser>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn session_token(parts: &Parts) -> Option<String> {
    let header = parts.headers.get(COOKIE)?.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

/// Any logged-in user.
pub struct AuthUser(pub SessionUser);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = session_token(parts)
            .and_then(|token| state.sessions.get(&token))
            .ok_or(AppError::Unauthorized("No autenticado."))?;
        Ok(AuthUser(user))
    }
}

/// Logged-in user with the admin role.
pub struct AdminUser(pub SessionUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response> {
    let (Some(email), Some(password)) = (
        body.email.filter(|e| !e.is_empty()),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Por favor, complete todos los campos.".to_string(),
        ));
    };

    let user = UserRepo::new(&state.db)
        .verify_credentials(&email, &password)
        .await?
        .ok_or(AppError::Unauthorized("Credenciales inválidas."))?;

    let session = SessionUser::from(&user);
    let token = state.sessions.insert(session.clone());
    tracing::info!(email = %session.email, "user logged in");

    let cookie = format!("{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax");
    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({
            "message": "Inicio de sesión exitoso.",
            "user": session,
        })),
    )
        .into_response())
}

pub async fn logout(State(state): State<AppState>, parts: axum::http::request::Parts) -> Response {
    if let Some(token) = session_token(&parts) {
        state.sessions.remove(&token);
    }

    let cookie = format!("{SESSION_COOKIE}=; HttpOnly; Path=/; Max-Age=0");
    (
        [(SET_COOKIE, cookie)],
        Json(json!({ "message": "Sesión cerrada correctamente." })),
    )
        .into_response()
}

pub async fn current_user(AuthUser(user): AuthUser) -> Json<serde_json::Value> {
    Json(json!({ "user": user }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_user(role: Role) -> SessionUser {
        SessionUser {
            id: 1,
            email: "a@b.com".to_string(),
            name: "Ana".to_string(),
            role,
        }
    }

    #[test]
    fn sessions_roundtrip_and_invalidate() {
        let sessions = Sessions::new();
        let token = sessions.insert(session_user(Role::Admin));

        assert_eq!(sessions.get(&token).unwrap().email, "a@b.com");
        assert!(sessions.remove(&token));
        assert!(sessions.get(&token).is_none());
        assert!(!sessions.remove(&token));
    }

    #[test]
    fn sessions_survive_a_poisoned_lock() {
        let sessions = Sessions::new();
        let token = sessions.insert(session_user(Role::Client));

        let poisoner = sessions.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.0.lock().unwrap();
            panic!("poison the session mutex");
        })
        .join();

        assert_eq!(sessions.get(&token).unwrap().email, "a@b.com");
        assert!(sessions.remove(&token));
    }

    #[test]
    fn cookie_header_parsing_finds_the_session_token() {
        let request = axum::http::Request::builder()
            .header(COOKIE, "theme=dark; evoadmin_session=tok123; lang=es")
            .body(())
            .unwrap();
        let (parts, ()) = request.into_parts();
        assert_eq!(session_token(&parts).as_deref(), Some("tok123"));

        let request = axum::http::Request::builder()
            .header(COOKIE, "theme=dark")
            .body(())
            .unwrap();
        let (parts, ()) = request.into_parts();
        assert!(session_token(&parts).is_none());
    }
}
