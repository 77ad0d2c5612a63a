pub mod auth;
pub mod data;
pub mod events;
pub mod instances;
pub mod users;
pub mod webhook;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::services::{EvolutionClient, MediaStore, Notifier};

pub use auth::Sessions;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub evolution: Arc<EvolutionClient>,
    pub media: Arc<MediaStore>,
    pub notifier: Notifier,
    pub sessions: Sessions,
    /// Default owner for instances auto-registered from webhooks.
    pub seed_user_id: Option<i64>,
}

pub fn router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.media.base_dir());

    Router::new()
        .route("/webhook", post(webhook::receive))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/api/user", get(auth::current_user))
        .route("/api/events", get(events::stream))
        .route("/api/data/{kind}", get(data::table))
        .route(
            "/api/instances",
            get(instances::list).post(instances::create),
        )
        .route("/api/instances/{name}/delete", post(instances::remove))
        .route("/api/instances/{name}/qrcode", get(instances::qrcode))
        .route("/api/users", get(users::list).post(users::create))
        .route("/api/users/{id}", post(users::update))
        .route("/api/users/{id}/delete", post(users::remove))
        .nest_service("/uploads", uploads)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
