use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod error;
mod ingest;
mod repos;
mod routes;
mod schema;
mod services;

use config::Config;
use repos::UserRepo;
use routes::{AppState, Sessions};
use services::{EvolutionClient, MediaStore, Notifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let pool = db::connect(&config.database_path).await?;
    db::seed_admin(&pool, &config.admin_email, &config.admin_password).await?;
    let seed_user_id = UserRepo::new(&pool)
        .get_by_email(&config.admin_email)
        .await?
        .map(|user| user.id);

    let media = Arc::new(MediaStore::new(config.upload_dir.clone()));
    if let Some(days) = config.media_retention_days {
        tracing::info!(days, "running media retention sweep");
        media.cleanup_old_media(days);
    }

    let evolution = Arc::new(EvolutionClient::new(
        config.evolution_api_url.clone(),
        config.evolution_api_key.clone(),
    ));

    let state = AppState {
        db: pool,
        evolution,
        media,
        notifier: Notifier::new(),
        sessions: Sessions::new(),
        seed_user_id,
    };

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, routes::router(state)).await?;

    Ok(())
}
