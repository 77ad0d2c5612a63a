use std::path::PathBuf;

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub evolution_api_url: Option<String>,
    pub evolution_api_key: Option<String>,
    pub upload_dir: PathBuf,
    pub admin_email: String,
    pub admin_password: String,
    pub media_retention_days: Option<u64>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT").unwrap_or(4002),
            database_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| "app.db".to_string()),
            evolution_api_url: std::env::var("EVOLUTION_API_URL").ok(),
            evolution_api_key: std::env::var("EVOLUTION_API_KEY").ok(),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public/uploads")),
            admin_email: std::env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@example.com".to_string()),
            admin_password: std::env::var("ADMIN_PASSWORD")
                .unwrap_or_else(|_| "admin123".to_string()),
            media_retention_days: env_parse("MEDIA_RETENTION_DAYS"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
