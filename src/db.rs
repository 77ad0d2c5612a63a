use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::repos::UserRepo;
use crate::schema::{NewUser, Role};

/// Tables are created idempotently at startup. The `media_*` columns on
/// `messages` are part of the base schema; they hold the descriptor produced
/// by the media fetcher for multimedia message types.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    name TEXT NOT NULL,
    role TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS instances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL,
    user_id INTEGER,
    status TEXT NOT NULL DEFAULT 'unknown',
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS contacts (
    id TEXT PRIMARY KEY,
    push_name TEXT,
    profile_picture_url TEXT,
    owner TEXT NOT NULL,
    raw_payload TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    FOREIGN KEY (owner) REFERENCES instances (name) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    raw_payload TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    FOREIGN KEY (owner) REFERENCES instances (name) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    remote_jid TEXT NOT NULL,
    participant TEXT,
    push_name TEXT,
    message_type TEXT,
    message_timestamp INTEGER,
    owner TEXT NOT NULL,
    source TEXT,
    content TEXT,
    media_type TEXT,
    media_filename TEXT,
    media_path TEXT,
    media_size INTEGER,
    media_mimetype TEXT,
    media_caption TEXT,
    media_downloaded BOOLEAN NOT NULL DEFAULT FALSE,
    raw_payload TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    FOREIGN KEY (owner) REFERENCES instances (name) ON DELETE CASCADE,
    FOREIGN KEY (remote_jid) REFERENCES chats (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_owner ON messages(owner);
CREATE INDEX IF NOT EXISTS idx_messages_remote_jid ON messages(remote_jid);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(message_timestamp);
"#;

pub async fn connect(path: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;

    tracing::info!(path, "database initialized");
    Ok(pool)
}

/// Ensures the default admin account exists. Auto-provisioned instances are
/// owned by this user.
pub async fn seed_admin(pool: &SqlitePool, email: &str, password: &str) -> crate::error::Result<()> {
    let users = UserRepo::new(pool);
    if users.get_by_email(email).await?.is_none() {
        users
            .create(&NewUser {
                email: email.to_string(),
                password: password.to_string(),
                name: "Administrador".to_string(),
                role: Role::Admin,
            })
            .await?;
        tracing::info!(email, "seeded default admin user");
    }
    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::new().in_memory(true).foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("failed to open in-memory database");
    sqlx::raw_sql(SCHEMA)
        .execute(&pool)
        .await
        .expect("failed to apply schema");
    pool
}
