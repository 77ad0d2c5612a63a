use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::Result;
use crate::schema::{NewUser, Role, User, UserPatch};

// Read queries name their columns so the hash never reaches a `User`.
const USER_COLUMNS: &str = "id, email, name, role, created_at, updated_at";

pub struct UserRepo<'a> {
    db: &'a SqlitePool,
}

#[derive(sqlx::FromRow)]
struct AuthRow {
    id: i64,
    email: String,
    password_hash: String,
    name: String,
    role: Role,
    created_at: i64,
    updated_at: i64,
}

impl<'a> UserRepo<'a> {
    pub fn new(db: &'a SqlitePool) -> Self {
        Self { db }
    }

    pub async fn all(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(self.db)
        .await?;
        Ok(users)
    }

    pub async fn get(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.db)
        .await?;
        Ok(user)
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(self.db)
        .await?;
        Ok(user)
    }

    pub async fn create(&self, new: &NewUser) -> Result<User> {
        let hash = hash_password(&new.password);
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, name, role) VALUES (?, ?, ?, ?)",
        )
        .bind(&new.email)
        .bind(&hash)
        .bind(&new.name)
        .bind(new.role)
        .execute(self.db)
        .await?;

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(result.last_insert_rowid())
        .fetch_one(self.db)
        .await?;
        Ok(user)
    }

    pub async fn update(&self, id: i64, patch: &UserPatch) -> Result<Option<User>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE users SET updated_at = strftime('%s', 'now')");
        if let Some(email) = &patch.email {
            qb.push(", email = ").push_bind(email);
        }
        if let Some(password) = &patch.password {
            qb.push(", password_hash = ").push_bind(hash_password(password));
        }
        if let Some(name) = &patch.name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(role) = patch.role {
            qb.push(", role = ").push_bind(role);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(self.db).await?;

        self.get(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The only read path that touches the stored hash.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, AuthRow>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.db)
            .await?;

        Ok(row.and_then(|row| {
            verify_password(password, &row.password_hash).then_some(User {
                id: row.id,
                email: row.email,
                name: row.name,
                role: row.role,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        }))
    }
}

/// Salted SHA-256, stored as `{salt_hex}${digest_hex}`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    format!("{}${}", hex::encode(salt), hex::encode(hasher.finalize()))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };

    let mut hasher = Sha256::new();
    hasher.update(&salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize()) == digest_hex
}
