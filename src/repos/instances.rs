use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::{AppError, Result};
use crate::schema::{Instance, InstancePatch, InstanceStatus, InstanceWithStats, NewInstance};

const STATS_QUERY: &str = r#"
SELECT
    i.id,
    i.name,
    i.user_id,
    i.status,
    u.name AS owner_name,
    i.created_at,
    i.updated_at,
    (SELECT COUNT(*) FROM chats WHERE owner = i.name) AS chat_count,
    (SELECT COUNT(*) FROM messages WHERE owner = i.name) AS message_count,
    (SELECT COUNT(*) FROM contacts WHERE owner = i.name) AS contact_count
FROM instances i
LEFT JOIN users u ON i.user_id = u.id
ORDER BY i.id DESC
"#;

pub struct InstanceRepo<'a> {
    db: &'a SqlitePool,
}

impl<'a> InstanceRepo<'a> {
    pub fn new(db: &'a SqlitePool) -> Self {
        Self { db }
    }

    pub async fn all_with_stats(&self) -> Result<Vec<InstanceWithStats>> {
        let rows = sqlx::query_as::<_, InstanceWithStats>(STATS_QUERY)
            .fetch_all(self.db)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Instance>> {
        let row = sqlx::query_as::<_, Instance>("SELECT * FROM instances WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db)
            .await?;
        Ok(row)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Instance>> {
        let row = sqlx::query_as::<_, Instance>("SELECT * FROM instances WHERE name = ?")
            .bind(name)
            .fetch_optional(self.db)
            .await?;
        Ok(row)
    }

    /// Name uniqueness is also checked here so callers get a descriptive
    /// conflict instead of a raw constraint violation. The check-then-act is
    /// not atomic; the UNIQUE constraint catches the losing side of a race.
    pub async fn create(&self, new: &NewInstance) -> Result<Instance> {
        if self.get_by_name(&new.name).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Ya existe una instancia con el nombre '{}'.",
                new.name
            )));
        }

        let result = sqlx::query("INSERT INTO instances (name, user_id) VALUES (?, ?)")
            .bind(&new.name)
            .bind(new.user_id)
            .execute(self.db)
            .await?;

        let row = sqlx::query_as::<_, Instance>("SELECT * FROM instances WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(self.db)
            .await?;
        Ok(row)
    }

    pub async fn update(&self, id: i64, patch: &InstancePatch) -> Result<Option<Instance>> {
        if let Some(name) = &patch.name {
            if let Some(existing) = self.get_by_name(name).await? {
                if existing.id != id {
                    return Err(AppError::Conflict(format!(
                        "Ya existe una instancia con el nombre '{name}'."
                    )));
                }
            }
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE instances SET updated_at = strftime('%s', 'now')");
        if let Some(name) = &patch.name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(user_id) = patch.user_id {
            qb.push(", user_id = ").push_bind(user_id);
        }
        if let Some(status) = patch.status {
            qb.push(", status = ").push_bind(status);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(self.db).await?;

        self.get(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM instances WHERE id = ?")
            .bind(id)
            .execute(self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Narrow update used by connection-state polling.
    pub async fn update_status_by_name(&self, name: &str, status: InstanceStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE instances SET status = ?, updated_at = strftime('%s', 'now') WHERE name = ?",
        )
        .bind(status)
        .bind(name)
        .execute(self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn create(repo: &InstanceRepo<'_>, name: &str) -> Instance {
        repo.create(&NewInstance {
            name: name.to_string(),
            user_id: None,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn create_defaults_status_to_unknown() {
        let pool = test_pool().await;
        let repo = InstanceRepo::new(&pool);
        let inst = create(&repo, "shop1").await;
        assert_eq!(inst.status, InstanceStatus::Unknown);
        assert!(inst.created_at > 0);
    }

    #[tokio::test]
    async fn duplicate_name_is_a_descriptive_conflict() {
        let pool = test_pool().await;
        let repo = InstanceRepo::new(&pool);
        create(&repo, "shop1").await;

        let err = repo
            .create(&NewInstance {
                name: "shop1".to_string(),
                user_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn rename_collision_is_rejected_but_self_rename_is_not() {
        let pool = test_pool().await;
        let repo = InstanceRepo::new(&pool);
        let a = create(&repo, "a").await;
        create(&repo, "b").await;

        let err = repo
            .update(
                a.id,
                &InstancePatch {
                    name: Some("b".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // patching to its own current name is a no-op, not a conflict
        let same = repo
            .update(
                a.id,
                &InstancePatch {
                    name: Some("a".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(same.name, "a");
    }

    #[tokio::test]
    async fn update_status_by_name_reports_missing_instance() {
        let pool = test_pool().await;
        let repo = InstanceRepo::new(&pool);
        create(&repo, "shop1").await;

        assert!(repo
            .update_status_by_name("shop1", InstanceStatus::Open)
            .await
            .unwrap());
        assert_eq!(
            repo.get_by_name("shop1").await.unwrap().unwrap().status,
            InstanceStatus::Open
        );
        assert!(!repo
            .update_status_by_name("missing", InstanceStatus::Open)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn stats_listing_counts_dependents_per_instance() {
        let pool = test_pool().await;
        let repo = InstanceRepo::new(&pool);
        create(&repo, "shop1").await;
        create(&repo, "shop2").await;

        sqlx::query("INSERT INTO chats (id, owner) VALUES ('c1', 'shop1')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO messages (id, remote_jid, owner) VALUES ('m1', 'c1', 'shop1')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let rows = repo.all_with_stats().await.unwrap();
        // ordered by id DESC
        assert_eq!(rows[0].name, "shop2");
        assert_eq!(rows[0].message_count, 0);
        assert_eq!(rows[1].name, "shop1");
        assert_eq!(rows[1].chat_count, 1);
        assert_eq!(rows[1].message_count, 1);
        assert_eq!(rows[1].contact_count, 0);
    }
}
