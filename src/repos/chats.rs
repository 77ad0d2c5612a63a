use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::Result;
use crate::schema::{Chat, ChatPatch, NewChat};

pub struct ChatRepo<'a> {
    db: &'a SqlitePool,
}

impl<'a> ChatRepo<'a> {
    pub fn new(db: &'a SqlitePool) -> Self {
        Self { db }
    }

    pub async fn all(&self) -> Result<Vec<Chat>> {
        let rows = sqlx::query_as::<_, Chat>("SELECT * FROM chats ORDER BY id")
            .fetch_all(self.db)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Chat>> {
        let row = sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db)
            .await?;
        Ok(row)
    }

    pub async fn create(&self, new: &NewChat) -> Result<Chat> {
        sqlx::query(
            r#"INSERT INTO chats (id, owner, raw_payload)
               VALUES (?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 owner = excluded.owner,
                 raw_payload = excluded.raw_payload,
                 updated_at = strftime('%s', 'now')"#,
        )
        .bind(&new.id)
        .bind(&new.owner)
        .bind(&new.raw_payload)
        .execute(self.db)
        .await?;

        let row = sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE id = ?")
            .bind(&new.id)
            .fetch_one(self.db)
            .await?;
        Ok(row)
    }

    /// Creates a placeholder row if the chat has never been observed. Keeps
    /// the message → chat foreign key satisfiable when a message arrives
    /// before any `chats.update` event.
    pub async fn ensure(&self, id: &str, owner: &str) -> Result<()> {
        sqlx::query("INSERT INTO chats (id, owner) VALUES (?, ?) ON CONFLICT(id) DO NOTHING")
            .bind(id)
            .bind(owner)
            .execute(self.db)
            .await?;
        Ok(())
    }

    pub async fn update(&self, id: &str, patch: &ChatPatch) -> Result<Option<Chat>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE chats SET updated_at = strftime('%s', 'now')");
        if let Some(owner) = &patch.owner {
            qb.push(", owner = ").push_bind(owner);
        }
        if let Some(raw) = &patch.raw_payload {
            qb.push(", raw_payload = ").push_bind(raw);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(self.db).await?;

        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(id)
            .execute(self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self, owner: Option<&str>) -> Result<i64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM chats");
        if let Some(owner) = owner {
            qb.push(" WHERE owner = ").push_bind(owner);
        }
        Ok(qb.build_query_scalar().fetch_one(self.db).await?)
    }

    pub async fn count_filtered(&self, owner: Option<&str>, search: &str) -> Result<i64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM chats");
        push_filters(&mut qb, owner, search);
        Ok(qb.build_query_scalar().fetch_one(self.db).await?)
    }

    pub async fn page(
        &self,
        owner: Option<&str>,
        search: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Chat>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM chats");
        push_filters(&mut qb, owner, search);
        qb.push(" ORDER BY id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        Ok(qb.build_query_as().fetch_all(self.db).await?)
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, owner: Option<&str>, search: &str) {
    let mut prefix = " WHERE ";
    if let Some(owner) = owner {
        qb.push(prefix).push("owner = ").push_bind(owner.to_string());
        prefix = " AND ";
    }
    if !search.is_empty() {
        qb.push(prefix)
            .push("id LIKE ")
            .push_bind(format!("%{search}%"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::repos::InstanceRepo;
    use crate::schema::NewInstance;

    async fn seed_instance(pool: &SqlitePool, name: &str) {
        InstanceRepo::new(pool)
            .create(&NewInstance {
                name: name.to_string(),
                user_id: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ensure_is_idempotent_and_preserves_existing_payload() {
        let pool = test_pool().await;
        seed_instance(&pool, "shop1").await;
        let repo = ChatRepo::new(&pool);

        repo.create(&NewChat {
            id: "123@g.us".to_string(),
            owner: "shop1".to_string(),
            raw_payload: Some("{\"x\":1}".to_string()),
        })
        .await
        .unwrap();

        repo.ensure("123@g.us", "shop1").await.unwrap();
        let chat = repo.get("123@g.us").await.unwrap().unwrap();
        assert_eq!(chat.raw_payload.as_deref(), Some("{\"x\":1}"));

        repo.ensure("456@g.us", "shop1").await.unwrap();
        assert_eq!(repo.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn patch_and_delete_behave_like_the_other_stores() {
        let pool = test_pool().await;
        seed_instance(&pool, "shop1").await;
        let repo = ChatRepo::new(&pool);
        repo.ensure("c1", "shop1").await.unwrap();

        let updated = repo
            .update(
                "c1",
                &ChatPatch {
                    raw_payload: Some("{\"name\":\"Grupo\"}".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.raw_payload.as_deref(), Some("{\"name\":\"Grupo\"}"));
        assert_eq!(updated.owner, "shop1");

        assert_eq!(repo.count(Some("shop1")).await.unwrap(), 1);
        assert_eq!(repo.count_filtered(None, "c1").await.unwrap(), 1);
        assert_eq!(repo.page(None, "", 10, 0).await.unwrap().len(), 1);

        assert!(repo.delete("c1").await.unwrap());
        assert!(!repo.delete("c1").await.unwrap());
    }

    #[tokio::test]
    async fn deleting_an_instance_cascades_to_its_rows_only() {
        let pool = test_pool().await;
        seed_instance(&pool, "shop1").await;
        seed_instance(&pool, "shop2").await;
        let chats = ChatRepo::new(&pool);
        chats.ensure("c1", "shop1").await.unwrap();
        chats.ensure("c2", "shop2").await.unwrap();

        sqlx::query(
            "INSERT INTO messages (id, remote_jid, owner) VALUES ('m1', 'c1', 'shop1')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO contacts (id, owner) VALUES ('p1', 'shop1')")
            .execute(&pool)
            .await
            .unwrap();

        let instances = InstanceRepo::new(&pool);
        let shop1 = instances.get_by_name("shop1").await.unwrap().unwrap();
        assert!(instances.delete(shop1.id).await.unwrap());

        assert!(chats.get("c1").await.unwrap().is_none());
        assert!(chats.get("c2").await.unwrap().is_some());
        let messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(messages, 0);
        let contacts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(contacts, 0);
    }
}
