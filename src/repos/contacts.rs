use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::Result;
use crate::schema::{Contact, ContactPatch, NewContact};

pub struct ContactRepo<'a> {
    db: &'a SqlitePool,
}

impl<'a> ContactRepo<'a> {
    pub fn new(db: &'a SqlitePool) -> Self {
        Self { db }
    }

    pub async fn all(&self) -> Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, Contact>("SELECT * FROM contacts ORDER BY id")
            .fetch_all(self.db)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Contact>> {
        let row = sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db)
            .await?;
        Ok(row)
    }

    /// Upsert: a re-observed contact overwrites every mutable field, keeping
    /// only `created_at` from the first observation.
    pub async fn create(&self, new: &NewContact) -> Result<Contact> {
        sqlx::query(
            r#"INSERT INTO contacts (id, push_name, profile_picture_url, owner, raw_payload)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 push_name = excluded.push_name,
                 profile_picture_url = excluded.profile_picture_url,
                 owner = excluded.owner,
                 raw_payload = excluded.raw_payload,
                 updated_at = strftime('%s', 'now')"#,
        )
        .bind(&new.id)
        .bind(&new.push_name)
        .bind(&new.profile_picture_url)
        .bind(&new.owner)
        .bind(&new.raw_payload)
        .execute(self.db)
        .await?;

        let row = sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = ?")
            .bind(&new.id)
            .fetch_one(self.db)
            .await?;
        Ok(row)
    }

    pub async fn update(&self, id: &str, patch: &ContactPatch) -> Result<Option<Contact>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE contacts SET updated_at = strftime('%s', 'now')");
        if let Some(push_name) = &patch.push_name {
            qb.push(", push_name = ").push_bind(push_name);
        }
        if let Some(url) = &patch.profile_picture_url {
            qb.push(", profile_picture_url = ").push_bind(url);
        }
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
        let result = sqlx::query("DELETE FROM contacts WHERE id = ?")
            .bind(id)
            .execute(self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn by_instance(&self, instance: Option<&str>) -> Result<Vec<Contact>> {
        let rows = match instance {
            Some(owner) => {
                sqlx::query_as::<_, Contact>(
                    "SELECT * FROM contacts WHERE owner = ? ORDER BY push_name, id",
                )
                .bind(owner)
                .fetch_all(self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, Contact>("SELECT * FROM contacts ORDER BY push_name, id")
                    .fetch_all(self.db)
                    .await?
            }
        };
        Ok(rows)
    }

    pub async fn count(&self, owner: Option<&str>) -> Result<i64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM contacts");
        if let Some(owner) = owner {
            qb.push(" WHERE owner = ").push_bind(owner);
        }
        Ok(qb.build_query_scalar().fetch_one(self.db).await?)
    }

    pub async fn count_filtered(&self, owner: Option<&str>, search: &str) -> Result<i64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM contacts");
        push_filters(&mut qb, owner, search);
        Ok(qb.build_query_scalar().fetch_one(self.db).await?)
    }

    pub async fn page(
        &self,
        owner: Option<&str>,
        search: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Contact>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM contacts");
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
        let pattern = format!("%{search}%");
        qb.push(prefix)
            .push("(id LIKE ")
            .push_bind(pattern.clone())
            .push(" OR push_name LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}
