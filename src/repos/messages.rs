use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::Result;
use crate::schema::{Message, MessagePatch, NewMessage};

pub struct MessageRepo<'a> {
    db: &'a SqlitePool,
}

impl<'a> MessageRepo<'a> {
    pub fn new(db: &'a SqlitePool) -> Self {
        Self { db }
    }

    /// Newest first; ordering is only as good as the provider-supplied
    /// timestamp.
    pub async fn all(&self) -> Result<Vec<Message>> {
        let rows =
            sqlx::query_as::<_, Message>("SELECT * FROM messages ORDER BY message_timestamp DESC")
                .fetch_all(self.db)
                .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db)
            .await?;
        Ok(row)
    }

    pub async fn create(&self, new: &NewMessage) -> Result<Message> {
        let media = new.media.as_ref();
        sqlx::query(
            r#"INSERT INTO messages
                 (id, remote_jid, participant, push_name, message_type, message_timestamp,
                  owner, source, content, media_type, media_filename, media_path, media_size,
                  media_mimetype, media_caption, media_downloaded, raw_payload)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 remote_jid = excluded.remote_jid,
                 participant = excluded.participant,
                 push_name = excluded.push_name,
                 message_type = excluded.message_type,
                 message_timestamp = excluded.message_timestamp,
                 owner = excluded.owner,
                 source = excluded.source,
                 content = excluded.content,
                 media_type = excluded.media_type,
                 media_filename = excluded.media_filename,
                 media_path = excluded.media_path,
                 media_size = excluded.media_size,
                 media_mimetype = excluded.media_mimetype,
                 media_caption = excluded.media_caption,
                 media_downloaded = excluded.media_downloaded,
                 raw_payload = excluded.raw_payload,
                 updated_at = strftime('%s', 'now')"#,
        )
        .bind(&new.id)
        .bind(&new.remote_jid)
        .bind(&new.participant)
        .bind(&new.push_name)
        .bind(&new.message_type)
        .bind(new.message_timestamp)
        .bind(&new.owner)
        .bind(&new.source)
        .bind(&new.content)
        .bind(media.map(|m| m.media_type.clone()))
        .bind(media.map(|m| m.file_name.clone()))
        .bind(media.map(|m| m.web_path.clone()))
        .bind(media.map(|m| m.file_size))
        .bind(media.map(|m| m.mime_type.clone()))
        .bind(media.and_then(|m| m.caption.clone()))
        .bind(media.is_some())
        .bind(&new.raw_payload)
        .execute(self.db)
        .await?;

        let row = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ?")
            .bind(&new.id)
            .fetch_one(self.db)
            .await?;
        Ok(row)
    }

    pub async fn update(&self, id: &str, patch: &MessagePatch) -> Result<Option<Message>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE messages SET updated_at = strftime('%s', 'now')");
        if let Some(remote_jid) = &patch.remote_jid {
            qb.push(", remote_jid = ").push_bind(remote_jid);
        }
        if let Some(participant) = &patch.participant {
            qb.push(", participant = ").push_bind(participant);
        }
        if let Some(push_name) = &patch.push_name {
            qb.push(", push_name = ").push_bind(push_name);
        }
        if let Some(message_type) = &patch.message_type {
            qb.push(", message_type = ").push_bind(message_type);
        }
        if let Some(ts) = patch.message_timestamp {
            qb.push(", message_timestamp = ").push_bind(ts);
        }
        if let Some(owner) = &patch.owner {
            qb.push(", owner = ").push_bind(owner);
        }
        if let Some(source) = &patch.source {
            qb.push(", source = ").push_bind(source);
        }
        if let Some(content) = &patch.content {
            qb.push(", content = ").push_bind(content);
        }
        if let Some(raw) = &patch.raw_payload {
            qb.push(", raw_payload = ").push_bind(raw);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(self.db).await?;

        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self, owner: Option<&str>) -> Result<i64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM messages");
        if let Some(owner) = owner {
            qb.push(" WHERE owner = ").push_bind(owner);
        }
        Ok(qb.build_query_scalar().fetch_one(self.db).await?)
    }

    pub async fn count_filtered(&self, owner: Option<&str>, search: &str) -> Result<i64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM messages");
        push_filters(&mut qb, owner, search);
        Ok(qb.build_query_scalar().fetch_one(self.db).await?)
    }

    pub async fn page(
        &self,
        owner: Option<&str>,
        search: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM messages");
        push_filters(&mut qb, owner, search);
        qb.push(" ORDER BY message_timestamp DESC LIMIT ")
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
            .push(" OR remote_jid LIKE ")
            .push_bind(pattern.clone())
            .push(" OR push_name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR content LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}
