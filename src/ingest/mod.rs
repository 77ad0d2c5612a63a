use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::error::{AppError, Result};
use crate::repos::{ChatRepo, ContactRepo, InstanceRepo, MessageRepo};
use crate::schema::{NewChat, NewContact, NewInstance, NewMessage};
use crate::services::media::{MediaSource, MediaStore, media_subdir};
use crate::services::notifier::{Notification, Notifier};

/// Common frame of every provider delivery. `data` holds the event-specific
/// payload, either a single object or an array of them.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    pub instance: String,
    #[serde(default)]
    pub data: Value,
    pub server_url: Option<String>,
    pub apikey: Option<String>,
}

/// Applies one webhook delivery to the database: resolves the instance,
/// dispatches on the event name and upserts the affected rows.
pub struct Ingestor<'a> {
    db: &'a SqlitePool,
    media: &'a MediaStore,
    source: &'a dyn MediaSource,
    notifier: &'a Notifier,
    seed_user_id: Option<i64>,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        db: &'a SqlitePool,
        media: &'a MediaStore,
        source: &'a dyn MediaSource,
        notifier: &'a Notifier,
        seed_user_id: Option<i64>,
    ) -> Self {
        Self {
            db,
            media,
            source,
            notifier,
            seed_user_id,
        }
    }

    pub async fn process(&self, payload: &Value) -> Result<()> {
        let envelope: WebhookEnvelope = serde_json::from_value(payload.clone())
            .map_err(|e| AppError::BadRequest(format!("Payload de webhook inválido: {e}")))?;

        tracing::info!(
            event = %envelope.event,
            instance = %envelope.instance,
            "webhook received"
        );

        self.ensure_instance(&envelope.instance).await?;

        match envelope.event.as_str() {
            "messages.upsert" | "send.message" => self.store_messages(&envelope).await,
            "contacts.update" => self.store_contacts(&envelope).await,
            "chats.update" => self.store_chats(&envelope).await,
            "presence.update" | "messages.update" => {
                tracing::debug!(event = %envelope.event, instance = %envelope.instance, "transient event, not persisted");
                Ok(())
            }
            other => {
                tracing::info!(event = other, instance = %envelope.instance, "unhandled webhook event");
                Ok(())
            }
        }
    }

    /// First delivery for an unregistered instance registers it unowned (or
    /// under the configured seed user). Losing a create race is fine, the row
    /// exists either way.
    async fn ensure_instance(&self, name: &str) -> Result<()> {
        let repo = InstanceRepo::new(self.db);
        if repo.get_by_name(name).await?.is_some() {
            return Ok(());
        }

        match repo
            .create(&NewInstance {
                name: name.to_string(),
                user_id: self.seed_user_id,
            })
            .await
        {
            Ok(instance) => {
                tracing::info!(instance = %instance.name, "auto-registered instance from webhook");
                Ok(())
            }
            Err(AppError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn store_messages(&self, envelope: &WebhookEnvelope) -> Result<()> {
        for item in items(&envelope.data) {
            if let Err(e) = self.store_message(envelope, item).await {
                tracing::error!(
                    instance = %envelope.instance,
                    error = %e,
                    "failed to store message, continuing with remaining items"
                );
            }
        }
        Ok(())
    }

    async fn store_message(&self, envelope: &WebhookEnvelope, item: &Value) -> Result<()> {
        let Some(id) = item.pointer("/key/id").and_then(Value::as_str) else {
            tracing::warn!(instance = %envelope.instance, "message without key.id, skipped");
            return Ok(());
        };
        let Some(remote_jid) = item.pointer("/key/remoteJid").and_then(Value::as_str) else {
            tracing::warn!(instance = %envelope.instance, message_id = id, "message without key.remoteJid, skipped");
            return Ok(());
        };

        let message_type = item.get("messageType").and_then(Value::as_str);
        let media = match (
            message_type.and_then(media_subdir),
            envelope.server_url.as_deref(),
            envelope.apikey.as_deref(),
        ) {
            (Some(_), Some(server_url), Some(apikey)) => {
                self.media
                    .process_message(self.source, server_url, apikey, item)
                    .await
            }
            _ => None,
        };

        let new = NewMessage {
            id: id.to_string(),
            remote_jid: remote_jid.to_string(),
            participant: item
                .pointer("/key/participant")
                .and_then(Value::as_str)
                .map(str::to_string),
            push_name: item
                .get("pushName")
                .and_then(Value::as_str)
                .map(str::to_string),
            message_type: message_type.map(str::to_string),
            message_timestamp: timestamp_of(item),
            owner: envelope.instance.clone(),
            source: item
                .get("source")
                .and_then(Value::as_str)
                .map(str::to_string),
            content: Some(extract_content(item)),
            media,
            raw_payload: Some(item.to_string()),
        };

        ChatRepo::new(self.db)
            .ensure(remote_jid, &envelope.instance)
            .await?;
        let stored = MessageRepo::new(self.db).create(&new).await?;
        self.notifier.publish(Notification::from(&stored));
        Ok(())
    }

    async fn store_contacts(&self, envelope: &WebhookEnvelope) -> Result<()> {
        let repo = ContactRepo::new(self.db);
        for item in items(&envelope.data) {
            let Some(id) = item.get("id").and_then(Value::as_str) else {
                tracing::warn!(instance = %envelope.instance, "contact without id, skipped");
                continue;
            };

            let new = NewContact {
                id: id.to_string(),
                push_name: item
                    .get("pushName")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                // some provider versions send profilePicUrl instead
                profile_picture_url: item
                    .get("profilePictureUrl")
                    .or_else(|| item.get("profilePicUrl"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                owner: envelope.instance.clone(),
                raw_payload: Some(item.to_string()),
            };

            match repo.create(&new).await {
                Ok(stored) => self.notifier.publish(Notification::from(&stored)),
                Err(e) => {
                    tracing::error!(
                        instance = %envelope.instance,
                        contact_id = id,
                        error = %e,
                        "failed to store contact, continuing with remaining items"
                    );
                }
            }
        }
        Ok(())
    }

    async fn store_chats(&self, envelope: &WebhookEnvelope) -> Result<()> {
        let repo = ChatRepo::new(self.db);
        for item in items(&envelope.data) {
            let Some(id) = item.get("id").and_then(Value::as_str) else {
                tracing::warn!(instance = %envelope.instance, "chat without id, skipped");
                continue;
            };

            let new = NewChat {
                id: id.to_string(),
                owner: envelope.instance.clone(),
                raw_payload: Some(item.to_string()),
            };

            match repo.create(&new).await {
                Ok(stored) => self.notifier.publish(Notification::from(&stored)),
                Err(e) => {
                    tracing::error!(
                        instance = %envelope.instance,
                        chat_id = id,
                        error = %e,
                        "failed to store chat, continuing with remaining items"
                    );
                }
            }
        }
        Ok(())
    }
}

/// The provider delivers `data` either as one object or as an array of them.
fn items(data: &Value) -> Vec<&Value> {
    match data {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![data],
        _ => Vec::new(),
    }
}

/// Some providers send the timestamp as a number, others as a decimal string.
fn timestamp_of(item: &Value) -> Option<i64> {
    match item.get("messageTimestamp") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

/// Derives the display text for a message, checking the known message kinds
/// in a fixed order. Multimedia kinds render as a bracketed label with the
/// caption or file name appended when present.
fn extract_content(item: &Value) -> String {
    let Some(message) = item.get("message").filter(|m| m.is_object()) else {
        return String::new();
    };

    if let Some(text) = message
        .get("conversation")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
    {
        return text.to_string();
    }
    if let Some(text) = message
        .pointer("/extendedTextMessage/text")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
    {
        return text.to_string();
    }

    let labeled = |kind: &str, label: &str, detail: &str| -> Option<String> {
        let inner = message.get(kind)?;
        match inner.get(detail).and_then(Value::as_str).filter(|s| !s.is_empty()) {
            Some(detail) => Some(format!("{label} {detail}")),
            None => Some(label.to_string()),
        }
    };

    if let Some(content) = labeled("imageMessage", "[Imagen]", "caption") {
        return content;
    }
    if let Some(content) = labeled("videoMessage", "[Video]", "caption") {
        return content;
    }
    if let Some(content) = labeled("documentMessage", "[Documento]", "fileName") {
        return content;
    }
    if message.get("audioMessage").is_some() {
        return "[Audio]".to_string();
    }
    if message.get("stickerMessage").is_some() {
        return "[Sticker]".to_string();
    }

    let kind = item
        .get("messageType")
        .and_then(Value::as_str)
        .unwrap_or("Mensaje");
    format!("[{kind}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::services::media::MediaDownload;
    use async_trait::async_trait;
    use base64::Engine;
    use serde_json::json;

    struct NoSource;

    #[async_trait]
    impl MediaSource for NoSource {
        async fn fetch_base64(
            &self,
            _server_url: &str,
            _api_key: &str,
            _message_id: &str,
        ) -> anyhow::Result<MediaDownload> {
            anyhow::bail!("no media backend in this test")
        }
    }

    struct OkSource;

    #[async_trait]
    impl MediaSource for OkSource {
        async fn fetch_base64(
            &self,
            _server_url: &str,
            _api_key: &str,
            _message_id: &str,
        ) -> anyhow::Result<MediaDownload> {
            Ok(MediaDownload {
                base64: base64::engine::general_purpose::STANDARD.encode(b"pixels"),
                mime_type: "image/jpeg".to_string(),
                file_name: None,
            })
        }
    }

    fn message_event(instance: &str, items: Value) -> Value {
        json!({
            "event": "messages.upsert",
            "instance": instance,
            "data": items
        })
    }

    fn text_item(id: &str, text: &str) -> Value {
        json!({
            "key": { "id": id, "remoteJid": "123@g.us" },
            "pushName": "Ana",
            "messageType": "conversation",
            "messageTimestamp": 1_700_000_000,
            "message": { "conversation": text }
        })
    }

    #[test]
    fn content_extraction_follows_kind_priority() {
        let text = json!({"message": {"conversation": "hola"}});
        assert_eq!(extract_content(&text), "hola");

        let extended = json!({"message": {"conversation": "", "extendedTextMessage": {"text": "largo"}}});
        assert_eq!(extract_content(&extended), "largo");

        let image = json!({"message": {"imageMessage": {"caption": "hi"}}});
        assert_eq!(extract_content(&image), "[Imagen] hi");

        let image_no_caption = json!({"message": {"imageMessage": {}}});
        assert_eq!(extract_content(&image_no_caption), "[Imagen]");

        let document = json!({"message": {"documentMessage": {"fileName": "cv.pdf"}}});
        assert_eq!(extract_content(&document), "[Documento] cv.pdf");

        let audio = json!({"message": {"audioMessage": {"seconds": 3}}});
        assert_eq!(extract_content(&audio), "[Audio]");

        let unknown = json!({"messageType": "reactionMessage", "message": {"reactionMessage": {}}});
        assert_eq!(extract_content(&unknown), "[reactionMessage]");

        let untyped = json!({"message": {"somethingNew": {}}});
        assert_eq!(extract_content(&untyped), "[Mensaje]");

        let no_message = json!({"key": {"id": "x"}});
        assert_eq!(extract_content(&no_message), "");
    }

    #[test]
    fn string_timestamps_are_parsed() {
        assert_eq!(timestamp_of(&json!({"messageTimestamp": 5})), Some(5));
        assert_eq!(timestamp_of(&json!({"messageTimestamp": "7"})), Some(7));
        assert_eq!(timestamp_of(&json!({"messageTimestamp": "x"})), None);
        assert_eq!(timestamp_of(&json!({})), None);
    }

    #[tokio::test]
    async fn first_webhook_auto_registers_the_instance_once() {
        let pool = test_pool().await;
        let tmp = tempfile::tempdir().unwrap();
        let media = MediaStore::new(tmp.path());
        let notifier = Notifier::new();
        let ingestor = Ingestor::new(&pool, &media, &NoSource, &notifier, None);

        ingestor
            .process(&message_event("shop1", json!([text_item("m1", "hola")])))
            .await
            .unwrap();
        ingestor
            .process(&message_event("shop1", json!([text_item("m2", "adios")])))
            .await
            .unwrap();

        let instances = InstanceRepo::new(&pool).all_with_stats().await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].name, "shop1");
        assert_eq!(instances[0].message_count, 2);
        assert_eq!(instances[0].chat_count, 1);
    }

    #[tokio::test]
    async fn image_without_credentials_is_stored_undownloaded() {
        let pool = test_pool().await;
        let tmp = tempfile::tempdir().unwrap();
        let media = MediaStore::new(tmp.path());
        let notifier = Notifier::new();
        let ingestor = Ingestor::new(&pool, &media, &NoSource, &notifier, None);

        let item = json!({
            "key": { "id": "m1", "remoteJid": "123@g.us" },
            "messageType": "imageMessage",
            "message": { "imageMessage": { "caption": "hi" } }
        });
        ingestor
            .process(&message_event("shop1", json!([item])))
            .await
            .unwrap();

        let row = MessageRepo::new(&pool).get("m1").await.unwrap().unwrap();
        assert_eq!(row.content.as_deref(), Some("[Imagen] hi"));
        assert!(!row.media_downloaded);
        assert!(row.media_path.is_none());
    }

    #[tokio::test]
    async fn failed_media_download_still_persists_the_message() {
        let pool = test_pool().await;
        let tmp = tempfile::tempdir().unwrap();
        let media = MediaStore::new(tmp.path());
        let notifier = Notifier::new();
        let ingestor = Ingestor::new(&pool, &media, &NoSource, &notifier, None);

        let item = json!({
            "key": { "id": "m1", "remoteJid": "123@g.us" },
            "messageType": "imageMessage",
            "message": { "imageMessage": {} }
        });
        let payload = json!({
            "event": "messages.upsert",
            "instance": "shop1",
            "data": [item],
            "server_url": "http://evo.local",
            "apikey": "key"
        });
        ingestor.process(&payload).await.unwrap();

        let row = MessageRepo::new(&pool).get("m1").await.unwrap().unwrap();
        assert!(!row.media_downloaded);
    }

    #[tokio::test]
    async fn media_download_fills_the_media_columns() {
        let pool = test_pool().await;
        let tmp = tempfile::tempdir().unwrap();
        let media = MediaStore::new(tmp.path());
        let notifier = Notifier::new();
        let ingestor = Ingestor::new(&pool, &media, &OkSource, &notifier, None);

        let item = json!({
            "key": { "id": "m1", "remoteJid": "123@g.us" },
            "messageType": "imageMessage",
            "message": { "imageMessage": { "caption": "hi" } }
        });
        let payload = json!({
            "event": "messages.upsert",
            "instance": "shop1",
            "data": [item],
            "server_url": "http://evo.local",
            "apikey": "key"
        });
        ingestor.process(&payload).await.unwrap();

        let row = MessageRepo::new(&pool).get("m1").await.unwrap().unwrap();
        assert!(row.media_downloaded);
        assert_eq!(row.media_mimetype.as_deref(), Some("image/jpeg"));
        assert_eq!(row.media_size, Some(6));
        assert!(row.media_path.unwrap().starts_with("/uploads/images/"));
    }

    #[tokio::test]
    async fn item_without_identity_is_skipped_and_siblings_survive() {
        let pool = test_pool().await;
        let tmp = tempfile::tempdir().unwrap();
        let media = MediaStore::new(tmp.path());
        let notifier = Notifier::new();
        let ingestor = Ingestor::new(&pool, &media, &NoSource, &notifier, None);

        let broken = json!({ "message": { "conversation": "sin clave" } });
        ingestor
            .process(&message_event(
                "shop1",
                json!([broken, text_item("m1", "hola")]),
            ))
            .await
            .unwrap();

        let repo = MessageRepo::new(&pool);
        assert_eq!(repo.count(None).await.unwrap(), 1);
        assert!(repo.get("m1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn send_message_event_uses_the_message_path() {
        let pool = test_pool().await;
        let tmp = tempfile::tempdir().unwrap();
        let media = MediaStore::new(tmp.path());
        let notifier = Notifier::new();
        let ingestor = Ingestor::new(&pool, &media, &NoSource, &notifier, None);

        let payload = json!({
            "event": "send.message",
            "instance": "shop1",
            "data": text_item("m1", "enviado")
        });
        ingestor.process(&payload).await.unwrap();

        let row = MessageRepo::new(&pool).get("m1").await.unwrap().unwrap();
        assert_eq!(row.content.as_deref(), Some("enviado"));
    }

    #[tokio::test]
    async fn contacts_and_chats_events_upsert_rows() {
        let pool = test_pool().await;
        let tmp = tempfile::tempdir().unwrap();
        let media = MediaStore::new(tmp.path());
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let ingestor = Ingestor::new(&pool, &media, &NoSource, &notifier, None);

        ingestor
            .process(&json!({
                "event": "contacts.update",
                "instance": "shop1",
                "data": [{ "id": "555@s.net", "pushName": "Ana", "profilePicUrl": "http://p/1.jpg" }]
            }))
            .await
            .unwrap();
        ingestor
            .process(&json!({
                "event": "chats.update",
                "instance": "shop1",
                "data": { "id": "123@g.us" }
            }))
            .await
            .unwrap();

        let contact = ContactRepo::new(&pool).get("555@s.net").await.unwrap().unwrap();
        assert_eq!(contact.push_name.as_deref(), Some("Ana"));
        assert!(ChatRepo::new(&pool).get("123@g.us").await.unwrap().is_some());

        assert_eq!(rx.recv().await.unwrap().event_name(), "new_contact");
        assert_eq!(rx.recv().await.unwrap().event_name(), "new_chat");
    }

    #[tokio::test]
    async fn contact_picture_is_read_from_either_provider_key() {
        let pool = test_pool().await;
        let tmp = tempfile::tempdir().unwrap();
        let media = MediaStore::new(tmp.path());
        let notifier = Notifier::new();
        let ingestor = Ingestor::new(&pool, &media, &NoSource, &notifier, None);

        ingestor
            .process(&json!({
                "event": "contacts.update",
                "instance": "shop1",
                "data": [
                    { "id": "c1", "profilePictureUrl": "http://p/long.jpg" },
                    { "id": "c2", "profilePicUrl": "http://p/short.jpg" }
                ]
            }))
            .await
            .unwrap();

        let repo = ContactRepo::new(&pool);
        let c1 = repo.get("c1").await.unwrap().unwrap();
        assert_eq!(c1.profile_picture_url.as_deref(), Some("http://p/long.jpg"));
        let c2 = repo.get("c2").await.unwrap().unwrap();
        assert_eq!(c2.profile_picture_url.as_deref(), Some("http://p/short.jpg"));
    }

    #[tokio::test]
    async fn presence_update_is_acknowledged_without_writes() {
        let pool = test_pool().await;
        let tmp = tempfile::tempdir().unwrap();
        let media = MediaStore::new(tmp.path());
        let notifier = Notifier::new();
        let ingestor = Ingestor::new(&pool, &media, &NoSource, &notifier, None);

        ingestor
            .process(&json!({
                "event": "presence.update",
                "instance": "shop1",
                "data": { "id": "123@g.us", "presences": {} }
            }))
            .await
            .unwrap();

        // instance row is still provisioned, nothing else is
        assert!(InstanceRepo::new(&pool).get_by_name("shop1").await.unwrap().is_some());
        assert_eq!(MessageRepo::new(&pool).count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_envelope_is_a_bad_request() {
        let pool = test_pool().await;
        let tmp = tempfile::tempdir().unwrap();
        let media = MediaStore::new(tmp.path());
        let notifier = Notifier::new();
        let ingestor = Ingestor::new(&pool, &media, &NoSource, &notifier, None);

        let err = ingestor.process(&json!({"data": []})).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
