use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::schema::MediaDescriptor;

/// Base64 blob as returned by the provider's media endpoint.
#[derive(Debug, Clone)]
pub struct MediaDownload {
    pub base64: String,
    pub mime_type: String,
    pub file_name: Option<String>,
}

/// Seam between ingestion and the provider; lets tests substitute the
/// download step.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch_base64(
        &self,
        server_url: &str,
        api_key: &str,
        message_id: &str,
    ) -> anyhow::Result<MediaDownload>;
}

/// Stickers share the image directory.
pub fn media_subdir(message_type: &str) -> Option<&'static str> {
    match message_type {
        "imageMessage" | "stickerMessage" => Some("images"),
        "videoMessage" => Some("videos"),
        "audioMessage" => Some("audios"),
        "documentMessage" => Some("documents"),
        _ => None,
    }
}

fn default_extension(message_type: &str) -> &'static str {
    match message_type {
        "imageMessage" => ".jpg",
        "videoMessage" => ".mp4",
        "audioMessage" => ".ogg",
        "documentMessage" => ".pdf",
        "stickerMessage" => ".webp",
        _ => ".bin",
    }
}

fn strip_data_uri(data: &str) -> &str {
    if data.starts_with("data:") {
        if let Some(idx) = data.find(";base64,") {
            return &data[idx + ";base64,".len()..];
        }
    }
    data
}

pub struct MediaStore {
    base_dir: PathBuf,
}

struct SavedFile {
    web_path: String,
    size: i64,
}

impl MediaStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `{messageId}_{unixMillis}_{originalStem}{ext}`; the extension comes
    /// from the original name when one is known, else from the type default.
    pub fn generate_file_name(
        message_id: &str,
        message_type: &str,
        original_name: Option<&str>,
    ) -> String {
        let timestamp = Utc::now().timestamp_millis();
        let fallback = default_extension(message_type);

        match original_name {
            Some(original) => {
                let path = Path::new(original);
                let ext = path
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_else(|| fallback.to_string());
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("{message_id}_{timestamp}_{stem}{ext}")
            }
            None => format!("{message_id}_{timestamp}{fallback}"),
        }
    }

    async fn save_base64(
        &self,
        data: &str,
        file_name: &str,
        message_type: &str,
    ) -> anyhow::Result<SavedFile> {
        let subdir = media_subdir(message_type).unwrap_or("documents");
        let dir = self.base_dir.join(subdir);
        tokio::fs::create_dir_all(&dir).await?;

        let bytes = BASE64.decode(strip_data_uri(data).trim())?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, &bytes).await?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "saved media file");

        Ok(SavedFile {
            web_path: format!("/uploads/{subdir}/{file_name}"),
            size: bytes.len() as i64,
        })
    }

    /// Downloads and stores the attachment for one multimedia message item.
    /// Never propagates an error: any failure is logged and the caller
    /// persists the message without media fields.
    pub async fn process_message(
        &self,
        source: &dyn MediaSource,
        server_url: &str,
        api_key: &str,
        item: &Value,
    ) -> Option<MediaDescriptor> {
        let message_type = item.get("messageType").and_then(Value::as_str)?;
        let message_id = item.pointer("/key/id").and_then(Value::as_str)?;
        media_subdir(message_type)?;

        let media_info = item.pointer(&format!("/message/{message_type}"));
        let caption = media_info
            .and_then(|m| m.get("caption"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let original_name = media_info
            .and_then(|m| m.get("fileName").or_else(|| m.get("caption")))
            .and_then(Value::as_str)
            .map(str::to_string);

        let download = match source.fetch_base64(server_url, api_key, message_id).await {
            Ok(download) => download,
            Err(e) => {
                tracing::warn!(message_id, error = %e, "media download failed");
                return None;
            }
        };

        let file_name = Self::generate_file_name(
            message_id,
            message_type,
            original_name.as_deref().or(download.file_name.as_deref()),
        );

        match self.save_base64(&download.base64, &file_name, message_type).await {
            Ok(saved) => Some(MediaDescriptor {
                media_type: message_type.to_string(),
                file_name,
                web_path: saved.web_path,
                file_size: saved.size,
                mime_type: download.mime_type,
                caption,
            }),
            Err(e) => {
                tracing::error!(message_id, error = %e, "failed to save media file");
                None
            }
        }
    }

    /// Retention sweep: removes files older than `days`, independently per
    /// subdirectory. Not wired to a recurring scheduler; callers run it on
    /// demand.
    pub fn cleanup_old_media(&self, days: u64) {
        let cutoff = SystemTime::now() - Duration::from_secs(days * 86_400);

        for subdir in ["images", "videos", "audios", "documents"] {
            let dir = self.base_dir.join(subdir);
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };

            for entry in entries.flatten() {
                let path = entry.path();
                let modified = entry.metadata().and_then(|m| m.modified());
                if let Ok(modified) = modified {
                    if modified < cutoff {
                        match std::fs::remove_file(&path) {
                            Ok(()) => tracing::info!(path = %path.display(), "removed old media file"),
                            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove old media file"),
                        }
                    }
                }
            }
        }
    }
}
