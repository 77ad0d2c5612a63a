use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::schema::{Chat, Contact, Message};

const CHANNEL_CAPACITY: usize = 256;

/// Redacted view of a stored message pushed to dashboard sessions. Carries
/// neither the raw payload nor any on-disk location.
#[derive(Debug, Clone, Serialize)]
pub struct MessageNotice {
    pub id: String,
    pub remote_jid: String,
    pub push_name: Option<String>,
    pub message_type: Option<String>,
    pub message_timestamp: Option<i64>,
    pub owner: String,
    pub content: Option<String>,
    pub media_downloaded: bool,
    pub media_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactNotice {
    pub id: String,
    pub push_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub owner: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatNotice {
    pub id: String,
    pub owner: String,
}

#[derive(Debug, Clone)]
pub enum Notification {
    NewMessage(MessageNotice),
    NewContact(ContactNotice),
    NewChat(ChatNotice),
}

impl Notification {
    pub fn event_name(&self) -> &'static str {
        match self {
            Notification::NewMessage(_) => "new_message",
            Notification::NewContact(_) => "new_contact",
            Notification::NewChat(_) => "new_chat",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Notification::NewMessage(n) => serde_json::json!(n),
            Notification::NewContact(n) => serde_json::json!(n),
            Notification::NewChat(n) => serde_json::json!(n),
        }
    }
}

impl From<&Message> for Notification {
    fn from(message: &Message) -> Self {
        Notification::NewMessage(MessageNotice {
            id: message.id.clone(),
            remote_jid: message.remote_jid.clone(),
            push_name: message.push_name.clone(),
            message_type: message.message_type.clone(),
            message_timestamp: message.message_timestamp,
            owner: message.owner.clone(),
            content: message.content.clone(),
            media_downloaded: message.media_downloaded,
            media_path: message.media_path.clone(),
        })
    }
}

impl From<&Contact> for Notification {
    fn from(contact: &Contact) -> Self {
        Notification::NewContact(ContactNotice {
            id: contact.id.clone(),
            push_name: contact.push_name.clone(),
            profile_picture_url: contact.profile_picture_url.clone(),
            owner: contact.owner.clone(),
        })
    }
}

impl From<&Chat> for Notification {
    fn from(chat: &Chat) -> Self {
        Notification::NewChat(ChatNotice {
            id: chat.id.clone(),
            owner: chat.owner.clone(),
        })
    }
}

/// Fire-and-forget fan-out to subscribed dashboard sessions. Publishing with
/// no subscriber attached is a defined no-op; slow subscribers lose the
/// oldest events.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn publish(&self, notification: Notification) {
        // SendError here only means nobody is listening
        let _ = self.tx.send(notification);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
