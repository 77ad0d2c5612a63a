pub mod evolution;
pub mod media;
pub mod notifier;

pub use evolution::EvolutionClient;
pub use media::{MediaDownload, MediaSource, MediaStore};
pub use notifier::{Notification, Notifier};
