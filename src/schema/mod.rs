pub mod chat;
pub mod contact;
pub mod instance;
pub mod message;
pub mod user;

pub use chat::*;
pub use contact::*;
pub use instance::*;
pub use message::*;
pub use user::*;
