pub mod chats;
pub mod contacts;
pub mod instances;
pub mod messages;
pub mod users;

pub use chats::ChatRepo;
pub use contacts::ContactRepo;
pub use instances::InstanceRepo;
pub use messages::MessageRepo;
pub use users::UserRepo;
