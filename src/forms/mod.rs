pub mod chat;
pub mod user;

pub use chat::{ChatMessage, DeleteConversation, SaveChat};
pub use user::{Login, Register};
