mod chat_history;
mod conversation;
mod message;
mod user;

pub use chat_history::*;
pub use conversation::*;
pub use message::*;
pub use user::*;
