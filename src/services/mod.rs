pub mod chat;
pub mod exchange_store;

pub use chat::{ChatError, ChatInput, ChatService, ExchangeOutcome, PreparedExchange, SavedExchange};
pub use exchange_store::{ExchangeStore, PgExchangeStore};
