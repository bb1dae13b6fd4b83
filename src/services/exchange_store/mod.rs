//! Durable record of chat exchanges.
//!
//! One exchange is four writes: the conversation (created or touched), the
//! user message, the assistant message pointing at it, and the chat-history
//! row. Implementations commit all four or none.

use crate::helpers::StoredUpload;
use async_trait::async_trait;
use serde_json::Value;

pub mod postgres;
#[cfg(test)]
pub mod mock;

#[cfg(test)]
pub use mock::{FailPoint, MemoryExchangeStore};
pub use postgres::PgExchangeStore;

#[derive(Debug, Clone, Default)]
pub struct ExchangeRecord {
    pub user_id: i64,
    pub session_id: String,
    /// What the client asked for; a sentinel or unknown id starts a new one.
    pub requested_conversation_id: String,
    pub user_content: String,
    pub assistant_content: String,
    /// Empty when the remote side never sent a terminal status.
    pub remote_conversation_id: String,
    pub api_response: Option<Value>,
    pub attachment: Option<StoredUpload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedExchange {
    pub conversation_id: String,
    pub remote_conversation_id: String,
    pub user_message_id: String,
    pub assistant_message_id: String,
    pub chat_id: String,
    pub created: bool,
}

/// What the pipeline needs to know about a conversation before calling out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    pub remote_conversation_id: String,
    pub message_count: i64,
}

#[async_trait]
pub trait ExchangeStore: Send + Sync {
    /// Live conversation owned by `user_id`, or `None`.
    async fn conversation_state(
        &self,
        conversation_id: &str,
        user_id: i64,
    ) -> Result<Option<ConversationState>, String>;

    async fn record_exchange(&self, exchange: &ExchangeRecord) -> Result<RecordedExchange, String>;
}
