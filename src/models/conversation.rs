use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    #[serde(skip_serializing)]
    pub id: i64,
    pub conversation_id: String,
    pub remote_conversation_id: String,
    pub session_id: String,
    pub owner_user_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Conversation ids a client sends to ask for a fresh conversation.
    pub fn is_new_sentinel(requested: &str) -> bool {
        matches!(requested.trim(), "" | "0" | "new")
    }

    /// Title for a new conversation: the first `max_chars` characters of the
    /// opening message.
    pub fn title_from(content: &str, max_chars: usize) -> String {
        content.chars().take(max_chars).collect()
    }
}
