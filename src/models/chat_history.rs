use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Denormalised copy of one exchange, kept for "last exchange" reads.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatHistory {
    #[serde(skip_serializing)]
    pub id: i64,
    pub chat_id: String,
    pub conversation_id: String,
    pub session_id: String,
    pub user_text: String,
    pub assistant_text: String,
    pub file_name: Option<String>,
    pub file_url: Option<String>,
    pub file_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}
