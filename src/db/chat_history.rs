use crate::helpers::StoredUpload;
use crate::models;
use sqlx::{PgConnection, PgPool};
use tracing::Instrument;

const COLUMNS: &str = "id, chat_id, conversation_id, session_id, user_text, assistant_text, \
                       file_name, file_url, file_type, created_at, updated_at, deleted_at";

pub async fn insert(
    conn: &mut PgConnection,
    chat_id: &str,
    conversation_id: &str,
    session_id: &str,
    user_text: &str,
    assistant_text: &str,
    attachment: Option<&StoredUpload>,
) -> Result<models::ChatHistory, String> {
    let query_span = tracing::info_span!("Inserting chat history row");
    sqlx::query_as::<_, models::ChatHistory>(&format!(
        r#"
        INSERT INTO chat_history (chat_id, conversation_id, session_id, user_text, assistant_text,
                                  file_name, file_url, file_type, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
        RETURNING {COLUMNS}
        "#
    ))
    .bind(chat_id)
    .bind(conversation_id)
    .bind(session_id)
    .bind(user_text)
    .bind(assistant_text)
    .bind(attachment.map(|a| a.name.as_str()))
    .bind(attachment.map(|a| a.url.as_str()))
    .bind(attachment.map(|a| a.content_type.as_str()))
    .fetch_one(conn)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to insert chat history: {:?}", err);
        "Failed to save chat history".to_string()
    })
}

pub async fn latest(
    pool: &PgPool,
    conversation_id: &str,
) -> Result<Option<models::ChatHistory>, String> {
    let query_span = tracing::info_span!("Fetching last exchange", conversation_id);
    sqlx::query_as::<_, models::ChatHistory>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM chat_history
        WHERE conversation_id = $1 AND deleted_at IS NULL
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#
    ))
    .bind(conversation_id)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch chat history: {:?}", err);
        "Database error".to_string()
    })
}
