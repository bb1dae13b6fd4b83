use crate::models;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tracing::Instrument;

const COLUMNS: &str = "id, message_id, conversation_id, parent_message_id, role, content, \
                       metadata, created_at, updated_at, deleted_at";

pub async fn insert(
    conn: &mut PgConnection,
    message_id: &str,
    conversation_id: &str,
    parent_message_id: Option<&str>,
    role: models::MessageRole,
    content: &str,
    metadata: &models::MessageMetadata,
) -> Result<models::Message, String> {
    let query_span = tracing::info_span!("Inserting message into database", role = %role);
    sqlx::query_as::<_, models::Message>(&format!(
        r#"
        INSERT INTO messages (message_id, conversation_id, parent_message_id, role, content,
                              metadata, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
        RETURNING {COLUMNS}
        "#
    ))
    .bind(message_id)
    .bind(conversation_id)
    .bind(parent_message_id)
    .bind(role.as_str())
    .bind(content)
    .bind(Json(metadata))
    .fetch_one(conn)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to insert {} message: {:?}", role, err);
        format!("Failed to save {} message", role)
    })
}

pub async fn count_live(pool: &PgPool, conversation_id: &str) -> Result<i64, String> {
    let query_span = tracing::info_span!("Counting conversation messages", conversation_id);
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM messages
        WHERE conversation_id = $1 AND deleted_at IS NULL
        "#,
    )
    .bind(conversation_id)
    .fetch_one(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to count messages: {:?}", err);
        "Database error".to_string()
    })
}

pub async fn list_live(
    pool: &PgPool,
    conversation_id: &str,
) -> Result<Vec<models::Message>, String> {
    let query_span = tracing::info_span!("Listing conversation messages", conversation_id);
    sqlx::query_as::<_, models::Message>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM messages
        WHERE conversation_id = $1 AND deleted_at IS NULL
        ORDER BY created_at, id
        "#
    ))
    .bind(conversation_id)
    .fetch_all(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to list messages: {:?}", err);
        "Database error".to_string()
    })
}
