use crate::models;
use sqlx::{PgConnection, PgPool};
use tracing::Instrument;

const COLUMNS: &str = "id, conversation_id, remote_conversation_id, session_id, owner_user_id, \
                       title, created_at, updated_at, deleted_at";

pub async fn insert(
    conn: &mut PgConnection,
    conversation_id: &str,
    remote_conversation_id: &str,
    session_id: &str,
    owner_user_id: i64,
    title: &str,
) -> Result<models::Conversation, String> {
    let query_span = tracing::info_span!("Inserting conversation into database");
    sqlx::query_as::<_, models::Conversation>(&format!(
        r#"
        INSERT INTO conversations (conversation_id, remote_conversation_id, session_id,
                                   owner_user_id, title, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        RETURNING {COLUMNS}
        "#
    ))
    .bind(conversation_id)
    .bind(remote_conversation_id)
    .bind(session_id)
    .bind(owner_user_id)
    .bind(title)
    .fetch_one(conn)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to insert conversation: {:?}", err);
        "Failed to create conversation".to_string()
    })
}

/// Bump `updated_at` on a live conversation owned by `owner_user_id`. An empty
/// remote id is filled in with `remote_conversation_id`; a set one is kept.
/// Returns `None` when no such conversation exists.
pub async fn touch_owned(
    conn: &mut PgConnection,
    conversation_id: &str,
    owner_user_id: i64,
    remote_conversation_id: &str,
) -> Result<Option<models::Conversation>, String> {
    let query_span = tracing::info_span!("Touching conversation", conversation_id);
    sqlx::query_as::<_, models::Conversation>(&format!(
        r#"
        UPDATE conversations
        SET updated_at = NOW(),
            remote_conversation_id = CASE
                WHEN remote_conversation_id = '' THEN $3
                ELSE remote_conversation_id
            END
        WHERE conversation_id = $1 AND owner_user_id = $2 AND deleted_at IS NULL
        RETURNING {COLUMNS}
        "#
    ))
    .bind(conversation_id)
    .bind(owner_user_id)
    .bind(remote_conversation_id)
    .fetch_optional(conn)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to update conversation: {:?}", err);
        "Failed to update conversation".to_string()
    })
}

pub async fn fetch_owned(
    pool: &PgPool,
    conversation_id: &str,
    owner_user_id: i64,
) -> Result<Option<models::Conversation>, String> {
    let query_span = tracing::info_span!("Fetching conversation", conversation_id);
    sqlx::query_as::<_, models::Conversation>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM conversations
        WHERE conversation_id = $1 AND owner_user_id = $2 AND deleted_at IS NULL
        "#
    ))
    .bind(conversation_id)
    .bind(owner_user_id)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch conversation: {:?}", err);
        "Database error".to_string()
    })
}

/// Soft delete. `false` when nothing live and owned matched.
pub async fn soft_delete(
    pool: &PgPool,
    conversation_id: &str,
    owner_user_id: i64,
) -> Result<bool, String> {
    let query_span = tracing::info_span!("Soft-deleting conversation", conversation_id);
    sqlx::query(
        r#"
        UPDATE conversations
        SET deleted_at = NOW(), updated_at = NOW()
        WHERE conversation_id = $1 AND owner_user_id = $2 AND deleted_at IS NULL
        "#,
    )
    .bind(conversation_id)
    .bind(owner_user_id)
    .execute(pool)
    .instrument(query_span)
    .await
    .map(|result| result.rows_affected() > 0)
    .map_err(|err| {
        tracing::error!("Failed to delete conversation: {:?}", err);
        "Failed to delete conversation".to_string()
    })
}
