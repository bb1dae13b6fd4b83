use crate::models;
use sqlx::{PgConnection, PgPool};
use tracing::Instrument;

pub async fn insert_account(
    conn: &mut PgConnection,
    username: &str,
    password_hash: &str,
) -> Result<models::Account, String> {
    let query_span = tracing::info_span!("Inserting account", username);
    sqlx::query_as::<_, models::Account>(
        r#"
        INSERT INTO auths (username, password)
        VALUES ($1, $2)
        RETURNING id, username, password
        "#,
    )
    .bind(username)
    .bind(password_hash)
    .fetch_one(conn)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to insert account: {:?}", err);
        "Failed to create account".to_string()
    })
}

pub async fn insert_user(
    conn: &mut PgConnection,
    name: &str,
    email: &str,
    auth_id: i64,
) -> Result<models::User, String> {
    let query_span = tracing::info_span!("Inserting user");
    sqlx::query_as::<_, models::User>(
        r#"
        INSERT INTO users (name, email, auth_id)
        VALUES ($1, $2, $3)
        RETURNING id, name, email, auth_id
        "#,
    )
    .bind(name)
    .bind(email)
    .bind(auth_id)
    .fetch_one(conn)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to insert user: {:?}", err);
        "Failed to create user".to_string()
    })
}

pub async fn fetch_account_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<models::Account>, String> {
    let query_span = tracing::info_span!("Fetching account by username", username);
    sqlx::query_as::<_, models::Account>(
        r#"SELECT id, username, password FROM auths WHERE username = $1"#,
    )
    .bind(username)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch account: {:?}", err);
        "Database error".to_string()
    })
}

pub async fn fetch_by_auth_id(pool: &PgPool, auth_id: i64) -> Result<Option<models::User>, String> {
    let query_span = tracing::info_span!("Fetching user by auth id");
    sqlx::query_as::<_, models::User>(
        r#"SELECT id, name, email, auth_id FROM users WHERE auth_id = $1"#,
    )
    .bind(auth_id)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch user: {:?}", err);
        "Database error".to_string()
    })
}

pub async fn fetch_profile(pool: &PgPool, user_id: i64) -> Result<Option<models::Profile>, String> {
    let query_span = tracing::info_span!("Fetching user profile");
    sqlx::query_as::<_, models::Profile>(
        r#"
        SELECT u.id, u.name, u.email, a.username
        FROM users u
        JOIN auths a ON a.id = u.auth_id
        WHERE u.id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch profile: {:?}", err);
        "Database error".to_string()
    })
}
