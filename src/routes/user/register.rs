use crate::db;
use crate::forms;
use crate::helpers::JsonResponse;
use crate::models;
use actix_web::{post, web, Responder, Result};
use serde_valid::Validate;
use sqlx::PgPool;

/// POST /api/user/register
#[tracing::instrument(name = "Register user.", skip_all, fields(username = %form.username))]
#[post("/register")]
pub async fn handler(
    form: web::Json<forms::Register>,
    pg_pool: web::Data<PgPool>,
) -> Result<impl Responder> {
    if let Err(errors) = form.validate() {
        tracing::debug!("Invalid registration: {}", errors);
        return Err(JsonResponse::<models::User>::build().form_error(errors.to_string()));
    }

    let existing = db::user::fetch_account_by_username(pg_pool.get_ref(), &form.username)
        .await
        .map_err(|err| JsonResponse::<models::User>::build().internal_server_error(err))?;
    if existing.is_some() {
        return Err(JsonResponse::<models::User>::build().conflict("Username already taken"));
    }

    let password = form.password.clone();
    let password_hash = web::block(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|err| JsonResponse::<models::User>::build().internal_server_error(err.to_string()))?
        .map_err(|err| {
            tracing::error!("Failed to hash password: {:?}", err);
            JsonResponse::<models::User>::build().internal_server_error("Failed to create account")
        })?;

    let mut tx = pg_pool.begin().await.map_err(|err| {
        tracing::error!("Failed to begin transaction: {:?}", err);
        JsonResponse::<models::User>::build().internal_server_error("Database error")
    })?;

    let account = db::user::insert_account(&mut *tx, &form.username, &password_hash)
        .await
        .map_err(|err| JsonResponse::<models::User>::build().internal_server_error(err))?;
    let user = db::user::insert_user(&mut *tx, &form.name, &form.email, account.id)
        .await
        .map_err(|err| JsonResponse::<models::User>::build().internal_server_error(err))?;

    tx.commit().await.map_err(|err| {
        tracing::error!("Failed to commit registration: {:?}", err);
        JsonResponse::<models::User>::build().internal_server_error("Database error")
    })?;

    tracing::info!(user_id = user.id, "User registered");
    Ok(JsonResponse::build().set_data(user).ok("User registered"))
}
