use crate::db;
use crate::forms;
use crate::helpers::JsonResponse;
use crate::middleware::authentication::JwtAuthenticator;
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::http::StatusCode;
use actix_web::{post, web, HttpResponse, Result};
use serde::Serialize;
use serde_valid::Validate;
use sqlx::PgPool;

#[derive(Debug, Serialize)]
pub struct LoginToken {
    pub token: String,
}

/// POST /api/user/login
/// Sets the session cookie and returns the same token in the body.
#[tracing::instrument(name = "Log in.", skip_all, fields(username = %form.username))]
#[post("/login")]
pub async fn handler(
    form: web::Json<forms::Login>,
    pg_pool: web::Data<PgPool>,
    jwt: web::Data<JwtAuthenticator>,
) -> Result<HttpResponse> {
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::<LoginToken>::build().bad_request(errors.to_string()));
    }

    let pool = pg_pool.get_ref();
    let account = db::user::fetch_account_by_username(pool, &form.username)
        .await
        .map_err(|err| JsonResponse::<LoginToken>::build().internal_server_error(err))?
        .ok_or_else(|| JsonResponse::<LoginToken>::build().not_found("User not found"))?;

    let password = form.password.clone();
    let stored_hash = account.password.clone();
    let verified = web::block(move || bcrypt::verify(password, &stored_hash))
        .await
        .map_err(|err| JsonResponse::<LoginToken>::build().internal_server_error(err.to_string()))?
        .unwrap_or_else(|err| {
            tracing::warn!("Unreadable password hash for {}: {:?}", account.username, err);
            false
        });
    if !verified {
        return Err(JsonResponse::<LoginToken>::build().bad_request("Invalid password"));
    }

    let user = db::user::fetch_by_auth_id(pool, account.id)
        .await
        .map_err(|err| JsonResponse::<LoginToken>::build().internal_server_error(err))?
        .ok_or_else(|| JsonResponse::<LoginToken>::build().not_found("User not found"))?;

    let session_id = uuid::Uuid::new_v4().to_string();
    let (token, _claims) = jwt
        .issue(user.id, &session_id)
        .map_err(|err| JsonResponse::<LoginToken>::build().internal_server_error(err.to_string()))?;

    let cookie = Cookie::build(jwt.cookie_name().to_string(), token.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(jwt.ttl().num_seconds()))
        .finish();

    tracing::info!(user_id = user.id, "User logged in");
    let mut response = JsonResponse::build()
        .set_data(LoginToken { token })
        .set_msg("Login successful")
        .respond(StatusCode::OK);
    response
        .add_cookie(&cookie)
        .map_err(|err| JsonResponse::<LoginToken>::build().internal_server_error(err.to_string()))?;

    Ok(response)
}
