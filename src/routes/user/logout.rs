use crate::helpers::JsonResponse;
use crate::middleware::authentication::JwtAuthenticator;
use crate::models::Identity;
use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::http::StatusCode;
use actix_web::{post, web, HttpRequest, HttpResponse, Result};
use std::sync::Arc;

/// POST /api/user/logout
/// Revokes the presented token until it would have expired anyway.
#[tracing::instrument(name = "Log out.", skip_all, fields(user_id = identity.user_id))]
#[post("/logout")]
pub async fn handler(
    identity: web::ReqData<Arc<Identity>>,
    req: HttpRequest,
    jwt: web::Data<JwtAuthenticator>,
) -> Result<HttpResponse> {
    let token = req
        .cookie(jwt.cookie_name())
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| JsonResponse::<()>::build().unauthorized("Unauthorized"))?;

    jwt.revoke(&token)
        .await
        .map_err(|err| {
            tracing::error!("Failed to revoke token: {}", err);
            JsonResponse::<()>::build().internal_server_error("Failed to log out")
        })?;

    let expired = Cookie::build(jwt.cookie_name().to_string(), "")
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::ZERO)
        .finish();

    let mut response = JsonResponse::<()>::build()
        .set_msg("Logged out")
        .respond(StatusCode::OK);
    response
        .add_cookie(&expired)
        .map_err(|err| JsonResponse::<()>::build().internal_server_error(err.to_string()))?;

    Ok(response)
}
