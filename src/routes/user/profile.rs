use crate::db;
use crate::helpers::JsonResponse;
use crate::models::{Identity, Profile};
use actix_web::{get, web, Responder, Result};
use sqlx::PgPool;
use std::sync::Arc;

/// GET /api/user/profile
#[tracing::instrument(name = "Get profile.", skip_all, fields(user_id = identity.user_id))]
#[get("/profile")]
pub async fn handler(
    identity: web::ReqData<Arc<Identity>>,
    pg_pool: web::Data<PgPool>,
) -> Result<impl Responder> {
    db::user::fetch_profile(pg_pool.get_ref(), identity.user_id)
        .await
        .map_err(|err| JsonResponse::<Profile>::build().internal_server_error(err))?
        .map(|profile| JsonResponse::build().set_data(profile).ok("OK"))
        .ok_or_else(|| JsonResponse::<Profile>::build().not_found("User not found"))
}
