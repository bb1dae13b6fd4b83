use crate::db;
use crate::helpers::JsonResponse;
use crate::models::Identity;
use actix_web::{get, web, Responder, Result};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

/// GET /api/chat/conversation/{conversation_id}
/// The conversation, its live messages oldest first, and the last exchange.
#[tracing::instrument(name = "Get conversation.", skip_all, fields(user_id = identity.user_id))]
#[get("/conversation/{conversation_id}")]
pub async fn handler(
    identity: web::ReqData<Arc<Identity>>,
    path: web::Path<(String,)>,
    pg_pool: web::Data<PgPool>,
) -> Result<impl Responder> {
    let conversation_id = path.into_inner().0;
    let pool = pg_pool.get_ref();

    let conversation = db::conversation::fetch_owned(pool, &conversation_id, identity.user_id)
        .await
        .map_err(|err| JsonResponse::<()>::build().internal_server_error(err))?
        .ok_or_else(|| JsonResponse::<()>::build().not_found("Conversation not found"))?;

    let messages = db::message::list_live(pool, &conversation_id)
        .await
        .map_err(|err| JsonResponse::<()>::build().internal_server_error(err))?;
    let last_exchange = db::chat_history::latest(pool, &conversation_id)
        .await
        .map_err(|err| JsonResponse::<()>::build().internal_server_error(err))?;

    Ok(JsonResponse::build()
        .set_data(json!({
            "conversation": conversation,
            "messages": messages,
            "last_exchange": last_exchange,
        }))
        .ok("OK"))
}
