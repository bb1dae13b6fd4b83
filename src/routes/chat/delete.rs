use crate::db;
use crate::forms;
use crate::helpers::JsonResponse;
use crate::models::Identity;
use actix_web::{delete, web, Responder, Result};
use serde_valid::Validate;
use sqlx::PgPool;
use std::sync::Arc;

/// DELETE /api/chat/conversation
/// Soft-deletes a conversation the caller owns.
#[tracing::instrument(name = "Delete conversation.", skip_all, fields(user_id = identity.user_id))]
#[delete("/conversation")]
pub async fn handler(
    identity: web::ReqData<Arc<Identity>>,
    form: web::Json<forms::DeleteConversation>,
    pg_pool: web::Data<PgPool>,
) -> Result<impl Responder> {
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::<()>::build().bad_request(errors.to_string()));
    }

    match db::conversation::soft_delete(pg_pool.get_ref(), &form.conversation_id, identity.user_id)
        .await
    {
        Ok(true) => Ok(JsonResponse::<()>::build().ok("Conversation deleted")),
        Ok(false) => Err(JsonResponse::<()>::build().not_found("Conversation not found")),
        Err(err) => Err(JsonResponse::<()>::build().internal_server_error(err)),
    }
}
