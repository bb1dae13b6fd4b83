use crate::forms;
use crate::helpers::JsonResponse;
use crate::models::Identity;
use crate::services::{ChatError, ChatService};
use actix_web::{post, web, HttpRequest, Responder};
use std::sync::Arc;

/// POST /api/chat/send
/// Buffered exchange: answers once the reply has been stored.
#[tracing::instrument(name = "Send chat message.", skip_all, fields(user_id = identity.user_id))]
#[post("/send")]
pub async fn handler(
    identity: web::ReqData<Arc<Identity>>,
    req: HttpRequest,
    payload: web::Payload,
    service: web::Data<ChatService>,
) -> Result<impl Responder, ChatError> {
    let input = forms::ChatMessage::read(&req, payload, service.max_body_bytes()).await?;
    let outcome = service.send(&identity, input).await?;

    tracing::info!(conversation_id = %outcome.conversation_id, "Exchange stored");
    Ok(JsonResponse::build().set_data(outcome).ok("Message sent"))
}
