use crate::forms;
use crate::helpers::JsonResponse;
use crate::models::Identity;
use crate::services::{ChatError, ChatService};
use actix_web::{post, web, Responder};
use serde_valid::Validate;
use std::sync::Arc;

/// POST /api/chat/save
/// Stores an exchange the client streamed on its own.
#[tracing::instrument(name = "Save streamed chat.", skip_all, fields(user_id = identity.user_id))]
#[post("/save")]
pub async fn handler(
    identity: web::ReqData<Arc<Identity>>,
    form: web::Json<forms::SaveChat>,
    service: web::Data<ChatService>,
) -> Result<impl Responder, ChatError> {
    if let Err(errors) = form.validate() {
        tracing::debug!("Invalid save payload: {}", errors);
        return Err(ChatError::Validation(
            "Content and stream_message are required".to_string(),
        ));
    }

    let outcome = service.save(&identity, form.into_inner().into()).await?;
    Ok(JsonResponse::build().set_data(outcome).ok("Chat saved"))
}
