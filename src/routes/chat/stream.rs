use crate::forms;
use crate::models::Identity;
use crate::services::{ChatError, ChatInput, ChatService, ExchangeOutcome};
use actix_web::http::header::CACHE_CONTROL;
use actix_web::{post, web, HttpRequest, HttpResponse};
use bytes::Bytes;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::Instrument;

const RELAY_BUFFER: usize = 64;

/// POST /api/chat/stream
/// Relays the remote event stream line by line, then stores the exchange and
/// closes with `event: save_success` or `event: error`.
#[tracing::instrument(name = "Stream chat message.", skip_all, fields(user_id = identity.user_id))]
#[post("/stream")]
pub async fn handler(
    identity: web::ReqData<Arc<Identity>>,
    req: HttpRequest,
    payload: web::Payload,
    service: web::Data<ChatService>,
) -> HttpResponse {
    let input = forms::ChatMessage::read(&req, payload, service.max_body_bytes()).await;
    let identity = identity.into_inner();
    let (tx, rx) = mpsc::channel::<Bytes>(RELAY_BUFFER);

    actix_web::rt::spawn(
        async move {
            let frame = match run_exchange(&service, &identity, input, &tx).await {
                Ok(outcome) => save_success_frame(&outcome),
                Err(err) => {
                    tracing::error!("Streaming exchange failed: {}", err);
                    err.to_sse_frame()
                }
            };
            if tx.send(frame).await.is_err() {
                tracing::debug!("Client left before the closing frame");
            }
        }
        .instrument(tracing::Span::current()),
    );

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(ReceiverStream::new(rx).map(Ok::<_, Infallible>))
}

async fn run_exchange(
    service: &ChatService,
    identity: &Identity,
    input: Result<ChatInput, ChatError>,
    out: &mpsc::Sender<Bytes>,
) -> Result<ExchangeOutcome, ChatError> {
    let prepared = service.prepare(identity, input?).await?;
    let upstream = service.open_stream(&prepared).await?;
    service.relay_and_persist(&prepared, upstream, out).await
}

fn save_success_frame(outcome: &ExchangeOutcome) -> Bytes {
    let payload = json!({
        "status": "success",
        "data": {
            "conversation_id": outcome.conversation_id,
            "api_conversation_id": outcome.api_conversation_id,
            "session_id": outcome.session_id,
            "complete": outcome.complete,
        }
    });
    Bytes::from(format!("event: save_success\ndata: {}\n\n", payload))
}
