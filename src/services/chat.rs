//! The chat exchange pipeline: validate, store the attachment, call the
//! remote chat API, persist the exchange.

use crate::connectors::chat_api::{self, ByteStream};
use crate::connectors::{ChatApiConnector, ChatApiRequest, ChatImage, ConnectorError};
use crate::helpers::sse::AccumulatedReply;
use crate::helpers::{IncomingFile, JsonResponse, StoredUpload, UploadError, UploadHandler};
use crate::models::{Conversation, Identity};
use crate::services::exchange_store::{ExchangeRecord, ExchangeStore};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use bytes::Bytes;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

// room for the text fields and multipart framing around the attachment
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Content stored for a message that only carries an image.
pub const IMAGE_ONLY_CONTENT: &str = "[Image]";

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug)]
pub enum ChatError {
    Validation(String),
    EmptyContent,
    ConversationLimit { limit: i64 },
    Storage(String),
    Upstream { status: u16 },
    UpstreamUnavailable(String),
    Persistence(String),
    NotFound(String),
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{}", msg),
            Self::EmptyContent => write!(f, "Content or image is required"),
            Self::ConversationLimit { limit } => write!(
                f,
                "Conversation has reached the limit of {} messages, please start a new conversation",
                limit
            ),
            Self::Storage(msg) => write!(f, "Failed to save uploaded file: {}", msg),
            Self::Upstream { status } => write!(f, "Chat API returned status {}", status),
            Self::UpstreamUnavailable(_) => write!(f, "Failed to connect to chat API"),
            Self::Persistence(_) => write!(f, "Failed to save chat"),
            Self::NotFound(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<ConnectorError> for ChatError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::Upstream { status, .. } => Self::Upstream { status },
            ConnectorError::Unavailable(msg) | ConnectorError::Http(msg) => {
                Self::UpstreamUnavailable(msg)
            }
        }
    }
}

impl From<UploadError> for ChatError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::TooLarge { .. } => Self::Validation(err.to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl ResponseError for ChatError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::EmptyContent => StatusCode::BAD_REQUEST,
            Self::ConversationLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Storage(_) | Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let builder = JsonResponse::build().set_msg(self.to_string());
        let builder = match self {
            Self::Upstream { status } => builder.set_data(json!({ "upstream_status": status })),
            _ => builder,
        };
        builder.respond(self.status_code())
    }
}

impl ChatError {
    /// Terminal `event: error` frame for the streaming endpoint.
    pub fn to_sse_frame(&self) -> Bytes {
        let payload = json!({
            "error": self.to_string(),
            "code": self.status_code().as_u16(),
        });
        Bytes::from(format!("event: error\ndata: {}\n\n", payload))
    }
}

/// One inbound chat message, as parsed off a multipart or JSON body.
#[derive(Debug, Clone, Default)]
pub struct ChatInput {
    pub content: String,
    pub conversation_id: String,
    pub persona: Option<String>,
    pub response_mode: Option<String>,
    pub reranker: Option<String>,
    pub model_name: Option<String>,
    pub image: Option<IncomingFile>,
}

/// A validated exchange whose attachment is on disk, ready to be sent.
#[derive(Debug, Clone)]
pub struct PreparedExchange {
    pub identity: Identity,
    pub requested_conversation_id: String,
    pub content: String,
    pub attachment: Option<StoredUpload>,
    pub request: ChatApiRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyMessage {
    pub content: String,
    pub role: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeOutcome {
    pub msg: ReplyMessage,
    pub conversation_id: String,
    pub api_conversation_id: String,
    pub session_id: String,
    /// `false` when the remote stream ended without its terminal status.
    pub complete: bool,
}

/// Exchange that the client streamed itself and now wants stored.
#[derive(Debug, Clone, Default)]
pub struct SavedExchange {
    pub content: String,
    pub stream_message: String,
    pub conversation_id: String,
    pub api_conversation_id: String,
    pub image_name: Option<String>,
    pub image_url: Option<String>,
    pub image_type: Option<String>,
}

pub struct ChatService {
    connector: Arc<dyn ChatApiConnector>,
    store: Arc<dyn ExchangeStore>,
    uploads: UploadHandler,
    max_messages: i64,
}

impl ChatService {
    pub fn new(
        connector: Arc<dyn ChatApiConnector>,
        store: Arc<dyn ExchangeStore>,
        uploads: UploadHandler,
        max_messages: i64,
    ) -> Self {
        Self {
            connector,
            store,
            uploads,
            max_messages,
        }
    }

    /// Largest inbound chat body worth reading.
    pub fn max_body_bytes(&self) -> usize {
        self.uploads.max_bytes() + FORM_OVERHEAD_BYTES
    }

    /// Everything that has to happen before the remote call: content check,
    /// conversation limit, attachment write. Fails without side effects
    /// except for the attachment write itself.
    #[tracing::instrument(name = "Prepare chat exchange.", skip(self, input), fields(user_id = identity.user_id))]
    pub async fn prepare(&self, identity: &Identity, input: ChatInput) -> Result<PreparedExchange> {
        let has_image = input
            .image
            .as_ref()
            .map_or(false, |file| !(file.file_name.is_empty() && file.bytes.is_empty()));

        let content = match input.content.trim() {
            "" if has_image => IMAGE_ONLY_CONTENT.to_string(),
            "" => return Err(ChatError::EmptyContent),
            _ => input.content.clone(),
        };

        let requested = input.conversation_id.trim().to_string();
        let mut remote_conversation_id = None;
        if !Conversation::is_new_sentinel(&requested) {
            let state = self
                .store
                .conversation_state(&requested, identity.user_id)
                .await
                .map_err(ChatError::Persistence)?;

            if let Some(state) = state {
                if state.message_count > self.max_messages {
                    tracing::info!(
                        conversation_id = %requested,
                        count = state.message_count,
                        "Conversation limit reached"
                    );
                    return Err(ChatError::ConversationLimit {
                        limit: self.max_messages,
                    });
                }
                remote_conversation_id =
                    Some(state.remote_conversation_id).filter(|id| !id.is_empty());
            }
        }

        let image_bytes = input.image.as_ref().map(|file| file.bytes.clone());
        let attachment = self.uploads.store(input.image).await?;

        let image = match (&attachment, image_bytes) {
            (Some(upload), Some(bytes)) => Some(ChatImage {
                file_name: upload.name.clone(),
                content_type: upload.content_type.clone(),
                bytes,
            }),
            _ => None,
        };

        Ok(PreparedExchange {
            identity: identity.clone(),
            requested_conversation_id: requested,
            request: ChatApiRequest {
                content: content.clone(),
                conversation_id: Some(remote_conversation_id.unwrap_or_else(|| "0".to_string())),
                persona: input.persona,
                response_mode: input.response_mode,
                reranker: input.reranker,
                model_name: input.model_name,
                image,
            },
            content,
            attachment,
        })
    }

    /// Buffered mode: one JSON answer once the reply is stored.
    pub async fn send(&self, identity: &Identity, input: ChatInput) -> Result<ExchangeOutcome> {
        let prepared = self.prepare(identity, input).await?;
        let reply = self.connector.send(&prepared.request).await?;
        self.persist(&prepared, reply).await
    }

    /// Streaming mode, first half: the remote side accepted the request.
    pub async fn open_stream(&self, prepared: &PreparedExchange) -> Result<ByteStream> {
        Ok(self.connector.stream(&prepared.request).await?)
    }

    /// Streaming mode, second half: relay to `out` while accumulating, then
    /// persist. Runs to completion even if `out` closes early.
    pub async fn relay_and_persist(
        &self,
        prepared: &PreparedExchange,
        upstream: ByteStream,
        out: &mpsc::Sender<Bytes>,
    ) -> Result<ExchangeOutcome> {
        let reply = chat_api::relay(upstream, out).await?;
        self.persist(prepared, reply).await
    }

    pub async fn persist(
        &self,
        prepared: &PreparedExchange,
        reply: AccumulatedReply,
    ) -> Result<ExchangeOutcome> {
        if !reply.is_complete() {
            tracing::warn!("Chat API stream ended without a terminal status");
        }

        let remote_conversation_id = reply.remote_conversation_id().unwrap_or_default().to_string();
        let record = ExchangeRecord {
            user_id: prepared.identity.user_id,
            session_id: prepared.identity.session_id.clone(),
            requested_conversation_id: prepared.requested_conversation_id.clone(),
            user_content: prepared.content.clone(),
            assistant_content: reply.content.clone(),
            remote_conversation_id: remote_conversation_id.clone(),
            api_response: reply.api_response(),
            attachment: prepared.attachment.clone(),
        };

        let recorded = self
            .store
            .record_exchange(&record)
            .await
            .map_err(ChatError::Persistence)?;

        Ok(ExchangeOutcome {
            msg: ReplyMessage {
                content: reply.content,
                role: "assistant",
            },
            conversation_id: recorded.conversation_id,
            api_conversation_id: remote_conversation_id,
            session_id: prepared.identity.session_id.clone(),
            complete: reply.status.is_some(),
        })
    }

    /// Store an exchange the client already streamed, without calling out.
    pub async fn save(&self, identity: &Identity, saved: SavedExchange) -> Result<ExchangeOutcome> {
        if saved.content.trim().is_empty() || saved.stream_message.trim().is_empty() {
            return Err(ChatError::Validation(
                "Content and stream_message are required".to_string(),
            ));
        }

        let attachment = saved
            .image_url
            .filter(|url| !url.is_empty())
            .map(|url| StoredUpload {
                name: saved.image_name.unwrap_or_default(),
                url,
                content_type: saved.image_type.unwrap_or_default(),
                path: PathBuf::new(),
            });

        let api_response = json!({
            "status": "success",
            "data": {
                "message": saved.stream_message,
                "conversation_id": saved.api_conversation_id,
                "content": saved.stream_message,
                "role": "assistant",
            }
        });

        let recorded = self
            .store
            .record_exchange(&ExchangeRecord {
                user_id: identity.user_id,
                session_id: identity.session_id.clone(),
                requested_conversation_id: saved.conversation_id,
                user_content: saved.content,
                assistant_content: saved.stream_message.clone(),
                remote_conversation_id: saved.api_conversation_id.clone(),
                api_response: Some(api_response),
                attachment,
            })
            .await
            .map_err(ChatError::Persistence)?;

        Ok(ExchangeOutcome {
            msg: ReplyMessage {
                content: saved.stream_message,
                role: "assistant",
            },
            conversation_id: recorded.conversation_id,
            api_conversation_id: saved.api_conversation_id,
            session_id: identity.session_id.clone(),
            complete: true,
        })
    }
}
