use crate::helpers::IncomingFile;
use crate::services::{ChatError, ChatInput, SavedExchange};
use actix_multipart::Multipart;
use actix_web::http::header::CONTENT_TYPE;
use actix_web::{web, HttpRequest};
use bytes::BytesMut;
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::Value;
use serde_valid::Validate;

/// Field holding the attachment in a multipart chat message.
pub const IMAGE_FIELD: &str = "image";

/// Text fields of `/send` and `/stream`.
#[derive(Debug, Default, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "id_string")]
    pub conversation_id: String,
    pub persona: Option<String>,
    pub response_mode: Option<String>,
    pub reranker: Option<String>,
    pub model_name: Option<String>,
}

impl ChatMessage {
    fn set_field(&mut self, name: &str, value: String) {
        match name {
            "content" => self.content = value,
            "conversation_id" => self.conversation_id = value,
            "persona" => self.persona = Some(value),
            "response_mode" => self.response_mode = Some(value),
            "reranker" => self.reranker = Some(value),
            "model_name" => self.model_name = Some(value),
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    pub fn into_input(self, image: Option<IncomingFile>) -> ChatInput {
        ChatInput {
            content: self.content,
            conversation_id: self.conversation_id,
            persona: self.persona.filter(|v| !v.is_empty()),
            response_mode: self.response_mode.filter(|v| !v.is_empty()),
            reranker: self.reranker.filter(|v| !v.is_empty()),
            model_name: self.model_name.filter(|v| !v.is_empty()),
            image,
        }
    }

    /// Read a chat message off either a `multipart/form-data` or a JSON body.
    /// Bodies larger than `max_bytes` are refused.
    pub async fn read(req: &HttpRequest, payload: web::Payload, max_bytes: usize) -> Result<ChatInput, ChatError> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map_or(false, |value| value.starts_with("multipart/form-data"));

        if is_multipart {
            Self::read_multipart(Multipart::new(req.headers(), payload), max_bytes).await
        } else {
            let body = read_limited(payload, max_bytes).await?;
            let form: ChatMessage = serde_json::from_slice(&body)
                .map_err(|err| ChatError::Validation(format!("Invalid request body: {}", err)))?;
            Ok(form.into_input(None))
        }
    }

    async fn read_multipart(mut multipart: Multipart, max_bytes: usize) -> Result<ChatInput, ChatError> {
        let mut form = ChatMessage::default();
        let mut image = None;
        let mut total = 0usize;

        while let Some(field) = multipart.next().await {
            let mut field = field.map_err(multipart_error)?;
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(str::to_string);
            let content_type = field.content_type().map(|mime| mime.essence_str().to_string());

            let mut bytes = BytesMut::new();
            while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
                total += chunk.len();
                if total > max_bytes {
                    return Err(ChatError::Validation(format!(
                        "Request body exceeds {} bytes",
                        max_bytes
                    )));
                }
                bytes.extend_from_slice(&chunk);
            }

            if name == IMAGE_FIELD {
                image = Some(IncomingFile {
                    file_name: file_name.unwrap_or_default(),
                    content_type,
                    bytes: bytes.freeze(),
                });
            } else {
                let value = String::from_utf8(bytes.to_vec()).map_err(|_| {
                    ChatError::Validation(format!("Field {} is not valid UTF-8", name))
                })?;
                form.set_field(&name, value);
            }
        }

        Ok(form.into_input(image))
    }
}

fn multipart_error(err: actix_multipart::MultipartError) -> ChatError {
    ChatError::Validation(format!("Invalid multipart body: {}", err))
}

async fn read_limited(mut payload: web::Payload, max_bytes: usize) -> Result<BytesMut, ChatError> {
    let mut body = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|err| ChatError::Validation(err.to_string()))?;
        if body.len() + chunk.len() > max_bytes {
            return Err(ChatError::Validation(format!(
                "Request body exceeds {} bytes",
                max_bytes
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

// clients send conversation ids both quoted and bare
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Body of `/save`: an exchange the client already streamed.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveChat {
    #[validate(min_length = 1)]
    #[serde(default)]
    pub content: String,
    #[validate(min_length = 1)]
    #[serde(default)]
    pub stream_message: String,
    #[serde(default, deserialize_with = "id_string")]
    pub conversation_id: String,
    #[serde(default, deserialize_with = "id_string")]
    pub api_conversation_id: String,
    pub image_name: Option<String>,
    pub image_url: Option<String>,
    pub image_type: Option<String>,
}

impl From<SaveChat> for SavedExchange {
    fn from(form: SaveChat) -> Self {
        SavedExchange {
            content: form.content,
            stream_message: form.stream_message,
            conversation_id: form.conversation_id,
            api_conversation_id: form.api_conversation_id,
            image_name: form.image_name,
            image_url: form.image_url,
            image_type: form.image_type,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeleteConversation {
    #[validate(min_length = 1)]
    #[serde(default, deserialize_with = "id_string")]
    pub conversation_id: String,
}
