//! Remote chat API.
//!
//! One endpoint, `POST <base>/chat-stream/`, taking a multipart form and
//! answering with an event-stream. [`ChatApiConnector::send`] waits for the
//! whole body; [`ChatApiConnector::stream`] hands the body out chunk by chunk
//! and [`relay`] forwards and accumulates it at the same time.

use crate::connectors::ConnectorError;
use crate::helpers::sse::AccumulatedReply;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

pub mod client;
#[cfg(test)]
pub mod mock;
mod relay;

pub use client::ChatApiClient;
#[cfg(test)]
pub use mock::MockChatApiConnector;
pub use relay::relay;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ConnectorError>> + Send>>;

#[derive(Debug, Clone)]
pub struct ChatImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Fields of one outbound chat request. `None` or empty values fall back to
/// the configured defaults when the form is built.
#[derive(Debug, Clone, Default)]
pub struct ChatApiRequest {
    pub content: String,
    /// Remote conversation id; `"0"` starts a new remote conversation.
    pub conversation_id: Option<String>,
    pub persona: Option<String>,
    pub response_mode: Option<String>,
    pub reranker: Option<String>,
    pub model_name: Option<String>,
    pub image: Option<ChatImage>,
}

#[async_trait]
pub trait ChatApiConnector: Send + Sync {
    /// Buffered mode: read the full body, then parse it in one pass.
    async fn send(&self, request: &ChatApiRequest) -> Result<AccumulatedReply, ConnectorError>;

    /// Streaming mode: the status line has been checked, the body is left
    /// unread for the caller.
    async fn stream(&self, request: &ChatApiRequest) -> Result<ByteStream, ConnectorError>;
}
