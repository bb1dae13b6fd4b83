use super::{ByteStream, ChatApiConnector, ChatApiRequest};
use crate::connectors::ConnectorError;
use crate::helpers::sse::AccumulatedReply;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Replays a canned event-stream body and counts how often it was asked.
pub struct MockChatApiConnector {
    chunks: Vec<Bytes>,
    failure: Option<u16>,
    calls: AtomicUsize,
    last_request: Mutex<Option<ChatApiRequest>>,
}

impl MockChatApiConnector {
    pub fn replying(body: &str) -> Self {
        Self::chunked(vec![body.to_string()])
    }

    pub fn chunked(chunks: Vec<String>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Bytes::from).collect(),
            failure: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Every call fails with the given upstream status.
    pub fn failing(status: u16) -> Self {
        let mut mock = Self::chunked(vec![]);
        mock.failure = Some(status);
        mock
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChatApiRequest> {
        self.last_request.lock().unwrap().clone()
    }

    fn record(&self, request: &ChatApiRequest) -> Result<(), ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        match self.failure {
            Some(status) => Err(ConnectorError::Upstream {
                status,
                body: "mock failure".to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatApiConnector for MockChatApiConnector {
    async fn send(&self, request: &ChatApiRequest) -> Result<AccumulatedReply, ConnectorError> {
        self.record(request)?;
        Ok(AccumulatedReply::parse(&self.chunks.concat()))
    }

    async fn stream(&self, request: &ChatApiRequest) -> Result<ByteStream, ConnectorError> {
        self.record(request)?;
        let chunks: Vec<Result<Bytes, ConnectorError>> =
            self.chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}
