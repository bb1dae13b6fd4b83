use super::{ByteStream, ChatApiConnector, ChatApiRequest};
use crate::configuration::ChatApiSettings;
use crate::connectors::ConnectorError;
use crate::helpers::sse::AccumulatedReply;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::Instrument;

/// HTTP client for the remote chat API.
pub struct ChatApiClient {
    endpoint: String,
    api_key_header: String,
    api_key: String,
    http_client: reqwest::Client,
    defaults: FormDefaults,
}

struct FormDefaults {
    persona: String,
    response_mode: String,
    reranker: String,
    model_name: String,
}

fn or_default(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

impl ChatApiClient {
    pub fn new(settings: &ChatApiSettings) -> Result<Self, ConnectorError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|err| ConnectorError::Http(format!("HTTP client error: {}", err)))?;

        Ok(Self {
            endpoint: settings.endpoint(),
            api_key_header: settings.api_key_header.clone(),
            api_key: settings.api_key.clone(),
            http_client,
            defaults: FormDefaults {
                persona: settings.default_persona.clone(),
                response_mode: settings.default_response_mode.clone(),
                reranker: settings.default_reranker.clone(),
                model_name: settings.default_model.clone(),
            },
        })
    }

    fn form(&self, request: &ChatApiRequest) -> Result<Form, ConnectorError> {
        let mut form = Form::new()
            .text("content", request.content.clone())
            .text("conversation_id", or_default(&request.conversation_id, "0"))
            .text("persona", or_default(&request.persona, &self.defaults.persona))
            .text(
                "response_mode",
                or_default(&request.response_mode, &self.defaults.response_mode),
            )
            .text("reranker", or_default(&request.reranker, &self.defaults.reranker))
            .text(
                "model_name",
                or_default(&request.model_name, &self.defaults.model_name),
            );

        if let Some(image) = &request.image {
            let part = Part::bytes(image.bytes.to_vec())
                .file_name(image.file_name.clone())
                .mime_str(&image.content_type)
                .map_err(|err| ConnectorError::Http(format!("invalid image content type: {}", err)))?;
            form = form.part("image", part);
        }

        Ok(form)
    }

    async fn post(&self, request: &ChatApiRequest) -> Result<reqwest::Response, ConnectorError> {
        let span = tracing::info_span!(
            "chat_api_request",
            endpoint = %self.endpoint,
            has_image = request.image.is_some()
        );

        let resp = self
            .http_client
            .post(&self.endpoint)
            .header(self.api_key_header.as_str(), self.api_key.as_str())
            .header(ACCEPT, "text/event-stream")
            .multipart(self.form(request)?)
            .send()
            .instrument(span)
            .await
            .map_err(|err| {
                tracing::error!("Chat API request failed: {:?}", err);
                ConnectorError::from(err)
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "Chat API returned an error");
            return Err(ConnectorError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp)
    }
}

#[async_trait]
impl ChatApiConnector for ChatApiClient {
    async fn send(&self, request: &ChatApiRequest) -> Result<AccumulatedReply, ConnectorError> {
        let body = self.post(request).await?.bytes().await.map_err(|err| {
            tracing::error!("Failed to read chat API response: {:?}", err);
            ConnectorError::from(err)
        })?;

        Ok(AccumulatedReply::parse(&body))
    }

    async fn stream(&self, request: &ChatApiRequest) -> Result<ByteStream, ConnectorError> {
        let resp = self.post(request).await?;
        Ok(Box::pin(
            resp.bytes_stream().map(|chunk| chunk.map_err(ConnectorError::from)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::ChatImage;
    use bytes::Bytes;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    const BODY: &str = concat!(
        "data: {\"token\": \"Hel\"}\n\n",
        "data: {\"token\": \"lo\"}\n\n",
        "data: {\"status\": \"success\", \"data\": {\"conversation_id\": \"77\"}}\n\n",
    );

    fn settings(base_url: &str) -> ChatApiSettings {
        ChatApiSettings {
            base_url: base_url.to_string(),
            api_key: "secret-key".to_string(),
            api_key_header: "x-api-key".to_string(),
            timeout_secs: 5,
            default_model: "llama-4".to_string(),
            default_persona: "Normal".to_string(),
            default_response_mode: "short".to_string(),
            default_reranker: "false".to_string(),
        }
    }

    fn body_of(request: &Request) -> String {
        String::from_utf8_lossy(&request.body).into_owned()
    }

    #[tokio::test]
    async fn buffered_send_accumulates_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat-stream/"))
            .and(header("x-api-key", "secret-key"))
            .and(header("accept", "text/event-stream"))
            .and(header_exists("content-type"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(BODY, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatApiClient::new(&settings(&server.uri())).unwrap();
        let reply = client
            .send(&ChatApiRequest {
                content: "hi".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(reply.content, "Hello");
        assert_eq!(reply.remote_conversation_id(), Some("77"));
    }

    #[tokio::test]
    async fn form_carries_defaults_and_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat-stream/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(BODY, "text/event-stream"))
            .mount(&server)
            .await;

        let client = ChatApiClient::new(&settings(&server.uri())).unwrap();
        client
            .send(&ChatApiRequest {
                content: "what is this".to_string(),
                persona: Some(" ".to_string()),
                response_mode: Some("long".to_string()),
                image: Some(ChatImage {
                    file_name: "cat.png".to_string(),
                    content_type: "image/png".to_string(),
                    bytes: Bytes::from_static(b"PNGDATA"),
                }),
                ..Default::default()
            })
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let content_type = requests[0]
            .headers
            .get(&"content-type".parse().unwrap())
            .unwrap()
            .as_str();
        assert!(content_type.starts_with("multipart/form-data; boundary="));

        let body = body_of(&requests[0]);
        for (name, value) in [
            ("content", "what is this"),
            ("conversation_id", "0"),
            ("persona", "Normal"),
            ("response_mode", "long"),
            ("reranker", "false"),
            ("model_name", "llama-4"),
        ] {
            let needle = format!("name=\"{}\"\r\n\r\n{}\r\n", name, value);
            assert!(body.contains(&needle), "missing {} in {}", name, body);
        }
        assert!(body.contains("name=\"image\"; filename=\"cat.png\""));
        assert!(body.contains("Content-Type: image/png"));
        assert!(body.contains("PNGDATA"));
    }

    #[tokio::test]
    async fn non_success_status_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = ChatApiClient::new(&settings(&server.uri())).unwrap();
        let err = client.send(&ChatApiRequest::default()).await.unwrap_err();
        assert_eq!(err.status(), Some(503));

        let err = client.stream(&ChatApiRequest::default()).await.err().unwrap();
        assert!(matches!(err, ConnectorError::Upstream { status: 503, .. }));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = ChatApiClient::new(&settings(&base_url)).unwrap();
        let err = client.send(&ChatApiRequest::default()).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Unavailable(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn stream_yields_body_chunks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(BODY, "text/event-stream"))
            .mount(&server)
            .await;

        let client = ChatApiClient::new(&settings(&server.uri())).unwrap();
        let mut stream = client.stream(&ChatApiRequest::default()).await.unwrap();
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(body, BODY.as_bytes());
    }
}
