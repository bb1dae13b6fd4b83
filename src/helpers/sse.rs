//! Incremental Server-Sent-Events decoding for the remote chat stream.
//!
//! Network reads do not line up with SSE lines, so [`SseLineBuffer`] keeps the
//! unterminated tail between calls. It buffers raw bytes rather than text: a
//! multi-byte UTF-8 character split across two reads is decoded only once the
//! whole line has arrived.
//!
//! [`SseDecoder`] turns lines into `(event, data)` frames and
//! [`ChatAccumulator`] folds the chat payloads (`{"token": ..}` and the
//! terminal `{"status": ..}`) into an [`AccumulatedReply`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::mem;

const DEFAULT_EVENT: &str = "message";

#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, without the
    /// terminator. A trailing `\r` is stripped as well.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.buffer[start..end]));
            start = end + 1;
        }
        self.buffer.drain(..start);

        lines
    }

    /// Hand out whatever is left once the byte stream has ended.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Line-level SSE decoder. Every `data:` line is a frame of its own; an
/// `event:` field names the frames that follow it until the next blank line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    lines: SseLineBuffer,
    event: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.lines
            .feed(bytes)
            .iter()
            .filter_map(|line| self.push_line(line))
            .collect()
    }

    pub fn finish(&mut self) -> Vec<SseFrame> {
        let frame = self.lines.flush().and_then(|line| self.push_line(&line));
        self.event = None;
        frame.into_iter().collect()
    }

    pub fn push_line(&mut self, line: &str) -> Option<SseFrame> {
        let line = line.trim();
        if line.is_empty() {
            self.event = None;
            return None;
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.trim_start()),
            None => (line, ""),
        };

        match field {
            "event" => {
                self.event = Some(value.to_string()).filter(|event| !event.is_empty());
                None
            }
            "data" if !value.is_empty() => Some(SseFrame {
                event: self
                    .event
                    .clone()
                    .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
                data: value.to_string(),
            }),
            _ => None,
        }
    }
}

/// Terminal payload of the remote stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminalStatus {
    pub status: String,
    #[serde(default)]
    pub data: StatusData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusData {
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub conversation_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub role: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TerminalStatus {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

// the remote API has sent conversation ids both as strings and as integers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Token(String),
    Status(TerminalStatus),
}

impl ChatEvent {
    /// Recognise the two payload shapes; anything else, including JSON that
    /// does not parse, yields `None`.
    pub fn from_frame(frame: &SseFrame) -> Option<Self> {
        let value: Value = match serde_json::from_str(&frame.data) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(event = %frame.event, error = %err, "Skipping malformed SSE payload");
                return None;
            }
        };

        let Value::Object(object) = value else {
            return None;
        };

        if let Some(Value::String(token)) = object.get("token") {
            return Some(ChatEvent::Token(token.clone()));
        }

        if matches!(object.get("status"), Some(Value::String(_))) {
            return serde_json::from_value::<TerminalStatus>(Value::Object(object))
                .map(ChatEvent::Status)
                .map_err(|err| {
                    tracing::debug!(error = %err, "Skipping unreadable status payload");
                })
                .ok();
        }

        None
    }
}

/// What one exchange produced: the token text in arrival order and the
/// terminal status, if the stream delivered one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatedReply {
    pub content: String,
    pub status: Option<TerminalStatus>,
}

impl AccumulatedReply {
    /// Parse a complete response body in one pass.
    pub fn parse(body: &[u8]) -> Self {
        let mut accumulator = ChatAccumulator::new();
        accumulator.feed(body);
        accumulator.finish()
    }

    /// `false` when the stream ended before the terminal status arrived.
    pub fn is_complete(&self) -> bool {
        self.status.is_some()
    }

    pub fn remote_conversation_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|status| status.data.conversation_id.as_str())
            .filter(|id| !id.is_empty())
    }

    pub fn api_response(&self) -> Option<Value> {
        self.status
            .as_ref()
            .and_then(|status| serde_json::to_value(status).ok())
    }
}

#[derive(Debug, Default)]
pub struct ChatAccumulator {
    decoder: SseDecoder,
    reply: AccumulatedReply,
}

impl ChatAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        for frame in self.decoder.feed(bytes) {
            self.apply(&frame);
        }
    }

    /// Feed a line that was already split off the stream by the caller.
    pub fn push_line(&mut self, line: &str) {
        if let Some(frame) = self.decoder.push_line(line) {
            self.apply(&frame);
        }
    }

    fn apply(&mut self, frame: &SseFrame) {
        match ChatEvent::from_frame(frame) {
            Some(ChatEvent::Token(token)) => self.reply.content.push_str(&token),
            Some(ChatEvent::Status(status)) => self.reply.status = Some(status),
            None => {}
        }
    }

    pub fn finish(mut self) -> AccumulatedReply {
        for frame in self.decoder.finish() {
            self.apply(&frame);
        }
        self.reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = concat!(
        ": keep-alive\n",
        "data: {\"token\": \"Halo\"}\n\n",
        "data: {\"token\": \", apa kabar? \"}\r\n\r\n",
        "data: {\"token\": \"café ☕ 🙂\"}\n\n",
        "data: {not json\n\n",
        "event: progress\n",
        "data: {\"step\": 1}\n\n",
        "data: [DONE]\n\n",
        "data: {\"status\": \"success\", \"data\": {\"message\": \"done\", \"conversation_id\": 4821, \"role\": \"assistant\"}}\n\n",
    );

    #[test]
    fn accumulates_tokens_and_status() {
        let reply = AccumulatedReply::parse(STREAM.as_bytes());

        assert_eq!(reply.content, "Halo, apa kabar? café ☕ 🙂");
        assert!(reply.is_complete());
        let status = reply.status.as_ref().unwrap();
        assert!(status.is_success());
        assert_eq!(status.data.message, "done");
        assert_eq!(reply.remote_conversation_id(), Some("4821"));
    }

    #[test]
    fn any_split_point_gives_the_same_reply() {
        let bytes = STREAM.as_bytes();
        let expected = AccumulatedReply::parse(bytes);

        for offset in 0..=bytes.len() {
            let mut accumulator = ChatAccumulator::new();
            accumulator.feed(&bytes[..offset]);
            accumulator.feed(&bytes[offset..]);
            assert_eq!(accumulator.finish(), expected, "split at byte {}", offset);
        }
    }

    #[test]
    fn byte_by_byte_delivery() {
        let bytes = STREAM.as_bytes();
        let mut accumulator = ChatAccumulator::new();
        for byte in bytes {
            accumulator.feed(std::slice::from_ref(byte));
        }
        assert_eq!(accumulator.finish(), AccumulatedReply::parse(bytes));
    }

    #[test]
    fn missing_status_is_partial() {
        let reply = AccumulatedReply::parse(b"data: {\"token\":\"a\"}\n\ndata: {\"token\":\"b\"}");

        assert_eq!(reply.content, "ab");
        assert!(!reply.is_complete());
        assert_eq!(reply.remote_conversation_id(), None);
        assert_eq!(reply.api_response(), None);
    }

    #[test]
    fn malformed_payloads_do_not_abort() {
        let reply = AccumulatedReply::parse(
            b"data: {\"token\": 12}\ndata: {\"token\"\ndata: {\"token\":\"ok\"}\ndata: {\"status\": true}\n",
        );
        assert_eq!(reply.content, "ok");
        assert!(!reply.is_complete());
    }

    #[test]
    fn only_string_status_terminates() {
        for payload in [
            "{\"status\": 1, \"data\": {\"conversation_id\": 5}}",
            "{\"status\": null}",
            "{\"status\": {\"state\": \"success\"}}",
        ] {
            let frame = SseFrame {
                event: DEFAULT_EVENT.to_string(),
                data: payload.to_string(),
            };
            assert_eq!(ChatEvent::from_frame(&frame), None, "{}", payload);
        }

        let reply = AccumulatedReply::parse(
            b"data: {\"status\": false}\ndata: {\"status\":\"success\",\"data\":{\"conversation_id\":9}}\n",
        );
        assert!(reply.is_complete());
        assert_eq!(reply.remote_conversation_id(), Some("9"));
    }

    #[test]
    fn decoder_tracks_event_names() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"event: save_success\ndata: {\"a\":1}\ndata: {\"b\":2}\n\ndata: x\n");

        assert_eq!(
            frames,
            vec![
                SseFrame {
                    event: "save_success".to_string(),
                    data: "{\"a\":1}".to_string()
                },
                SseFrame {
                    event: "save_success".to_string(),
                    data: "{\"b\":2}".to_string()
                },
                SseFrame {
                    event: "message".to_string(),
                    data: "x".to_string()
                },
            ]
        );
    }

    #[test]
    fn line_buffer_keeps_partial_tail() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.feed(b"data: {\"tok").is_empty());
        assert_eq!(buffer.feed(b"en\":\"x\"}\r\n\nda"), vec!["data: {\"token\":\"x\"}", ""]);
        assert_eq!(buffer.flush(), Some("da".to_string()));
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn terminal_status_keeps_unknown_fields() {
        let reply = AccumulatedReply::parse(
            b"data: {\"status\":\"success\",\"usage\":{\"tokens\":3},\"data\":{\"conversation_id\":\"abc\",\"sources\":[1]}}\n",
        );
        let api_response = reply.api_response().unwrap();
        assert_eq!(api_response["usage"]["tokens"], 3);
        assert_eq!(api_response["data"]["sources"][0], 1);
        assert_eq!(api_response["data"]["conversation_id"], "abc");
    }
}
