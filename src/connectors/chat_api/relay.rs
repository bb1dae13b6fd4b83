use super::ByteStream;
use crate::connectors::ConnectorError;
use crate::helpers::sse::{AccumulatedReply, ChatAccumulator, SseLineBuffer};
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;

/// Forward every line of `upstream` to `out` as it completes, and accumulate
/// the chat payloads on the way.
///
/// A closed `out` (client gone) stops forwarding only; the upstream body is
/// still read to the end so the reply can be persisted.
pub async fn relay(
    mut upstream: ByteStream,
    out: &mpsc::Sender<Bytes>,
) -> Result<AccumulatedReply, ConnectorError> {
    let mut lines = SseLineBuffer::new();
    let mut accumulator = ChatAccumulator::new();
    let mut forwarding = true;

    while let Some(chunk) = upstream.next().await {
        let chunk = chunk.map_err(|err| {
            tracing::error!("Chat API stream broke off: {}", err);
            err
        })?;

        for line in lines.feed(&chunk) {
            forward(out, &line, &mut forwarding).await;
            accumulator.push_line(&line);
        }
    }

    if let Some(line) = lines.flush() {
        forward(out, &line, &mut forwarding).await;
        accumulator.push_line(&line);
    }

    Ok(accumulator.finish())
}

async fn forward(out: &mpsc::Sender<Bytes>, line: &str, forwarding: &mut bool) {
    if !*forwarding {
        return;
    }
    let mut frame = String::with_capacity(line.len() + 1);
    frame.push_str(line);
    frame.push('\n');
    if out.send(Bytes::from(frame)).await.is_err() {
        tracing::info!("Client went away, continuing without relay");
        *forwarding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn upstream(chunks: Vec<&'static str>) -> ByteStream {
        Box::pin(stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes()))),
        ))
    }

    async fn drain(mut rx: mpsc::Receiver<Bytes>) -> String {
        let mut out = String::new();
        while let Some(frame) = rx.recv().await {
            out.push_str(std::str::from_utf8(&frame).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn forwards_lines_in_order_and_accumulates() {
        let (tx, rx) = mpsc::channel(16);
        let reply = relay(
            upstream(vec![
                "data: {\"token\": \"He",
                "y\"}\n\ndata: {\"tok",
                "en\": \"!\"}\n\ndata: {\"status\":\"success\",\"data\":{\"conversation_id\":\"9\"}}",
            ]),
            &tx,
        )
        .await
        .unwrap();
        drop(tx);

        assert_eq!(reply.content, "Hey!");
        assert_eq!(reply.remote_conversation_id(), Some("9"));
        assert_eq!(
            drain(rx).await,
            "data: {\"token\": \"Hey\"}\n\ndata: {\"token\": \"!\"}\n\n\
             data: {\"status\":\"success\",\"data\":{\"conversation_id\":\"9\"}}\n"
        );
    }

    #[tokio::test]
    async fn keeps_accumulating_after_client_leaves() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let reply = relay(
            upstream(vec![
                "data: {\"token\": \"a\"}\n",
                "data: {\"token\": \"b\"}\n",
                "data: {\"status\":\"success\"}\n",
            ]),
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(reply.content, "ab");
        assert!(reply.is_complete());
    }

    #[tokio::test]
    async fn broken_upstream_is_an_error() {
        let (tx, _rx) = mpsc::channel(16);
        let broken: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"token\": \"a\"}\n")),
            Err(ConnectorError::Unavailable("reset".to_string())),
        ]));

        let err = relay(broken, &tx).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Unavailable(_)));
    }
}
