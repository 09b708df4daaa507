//! SSE 编码：每个 StreamEvent 一帧 `data: <json>`，通道关闭后追加 `data: [DONE]`

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{stream, Stream};
use tokio::sync::mpsc;

use crate::chat::events::StreamEvent;

pub const DONE_SENTINEL: &str = "[DONE]";

fn encode(event: &StreamEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        tracing::warn!(kind = event.kind(), error = %e, "Failed to encode stream event");
        Event::default().data(r#"{"type":"error","errorText":"Failed to encode event"}"#)
    })
}

/// 按接收顺序逐条编码，发送端全部关闭后以 [DONE] 收尾
pub fn event_stream(
    rx: mpsc::Receiver<StreamEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    stream::unfold(Some(rx), |state| async move {
        let mut rx = state?;
        match rx.recv().await {
            Some(event) => Some((Ok(encode(&event)), Some(rx))),
            None => Some((Ok(Event::default().data(DONE_SENTINEL)), None)),
        }
    })
}

pub fn sse_response(
    rx: mpsc::Receiver<StreamEvent>,
    keep_alive_secs: u64,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    Sse::new(event_stream(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(keep_alive_secs.max(1)))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use serde_json::{json, Value};

    use crate::chat::events::FinishReason;

    #[tokio::test]
    async fn test_frames_in_order_with_sentinel() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::Text { text: "hel".into() }).await.unwrap();
        tx.send(StreamEvent::Text { text: "lo".into() }).await.unwrap();
        tx.send(StreamEvent::Done {
            finish_reason: FinishReason::Stop,
        })
        .await
        .unwrap();
        drop(tx);

        let response = sse_response(rx, 15).into_response();
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        let frames: Vec<&str> = body
            .split("\n\n")
            .filter_map(|f| f.strip_prefix("data: "))
            .collect();

        assert_eq!(frames.len(), 4);
        let first: Value = serde_json::from_str(frames[0]).unwrap();
        assert_eq!(first, json!({"type": "text", "text": "hel"}));
        let done: Value = serde_json::from_str(frames[2]).unwrap();
        assert_eq!(done["finishReason"], "stop");
        assert_eq!(frames[3], DONE_SENTINEL);
    }
}
