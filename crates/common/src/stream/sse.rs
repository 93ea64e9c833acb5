use crate::error::{Error, Result};
use eventsource_stream::{Event, EventStreamError, Eventsource};
use faststr::FastStr;
use futures_util::{Stream, StreamExt};
use reqwest::RequestBuilder;
use serde_json::Value;
use std::fmt::Display;
use std::pin::Pin;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// One decoded upstream frame. `task_id` is captured opportunistically so a
/// later stop call can address the same upstream job.
#[derive(Debug, Clone)]
pub struct StreamFrame {
    pub payload: Value,
    pub task_id: Option<FastStr>,
}

#[derive(Debug, Clone)]
pub enum FrameEvent {
    Frame(StreamFrame),
    Done,
    Error(FastStr),
}

impl Display for FrameEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frame(frame) => write!(f, "{}", frame.payload),
            Self::Done => write!(f, "Done"),
            Self::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

/// Decode the payload of one `data:` event.
///
/// A payload that is not valid JSON fails this frame only; callers keep
/// reading the stream.
pub fn decode_frame(data: &str) -> Result<StreamFrame> {
    let payload: Value = serde_json::from_str(data)?;
    let task_id = payload
        .get("task_id")
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(|v| FastStr::from(v.to_owned()));
    Ok(StreamFrame { payload, task_id })
}

#[derive(Debug)]
pub struct SseMessage {
    #[allow(unused)]
    pub event: FastStr,
    pub data:  FastStr,
}

pub struct FrameSink {
    sender: UnboundedSender<FrameEvent>,
}

impl FrameSink {
    pub fn new(sender: UnboundedSender<FrameEvent>) -> Self {
        Self { sender }
    }

    pub fn frame(&mut self, frame: StreamFrame) -> Result<()> {
        debug!("frame: {}", frame.payload);
        let event = FrameEvent::Frame(frame);
        if self.sender.send(event.clone()).is_err() {
            return Err(Error::SendFrameError(event));
        }
        Ok(())
    }

    pub fn done(&mut self) {
        debug!("frame: Done");
        if self.sender.send(FrameEvent::Done).is_err() {
            warn!("failed to send FrameEvent::Done, rx maybe closed")
        }
    }

    pub fn error(&mut self, message: impl Into<FastStr>) {
        let message = message.into();
        warn!("frame: Error: {message}");
        if self.sender.send(FrameEvent::Error(message)).is_err() {
            warn!("failed to send FrameEvent::Error, rx maybe closed")
        }
    }
}

/// An open upstream SSE connection. `open` sends the request eagerly so a
/// non-2xx answer surfaces before anything has been written downstream.
pub struct SseConnection {
    stream: Pin<
        Box<dyn Stream<Item = std::result::Result<Event, EventStreamError<reqwest::Error>>> + Send>,
    >,
}

impl SseConnection {
    pub async fn open(builder: RequestBuilder) -> Result<Self> {
        let res = builder.send().await?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(Error::UpstreamStatus(text.into(), status.as_u16()));
        }
        Ok(Self {
            stream: Box::pin(res.bytes_stream().eventsource()),
        })
    }

    /// Drives the connection to completion, feeding each event through
    /// `handle`. `handle` returning `Ok(true)` stops reading early.
    pub async fn pump<F>(mut self, mut handle: F) -> Result<()>
    where
        F: FnMut(SseMessage) -> Result<bool>,
    {
        while let Some(event) = self.stream.next().await {
            match event {
                Ok(event) => {
                    let message = SseMessage {
                        event: event.event.into(),
                        data:  event.data.into(),
                    };
                    if handle(message)? {
                        break;
                    }
                }
                Err(EventStreamError::Transport(err)) => {
                    return Err(Error::ReqwestError(err));
                }
                Err(err) => {
                    return Err(Error::InvalidEventStream(err.to_string().into()));
                }
            }
        }
        debug!("upstream stream ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn test_decode_frame() {
        let frame = decode_frame(r#"{"event": "message", "answer": "hi"}"#).unwrap();
        assert!(frame.task_id.is_none());
        assert_eq!(frame.payload["answer"], "hi");
    }

    #[test]
    fn test_decode_frame_captures_task_id() {
        let frame =
            decode_frame(r#"{"event": "message", "task_id": "t-123", "answer": "hi"}"#).unwrap();
        assert_eq!(frame.task_id.as_deref(), Some("t-123"));
    }

    #[test]
    fn test_decode_frame_ignores_non_string_task_id() {
        let frame = decode_frame(r#"{"task_id": 42}"#).unwrap();
        assert!(frame.task_id.is_none());
    }

    #[test]
    fn test_decode_malformed_frame() {
        assert!(decode_frame("ping").is_err());
        assert!(decode_frame("").is_err());
    }

    #[tokio::test]
    async fn test_sink_preserves_order() {
        let (tx, mut rx) = unbounded_channel();
        let mut sink = FrameSink::new(tx);
        for i in 0..10 {
            sink.frame(decode_frame(&format!(r#"{{"seq": {i}}}"#)).unwrap())
                .unwrap();
        }
        sink.done();

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                FrameEvent::Frame(frame) => seen.push(frame.payload["seq"].as_i64().unwrap()),
                FrameEvent::Done => break,
                FrameEvent::Error(message) => panic!("unexpected error: {message}"),
            }
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_sink_errors_after_receiver_drop() {
        let (tx, rx) = unbounded_channel();
        drop(rx);
        let mut sink = FrameSink::new(tx);
        let frame = decode_frame(r#"{"answer": "hi"}"#).unwrap();
        assert!(sink.frame(frame).is_err());
    }
}
