use faststr::FastStr;
use thiserror::Error;

use crate::stream::sse::FrameEvent;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    MsgError(FastStr),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("upstream returned status {1}: {0}")]
    UpstreamStatus(FastStr, u16),
    #[error("Invalid response event-stream: {0}")]
    InvalidEventStream(FastStr),
    #[error("serde error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Failed to send frame: {0}")]
    SendFrameError(FrameEvent),
}

pub type Result<T> = std::result::Result<T, Error>;
