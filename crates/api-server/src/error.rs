use faststr::FastStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid Request Body: {0}")]
    InvalidRequestBody(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Application not found: {0}")]
    ApplicationNotFound(FastStr),

    #[error("Model not found: {0}")]
    ModelNotFound(FastStr),

    #[error("No active task to stop")]
    NoActiveTask,

    #[error("faild to build client")]
    FailedToBuildClient,

    #[error("{0}")]
    MsgError(FastStr),
}

pub type Result<T> = std::result::Result<T, Error>;
