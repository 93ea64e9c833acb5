use crate::data::AppChatData;
use crate::error::{Error, Result};
use crate::proxy::{AppVariant, ProxyTarget, RequestData, request_builder};
use crate::stream::sse::{FrameSink, SseConnection, SseMessage, decode_frame};
use serde_json::{Value, json};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    #[default]
    Streaming,
    Blocking,
}

impl ResponseMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Blocking => "blocking",
        }
    }
}

/// Shapes the upstream chat body for an agent or workflow target. The agent
/// protocol requires a non-empty `query`; the rest of the caller payload is
/// forwarded as-is.
pub fn build_chat_body(
    variant: AppVariant,
    data: &AppChatData,
    user: &str,
    mode: ResponseMode,
) -> Result<Value> {
    match variant {
        AppVariant::Agent => {
            if data.query.is_empty() {
                return Err(Error::MissingField("query"));
            }
            Ok(json!({
                "inputs": data.inputs,
                "query": data.query,
                "response_mode": mode.as_str(),
                "conversation_id": data.conversation_id,
                "user": user,
                "files": data.files,
            }))
        }
        AppVariant::Workflow => Ok(json!({
            "inputs": data.inputs,
            "response_mode": mode.as_str(),
            "user": user,
        })),
        AppVariant::Model => Err(Error::MsgError("not a dify application".into())),
    }
}

fn prepare_app_chat(
    target: &ProxyTarget,
    data: &AppChatData,
    user: &str,
    mode: ResponseMode,
) -> Result<RequestData> {
    let body = build_chat_body(target.variant, data, user, mode)?;
    let mut request_data = RequestData::new(target.chat_url(), body);
    request_data.bearer_auth(target.api_key.clone());
    Ok(request_data)
}

/// Opens a streaming chat against an agent or workflow target. Request
/// shaping errors and non-2xx upstream answers surface here, before anything
/// has been promised to the caller.
pub async fn open_app_chat(
    client: &reqwest::Client,
    target: &ProxyTarget,
    data: &AppChatData,
    user: &str,
) -> Result<SseConnection> {
    let request_data = prepare_app_chat(target, data, user, ResponseMode::Streaming)?;
    SseConnection::open(request_builder(request_data, client)).await
}

/// Forwards every decoded frame to `sink` in arrival order. A frame that
/// fails to decode is logged and skipped; the stream keeps going.
pub async fn relay_app_frames(connection: SseConnection, sink: &mut FrameSink) -> Result<()> {
    connection
        .pump(|message: SseMessage| {
            if message.data.is_empty() {
                return Ok(false);
            }
            match decode_frame(&message.data) {
                Ok(frame) => sink.frame(frame)?,
                Err(err) => warn!(error = %err, "skipping malformed frame"),
            }
            Ok(false)
        })
        .await
}

/// Runs a workflow in blocking mode and returns the complete response
/// object. The HTTP surface always streams; this is the other response mode
/// the upstream supports.
pub async fn workflow_run_blocking(
    client: &reqwest::Client,
    target: &ProxyTarget,
    data: &AppChatData,
    user: &str,
) -> Result<Value> {
    let request_data = prepare_app_chat(target, data, user, ResponseMode::Blocking)?;
    let res = request_builder(request_data, client).send().await?;
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        return Err(Error::UpstreamStatus(text.into(), status.as_u16()));
    }
    Ok(serde_json::from_str(&text)?)
}

/// Issues the upstream stop call for a previously observed task id. Model
/// targets have no cancellation primitive; stopping them trivially succeeds.
pub async fn stop_app_chat(
    client: &reqwest::Client,
    target: &ProxyTarget,
    task_id: &str,
    user: &str,
) -> Result<Value> {
    let Some(url) = target.stop_url(task_id) else {
        return Ok(json!({"status": "success", "message": "Chat stopped"}));
    };
    let mut request_data = RequestData::new(url, json!({"user": user}));
    request_data.bearer_auth(target.api_key.clone());

    let res = request_builder(request_data, client).send().await?;
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        return Err(Error::UpstreamStatus(text.into(), status.as_u16()));
    }
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_data(raw: &str) -> AppChatData {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_agent_body() {
        let data = chat_data(
            r#"{"query": "hello", "inputs": {"lang": "en"}, "conversation_id": "c-9"}"#,
        );
        let body = build_chat_body(AppVariant::Agent, &data, "alice", ResponseMode::Streaming)
            .unwrap();
        assert_eq!(body["query"], "hello");
        assert_eq!(body["inputs"]["lang"], "en");
        assert_eq!(body["conversation_id"], "c-9");
        assert_eq!(body["response_mode"], "streaming");
        assert_eq!(body["user"], "alice");
        assert!(body["files"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_agent_requires_query() {
        let data = chat_data(r#"{"inputs": {"lang": "en"}}"#);
        let err = build_chat_body(AppVariant::Agent, &data, "alice", ResponseMode::Streaming)
            .unwrap_err();
        assert!(matches!(err, Error::MissingField("query")));
    }

    #[test]
    fn test_workflow_body() {
        let data = chat_data(r#"{"inputs": {"topic": "rust"}, "query": "ignored"}"#);
        let body = build_chat_body(AppVariant::Workflow, &data, "bob", ResponseMode::Streaming)
            .unwrap();
        assert_eq!(body["inputs"]["topic"], "rust");
        assert_eq!(body["response_mode"], "streaming");
        assert_eq!(body["user"], "bob");
        // workflows take no query, files or conversation id
        assert!(body.get("query").is_none());
        assert!(body.get("files").is_none());
        assert!(body.get("conversation_id").is_none());
    }

    #[test]
    fn test_workflow_blocking_mode() {
        let data = chat_data("{}");
        let body = build_chat_body(AppVariant::Workflow, &data, "bob", ResponseMode::Blocking)
            .unwrap();
        assert_eq!(body["response_mode"], "blocking");
    }

    #[test]
    fn test_model_is_not_a_dify_target() {
        let data = chat_data(r#"{"query": "hello"}"#);
        assert!(build_chat_body(AppVariant::Model, &data, "alice", ResponseMode::Streaming).is_err());
    }
}
