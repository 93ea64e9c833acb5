use crate::data::ChatCompletionsData;
use crate::error::{Error, Result};
use crate::proxy::{RequestData, request_builder};
use crate::stream::sse::{FrameSink, SseConnection, SseMessage, StreamFrame};
use serde_json::Value;
use tracing::warn;

#[derive(Debug)]
pub struct ModelClient<'a> {
    pub api_base: &'a str,
    pub api_key:  Option<&'a str>,
}

impl<'a> ModelClient<'a> {
    pub fn new(api_base: &'a str, api_key: Option<&'a str>) -> Self {
        Self { api_base, api_key }
    }

    /// Opens a streaming completions request. An empty message list fails
    /// before any connection is made.
    pub async fn open_chat_completions(
        &self,
        client: &reqwest::Client,
        data: ChatCompletionsData,
    ) -> Result<SseConnection> {
        let request_data = prepare_chat_completions(self, data)?;
        SseConnection::open(request_builder(request_data, client)).await
    }
}

fn prepare_chat_completions(
    client: &ModelClient,
    data: ChatCompletionsData,
) -> Result<RequestData> {
    if data.messages.is_empty() {
        return Err(Error::MissingField("messages"));
    }
    let url = client.api_base;
    let url = format!("{url}/chat/completions");
    let body = serde_json::to_value(data)?;

    let mut request_data = RequestData::new(url, body);
    if let Some(key) = client.api_key {
        request_data.bearer_auth(key.to_owned());
    }
    Ok(request_data)
}

/// The content delta of one completions chunk, if it carries one.
pub fn delta_text(chunk: &Value) -> Option<&str> {
    chunk["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|v| !v.is_empty())
}

/// Forwards each non-empty content delta to `sink` as a text frame, in
/// arrival order, until the upstream signals `[DONE]`.
pub async fn relay_delta_frames(connection: SseConnection, sink: &mut FrameSink) -> Result<()> {
    connection
        .pump(|message: SseMessage| {
            if message.data == "[DONE]" {
                return Ok(true);
            }
            let chunk: Value = match serde_json::from_str(&message.data) {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(error = %err, "skipping malformed chunk");
                    return Ok(false);
                }
            };
            if let Some(text) = delta_text(&chunk) {
                sink.frame(StreamFrame {
                    payload: Value::String(text.to_owned()),
                    task_id: None,
                })?;
            }
            Ok(false)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ChatCompletionsData;
    use crate::messages::Message;

    fn messages(raw: &str) -> Vec<Message> {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_prepare_body() {
        let data = ChatCompletionsData::new(
            "qwen3-8b".into(),
            messages(r#"[{"role": "user", "content": "hi"}]"#),
            Some(0.5),
        );
        let client = ModelClient::new("http://llm.local/v1", Some("sk-1"));
        let request_data = prepare_chat_completions(&client, data).unwrap();
        assert_eq!(request_data.url, "http://llm.local/v1/chat/completions");
        assert_eq!(request_data.body["model"], "qwen3-8b");
        assert_eq!(request_data.body["temperature"], 0.5);
        assert_eq!(request_data.body["stream"], true);
        assert_eq!(
            request_data.headers.get("authorization").map(|v| v.as_str()),
            Some("Bearer sk-1")
        );
    }

    #[test]
    fn test_empty_messages_fail_fast() {
        let data = ChatCompletionsData::new("qwen3-8b".into(), vec![], None);
        let client = ModelClient::new("http://llm.local/v1", None);
        let err = prepare_chat_completions(&client, data).unwrap_err();
        assert!(matches!(err, Error::MissingField("messages")));
    }

    const CONTENT_CHUNK: &str = r#"{"id":"chatcmpl-178239000","object":"chat.completion.chunk","created":1746299682,"model":"Qwen/Qwen2.5-7B-Instruct","choices":[{"index":0,"delta":{"content":" it"},"finish_reason":null}]}"#;
    const EMPTY_CHUNK: &str = r#"{"id":"chatcmpl-178239001","object":"chat.completion.chunk","created":1746299683,"model":"Qwen/Qwen2.5-7B-Instruct","choices":[{"index":0,"delta":{"content":null,"role":"assistant"},"finish_reason":null}]}"#;

    #[test]
    fn test_delta_text() {
        let chunk: Value = serde_json::from_str(CONTENT_CHUNK).unwrap();
        assert_eq!(delta_text(&chunk), Some(" it"));

        let chunk: Value = serde_json::from_str(EMPTY_CHUNK).unwrap();
        assert_eq!(delta_text(&chunk), None);
    }
}
