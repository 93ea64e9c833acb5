use crate::error::{Error, Result};
use chrono::Timelike;
use faststr::FastStr;
use reqwest::Client as ReqwestClient;
use serde_json::{Value, json};
use std::time::Duration;

#[inline]
pub fn build_http_client() -> Result<ReqwestClient> {
    let builder = ReqwestClient::builder();
    let timeout = 10;
    let client = builder
        .connect_timeout(Duration::from_secs(timeout))
        .build()
        .map_err(|_| Error::FailedToBuildClient)?;
    Ok(client)
}

#[inline]
pub fn generate_completion_id() -> FastStr {
    let random_id = chrono::Utc::now().nanosecond();
    format!("chatcmpl-{random_id}").into()
}

#[inline]
pub fn create_text_frame(id: &str, model: &str, created: i64, content: &str) -> FastStr {
    let delta = if content.is_empty() {
        json!({ "role": "assistant", "content": content })
    } else {
        json!({ "content": content })
    };
    let choice = json!({
        "index": 0,
        "delta": delta,
        "finish_reason": null,
    });
    let value = build_chat_completion_chunk_json(id, model, created, &choice);
    format!("{value}").into()
}

#[inline]
pub fn create_done_frame(id: &str, model: &str, created: i64) -> (FastStr, FastStr) {
    let finish_reason = "stop";
    let choice = json!({
        "index": 0,
        "delta": {},
        "finish_reason": finish_reason
    });
    let v = build_chat_completion_chunk_json(id, model, created, &choice);
    (format!("{v}").into(), "[DONE]".into())
}

#[inline]
fn build_chat_completion_chunk_json(id: &str, model: &str, created: i64, choice: &Value) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [choice],
    })
}

/// The wire shape of every non-streaming failure.
#[inline]
pub fn error_json(message: &str) -> FastStr {
    json!({"status": "error", "message": message}).to_string().into()
}

#[inline]
pub fn json_body(value: Value) -> FastStr {
    value.to_string().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_id_prefix() {
        assert!(generate_completion_id().starts_with("chatcmpl-"));
    }

    #[test]
    fn test_text_frame() {
        let frame = create_text_frame("chatcmpl-1", "qwen3-8b", 1746299682, "Hel");
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["id"], "chatcmpl-1");
        assert_eq!(value["object"], "chat.completion.chunk");
        assert_eq!(value["model"], "qwen3-8b");
        assert_eq!(value["choices"][0]["delta"]["content"], "Hel");
        assert!(value["choices"][0]["finish_reason"].is_null());
    }

    #[test]
    fn test_empty_text_frame_carries_role() {
        let frame = create_text_frame("chatcmpl-1", "qwen3-8b", 1746299682, "");
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["choices"][0]["delta"]["role"], "assistant");
    }

    #[test]
    fn test_done_frame() {
        let (frame, done) = create_done_frame("chatcmpl-1", "qwen3-8b", 1746299682);
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(done, "[DONE]");
    }

    #[test]
    fn test_error_json() {
        let body = error_json("boom");
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "boom");
    }
}
