use super::app_chat::chat_open_error;
use super::guard::{authorize, read_json};
use crate::ServerState;
use crate::error::Error;
use crate::requests::ModelChatRequest;
use crate::tools::{
    build_http_client, create_done_frame, create_text_frame, error_json, generate_completion_id,
    json_body,
};
use async_stream::stream;
use chrono::Utc;
use common::data::ChatCompletionsData;
use common::proxy::chat_openai::{ModelClient, relay_delta_frames};
use common::stream::sse::{FrameEvent, FrameSink};
use faststr::FastStr;
use futures_util::{Stream, StreamExt, pin_mut};
use reqwest::StatusCode;
use serde_json::json;
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info};
use volo_http::request::ServerRequest;
use volo_http::response::Response;
use volo_http::server::IntoResponse;
use volo_http::server::response::sse::{Event, Sse};
use volo_http::server::route::{Router, post};
use volo_http::utils::Extension;

/// Re-shapes raw content deltas into `chat.completion.chunk` envelopes so
/// heterogeneous upstreams present one downstream shape. The completion id
/// is fixed at relay start and shared by every chunk of the invocation.
fn chunk_stream<S>(
    input: S,
    comp_id: FastStr,
    created_at: i64,
    model_name: FastStr,
) -> impl Stream<Item = FastStr>
where
    S: Stream<Item = FrameEvent>,
{
    stream! {
        pin_mut!(input);
        while let Some(event) = input.next().await {
            match event {
                FrameEvent::Frame(frame) => {
                    if let Some(text) = frame.payload.as_str() {
                        yield create_text_frame(&comp_id, &model_name, created_at, text);
                    }
                }
                FrameEvent::Error(message) => {
                    yield error_json(&message);
                    break;
                }
                FrameEvent::Done => {
                    let (frame, done) = create_done_frame(&comp_id, &model_name, created_at);
                    yield frame;
                    yield done;
                    break;
                }
            }
        }
    }
}

async fn model_chat_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, body) = req.into_parts();
    let session = match authorize(&state, &parts.headers).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    let req: ModelChatRequest = match read_json(body).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.messages.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_json("Missing required field: messages"),
        )
            .into_response();
    }

    let model = match state.db.get_model_by_show_name(&req.name).await {
        Ok(Some(model)) => model,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, error_json("Model not found")).into_response();
        }
        Err(e) => {
            error!("{e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, error_json("storage error"))
                .into_response();
        }
    };
    let data = ChatCompletionsData::new(model.model_name.clone(), req.messages, req.temperature);

    let http_client = match build_http_client() {
        Ok(client) => client,
        Err(e) => {
            error!("{e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, error_json("client error"))
                .into_response();
        }
    };
    info!(model=%model.show_name, user=%session.username, "opening model chat");
    let connection = match ModelClient::new(&model.api_base, model.api_key.as_deref())
        .open_chat_completions(&http_client, data)
        .await
    {
        Ok(connection) => connection,
        Err(err) => return chat_open_error(err),
    };

    let (tx, rx) = unbounded_channel();
    tokio::spawn(async move {
        let mut sink = FrameSink::new(tx);
        if let Err(e) = relay_delta_frames(connection, &mut sink).await {
            sink.error(format!("Stream Error: {e}"));
        }
        sink.done();
    });
    let rx = UnboundedReceiverStream::new(rx);
    let frames = chunk_stream(
        rx,
        generate_completion_id(),
        Utc::now().timestamp(),
        model.show_name.clone(),
    );
    Sse::new(frames.map(|frame| Ok::<_, Error>(Event::new().data(frame)))).into_response()
}

/// Direct model upstreams have no cancellation primitive; stopping is a
/// documented no-op.
async fn model_chat_stop_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, _) = req.into_parts();
    if let Err(resp) = authorize(&state, &parts.headers).await {
        return resp;
    }
    (
        StatusCode::OK,
        json_body(json!({"status": "success", "message": "Chat stopped"})),
    )
        .into_response()
}

pub fn model_chat_router() -> Router {
    Router::new()
        .route("/v1/models/chat", post(model_chat_handler))
        .route("/v1/models/chat/stop", post(model_chat_stop_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::stream::sse::StreamFrame;
    use serde_json::Value;

    fn delta(text: &str) -> FrameEvent {
        FrameEvent::Frame(StreamFrame {
            payload: Value::String(text.to_owned()),
            task_id: None,
        })
    }

    #[tokio::test]
    async fn test_chunks_reconstruct_answer_under_one_id() {
        let (tx, rx) = unbounded_channel();
        for part in ["Hel", "lo", "!"] {
            tx.send(delta(part)).unwrap();
        }
        tx.send(FrameEvent::Done).unwrap();
        drop(tx);

        let out: Vec<FastStr> = chunk_stream(
            UnboundedReceiverStream::new(rx),
            "chatcmpl-1".into(),
            1746299682,
            "qwen3-8b".into(),
        )
        .collect()
        .await;

        // three content chunks, one finish chunk, one [DONE] marker
        assert_eq!(out.len(), 5);
        assert_eq!(out[4], "[DONE]");

        let mut answer = String::new();
        for raw in &out[..3] {
            let value: Value = serde_json::from_str(raw).unwrap();
            assert_eq!(value["id"], "chatcmpl-1");
            assert_eq!(value["model"], "qwen3-8b");
            answer.push_str(value["choices"][0]["delta"]["content"].as_str().unwrap());
        }
        assert_eq!(answer, "Hello!");

        let finish: Value = serde_json::from_str(&out[3]).unwrap();
        assert_eq!(finish["choices"][0]["finish_reason"], "stop");
    }

    #[tokio::test]
    async fn test_stream_error_becomes_final_frame() {
        let (tx, rx) = unbounded_channel();
        tx.send(delta("Hel")).unwrap();
        tx.send(FrameEvent::Error("Stream Error: connection reset".into()))
            .unwrap();
        drop(tx);

        let out: Vec<FastStr> = chunk_stream(
            UnboundedReceiverStream::new(rx),
            "chatcmpl-1".into(),
            1746299682,
            "qwen3-8b".into(),
        )
        .collect()
        .await;

        assert_eq!(out.len(), 2);
        let last: Value = serde_json::from_str(&out[1]).unwrap();
        assert_eq!(last["status"], "error");
    }
}
