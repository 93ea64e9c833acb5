use super::guard::{authorize, read_json};
use crate::ServerState;
use crate::error::Error;
use crate::requests::{AppChatRequest, StopRequest};
use crate::tasks::{TaskHandle, TaskRegistry};
use crate::tools::{build_http_client, error_json, json_body};
use async_stream::stream;
use common::error::Error as ProxyError;
use common::proxy::dify::{open_app_chat, relay_app_frames, stop_app_chat};
use common::proxy::{AppVariant, ProxyTarget};
use common::stream::sse::{FrameEvent, FrameSink};
use faststr::FastStr;
use futures_util::{Stream, StreamExt, pin_mut};
use reqwest::StatusCode;
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info};
use volo_http::request::ServerRequest;
use volo_http::response::Response;
use volo_http::server::IntoResponse;
use volo_http::server::response::sse::{Event, Sse};
use volo_http::server::route::{Router, post};
use volo_http::utils::Extension;

/// Maps a failure that happened before anything was streamed to the caller.
/// After the first byte these become in-band error frames instead.
pub(super) fn chat_open_error(err: ProxyError) -> Response {
    match err {
        ProxyError::MissingField(field) => (
            StatusCode::BAD_REQUEST,
            error_json(&format!("Missing required field: {field}")),
        )
            .into_response(),
        ProxyError::UpstreamStatus(body, status) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_json(&format!("upstream returned status {status}: {body}")),
        )
            .into_response(),
        err => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_json(&format!("{err}")),
        )
            .into_response(),
    }
}

/// Re-emits decoded frames as outbound SSE payloads in arrival order,
/// recording every observed task id so a later stop call can find the job.
/// An upstream failure ends the stream with one in-band error frame.
fn relay_stream<S>(
    input: S,
    tasks: TaskRegistry,
    target: ProxyTarget,
    user: FastStr,
) -> impl Stream<Item = FastStr>
where
    S: Stream<Item = FrameEvent>,
{
    stream! {
        pin_mut!(input);
        while let Some(event) = input.next().await {
            match event {
                FrameEvent::Frame(frame) => {
                    if let Some(task_id) = &frame.task_id {
                        tasks
                            .record(task_id, TaskHandle {
                                target: target.clone(),
                                user:   user.clone(),
                            })
                            .await;
                    }
                    yield FastStr::from(frame.payload.to_string());
                }
                FrameEvent::Error(message) => {
                    yield error_json(&message);
                    break;
                }
                FrameEvent::Done => break,
            }
        }
    }
}

async fn app_chat_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, body) = req.into_parts();
    let session = match authorize(&state, &parts.headers).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    let req: AppChatRequest = match read_json(body).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let app = match state.db.get_application(&req.application_name).await {
        Ok(Some(app)) => app,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, error_json("Application not found")).into_response();
        }
        Err(e) => {
            error!("{e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, error_json("storage error"))
                .into_response();
        }
    };
    if !session.is_superuser {
        let member = match state.db.get_member(&session.username).await {
            Ok(Some(member)) => member,
            Ok(None) => {
                return (StatusCode::UNAUTHORIZED, error_json("unknown account")).into_response();
            }
            Err(e) => {
                error!("{e}");
                return (StatusCode::INTERNAL_SERVER_ERROR, error_json("storage error"))
                    .into_response();
            }
        };
        match state.db.member_has_application(member.id, &app.name).await {
            Ok(true) => {}
            Ok(false) => {
                return (
                    StatusCode::FORBIDDEN,
                    error_json("application not authorized for this account"),
                )
                    .into_response();
            }
            Err(e) => {
                error!("{e}");
                return (StatusCode::INTERNAL_SERVER_ERROR, error_json("storage error"))
                    .into_response();
            }
        }
    }
    let Some(variant) = AppVariant::from_app_type(&app.ty) else {
        return (
            StatusCode::BAD_REQUEST,
            error_json("Unsupported application type"),
        )
            .into_response();
    };
    let target = ProxyTarget {
        api_base: app.api_base.clone(),
        api_key:  app.api_key.clone(),
        variant,
    };

    let http_client = match build_http_client() {
        Ok(client) => client,
        Err(e) => {
            error!("{e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, error_json("client error"))
                .into_response();
        }
    };
    let user = session.username.clone();
    info!(application=%app.name, user=%user, "opening app chat");
    let connection = match open_app_chat(&http_client, &target, &req.data, &user).await {
        Ok(connection) => connection,
        Err(err) => return chat_open_error(err),
    };

    let (tx, rx) = unbounded_channel();
    tokio::spawn(async move {
        let mut sink = FrameSink::new(tx);
        if let Err(e) = relay_app_frames(connection, &mut sink).await {
            sink.error(format!("{e}"));
        }
        sink.done();
    });
    let rx = UnboundedReceiverStream::new(rx);
    let frames = relay_stream(rx, state.tasks.clone(), target, user);
    Sse::new(frames.map(|frame| Ok::<_, Error>(Event::new().data(frame)))).into_response()
}

async fn app_chat_stop_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, body) = req.into_parts();
    let session = match authorize(&state, &parts.headers).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    let req: StopRequest = match read_json(body).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let Some(handle) = state.tasks.lookup(&req.task_id).await else {
        return (StatusCode::BAD_REQUEST, error_json("No active task to stop")).into_response();
    };
    if !session.is_superuser && handle.user != session.username {
        return (
            StatusCode::FORBIDDEN,
            error_json("task belongs to another account"),
        )
            .into_response();
    }

    let http_client = match build_http_client() {
        Ok(client) => client,
        Err(e) => {
            error!("{e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, error_json("client error"))
                .into_response();
        }
    };
    info!(task_id=%req.task_id, user=%handle.user, "stopping app chat");
    match stop_app_chat(&http_client, &handle.target, &req.task_id, &handle.user).await {
        Ok(ack) => (StatusCode::OK, json_body(ack)).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_json(&format!("Failed to stop: {err}")),
        )
            .into_response(),
    }
}

pub fn app_chat_router() -> Router {
    Router::new()
        .route("/v1/apps/chat", post(app_chat_handler))
        .route("/v1/apps/chat/stop", post(app_chat_stop_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::stream::sse::StreamFrame;
    use serde_json::{Value, json};

    fn target() -> ProxyTarget {
        ProxyTarget {
            api_base: "http://dify.local/v1".into(),
            api_key:  "app-key".into(),
            variant:  AppVariant::Agent,
        }
    }

    fn frame(payload: Value) -> FrameEvent {
        let task_id = payload
            .get("task_id")
            .and_then(Value::as_str)
            .map(|v| FastStr::from(v.to_owned()));
        FrameEvent::Frame(StreamFrame { payload, task_id })
    }

    #[tokio::test]
    async fn test_relay_preserves_order_and_records_task() {
        let (tx, rx) = unbounded_channel();
        for i in 0..5 {
            tx.send(frame(json!({"seq": i, "task_id": "t-9"}))).unwrap();
        }
        tx.send(FrameEvent::Done).unwrap();
        drop(tx);

        let tasks = TaskRegistry::new();
        let out: Vec<FastStr> = relay_stream(
            UnboundedReceiverStream::new(rx),
            tasks.clone(),
            target(),
            "alice".into(),
        )
        .collect()
        .await;

        assert_eq!(out.len(), 5);
        for (i, raw) in out.iter().enumerate() {
            let value: Value = serde_json::from_str(raw).unwrap();
            assert_eq!(value["seq"], i as i64);
        }

        let handle = tasks.lookup("t-9").await.unwrap();
        assert_eq!(handle.user, "alice");
        assert_eq!(handle.target.variant, AppVariant::Agent);
    }

    #[tokio::test]
    async fn test_relay_emits_final_error_frame() {
        let (tx, rx) = unbounded_channel();
        tx.send(frame(json!({"answer": "partial"}))).unwrap();
        tx.send(FrameEvent::Error("upstream went away".into()))
            .unwrap();
        drop(tx);

        let out: Vec<FastStr> = relay_stream(
            UnboundedReceiverStream::new(rx),
            TaskRegistry::new(),
            target(),
            "alice".into(),
        )
        .collect()
        .await;

        assert_eq!(out.len(), 2);
        let last: Value = serde_json::from_str(&out[1]).unwrap();
        assert_eq!(last["status"], "error");
        assert_eq!(last["message"], "upstream went away");
    }

    #[tokio::test]
    async fn test_relay_without_task_id_records_nothing() {
        let (tx, rx) = unbounded_channel();
        tx.send(frame(json!({"answer": "hi"}))).unwrap();
        tx.send(FrameEvent::Done).unwrap();
        drop(tx);

        let tasks = TaskRegistry::new();
        let _: Vec<FastStr> = relay_stream(
            UnboundedReceiverStream::new(rx),
            tasks.clone(),
            target(),
            "alice".into(),
        )
        .collect()
        .await;
        assert!(tasks.lookup("t-9").await.is_none());
    }
}
