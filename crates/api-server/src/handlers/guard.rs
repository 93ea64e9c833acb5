use crate::ServerState;
use crate::sessions::Session;
use crate::tools::error_json;
use http_body_util::BodyExt;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde::de::DeserializeOwned;
use volo_http::body::Body;
use volo_http::response::Response;
use volo_http::server::IntoResponse;

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// The guard stage in front of every protected handler: resolves the bearer
/// token to a live session or produces the 401 the handler returns as-is.
pub async fn authorize(
    state: &ServerState,
    headers: &HeaderMap,
) -> std::result::Result<Session, Response> {
    let Some(token) = bearer_token(headers) else {
        return Err(
            (StatusCode::UNAUTHORIZED, error_json("not logged in")).into_response(),
        );
    };
    match state.sessions.get(token).await {
        Some(session) => Ok(session),
        None => Err((StatusCode::UNAUTHORIZED, error_json("not logged in")).into_response()),
    }
}

pub async fn require_superuser(
    state: &ServerState,
    headers: &HeaderMap,
) -> std::result::Result<Session, Response> {
    let session = authorize(state, headers).await?;
    if !session.is_superuser {
        return Err(
            (StatusCode::FORBIDDEN, error_json("superuser required")).into_response(),
        );
    }
    Ok(session)
}

/// Collects and decodes a JSON request body, or produces the 400 response.
pub async fn read_json<T: DeserializeOwned>(body: Body) -> std::result::Result<T, Response> {
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => {
            return Err(
                (StatusCode::BAD_REQUEST, error_json("unreadable request body")).into_response(),
            );
        }
    };
    serde_json::from_slice(&bytes).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            error_json(&format!("Invalid request body: {e}")),
        )
            .into_response()
    })
}
