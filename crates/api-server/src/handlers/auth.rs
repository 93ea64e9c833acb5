use super::guard::bearer_token;
use crate::ServerState;
use crate::requests::{ChangePasswordRequest, LoginRequest};
use crate::tools::{error_json, json_body};
use reqwest::StatusCode;
use serde_json::json;
use storage::{hash_password, password_strength_ok, verify_password};
use tracing::{error, info};
use volo_http::request::ServerRequest;
use volo_http::response::Response;
use volo_http::server::IntoResponse;
use volo_http::server::extract::Json;
use volo_http::server::route::{Router, post};
use volo_http::utils::Extension;

async fn login_handler(
    Extension(state): Extension<ServerState>,
    Json(req): Json<LoginRequest>,
) -> Response {
    login(state, req, false).await
}

async fn super_login_handler(
    Extension(state): Extension<ServerState>,
    Json(req): Json<LoginRequest>,
) -> Response {
    login(state, req, true).await
}

async fn login(state: ServerState, req: LoginRequest, superuser_only: bool) -> Response {
    let member = match state.db.get_member(&req.username).await {
        Ok(Some(member)) => member,
        Ok(None) => {
            return (
                StatusCode::UNAUTHORIZED,
                error_json("incorrect username or password"),
            )
                .into_response();
        }
        Err(e) => {
            error!("{e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, error_json("storage error"))
                .into_response();
        }
    };
    if !member.is_active {
        return (StatusCode::UNAUTHORIZED, error_json("account disabled")).into_response();
    }
    if !verify_password(&req.password, &member.password_hash).unwrap_or(false) {
        return (
            StatusCode::UNAUTHORIZED,
            error_json("incorrect username or password"),
        )
            .into_response();
    }
    if superuser_only && !member.is_superuser {
        return (StatusCode::FORBIDDEN, error_json("superuser required")).into_response();
    }

    if let Err(e) = state.db.record_login(&member.username).await {
        error!("failed to record login: {e}");
    }
    let token = state
        .sessions
        .issue(member.username.clone(), member.is_superuser)
        .await;
    info!(username=%member.username, "login ok");
    (
        StatusCode::OK,
        json_body(json!({
            "status": "success",
            "message": "login ok",
            "token": token,
            "user": {
                "username": member.username,
                "email": member.email,
                "department_name": member.department_name,
                "is_superuser": member.is_superuser,
            },
        })),
    )
        .into_response()
}

async fn logout_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, _) = req.into_parts();
    if let Some(token) = bearer_token(&parts.headers) {
        state.sessions.revoke(token).await;
    }
    (
        StatusCode::OK,
        json_body(json!({"status": "success", "message": "logged out"})),
    )
        .into_response()
}

async fn change_password_handler(
    Extension(state): Extension<ServerState>,
    Json(req): Json<ChangePasswordRequest>,
) -> Response {
    if !password_strength_ok(&req.new_password) {
        return (
            StatusCode::BAD_REQUEST,
            error_json("new password must contain letters, digits and special characters"),
        )
            .into_response();
    }
    if req.old_password == req.new_password {
        return (
            StatusCode::BAD_REQUEST,
            error_json("new password must differ from the old one"),
        )
            .into_response();
    }

    let member = match state.db.get_member(&req.username).await {
        Ok(Some(member)) => member,
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                error_json("incorrect username or old password"),
            )
                .into_response();
        }
        Err(e) => {
            error!("{e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, error_json("storage error"))
                .into_response();
        }
    };
    if !verify_password(&req.old_password, &member.password_hash).unwrap_or(false) {
        return (
            StatusCode::BAD_REQUEST,
            error_json("incorrect username or old password"),
        )
            .into_response();
    }

    let hash = match hash_password(&req.new_password) {
        Ok(hash) => hash,
        Err(e) => {
            error!("{e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, error_json("hashing failed"))
                .into_response();
        }
    };
    if let Err(e) = state.db.set_password(&req.username, &hash).await {
        error!("{e}");
        return (StatusCode::INTERNAL_SERVER_ERROR, error_json("storage error")).into_response();
    }
    (
        StatusCode::OK,
        json_body(json!({"status": "success", "message": "password changed"})),
    )
        .into_response()
}

pub fn auth_router() -> Router {
    Router::new()
        .route("/v1/login", post(login_handler))
        .route("/v1/super/login", post(super_login_handler))
        .route("/v1/logout", post(logout_handler))
        .route("/v1/change_password", post(change_password_handler))
}
