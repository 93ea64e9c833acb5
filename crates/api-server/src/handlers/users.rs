use super::guard::{read_json, require_superuser};
use crate::ServerState;
use crate::requests::{
    CreateUserRequest, DeleteUserRequest, ManageUserApplicationsRequest, ResetPasswordRequest,
    UpdateUserRequest,
};
use crate::tools::{error_json, json_body};
use faststr::FastStr;
use reqwest::StatusCode;
use serde_json::{Value, json};
use storage::{Member, MemberUpdate, NewMember, hash_password};
use tracing::error;
use volo_http::request::ServerRequest;
use volo_http::response::Response;
use volo_http::server::IntoResponse;
use volo_http::server::param::PathParams;
use volo_http::server::route::{Router, delete, get, post, put};
use volo_http::utils::Extension;

fn storage_error(e: storage::error::Error) -> Response {
    error!("{e}");
    (StatusCode::INTERNAL_SERVER_ERROR, error_json("storage error")).into_response()
}

fn member_json(member: &Member) -> Value {
    json!({
        "username": member.username,
        "email": member.email,
        "department_name": member.department_name,
        "is_active": member.is_active,
        "is_superuser": member.is_superuser,
        "date_joined": member.date_joined,
        "last_login": member.last_login,
    })
}

async fn list_users_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, _) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let members = match state.db.list_members().await {
        Ok(members) => members,
        Err(e) => return storage_error(e),
    };
    let users: Vec<Value> = members.iter().map(member_json).collect();
    (
        StatusCode::OK,
        json_body(json!({
            "status": "success",
            "total_users": users.len(),
            "users": users,
        })),
    )
        .into_response()
}

async fn create_user_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, body) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let req: CreateUserRequest = match read_json(body).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.username.is_empty() || req.password.is_empty() || req.department_name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_json("username, password and department_name must not be empty"),
        )
            .into_response();
    }
    match state.db.missing_applications(&req.applications).await {
        Ok(missing) if !missing.is_empty() => {
            let names: Vec<&str> = missing.iter().map(|n| n.as_str()).collect();
            return (
                StatusCode::BAD_REQUEST,
                error_json(&format!("unknown applications: {}", names.join(", "))),
            )
                .into_response();
        }
        Ok(_) => {}
        Err(e) => return storage_error(e),
    }

    let password_hash = match hash_password(&req.password) {
        Ok(hash) => hash,
        Err(e) => {
            error!("{e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, error_json("hashing failed"))
                .into_response();
        }
    };
    let new = NewMember {
        username:        req.username.clone(),
        password_hash:   password_hash.into(),
        email:           req.email,
        department_name: req.department_name,
    };
    let member = match state.db.create_member(&new).await {
        Ok(member) => member,
        Err(storage::error::Error::Conflict(_)) => {
            return (StatusCode::BAD_REQUEST, error_json("username already exists"))
                .into_response();
        }
        Err(e) => return storage_error(e),
    };
    if !req.applications.is_empty() {
        if let Err(e) = state
            .db
            .set_member_applications(member.id, &req.applications)
            .await
        {
            return storage_error(e);
        }
    }
    (
        StatusCode::OK,
        json_body(json!({
            "status": "success",
            "message": "user created",
            "user": member_json(&member),
            "applications": req.applications,
        })),
    )
        .into_response()
}

async fn update_user_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, body) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let req: UpdateUserRequest = match read_json(body).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let update = MemberUpdate {
        email:           req.email,
        department_name: req.department_name,
        is_active:       req.is_active,
    };
    let member = match state.db.update_member(&req.username, update).await {
        Ok(member) => member,
        Err(storage::error::Error::NotFound(_)) => {
            return (StatusCode::NOT_FOUND, error_json("user not found")).into_response();
        }
        Err(e) => return storage_error(e),
    };

    if let Some(applications) = req.applications {
        match state.db.missing_applications(&applications).await {
            Ok(missing) if !missing.is_empty() => {
                let names: Vec<&str> = missing.iter().map(|n| n.as_str()).collect();
                return (
                    StatusCode::BAD_REQUEST,
                    error_json(&format!("unknown applications: {}", names.join(", "))),
                )
                    .into_response();
            }
            Ok(_) => {}
            Err(e) => return storage_error(e),
        }
        if let Err(e) = state
            .db
            .set_member_applications(member.id, &applications)
            .await
        {
            return storage_error(e);
        }
    }
    (
        StatusCode::OK,
        json_body(json!({
            "status": "success",
            "message": "user updated",
            "user": member_json(&member),
        })),
    )
        .into_response()
}

async fn delete_user_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, body) = req.into_parts();
    let session = match require_superuser(&state, &parts.headers).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    let req: DeleteUserRequest = match read_json(body).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.username == session.username {
        return (
            StatusCode::BAD_REQUEST,
            error_json("cannot delete the logged-in account"),
        )
            .into_response();
    }
    let member = match state.db.get_member(&req.username).await {
        Ok(Some(member)) => member,
        Ok(None) => return (StatusCode::NOT_FOUND, error_json("user not found")).into_response(),
        Err(e) => return storage_error(e),
    };
    if member.is_superuser {
        return (
            StatusCode::BAD_REQUEST,
            error_json("cannot delete a superuser"),
        )
            .into_response();
    }
    match state.db.deactivate_member(&req.username).await {
        Ok(()) => (
            StatusCode::OK,
            json_body(json!({
                "status": "success",
                "message": "user deleted",
                "username": req.username,
            })),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}

async fn reset_password_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, body) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let req: ResetPasswordRequest = match read_json(body).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.username.is_empty() || req.new_password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_json("username and new_password must not be empty"),
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
    match state.db.set_password(&req.username, &hash).await {
        Ok(()) => (
            StatusCode::OK,
            json_body(json!({
                "status": "success",
                "message": "password reset",
                "username": req.username,
            })),
        )
            .into_response(),
        Err(storage::error::Error::NotFound(_)) => {
            (StatusCode::NOT_FOUND, error_json("user not found")).into_response()
        }
        Err(e) => storage_error(e),
    }
}

async fn manage_user_applications_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, body) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let req: ManageUserApplicationsRequest = match read_json(body).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.applications.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_json("applications must not be empty"),
        )
            .into_response();
    }
    if req.action != "add" && req.action != "remove" {
        return (
            StatusCode::BAD_REQUEST,
            error_json("action must be add or remove"),
        )
            .into_response();
    }
    let member = match state.db.get_member(&req.username).await {
        Ok(Some(member)) => member,
        Ok(None) => return (StatusCode::NOT_FOUND, error_json("user not found")).into_response(),
        Err(e) => return storage_error(e),
    };
    match state.db.missing_applications(&req.applications).await {
        Ok(missing) if !missing.is_empty() => {
            let names: Vec<&str> = missing.iter().map(|n| n.as_str()).collect();
            return (
                StatusCode::BAD_REQUEST,
                error_json(&format!("unknown applications: {}", names.join(", "))),
            )
                .into_response();
        }
        Ok(_) => {}
        Err(e) => return storage_error(e),
    }

    let result = if req.action == "add" {
        state
            .db
            .add_member_applications(member.id, &req.applications)
            .await
    } else {
        state
            .db
            .remove_member_applications(member.id, &req.applications)
            .await
    };
    if let Err(e) = result {
        return storage_error(e);
    }

    let current = match state.db.applications_for_member(member.id).await {
        Ok(apps) => apps,
        Err(e) => return storage_error(e),
    };
    let current_names: Vec<FastStr> = current.into_iter().map(|app| app.name).collect();
    (
        StatusCode::OK,
        json_body(json!({
            "status": "success",
            "message": "application grants updated",
            "username": member.username,
            "current_applications": current_names,
        })),
    )
        .into_response()
}

async fn user_applications_handler(
    Extension(state): Extension<ServerState>,
    PathParams(username): PathParams<FastStr>,
    req: ServerRequest,
) -> Response {
    let (parts, _) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let member = match state.db.get_member(&username).await {
        Ok(Some(member)) => member,
        Ok(None) => return (StatusCode::NOT_FOUND, error_json("user not found")).into_response(),
        Err(e) => return storage_error(e),
    };
    let apps = match state.db.applications_for_member(member.id).await {
        Ok(apps) => apps,
        Err(e) => return storage_error(e),
    };
    let applications: Vec<Value> = apps
        .into_iter()
        .map(|app| json!({"name": app.name, "type": app.ty, "icon": app.icon}))
        .collect();
    (
        StatusCode::OK,
        json_body(json!({
            "status": "success",
            "username": member.username,
            "applications": applications,
        })),
    )
        .into_response()
}

pub fn user_router() -> Router {
    Router::new()
        .route("/v1/users", get(list_users_handler))
        .route("/v1/users/create", post(create_user_handler))
        .route("/v1/users/update", put(update_user_handler))
        .route("/v1/users/delete", delete(delete_user_handler))
        .route("/v1/users/reset_password", post(reset_password_handler))
        .route("/v1/users/applications", post(manage_user_applications_handler))
        .route(
            "/v1/users/{:username}/applications",
            get(user_applications_handler),
        )
}
