use super::guard::{authorize, read_json, require_superuser};
use crate::ServerState;
use crate::requests::{CreateAppRequest, DeleteAppRequest, UpdateAppRequest};
use crate::tools::{build_http_client, error_json, json_body};
use faststr::FastStr;
use reqwest::StatusCode;
use serde_json::{Value, json};
use storage::{Application, ApplicationUpdate};
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

async fn my_apps_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, _) = req.into_parts();
    let session = match authorize(&state, &parts.headers).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    let member = match state.db.get_member(&session.username).await {
        Ok(Some(member)) => member,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, error_json("unknown account")).into_response();
        }
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
        json_body(json!({"status": "success", "applications": applications})),
    )
        .into_response()
}

async fn all_apps_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, _) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let apps = match state.db.list_applications().await {
        Ok(apps) => apps,
        Err(e) => return storage_error(e),
    };
    let mut applications = Vec::with_capacity(apps.len());
    for app in apps {
        let member_count = state
            .db
            .application_member_count(&app.name)
            .await
            .unwrap_or(0);
        applications.push(json!({
            "name": app.name,
            "api_base": app.api_base,
            "type": app.ty,
            "icon": app.icon,
            "member_count": member_count,
        }));
    }
    (
        StatusCode::OK,
        json_body(json!({
            "status": "success",
            "total_applications": applications.len(),
            "applications": applications,
        })),
    )
        .into_response()
}

async fn create_app_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, body) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let req: CreateAppRequest = match read_json(body).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.name.is_empty() || req.api_base.is_empty() || req.api_key.is_empty() || req.ty.is_empty()
    {
        return (
            StatusCode::BAD_REQUEST,
            error_json("name, api_base, api_key and type must not be empty"),
        )
            .into_response();
    }
    let app = Application {
        name:     req.name,
        api_base: req.api_base,
        api_key:  req.api_key,
        ty:       req.ty,
        icon:     req.icon,
    };
    match state.db.create_application(&app).await {
        Ok(()) => (
            StatusCode::OK,
            json_body(json!({
                "status": "success",
                "message": "application created",
                "application": {
                    "name": app.name,
                    "type": app.ty,
                    "icon": app.icon,
                    "api_base": app.api_base,
                },
            })),
        )
            .into_response(),
        Err(storage::error::Error::Conflict(_)) => (
            StatusCode::BAD_REQUEST,
            error_json("application name already exists"),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}

async fn update_app_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, body) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let req: UpdateAppRequest = match read_json(body).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.name.is_empty() {
        return (StatusCode::BAD_REQUEST, error_json("name must not be empty")).into_response();
    }
    let update = ApplicationUpdate {
        api_base: req.api_base,
        api_key:  req.api_key,
        ty:       req.ty,
        icon:     req.icon,
    };
    match state.db.update_application(&req.name, update).await {
        Ok(app) => (
            StatusCode::OK,
            json_body(json!({
                "status": "success",
                "message": "application updated",
                "application": {
                    "name": app.name,
                    "type": app.ty,
                    "icon": app.icon,
                    "api_base": app.api_base,
                },
            })),
        )
            .into_response(),
        Err(storage::error::Error::NotFound(_)) => {
            (StatusCode::NOT_FOUND, error_json("Application not found")).into_response()
        }
        Err(e) => storage_error(e),
    }
}

async fn delete_app_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, body) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let req: DeleteAppRequest = match read_json(body).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match state.db.delete_application(&req.name).await {
        Ok(()) => (
            StatusCode::OK,
            json_body(json!({"status": "success", "message": "application deleted"})),
        )
            .into_response(),
        Err(storage::error::Error::NotFound(_)) => {
            (StatusCode::NOT_FOUND, error_json("Application not found")).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// Proxies the upstream `/parameters` endpoint so the frontend can render an
/// application's input form without ever seeing its api key.
async fn app_parameters_handler(
    Extension(state): Extension<ServerState>,
    PathParams(name): PathParams<FastStr>,
    req: ServerRequest,
) -> Response {
    let (parts, _) = req.into_parts();
    let session = match authorize(&state, &parts.headers).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    let app = match state.db.get_application(&name).await {
        Ok(Some(app)) => app,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, error_json("Application not found")).into_response();
        }
        Err(e) => return storage_error(e),
    };
    if !session.is_superuser {
        let member = match state.db.get_member(&session.username).await {
            Ok(Some(member)) => member,
            Ok(None) => {
                return (StatusCode::UNAUTHORIZED, error_json("unknown account")).into_response();
            }
            Err(e) => return storage_error(e),
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
            Err(e) => return storage_error(e),
        }
    }

    let client = match build_http_client() {
        Ok(client) => client,
        Err(e) => {
            error!("{e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, error_json("client error"))
                .into_response();
        }
    };
    let upstream = client
        .get(format!("{}/parameters", app.api_base))
        .bearer_auth(app.api_key.as_str())
        .send()
        .await;
    let res = match upstream {
        Ok(res) => res,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_json(&format!("upstream request failed: {e}")),
            )
                .into_response();
        }
    };
    if !res.status().is_success() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_json(&format!("upstream returned status {}", res.status())),
        )
            .into_response();
    }
    let data: Value = match res.json().await {
        Ok(data) => data,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_json(&format!("upstream request failed: {e}")),
            )
                .into_response();
        }
    };
    (
        StatusCode::OK,
        json_body(json!({"status": "success", "data": data})),
    )
        .into_response()
}

async fn app_users_handler(
    Extension(state): Extension<ServerState>,
    PathParams(name): PathParams<FastStr>,
    req: ServerRequest,
) -> Response {
    let (parts, _) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let app = match state.db.get_application(&name).await {
        Ok(Some(app)) => app,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, error_json("Application not found")).into_response();
        }
        Err(e) => return storage_error(e),
    };
    let members = match state.db.members_for_application(&app.name).await {
        Ok(members) => members,
        Err(e) => return storage_error(e),
    };
    let users: Vec<Value> = members
        .into_iter()
        .map(|m| {
            json!({
                "username": m.username,
                "email": m.email,
                "department_name": m.department_name,
                "is_active": m.is_active,
                "date_joined": m.date_joined,
            })
        })
        .collect();
    (
        StatusCode::OK,
        json_body(json!({
            "status": "success",
            "application": {
                "name": app.name,
                "type": app.ty,
                "icon": app.icon,
                "api_base": app.api_base,
            },
            "total_users": users.len(),
            "users": users,
        })),
    )
        .into_response()
}

pub fn application_router() -> Router {
    Router::new()
        .route("/v1/apps", get(my_apps_handler))
        .route("/v1/apps/all", get(all_apps_handler))
        .route("/v1/apps/create", post(create_app_handler))
        .route("/v1/apps/update", put(update_app_handler))
        .route("/v1/apps/delete", delete(delete_app_handler))
        .route("/v1/apps/{:name}/parameters", get(app_parameters_handler))
        .route("/v1/apps/{:name}/users", get(app_users_handler))
}
