use super::guard::{read_json, require_superuser};
use crate::ServerState;
use crate::requests::{CreateModelRequest, DeleteModelRequest, UpdateModelRequest};
use crate::tools::{error_json, json_body};
use reqwest::StatusCode;
use serde_json::{Value, json};
use storage::{ModelInfo, ModelUpdate, NewModel};
use tracing::error;
use volo_http::request::ServerRequest;
use volo_http::response::Response;
use volo_http::server::IntoResponse;
use volo_http::server::route::{Router, delete, get, post, put};
use volo_http::utils::Extension;

fn storage_error(e: storage::error::Error) -> Response {
    error!("{e}");
    (StatusCode::INTERNAL_SERVER_ERROR, error_json("storage error")).into_response()
}

fn model_json(model: &ModelInfo) -> Value {
    json!({
        "id": model.id,
        "show_name": model.show_name,
        "model_name": model.model_name,
        "api_base": model.api_base,
        "model_type": model.model_type,
        "provider": model.provider,
        "provider_id": model.provider_id,
    })
}

async fn list_models_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, _) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let models = match state.db.list_models().await {
        Ok(models) => models,
        Err(e) => return storage_error(e),
    };
    let models: Vec<Value> = models.iter().map(model_json).collect();
    (
        StatusCode::OK,
        json_body(json!({
            "status": "success",
            "total_models": models.len(),
            "models": models,
        })),
    )
        .into_response()
}

async fn create_model_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, body) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let req: CreateModelRequest = match read_json(body).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.show_name.is_empty() || req.model_name.is_empty() || req.api_base.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_json("show_name, model_name and api_base must not be empty"),
        )
            .into_response();
    }
    let new = NewModel {
        show_name:   req.show_name,
        model_name:  req.model_name,
        api_base:    req.api_base,
        api_key:     req.api_key,
        model_type:  req.model_type,
        provider:    req.provider,
        provider_id: req.provider_id,
    };
    match state.db.create_model(&new).await {
        Ok(model) => (
            StatusCode::OK,
            json_body(json!({
                "status": "success",
                "message": "model created",
                "model": model_json(&model),
            })),
        )
            .into_response(),
        Err(storage::error::Error::Conflict(_)) => (
            StatusCode::BAD_REQUEST,
            error_json("show_name already exists"),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}

async fn update_model_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, body) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let req: UpdateModelRequest = match read_json(body).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let update = ModelUpdate {
        show_name:   req.show_name,
        model_name:  req.model_name,
        api_base:    req.api_base,
        api_key:     req.api_key,
        model_type:  req.model_type,
        provider:    req.provider,
        provider_id: req.provider_id,
    };
    match state.db.update_model(req.id, update).await {
        Ok(model) => (
            StatusCode::OK,
            json_body(json!({
                "status": "success",
                "message": "model updated",
                "model": model_json(&model),
            })),
        )
            .into_response(),
        Err(storage::error::Error::NotFound(_)) => {
            (StatusCode::NOT_FOUND, error_json("Model not found")).into_response()
        }
        Err(storage::error::Error::Conflict(_)) => (
            StatusCode::BAD_REQUEST,
            error_json("show_name already exists"),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}

async fn delete_model_handler(
    Extension(state): Extension<ServerState>,
    req: ServerRequest,
) -> Response {
    let (parts, body) = req.into_parts();
    if let Err(resp) = require_superuser(&state, &parts.headers).await {
        return resp;
    }
    let req: DeleteModelRequest = match read_json(body).await {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match state.db.delete_model(req.id).await {
        Ok(show_name) => (
            StatusCode::OK,
            json_body(json!({
                "status": "success",
                "message": "model deleted",
                "model_name": show_name,
            })),
        )
            .into_response(),
        Err(storage::error::Error::NotFound(_)) => {
            (StatusCode::NOT_FOUND, error_json("Model not found")).into_response()
        }
        Err(e) => storage_error(e),
    }
}

pub fn model_router() -> Router {
    Router::new()
        .route("/v1/models", get(list_models_handler))
        .route("/v1/models/create", post(create_model_handler))
        .route("/v1/models/update", put(update_model_handler))
        .route("/v1/models/delete", delete(delete_model_handler))
}
