use common::data::AppChatData;
use common::messages::Message;
use faststr::FastStr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: FastStr,
    pub password: FastStr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub username:     FastStr,
    pub old_password: FastStr,
    pub new_password: FastStr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppChatRequest {
    pub application_name: FastStr,
    #[serde(default)]
    pub data:             AppChatData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRequest {
    pub task_id: FastStr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelChatRequest {
    /// The model's display name in the registry.
    pub name:        FastStr,
    #[serde(default)]
    pub messages:    Vec<Message>,
    pub temperature: Option<f32>,
}

fn default_icon() -> FastStr {
    "MessageSquare".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppRequest {
    pub name:     FastStr,
    pub api_base: FastStr,
    pub api_key:  FastStr,
    #[serde(rename = "type")]
    pub ty:       FastStr,
    #[serde(default = "default_icon")]
    pub icon:     FastStr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppRequest {
    pub name:     FastStr,
    pub api_base: Option<FastStr>,
    pub api_key:  Option<FastStr>,
    #[serde(rename = "type")]
    pub ty:       Option<FastStr>,
    pub icon:     Option<FastStr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteAppRequest {
    pub name: FastStr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username:        FastStr,
    pub password:        FastStr,
    #[serde(default)]
    pub email:           FastStr,
    pub department_name: FastStr,
    #[serde(default)]
    pub applications:    Vec<FastStr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    pub username:        FastStr,
    pub email:           Option<FastStr>,
    pub department_name: Option<FastStr>,
    pub is_active:       Option<bool>,
    /// `Some` replaces the member's grants wholesale; an empty list clears
    /// them.
    pub applications:    Option<Vec<FastStr>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteUserRequest {
    pub username: FastStr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    pub username:     FastStr,
    pub new_password: FastStr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManageUserApplicationsRequest {
    pub username:     FastStr,
    pub action:       FastStr,
    pub applications: Vec<FastStr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateModelRequest {
    pub show_name:   FastStr,
    pub model_name:  FastStr,
    pub api_base:    FastStr,
    pub api_key:     Option<FastStr>,
    #[serde(default)]
    pub model_type:  FastStr,
    #[serde(default)]
    pub provider:    FastStr,
    #[serde(default)]
    pub provider_id: FastStr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateModelRequest {
    pub id:          i32,
    pub show_name:   Option<FastStr>,
    pub model_name:  Option<FastStr>,
    pub api_base:    Option<FastStr>,
    pub api_key:     Option<FastStr>,
    pub model_type:  Option<FastStr>,
    pub provider:    Option<FastStr>,
    pub provider_id: Option<FastStr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteModelRequest {
    pub id: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT_CHAT_REQ: &str = r#"
    {
        "application_name": "sales-helper",
        "data": {
            "query": "What changed in Q3?",
            "inputs": {"region": "emea"},
            "conversation_id": "c-42",
            "files": []
        }
    }
    "#;

    const WORKFLOW_CHAT_REQ: &str = r#"
    {
        "application_name": "weekly-report"
    }
    "#;

    const MODEL_CHAT_REQ: &str = r#"
    {
        "name": "Qwen3 8B",
        "temperature": 0.5,
        "messages": [
            {"role": "user", "content": "hi"}
        ]
    }
    "#;

    #[test]
    fn test_app_chat_request() {
        let req: AppChatRequest = serde_json::from_str(AGENT_CHAT_REQ).unwrap();
        assert_eq!(req.application_name, "sales-helper");
        assert_eq!(req.data.query, "What changed in Q3?");
        assert_eq!(req.data.conversation_id, "c-42");

        // the data payload is optional as a whole
        let req: AppChatRequest = serde_json::from_str(WORKFLOW_CHAT_REQ).unwrap();
        assert!(req.data.query.is_empty());
        assert!(req.data.inputs.is_empty());
    }

    #[test]
    fn test_model_chat_request() {
        let req: ModelChatRequest = serde_json::from_str(MODEL_CHAT_REQ).unwrap();
        assert_eq!(req.name, "Qwen3 8B");
        assert_eq!(req.temperature, Some(0.5));
        assert_eq!(req.messages.len(), 1);
    }

    #[test]
    fn test_create_app_request_defaults() {
        let req: CreateAppRequest = serde_json::from_str(
            r#"{"name": "a", "api_base": "http://x", "api_key": "k", "type": "dify_agent"}"#,
        )
        .unwrap();
        assert_eq!(req.icon, "MessageSquare");
    }

    #[test]
    fn test_create_user_request_defaults() {
        let req: CreateUserRequest = serde_json::from_str(
            r#"{"username": "alice", "password": "pw", "department_name": "sales"}"#,
        )
        .unwrap();
        assert!(req.email.is_empty());
        assert!(req.applications.is_empty());
    }
}
