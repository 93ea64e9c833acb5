use faststr::FastStr;

/// The protocol spoken by an upstream backend. Agent and workflow targets are
/// Dify-style applications; `Model` is an OpenAI-compatible completions
/// endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppVariant {
    Agent,
    Workflow,
    Model,
}

impl AppVariant {
    pub fn from_app_type(ty: &str) -> Option<Self> {
        match ty {
            "dify_agent" => Some(Self::Agent),
            "dify_workflow" => Some(Self::Workflow),
            _ => None,
        }
    }

    pub fn chat_path(&self) -> &'static str {
        match self {
            Self::Agent => "/chat-messages",
            Self::Workflow => "/workflows/run",
            Self::Model => "/chat/completions",
        }
    }

    /// Stop path for a running task. `Model` upstreams have no cancellation
    /// primitive, so there is no path for them.
    pub fn stop_path(&self, task_id: &str) -> Option<String> {
        match self {
            Self::Agent => Some(format!("/chat-messages/{task_id}/stop")),
            Self::Workflow => Some(format!("/workflows/{task_id}/stop")),
            Self::Model => None,
        }
    }
}

/// A resolved upstream endpoint: where to connect, how to authenticate, and
/// which protocol variant to speak. Read-only input to the proxy layer.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    pub api_base: FastStr,
    pub api_key:  FastStr,
    pub variant:  AppVariant,
}

impl ProxyTarget {
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.api_base, self.variant.chat_path())
    }

    pub fn stop_url(&self, task_id: &str) -> Option<String> {
        self.variant
            .stop_path(task_id)
            .map(|path| format!("{}{}", self.api_base, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_from_app_type() {
        assert_eq!(AppVariant::from_app_type("dify_agent"), Some(AppVariant::Agent));
        assert_eq!(
            AppVariant::from_app_type("dify_workflow"),
            Some(AppVariant::Workflow)
        );
        assert_eq!(AppVariant::from_app_type("coze_bot"), None);
    }

    #[test]
    fn test_urls() {
        let target = ProxyTarget {
            api_base: "http://dify.local/v1".into(),
            api_key:  "app-key".into(),
            variant:  AppVariant::Workflow,
        };
        assert_eq!(target.chat_url(), "http://dify.local/v1/workflows/run");
        assert_eq!(
            target.stop_url("t-1").as_deref(),
            Some("http://dify.local/v1/workflows/t-1/stop")
        );

        let model = ProxyTarget {
            api_base: "http://llm.local/v1".into(),
            api_key:  "sk".into(),
            variant:  AppVariant::Model,
        };
        assert_eq!(model.chat_url(), "http://llm.local/v1/chat/completions");
        assert!(model.stop_url("t-1").is_none());
    }
}
