use crate::messages::Message;
use faststr::FastStr;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The opaque caller payload for agent and workflow applications. Every field
/// is optional on the wire; which ones the upstream requires depends on the
/// application variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppChatData {
    #[serde(default)]
    pub inputs:          Map<String, Value>,
    #[serde(default)]
    pub query:           FastStr,
    #[serde(default)]
    pub conversation_id: FastStr,
    #[serde(default)]
    pub files:           Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionsData {
    #[serde(rename = "model")]
    pub model_name:  FastStr,
    pub messages:    Vec<Message>,
    pub temperature: f32,
    pub stream:      bool,
}

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

impl ChatCompletionsData {
    pub fn new(model_name: FastStr, messages: Vec<Message>, temperature: Option<f32>) -> Self {
        Self {
            model_name,
            messages,
            temperature: temperature.unwrap_or(DEFAULT_TEMPERATURE),
            stream: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_chat_data_defaults() {
        let data: AppChatData = serde_json::from_str("{}").unwrap();
        assert!(data.inputs.is_empty());
        assert!(data.query.is_empty());
        assert!(data.conversation_id.is_empty());
        assert!(data.files.is_empty());
    }

    #[test]
    fn test_chat_completions_defaults() {
        let data = ChatCompletionsData::new("qwen3-8b".into(), vec![], None);
        assert_eq!(data.temperature, DEFAULT_TEMPERATURE);
        assert!(data.stream);

        let body = serde_json::to_value(&data).unwrap();
        assert_eq!(body["model"], "qwen3-8b");
        assert_eq!(body["stream"], true);
    }
}
