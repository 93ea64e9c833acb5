use faststr::FastStr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    Assistant,
    User,
    Tool,
}

impl MessageRole {
    pub fn is_system(&self) -> bool {
        matches!(self, MessageRole::System)
    }

    pub fn is_user(&self) -> bool {
        matches!(self, MessageRole::User)
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, MessageRole::Assistant)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(FastStr),
    Array(Vec<MessageContentPart>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContentPart {
    Text { text: FastStr },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageUrl {
    pub url: FastStr,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub role:    MessageRole,
    pub content: MessageContent,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            role:    MessageRole::User,
            content: MessageContent::Text("".into()),
        }
    }
}

impl Message {
    pub fn new(role: MessageRole, content: MessageContent) -> Self {
        Self { role, content }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message() {
        let message: Message =
            serde_json::from_str(r#"{"role": "user", "content": "hi"}"#).unwrap();
        assert!(message.role.is_user());
        assert!(matches!(message.content, MessageContent::Text(ref t) if t == "hi"));
    }

    #[test]
    fn test_multimodal_message() {
        let raw = r#"
        {
            "role": "system",
            "content": [
                {"type": "image_url", "image_url": {"url": "https://example.com/a.png"}},
                {"type": "text", "text": "Describe this picture."}
            ]
        }
        "#;
        let message: Message = serde_json::from_str(raw).unwrap();
        assert!(message.role.is_system());
        let MessageContent::Array(parts) = message.content else {
            panic!("expected content parts");
        };
        assert_eq!(parts.len(), 2);
    }
}
