mod chat;

pub use chat::{AppChatData, ChatCompletionsData};
