mod app_chat;
mod applications;
mod auth;
mod guard;
mod model_chat;
mod models;
mod users;

pub use app_chat::app_chat_router;
pub use applications::application_router;
pub use auth::auth_router;
pub use model_chat::model_chat_router;
pub use models::model_router;
pub use users::user_router;
