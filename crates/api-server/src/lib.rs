pub use common::logging_stdout;
use sessions::SessionStore;
use std::net::SocketAddr;
use storage::{AppCache, Storage};
use tasks::TaskRegistry;
use volo_http::Address;
use volo_http::server::{Router, Server};
use volo_http::utils::Extension;

pub mod error;
pub mod handlers;
pub mod requests;
pub mod sessions;
pub mod tasks;
pub mod tools;

/// Everything a handler needs: the store, the login sessions and the
/// in-flight task registry.
#[derive(Clone)]
pub struct ServerState {
    pub db:       Storage<AppCache>,
    pub sessions: SessionStore,
    pub tasks:    TaskRegistry,
}

impl ServerState {
    pub fn new(db: Storage<AppCache>) -> Self {
        Self {
            db,
            sessions: SessionStore::new(),
            tasks: TaskRegistry::new(),
        }
    }
}

pub async fn run_api_server(addr: SocketAddr, db: Storage<AppCache>) {
    let state = ServerState::new(db);
    let app = Router::new()
        .merge(handlers::auth_router())
        .merge(handlers::application_router())
        .merge(handlers::app_chat_router())
        .merge(handlers::model_router())
        .merge(handlers::model_chat_router())
        .merge(handlers::user_router())
        .layer(Extension(state));
    let addr = Address::from(addr);
    Server::new(app).run(addr).await.unwrap();
}
