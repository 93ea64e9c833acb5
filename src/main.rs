use anyhow::Result;
use dotenvy::dotenv;
use std::net::SocketAddr;
use storage::{AppCache, Storage};
#[tokio::main]
async fn main() -> Result<()> {
    let _guard = api_server::logging_stdout();
    dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").expect("no database url");

    let storage = Storage::<AppCache>::new(&database_url).await?;

    let api_server_addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:19981".to_owned())
        .parse()?;

    api_server::run_api_server(api_server_addr, storage).await;

    Ok(())
}
