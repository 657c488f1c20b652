mod hooks;
mod models;
mod openai;
mod routes;
mod store;
mod venice;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use crate::openai::OpenAiClient;
use crate::routes::{app, AppState, RecordHooks};
use crate::store::StoreClient;
use crate::venice::VeniceClient;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let store_url = std::env::var("SUPABASE_URL").unwrap_or_else(|_| "http://localhost:54321".into());
    let store_key = std::env::var("SUPABASE_ANON_KEY").unwrap_or_default();
    let venice_key = std::env::var("VENICE_API_KEY").unwrap_or_default();
    let openai_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    tracing::info!("Using store at {}", store_url);

    let store = Arc::new(StoreClient::new(store_url, store_key));
    let state = AppState {
        venice: Arc::new(VeniceClient::new(venice_key)),
        openai: Arc::new(OpenAiClient::new(openai_key)),
        records: RecordHooks::new(store),
    };

    let port: u16 = std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Starting server");
    axum::serve(tokio::net::TcpListener::bind(addr).await.unwrap(), app(state))
        .await
        .unwrap();
}
