mod config;
mod routes;
mod state;
mod store;

use std::sync::Arc;

use config::{RelayConfig, StorageKind};
use store::{FileStorage, FrameStorage, MemoryStorage, RelayStore, SystemClock};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = RelayConfig::from_env();

    let storage: Arc<dyn FrameStorage> = match config.storage {
        StorageKind::File => {
            tracing::info!(path = %config.data_file.display(), "using file storage");
            Arc::new(FileStorage::new(&config.data_file))
        }
        StorageKind::Memory => {
            tracing::warn!("using in-memory storage; the frame does not survive restarts");
            Arc::new(MemoryStorage::new())
        }
    };
    let store = RelayStore::new(storage, Arc::new(SystemClock), config.max_frame_age);

    let app = routes::app(state::AppState::new(store));
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    tracing::info!(%addr, max_frame_age = config.max_frame_age, "relay listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
