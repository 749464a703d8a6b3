//! HTTP API
//!
//! Axum router exposing product and user endpoints. Product creation runs
//! the image pipeline before anything is persisted.

pub mod error;
pub mod products;
pub mod users;

pub use error::ApiError;

use crate::db::Database;
use crate::pipeline::ImagePipeline;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ImagePipeline>,
    pub db: Arc<dyn Database>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/products",
            post(products::create_product).get(products::list_products),
        )
        .route("/products/{id}", get(products::get_product))
        .route("/users", post(users::create_user))
        .route("/users/{id}", get(users::get_user))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `addr` until Ctrl+C or SIGTERM.
pub async fn serve(router: Router, addr: &str) -> crate::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server is running on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
