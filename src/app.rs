//! Application wiring for the catalog service.

use crate::db::{Database, SqliteDatabase};
use crate::fetch::{FetchService, HttpFetcher};
use crate::image::{CompressionService, ImageCompressor};
use crate::models::Config;
use crate::pipeline::ImagePipeline;
use crate::server::{self, AppState};
use crate::storage::{LocalStorage, Storage};
use crate::Result;
use axum::Router;
use std::sync::Arc;
use tracing::info;

/// Owns the service graph and the HTTP router built on top of it.
pub struct App {
    state: AppState,
    bind_addr: String,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub storage: Arc<dyn Storage>,
    pub fetcher: Arc<dyn FetchService>,
    pub compressor: Arc<dyn CompressionService>,
    pub db: Arc<dyn Database>,
}

impl App {
    /// Build an app from concrete service dependencies.
    pub fn with_services(services: AppServices, config: &Config) -> Self {
        let pipeline = ImagePipeline::new(services.storage, services.fetcher, services.compressor)
            .with_concurrency(config.pipeline_concurrency);

        Self {
            state: AppState {
                pipeline: Arc::new(pipeline),
                db: services.db,
            },
            bind_addr: config.bind_addr.clone(),
        }
    }

    /// Construct the production service graph from `config`.
    pub fn new(config: &Config) -> Result<Self> {
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(
            &config.images_dir,
            &config.compressed_images_dir,
        ));

        let fetcher = HttpFetcher::new(storage.clone(), config.fetch_timeout)?
            .with_status_check(config.require_success_status)
            .with_retries(config.fetch_retries, config.fetch_retry_delay)
            .with_max_body_bytes(config.max_image_bytes);

        let compressor = ImageCompressor::new(storage.clone());
        let db = SqliteDatabase::open(&config.database_path)?;

        info!(
            images_dir = %config.images_dir.display(),
            compressed_images_dir = %config.compressed_images_dir.display(),
            concurrency = config.pipeline_concurrency,
            "Image pipeline configured"
        );

        Ok(Self::with_services(
            AppServices {
                storage,
                fetcher: Arc::new(fetcher),
                compressor: Arc::new(compressor),
                db: Arc::new(db),
            },
            config,
        ))
    }

    pub fn router(&self) -> Router {
        server::create_router(self.state.clone())
    }

    /// Serve the API until shutdown is requested.
    pub async fn run(self) -> Result<()> {
        let router = self.router();
        server::serve(router, &self.bind_addr).await
    }
}
