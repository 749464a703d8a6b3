//! Remote image retrieval
//!
//! Downloads an image URL into the originals root and hands back the path it
//! was written to, plus where its compressed derivative should go.

pub mod client;
pub mod mock;

pub use client::HttpFetcher;
pub use mock::MockFetcher;

use crate::PipelineResult;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    /// Written original, `<originals>/<base><ext>`.
    pub original_path: PathBuf,
    /// Not yet written, `<derived>/<base><ext>`.
    pub derived_path: PathBuf,
}

#[async_trait]
pub trait FetchService: Send + Sync {
    /// Download `url`, giving up with `PipelineError::Cancelled` once `cancel`
    /// fires. A cancelled fetch leaves no file behind.
    async fn fetch_cancellable(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> PipelineResult<FetchedImage>;

    async fn fetch(&self, url: &str) -> PipelineResult<FetchedImage> {
        self.fetch_cancellable(url, &CancellationToken::new()).await
    }
}
