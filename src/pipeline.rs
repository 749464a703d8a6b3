//! Image pipeline orchestration
//!
//! Downloads and compresses every image of a product submission. The batch
//! is all-or-nothing: the first failure aborts the call, removes whatever the
//! call already wrote, and no path set is returned.

use crate::fetch::{FetchService, FetchedImage};
use crate::image::CompressionService;
use crate::models::ProductImageSet;
use crate::paths::path_to_string;
use crate::storage::{Storage, StorageRoot};
use crate::{PipelineError, PipelineResult};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Per-position results shared with pooled tasks. A slot is filled as soon as
/// its original exists so a failed or panicked task can still be cleaned up.
type Slots = Arc<Mutex<Vec<Option<FetchedImage>>>>;

/// Fetch-then-compress for a single URL.
#[derive(Clone)]
struct ImageTask {
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn FetchService>,
    compressor: Arc<dyn CompressionService>,
}

impl ImageTask {
    async fn run(&self, url: &str) -> PipelineResult<FetchedImage> {
        let fetched = self.fetcher.fetch(url).await?;

        if let Err(e) = self
            .compressor
            .compress(&fetched.original_path, &fetched.derived_path)
            .await
        {
            discard(self.storage.as_ref(), &fetched.original_path).await;
            return Err(e);
        }

        Ok(fetched)
    }

    /// Pooled variant of `run`. The fetch is abandoned as soon as `cancel`
    /// fires; compression runs to completion and is discarded by the caller.
    async fn run_in_slot(
        &self,
        index: usize,
        url: &str,
        slots: &Slots,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let fetched = match self.fetcher.fetch_cancellable(url, cancel).await {
            Err(PipelineError::Cancelled { .. }) => return Ok(()),
            result => result?,
        };
        slots.lock().await[index] = Some(fetched.clone());

        if cancel.is_cancelled() {
            return Ok(());
        }

        self.compressor
            .compress(&fetched.original_path, &fetched.derived_path)
            .await
    }
}

async fn discard(storage: &dyn Storage, path: &Path) {
    if let Err(e) = storage.remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove {} after pipeline failure: {}", path.display(), e);
        }
    }
}

async fn discard_all(storage: &dyn Storage, images: &[FetchedImage]) {
    for image in images {
        discard(storage, &image.original_path).await;
        discard(storage, &image.derived_path).await;
    }
}

/// Turns a list of image URLs into stored originals and derivatives.
pub struct ImagePipeline {
    task: ImageTask,
    concurrency: usize,
}

impl ImagePipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn FetchService>,
        compressor: Arc<dyn CompressionService>,
    ) -> Self {
        Self {
            task: ImageTask {
                storage,
                fetcher,
                compressor,
            },
            concurrency: 1,
        }
    }

    /// Process up to `concurrency` URLs at once. Output order is unaffected.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Download and compress `urls`, returning paths aligned with the input.
    pub async fn process_images(&self, urls: &[String]) -> PipelineResult<ProductImageSet> {
        self.prepare_roots().await?;

        let processed = if self.concurrency > 1 && urls.len() > 1 {
            self.process_concurrent(urls).await?
        } else {
            self.process_sequential(urls).await?
        };

        info!("Processed {} image(s)", processed.len());

        Ok(ProductImageSet {
            originals: processed
                .iter()
                .map(|image| path_to_string(&image.original_path))
                .collect(),
            derived: processed
                .iter()
                .map(|image| path_to_string(&image.derived_path))
                .collect(),
        })
    }

    /// Remove every file of a set this pipeline produced, e.g. when the
    /// product could not be persisted.
    pub async fn discard(&self, images: &ProductImageSet) {
        let storage = self.task.storage.as_ref();
        for path in images.originals.iter().chain(&images.derived) {
            discard(storage, &PathBuf::from(path)).await;
        }
    }

    async fn prepare_roots(&self) -> PipelineResult<()> {
        for root in [StorageRoot::Originals, StorageRoot::Derived] {
            self.task.storage.ensure_root(root).await.map_err(|source| {
                let path = self.task.storage.path_for(root, "");
                error!("Failed to create storage root {}: {}", path.display(), source);
                PipelineError::StorageInit { path, source }
            })?;
        }
        Ok(())
    }

    async fn process_sequential(&self, urls: &[String]) -> PipelineResult<Vec<FetchedImage>> {
        let mut processed = Vec::with_capacity(urls.len());

        for url in urls {
            match self.task.run(url).await {
                Ok(image) => processed.push(image),
                Err(e) => {
                    error!(kind = e.kind(), "Image processing failed for {}: {}", url, e);
                    discard_all(self.task.storage.as_ref(), &processed).await;
                    return Err(e);
                }
            }
        }

        Ok(processed)
    }

    async fn process_concurrent(&self, urls: &[String]) -> PipelineResult<Vec<FetchedImage>> {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let cancel = CancellationToken::new();
        let slots: Slots = Arc::new(Mutex::new(vec![None; urls.len()]));
        let mut tasks = JoinSet::new();

        for (index, url) in urls.iter().enumerate() {
            let task = self.task.clone();
            let permits = permits.clone();
            let cancel = cancel.clone();
            let slots = slots.clone();
            let url = url.clone();
            tasks.spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    permit = permits.acquire_owned() => {
                        permit.map_err(|e| PipelineError::Worker(e.to_string()))?
                    }
                };
                task.run_in_slot(index, &url, &slots, &cancel).await
            });
        }

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| PipelineError::Worker(format!("Image task join error: {}", e)))
                .and_then(|result| result);

            if let Err(e) = outcome {
                if failure.is_none() {
                    error!(kind = e.kind(), "Image processing failed: {}", e);
                    cancel.cancel();
                    failure = Some(e);
                }
            }
        }

        let slots = std::mem::take(&mut *slots.lock().await);
        if let Some(e) = failure {
            let written: Vec<FetchedImage> = slots.into_iter().flatten().collect();
            discard_all(self.task.storage.as_ref(), &written).await;
            return Err(e);
        }

        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| PipelineError::Worker("image task finished without a result".to_string()))
    }
}
