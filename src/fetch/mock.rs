use super::{FetchService, FetchedImage};
use crate::image::{generate_base_name, resolve_extension};
use crate::storage::{Storage, StorageRoot};
use crate::{PipelineError, PipelineResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Serves canned responses keyed by URL without touching the network.
///
/// Unknown URLs behave like a response with no content type.
pub struct MockFetcher {
    storage: Arc<dyn Storage>,
    responses: Arc<Mutex<HashMap<String, (String, Vec<u8>)>>>,
    requested: Arc<Mutex<Vec<String>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
}

impl MockFetcher {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            responses: Arc::new(Mutex::new(HashMap::new())),
            requested: Arc::new(Mutex::new(Vec::new())),
            delays: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_response(self, url: &str, content_type: &str, body: Vec<u8>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), (content_type.to_string(), body));
        self
    }

    /// Hold the response for `url` back by `delay`, as a slow host would.
    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
        self
    }

    pub fn get_requested_urls(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl FetchService for MockFetcher {
    async fn fetch_cancellable(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> PipelineResult<FetchedImage> {
        self.requested.lock().unwrap().push(url.to_string());

        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(PipelineError::Cancelled { url: url.to_string() });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let (content_type, body) = self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_default();

        let extension = resolve_extension(&content_type).ok_or_else(|| {
            PipelineError::UnresolvableContentType {
                url: url.to_string(),
                content_type: content_type.clone(),
            }
        })?;

        let file_name = format!("{}{}", generate_base_name(), extension);
        let original_path = self.storage.path_for(StorageRoot::Originals, &file_name);
        let derived_path = self.storage.path_for(StorageRoot::Derived, &file_name);

        self.storage
            .write_file(&original_path, &body)
            .await
            .map_err(|source| PipelineError::StorageWrite {
                path: original_path.clone(),
                source,
            })?;

        Ok(FetchedImage {
            original_path,
            derived_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockStorage;

    #[tokio::test]
    async fn test_mock_fetcher_writes_registered_body() {
        let storage = MockStorage::new();
        let fetcher = MockFetcher::new(Arc::new(storage.clone())).with_response(
            "https://x/img.png",
            "image/png",
            b"png".to_vec(),
        );

        let fetched = fetcher.fetch("https://x/img.png").await.unwrap();

        assert_eq!(storage.get_files()[&fetched.original_path], b"png".to_vec());
        assert!(fetched.derived_path.starts_with("compressed_images"));
        assert_eq!(fetcher.get_requested_urls(), vec!["https://x/img.png"]);
    }

    #[tokio::test]
    async fn test_mock_fetcher_delay_is_cancellable() {
        let storage = MockStorage::new();
        let fetcher = MockFetcher::new(Arc::new(storage.clone()))
            .with_response("https://x/slow.png", "image/png", b"png".to_vec())
            .with_delay("https://x/slow.png", Duration::from_secs(30));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fetcher
            .fetch_cancellable("https://x/slow.png", &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { .. }));
        assert!(storage.get_files().is_empty());
    }

    #[tokio::test]
    async fn test_mock_fetcher_unknown_url() {
        let storage = MockStorage::new();
        let fetcher = MockFetcher::new(Arc::new(storage.clone()));

        let err = fetcher.fetch("https://x/nothing").await.unwrap_err();

        assert!(matches!(err, PipelineError::UnresolvableContentType { .. }));
        assert!(storage.get_files().is_empty());
    }
}
