use super::{FetchService, FetchedImage};
use crate::image::{generate_base_name, resolve_extension};
use crate::storage::{FileWriter, Storage, StorageRoot};
use crate::{PipelineError, PipelineResult, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Upper bound on a single downloaded body unless configured otherwise.
pub const DEFAULT_MAX_BODY_BYTES: u64 = 25 * 1024 * 1024;

/// Downloads images over HTTP into the originals root.
pub struct HttpFetcher {
    client: Client,
    storage: Arc<dyn Storage>,
    require_success: bool,
    retries: usize,
    retry_delay: Duration,
    max_body_bytes: u64,
}

fn transport_error(url: &str, source: reqwest::Error) -> PipelineError {
    error!("Failed to download image {}: {}", url, source);
    PipelineError::Transport {
        url: url.to_string(),
        source,
    }
}

fn storage_error(url: &str, path: &Path, source: io::Error) -> PipelineError {
    error!(
        "Failed to save image from {} to {}: {}",
        url,
        path.display(),
        source
    );
    PipelineError::StorageWrite {
        path: path.to_path_buf(),
        source,
    }
}

fn cancelled(url: &str) -> PipelineError {
    info!(url, "Download cancelled");
    PipelineError::Cancelled {
        url: url.to_string(),
    }
}

impl HttpFetcher {
    /// Build a fetcher whose every request is bounded by `timeout`.
    pub fn new(storage: Arc<dyn Storage>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new_with_client(client, storage))
    }

    pub fn new_with_client(client: Client, storage: Arc<dyn Storage>) -> Self {
        Self {
            client,
            storage,
            require_success: true,
            retries: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// When disabled, any response body is stored regardless of its status.
    pub fn with_status_check(mut self, enabled: bool) -> Self {
        self.require_success = enabled;
        self
    }

    /// Retry transport failures up to `retries` extra times.
    pub fn with_retries(mut self, retries: usize, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = delay;
        self
    }

    /// Reject bodies larger than `bytes`.
    pub fn with_max_body_bytes(mut self, bytes: u64) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    async fn fetch_once(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> PipelineResult<FetchedImage> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled(url)),
            sent = self.client.get(url).send() => sent.map_err(|e| transport_error(url, e))?,
        };

        let response = if self.require_success {
            response
                .error_for_status()
                .map_err(|e| transport_error(url, e))?
        } else {
            response
        };

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let extension = resolve_extension(&content_type).ok_or_else(|| {
            error!(
                "Failed to detect file extension for {} (content type '{}')",
                url, content_type
            );
            PipelineError::UnresolvableContentType {
                url: url.to_string(),
                content_type: content_type.clone(),
            }
        })?;

        let file_name = format!("{}{}", generate_base_name(), extension);
        let original_path = self.storage.path_for(StorageRoot::Originals, &file_name);
        let derived_path = self.storage.path_for(StorageRoot::Derived, &file_name);

        let mut writer = self
            .storage
            .create_file(&original_path)
            .await
            .map_err(|e| storage_error(url, &original_path, e))?;

        let streamed = self
            .stream_body(url, response, writer.as_mut(), &original_path, cancel)
            .await;
        drop(writer);

        let bytes = match streamed {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Err(cleanup) = self.storage.remove_file(&original_path).await {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        warn!(
                            "Failed to remove partial file {}: {}",
                            original_path.display(),
                            cleanup
                        );
                    }
                }
                return Err(e);
            }
        };

        info!(
            url,
            destination = %original_path.display(),
            bytes,
            "Image downloaded successfully"
        );

        Ok(FetchedImage {
            original_path,
            derived_path,
        })
    }

    /// Copy the response body chunk by chunk, enforcing the size limit.
    async fn stream_body(
        &self,
        url: &str,
        response: Response,
        writer: &mut dyn FileWriter,
        path: &Path,
        cancel: &CancellationToken,
    ) -> PipelineResult<u64> {
        let mut body = Box::pin(response.bytes_stream());
        let mut written: u64 = 0;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled(url)),
                next = body.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| transport_error(url, e))?;

            written += chunk.len() as u64;
            if written > self.max_body_bytes {
                error!("Image body from {} exceeds {} bytes", url, self.max_body_bytes);
                return Err(PipelineError::BodyTooLarge {
                    url: url.to_string(),
                    limit: self.max_body_bytes,
                });
            }

            writer
                .write_chunk(&chunk)
                .await
                .map_err(|e| storage_error(url, path, e))?;
        }

        writer
            .finish()
            .await
            .map_err(|e| storage_error(url, path, e))?;
        Ok(written)
    }
}

#[async_trait]
impl FetchService for HttpFetcher {
    async fn fetch_cancellable(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> PipelineResult<FetchedImage> {
        let strategy = FixedInterval::new(self.retry_delay).take(self.retries);

        RetryIf::spawn(
            strategy,
            || self.fetch_once(url, cancel),
            |e: &PipelineError| {
                if e.is_transient() && !cancel.is_cancelled() {
                    warn!("Download attempt for {} failed: {}", url, e);
                    true
                } else {
                    false
                }
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LocalStorage, MockStorage};
    use image::{DynamicImage, ImageFormat};
    use std::io::Cursor;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_image(format: ImageFormat) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(10, 10, image::Rgb([255, 0, 0]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    struct TestFetcher {
        storage: Arc<LocalStorage>,
        temp_dir: TempDir,
    }

    impl TestFetcher {
        async fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let storage = Arc::new(LocalStorage::new(
                temp_dir.path().join("images"),
                temp_dir.path().join("compressed_images"),
            ));
            storage.ensure_root(StorageRoot::Originals).await.unwrap();
            storage.ensure_root(StorageRoot::Derived).await.unwrap();
            Self {
                storage,
                temp_dir,
            }
        }

        fn fetcher(&self) -> HttpFetcher {
            HttpFetcher::new(self.storage.clone(), Duration::from_secs(5)).unwrap()
        }

        fn originals(&self) -> usize {
            std::fs::read_dir(self.temp_dir.path().join("images"))
                .unwrap()
                .count()
        }
    }

    #[tokio::test]
    async fn test_fetch_writes_original_and_plans_derived_path() {
        let server = MockServer::start().await;
        let body = create_test_image(ImageFormat::Jpeg);

        Mock::given(method("GET"))
            .and(path("/img.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.clone(), "image/jpeg"))
            .mount(&server)
            .await;

        let test = TestFetcher::new().await;
        let fetched = test
            .fetcher()
            .fetch(&format!("{}/img.jpg", server.uri()))
            .await
            .unwrap();

        assert!(fetched.original_path.exists());
        assert!(!fetched.derived_path.exists());
        assert_eq!(std::fs::read(&fetched.original_path).unwrap(), body);
        assert_eq!(
            fetched.original_path.extension().unwrap(),
            fetched.derived_path.extension().unwrap()
        );
        assert_eq!(
            fetched.original_path.file_name(),
            fetched.derived_path.file_name()
        );
        assert!(fetched
            .original_path
            .to_string_lossy()
            .ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_octet_stream_is_unresolvable_and_writes_nothing() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(create_test_image(ImageFormat::Png), "application/octet-stream"),
            )
            .mount(&server)
            .await;

        let test = TestFetcher::new().await;
        let err = test
            .fetcher()
            .fetch(&format!("{}/bad", server.uri()))
            .await
            .unwrap_err();

        match err {
            PipelineError::UnresolvableContentType { content_type, .. } => {
                assert_eq!(content_type, "application/octet-stream")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(test.originals(), 0);
    }

    #[tokio::test]
    async fn test_missing_content_type_is_unresolvable() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let test = TestFetcher::new().await;
        let err = test
            .fetcher()
            .fetch(&format!("{}/empty", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::UnresolvableContentType { .. }));
    }

    #[tokio::test]
    async fn test_error_status_is_transport_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).set_body_raw(create_test_image(ImageFormat::Png), "image/png"),
            )
            .mount(&server)
            .await;

        let test = TestFetcher::new().await;
        let err = test
            .fetcher()
            .fetch(&format!("{}/missing.png", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Transport { .. }));
        assert_eq!(test.originals(), 0);
    }

    #[tokio::test]
    async fn test_error_status_accepted_without_status_check() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).set_body_raw(create_test_image(ImageFormat::Png), "image/png"),
            )
            .mount(&server)
            .await;

        let test = TestFetcher::new().await;
        let fetched = test
            .fetcher()
            .with_status_check(false)
            .fetch(&format!("{}/missing.png", server.uri()))
            .await
            .unwrap();

        assert!(fetched.original_path.exists());
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        let test = TestFetcher::new().await;
        let err = test
            .fetcher()
            .fetch("http://127.0.0.1:1/unreachable.jpg")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Transport { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(create_test_image(ImageFormat::Jpeg), "image/jpeg")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let test = TestFetcher::new().await;
        let fetcher =
            HttpFetcher::new(test.storage.clone(), Duration::from_millis(200)).unwrap();
        let err = fetcher
            .fetch(&format!("{}/slow.jpg", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_transport_failures_are_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(create_test_image(ImageFormat::Png), "image/png"),
            )
            .mount(&server)
            .await;

        let test = TestFetcher::new().await;
        let fetched = test
            .fetcher()
            .with_retries(2, Duration::from_millis(10))
            .fetch(&format!("{}/flaky.png", server.uri()))
            .await
            .unwrap();

        assert!(fetched.original_path.exists());
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected_without_leftovers() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![7u8; 64 * 1024], "image/png"),
            )
            .mount(&server)
            .await;

        let test = TestFetcher::new().await;
        let err = test
            .fetcher()
            .with_max_body_bytes(1024)
            .fetch(&format!("{}/huge.png", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::BodyTooLarge { limit: 1024, .. }));
        assert_eq!(test.originals(), 0);
    }

    #[tokio::test]
    async fn test_failed_streamed_write_removes_partial_file() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![1u8; 32 * 1024], "image/jpeg"),
            )
            .mount(&server)
            .await;

        let storage = MockStorage::new().with_write_limit(512);
        let fetcher = HttpFetcher::new(Arc::new(storage.clone()), Duration::from_secs(5)).unwrap();
        let err = fetcher
            .fetch(&format!("{}/big.jpg", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::StorageWrite { .. }));
        assert_eq!(storage.get_write_count(), 1);
        assert!(storage.get_files().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_pending_request() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(create_test_image(ImageFormat::Png), "image/png")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let test = TestFetcher::new().await;
        let fetcher = test.fetcher();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = fetcher
            .fetch_cancellable(&format!("{}/slow.png", server.uri()), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(test.originals(), 0);
    }

    #[tokio::test]
    async fn test_unresolvable_content_type_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"x".to_vec(), "text/plain"))
            .mount(&server)
            .await;

        let test = TestFetcher::new().await;
        let result = test
            .fetcher()
            .with_retries(3, Duration::from_millis(10))
            .fetch(&format!("{}/text", server.uri()))
            .await;

        assert!(result.is_err());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
