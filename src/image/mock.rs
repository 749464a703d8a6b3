use super::CompressionService;
use crate::storage::Storage;
use crate::{PipelineError, PipelineResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Copies originals to the derived path unchanged, optionally failing.
pub struct MockImageCompressor {
    storage: Arc<dyn Storage>,
    calls: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
    fail_on_call: Arc<Mutex<Option<usize>>>,
    panic_on_call: Arc<Mutex<Option<usize>>>,
}

impl MockImageCompressor {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_on_call: Arc::new(Mutex::new(None)),
            panic_on_call: Arc::new(Mutex::new(None)),
        }
    }

    /// Fail the `n`th call (1-based) with an unsupported format error.
    pub fn with_failure_on_call(self, n: usize) -> Self {
        *self.fail_on_call.lock().unwrap() = Some(n);
        self
    }

    /// Panic on the `n`th call (1-based), like a crashing worker.
    pub fn with_panic_on_call(self, n: usize) -> Self {
        *self.panic_on_call.lock().unwrap() = Some(n);
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn get_calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompressionService for MockImageCompressor {
    async fn compress(&self, input: &Path, output: &Path) -> PipelineResult<()> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((input.to_path_buf(), output.to_path_buf()));
            calls.len()
        };

        if *self.panic_on_call.lock().unwrap() == Some(call) {
            panic!("mock compressor crashed on call {}", call);
        }

        if *self.fail_on_call.lock().unwrap() == Some(call) {
            return Err(PipelineError::UnsupportedFormat {
                path: input.to_path_buf(),
                extension: ".mock".to_string(),
            });
        }

        let bytes = self.storage.read_file(input).await.map_err(|e| PipelineError::Decode {
            path: input.to_path_buf(),
            source: image::ImageError::IoError(e),
        })?;

        self.storage
            .write_file(output, &bytes)
            .await
            .map_err(|e| PipelineError::Encode {
                path: output.to_path_buf(),
                source: image::ImageError::IoError(e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MockStorage, StorageRoot};

    #[tokio::test]
    async fn test_mock_compressor_copies_original() {
        let storage = MockStorage::new().with_file("images/a.jpg", b"jpeg".to_vec());
        let compressor = MockImageCompressor::new(Arc::new(storage.clone()));
        let output = storage.path_for(StorageRoot::Derived, "a.jpg");

        compressor
            .compress(Path::new("images/a.jpg"), &output)
            .await
            .unwrap();

        assert_eq!(storage.get_files()[&output], b"jpeg".to_vec());
        assert_eq!(compressor.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_compressor_failure_on_call() {
        let storage = MockStorage::new().with_file("images/a.jpg", b"jpeg".to_vec());
        let compressor =
            MockImageCompressor::new(Arc::new(storage.clone())).with_failure_on_call(2);
        let input = Path::new("images/a.jpg");
        let output = Path::new("compressed_images/a.jpg");

        assert!(compressor.compress(input, output).await.is_ok());
        assert!(compressor.compress(input, output).await.is_err());
        assert_eq!(compressor.get_calls().len(), 2);
    }
}
