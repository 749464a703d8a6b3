use super::{FileWriter, Storage, StorageRoot};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// In-memory storage for tests.
#[derive(Clone)]
pub struct MockStorage {
    files: FileMap,
    fail_init: Arc<Mutex<bool>>,
    fail_writes_under: Arc<Mutex<Option<StorageRoot>>>,
    write_limit: Arc<Mutex<Option<usize>>>,
    write_count: Arc<Mutex<usize>>,
}

type FileMap = Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>;

/// Appends chunks straight into the shared file map.
struct MockFileWriter {
    files: FileMap,
    path: PathBuf,
    limit: Option<usize>,
}

#[async_trait]
impl FileWriter for MockFileWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let mut files = self.files.lock().unwrap();
        let content = files.entry(self.path.clone()).or_default();
        if let Some(limit) = self.limit {
            if content.len() + chunk.len() > limit {
                return Err(io::Error::other("Mock disk full"));
            }
        }
        content.extend_from_slice(chunk);
        Ok(())
    }

    async fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl MockStorage {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            fail_init: Arc::new(Mutex::new(false)),
            fail_writes_under: Arc::new(Mutex::new(None)),
            write_limit: Arc::new(Mutex::new(None)),
            write_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_init_failure(self, should_fail: bool) -> Self {
        *self.fail_init.lock().unwrap() = should_fail;
        self
    }

    /// Make every write below `root` fail.
    pub fn with_write_failure(self, root: StorageRoot) -> Self {
        *self.fail_writes_under.lock().unwrap() = Some(root);
        self
    }

    /// Make streamed writes fail once a file would grow past `bytes`.
    pub fn with_write_limit(self, bytes: usize) -> Self {
        *self.write_limit.lock().unwrap() = Some(bytes);
        self
    }

    pub fn with_file(self, path: impl Into<PathBuf>, content: Vec<u8>) -> Self {
        self.files.lock().unwrap().insert(path.into(), content);
        self
    }

    pub fn get_files(&self) -> HashMap<PathBuf, Vec<u8>> {
        self.files.lock().unwrap().clone()
    }

    pub fn get_write_count(&self) -> usize {
        *self.write_count.lock().unwrap()
    }

    fn check_write(&self, path: &Path) -> io::Result<()> {
        if let Some(root) = *self.fail_writes_under.lock().unwrap() {
            if path.starts_with(Self::root_dir(root)) {
                return Err(io::Error::other("Mock write failure"));
            }
        }
        Ok(())
    }

    fn root_dir(root: StorageRoot) -> &'static Path {
        match root {
            StorageRoot::Originals => Path::new("images"),
            StorageRoot::Derived => Path::new("compressed_images"),
        }
    }
}

impl Default for MockStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn ensure_root(&self, root: StorageRoot) -> io::Result<PathBuf> {
        if *self.fail_init.lock().unwrap() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "Mock root creation failure",
            ));
        }
        Ok(Self::root_dir(root).to_path_buf())
    }

    fn path_for(&self, root: StorageRoot, name: &str) -> PathBuf {
        Self::root_dir(root).join(name)
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.check_write(path)?;

        *self.write_count.lock().unwrap() += 1;
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    async fn create_file(&self, path: &Path) -> io::Result<Box<dyn FileWriter>> {
        self.check_write(path)?;

        *self.write_count.lock().unwrap() += 1;
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Vec::new());
        Ok(Box::new(MockFileWriter {
            files: self.files.clone(),
            path: path.to_path_buf(),
            limit: *self.write_limit.lock().unwrap(),
        }))
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("File not found: {}", path.display()),
                )
            })
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        match self.files.lock().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_storage_write_and_read() {
        let storage = MockStorage::new();
        let path = storage.path_for(StorageRoot::Originals, "a.jpg");

        storage.write_file(&path, b"data").await.unwrap();

        assert_eq!(storage.read_file(&path).await.unwrap(), b"data");
        assert_eq!(storage.get_write_count(), 1);
        assert_eq!(path, PathBuf::from("images").join("a.jpg"));
    }

    #[tokio::test]
    async fn test_mock_storage_write_failure_is_scoped_to_root() {
        let storage = MockStorage::new().with_write_failure(StorageRoot::Derived);

        let original = storage.path_for(StorageRoot::Originals, "a.jpg");
        let derived = storage.path_for(StorageRoot::Derived, "a.jpg");

        assert!(storage.write_file(&original, b"data").await.is_ok());
        assert!(storage.write_file(&derived, b"data").await.is_err());
        assert_eq!(storage.get_files().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_storage_streamed_write_limit() {
        let storage = MockStorage::new().with_write_limit(4);
        let path = storage.path_for(StorageRoot::Originals, "a.png");

        let mut writer = storage.create_file(&path).await.unwrap();
        writer.write_chunk(b"abc").await.unwrap();
        assert!(writer.write_chunk(b"de").await.is_err());

        assert_eq!(storage.get_files()[&path], b"abc".to_vec());
    }

    #[tokio::test]
    async fn test_mock_storage_init_failure() {
        let storage = MockStorage::new().with_init_failure(true);
        assert!(storage.ensure_root(StorageRoot::Originals).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_storage_remove_missing() {
        let storage = MockStorage::new().with_file("images/a.jpg", b"x".to_vec());

        assert!(storage.remove_file(Path::new("images/a.jpg")).await.is_ok());
        let err = storage
            .remove_file(Path::new("images/a.jpg"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
