use super::{FileWriter, Storage, StorageRoot};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Filesystem storage with one directory per root.
pub struct LocalStorage {
    originals_dir: PathBuf,
    derived_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(originals_dir: impl Into<PathBuf>, derived_dir: impl Into<PathBuf>) -> Self {
        Self {
            originals_dir: originals_dir.into(),
            derived_dir: derived_dir.into(),
        }
    }

    fn root_dir(&self, root: StorageRoot) -> &Path {
        match root {
            StorageRoot::Originals => &self.originals_dir,
            StorageRoot::Derived => &self.derived_dir,
        }
    }

    async fn write_all(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

struct LocalFileWriter {
    file: BufWriter<File>,
}

#[async_trait]
impl FileWriter for LocalFileWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await
    }

    async fn finish(&mut self) -> io::Result<()> {
        self.file.flush().await
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn ensure_root(&self, root: StorageRoot) -> io::Result<PathBuf> {
        let dir = self.root_dir(root);
        tokio::fs::create_dir_all(dir).await?;
        Ok(dir.to_path_buf())
    }

    fn path_for(&self, root: StorageRoot, name: &str) -> PathBuf {
        self.root_dir(root).join(name)
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Err(e) = Self::write_all(path, bytes).await {
            // Never leave a truncated file behind
            if let Err(cleanup) = tokio::fs::remove_file(path).await {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(
                        "Failed to remove partial file {}: {}",
                        path.display(),
                        cleanup
                    );
                }
            }
            return Err(e);
        }
        Ok(())
    }

    async fn create_file(&self, path: &Path) -> io::Result<Box<dyn FileWriter>> {
        let file = File::create(path).await?;
        Ok(Box::new(LocalFileWriter {
            file: BufWriter::new(file),
        }))
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage_in(dir: &TempDir) -> LocalStorage {
        LocalStorage::new(dir.path().join("images"), dir.path().join("compressed_images"))
    }

    #[tokio::test]
    async fn test_ensure_root_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let storage = storage_in(&dir);

        let first = storage.ensure_root(StorageRoot::Originals).await.unwrap();
        let second = storage.ensure_root(StorageRoot::Originals).await.unwrap();

        assert_eq!(first, second);
        assert!(first.is_dir());
        assert!(!dir.path().join("compressed_images").exists());
    }

    #[tokio::test]
    async fn test_ensure_root_fails_when_path_is_a_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("images"), b"not a directory").unwrap();
        let storage = storage_in(&dir);

        assert!(storage.ensure_root(StorageRoot::Originals).await.is_err());
    }

    #[tokio::test]
    async fn test_write_read_remove() {
        let dir = TempDir::new().unwrap();
        let storage = storage_in(&dir);
        storage.ensure_root(StorageRoot::Derived).await.unwrap();

        let path = storage.path_for(StorageRoot::Derived, "abc.png");
        assert!(path.starts_with(dir.path().join("compressed_images")));

        storage.write_file(&path, b"bytes").await.unwrap();
        assert_eq!(storage.read_file(&path).await.unwrap(), b"bytes");

        storage.remove_file(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_streamed_write() {
        let dir = TempDir::new().unwrap();
        let storage = storage_in(&dir);
        storage.ensure_root(StorageRoot::Originals).await.unwrap();
        let path = storage.path_for(StorageRoot::Originals, "streamed.png");

        let mut writer = storage.create_file(&path).await.unwrap();
        writer.write_chunk(b"first ").await.unwrap();
        writer.write_chunk(b"second").await.unwrap();
        writer.finish().await.unwrap();
        drop(writer);

        assert_eq!(storage.read_file(&path).await.unwrap(), b"first second");
    }

    #[tokio::test]
    async fn test_write_into_missing_root_fails_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let storage = storage_in(&dir);

        let path = storage.path_for(StorageRoot::Originals, "abc.jpg");
        assert!(storage.write_file(&path, b"bytes").await.is_err());
        assert!(!path.exists());
    }
}
