//! Local image storage
//!
//! Downloaded originals and their compressed derivatives live under two
//! separate roots. Services receive a `Storage` handle instead of touching
//! the filesystem directly.

pub mod local;
pub mod mock;

pub use local::LocalStorage;
pub use mock::MockStorage;

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageRoot {
    /// Images exactly as downloaded.
    Originals,
    /// Resized, re-encoded copies.
    Derived,
}

/// Incremental writer for one file, used to stream bodies to disk.
#[async_trait]
pub trait FileWriter: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Flush everything written so far. The writer must not be used after.
    async fn finish(&mut self) -> io::Result<()>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Create the directory backing `root` if it is missing and return it.
    async fn ensure_root(&self, root: StorageRoot) -> io::Result<PathBuf>;

    /// Location a file called `name` occupies under `root`.
    fn path_for(&self, root: StorageRoot, name: &str) -> PathBuf;

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Create (or truncate) `path` for chunked writing. The caller removes the
    /// file if streaming fails part way.
    async fn create_file(&self, path: &Path) -> io::Result<Box<dyn FileWriter>>;

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
    async fn remove_file(&self, path: &Path) -> io::Result<()>;
}
