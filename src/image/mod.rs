//! Image derivation
//!
//! Turns downloaded originals into bounded-width, re-encoded copies, and
//! provides the naming and extension rules shared with the fetcher.

pub mod compressor;
pub mod extension;
pub mod mock;
pub mod naming;

pub use compressor::ImageCompressor;
pub use extension::resolve_extension;
pub use mock::MockImageCompressor;
pub use naming::generate_base_name;

use crate::PipelineResult;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait CompressionService: Send + Sync {
    /// Derive a compressed copy of the image at `input` and write it to `output`.
    async fn compress(&self, input: &Path, output: &Path) -> PipelineResult<()>;
}
