//! Product catalog service - stores products whose images are downloaded and
//! compressed on submission
//!
//! Each submitted image URL is fetched into an originals directory, and a
//! width-bounded derivative is written under the same name into a compressed
//! directory. Products and users are kept in SQLite and served over HTTP.

pub mod app;
pub mod db;
pub mod error;
pub mod fetch;
pub mod image;
pub mod models;
pub mod paths;
pub mod pipeline;
pub mod server;
pub mod storage;

pub use error::{Error, PipelineError, PipelineResult, Result};
