//! Data models and structures
//!
//! Defines the catalog records exchanged with the database and the HTTP API,
//! the image path sets produced by the pipeline, and process configuration.

use crate::paths::normalize_paths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
}

impl NewUser {
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::Validation(
                "user name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub user_id: i64,
    pub product_name: String,
    pub product_description: String,
    pub product_images: Vec<String>,
    pub compressed_product_images: Vec<String>,
    pub product_price: f64,
}

impl Product {
    /// Rewrite stored image paths to forward slashes.
    pub fn normalize_paths(&mut self) {
        self.product_images = normalize_paths(&self.product_images);
        self.compressed_product_images = normalize_paths(&self.compressed_product_images);
    }
}

/// Product submission; `product_images` holds the remote URLs to download.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub user_id: i64,
    pub product_name: String,
    #[serde(default)]
    pub product_description: String,
    #[serde(default)]
    pub product_images: Vec<String>,
    #[serde(default)]
    pub product_price: f64,
}

/// Optional constraints for product queries, combined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    pub user_id: Option<i64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Case-insensitive substring of the product name.
    pub product_name: Option<String>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if self.user_id.is_some_and(|id| product.user_id != id) {
            return false;
        }
        if self.min_price.is_some_and(|min| product.product_price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.product_price > max) {
            return false;
        }
        match &self.product_name {
            Some(name) => product
                .product_name
                .to_lowercase()
                .contains(&name.to_lowercase()),
            None => true,
        }
    }
}

/// Original and derived paths for one product, aligned with its input URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductImageSet {
    pub originals: Vec<String>,
    pub derived: Vec<String>,
}

impl ProductImageSet {
    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    pub fn normalize_paths(&mut self) {
        self.originals = normalize_paths(&self.originals);
        self.derived = normalize_paths(&self.derived);
    }
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_path: String,
    pub images_dir: PathBuf,
    pub compressed_images_dir: PathBuf,
    pub fetch_timeout: Duration,
    pub fetch_retries: usize,
    pub fetch_retry_delay: Duration,
    pub require_success_status: bool,
    pub max_image_bytes: u64,
    pub pipeline_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_path: "catalog.db".to_string(),
            images_dir: PathBuf::from("images"),
            compressed_images_dir: PathBuf::from("compressed_images"),
            fetch_timeout: Duration::from_secs(30),
            fetch_retries: 0,
            fetch_retry_delay: Duration::from_millis(500),
            require_success_status: true,
            max_image_bytes: crate::fetch::client::DEFAULT_MAX_BODY_BYTES,
            pipeline_concurrency: 1,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> crate::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| crate::Error::Config(format!("Invalid value for {}: '{}'", key, value)))
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let pipeline_concurrency = match lookup("PIPELINE_CONCURRENCY") {
            Some(v) => parse_var::<usize>("PIPELINE_CONCURRENCY", &v)?,
            None => defaults.pipeline_concurrency,
        };
        if pipeline_concurrency == 0 {
            return Err(crate::Error::Config(
                "PIPELINE_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_path: lookup("DATABASE_PATH").unwrap_or(defaults.database_path),
            images_dir: lookup("IMAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.images_dir),
            compressed_images_dir: lookup("COMPRESSED_IMAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.compressed_images_dir),
            fetch_timeout: match lookup("FETCH_TIMEOUT_SECS") {
                Some(v) => Duration::from_secs(parse_var("FETCH_TIMEOUT_SECS", &v)?),
                None => defaults.fetch_timeout,
            },
            fetch_retries: match lookup("FETCH_RETRIES") {
                Some(v) => parse_var("FETCH_RETRIES", &v)?,
                None => defaults.fetch_retries,
            },
            fetch_retry_delay: match lookup("FETCH_RETRY_DELAY_MS") {
                Some(v) => Duration::from_millis(parse_var("FETCH_RETRY_DELAY_MS", &v)?),
                None => defaults.fetch_retry_delay,
            },
            require_success_status: match lookup("REQUIRE_SUCCESS_STATUS") {
                Some(v) => parse_var("REQUIRE_SUCCESS_STATUS", &v)?,
                None => defaults.require_success_status,
            },
            max_image_bytes: match lookup("MAX_IMAGE_BYTES") {
                Some(v) => parse_var("MAX_IMAGE_BYTES", &v)?,
                None => defaults.max_image_bytes,
            },
            pipeline_concurrency,
        })
    }
}
