//! Catalog persistence
//!
//! Users and products live in a relational store reached through the
//! `Database` handle. Image paths are stored exactly as the pipeline produced
//! them.

pub mod mock;
pub mod sqlite;

pub use mock::MockDatabase;
pub use sqlite::SqliteDatabase;

use crate::models::{NewProduct, NewUser, Product, ProductFilter, ProductImageSet, User};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Database: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn get_user(&self, id: i64) -> Result<Option<User>>;

    /// Persist a product with the image paths resolved for it.
    async fn insert_product(&self, product: NewProduct, images: ProductImageSet)
        -> Result<Product>;
    async fn get_product(&self, id: i64) -> Result<Option<Product>>;
    async fn find_products(&self, filter: &ProductFilter) -> Result<Vec<Product>>;
}
