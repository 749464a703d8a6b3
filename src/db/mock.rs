use super::Database;
use crate::models::{NewProduct, NewUser, Product, ProductFilter, ProductImageSet, User};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    users: Vec<User>,
    products: Vec<Product>,
}

/// In-memory catalog store with injectable failures.
#[derive(Clone, Default)]
pub struct MockDatabase {
    state: Arc<Mutex<MockState>>,
    should_fail: bool,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self, should_fail: bool) -> Self {
        self.should_fail = should_fail;
        self
    }

    pub fn get_product_count(&self) -> usize {
        self.state.lock().unwrap().products.len()
    }

    fn check(&self) -> Result<()> {
        if self.should_fail {
            return Err(Error::Database("mock database failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Database for MockDatabase {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let user = User {
            id: state.users.len() as i64 + 1,
            name: user.name,
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn insert_product(
        &self,
        product: NewProduct,
        images: ProductImageSet,
    ) -> Result<Product> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let product = Product {
            id: state.products.len() as i64 + 1,
            user_id: product.user_id,
            product_name: product.product_name,
            product_description: product.product_description,
            product_images: images.originals,
            compressed_product_images: images.derived,
            product_price: product.product_price,
        };
        state.products.push(product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state.products.iter().find(|p| p.id == id).cloned())
    }

    async fn find_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .products
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }
}
