//! SQLite-backed catalog store behind an r2d2 connection pool.

use super::Database;
use crate::models::{NewProduct, NewUser, Product, ProductFilter, ProductImageSet, User};
use crate::{Error, Result};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::info;

pub type DbPool = Pool<SqliteConnectionManager>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS products (
    id                        INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id                   INTEGER NOT NULL,
    product_name              TEXT NOT NULL,
    product_description       TEXT NOT NULL DEFAULT '',
    product_images            TEXT NOT NULL DEFAULT '[]',
    compressed_product_images TEXT NOT NULL DEFAULT '[]',
    product_price             REAL NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_products_user ON products(user_id);
CREATE INDEX IF NOT EXISTS idx_products_price ON products(product_price);
"#;

const PRODUCT_COLUMNS: &str = "id, user_id, product_name, product_description, \
     product_images, compressed_product_images, product_price";

pub struct SqliteDatabase {
    pool: DbPool,
}

impl SqliteDatabase {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.execute_batch("PRAGMA journal_mode = WAL;"));
        let pool = Pool::builder().max_size(4).build(manager)?;
        let db = Self::from_pool(pool)?;
        info!("Opened catalog database at {}", path);
        Ok(db)
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same database.
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::from_pool(pool)
    }

    fn from_pool(pool: DbPool) -> Result<Self> {
        let conn = pool.get()?;
        conn.execute_batch(SCHEMA)?;
        drop(conn);
        Ok(Self { pool })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| Error::Database(format!("database task failed: {}", e)))?
    }
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        user_id: row.get(1)?,
        product_name: row.get(2)?,
        product_description: row.get(3)?,
        product_images: json_column(row, 4)?,
        compressed_product_images: json_column(row, 5)?,
        product_price: row.get(6)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

/// Build the WHERE clause and its positional parameters for a filter.
///
/// The name constraint is left to `ProductFilter::matches`: SQLite only folds
/// ASCII case and `LIKE` treats `%` and `_` as wildcards.
fn filter_clause(filter: &ProductFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(user_id) = filter.user_id {
        conditions.push("user_id = ?");
        values.push(Value::Integer(user_id));
    }
    if let Some(min) = filter.min_price {
        conditions.push("product_price >= ?");
        values.push(Value::Real(min));
    }
    if let Some(max) = filter.max_price {
        conditions.push("product_price <= ?");
        values.push(Value::Real(max));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.with_conn(move |conn| {
            conn.execute("INSERT INTO users (name) VALUES (?1)", [&user.name])?;
            Ok(User {
                id: conn.last_insert_rowid(),
                name: user.name,
            })
        })
        .await
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.with_conn(move |conn| {
            let user = conn
                .query_row("SELECT id, name FROM users WHERE id = ?1", [id], user_from_row)
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn insert_product(
        &self,
        product: NewProduct,
        images: ProductImageSet,
    ) -> Result<Product> {
        self.with_conn(move |conn| {
            let originals = serde_json::to_string(&images.originals)?;
            let derived = serde_json::to_string(&images.derived)?;

            conn.execute(
                "INSERT INTO products (user_id, product_name, product_description,
                     product_images, compressed_product_images, product_price)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    product.user_id,
                    product.product_name,
                    product.product_description,
                    originals,
                    derived,
                    product.product_price
                ],
            )?;

            Ok(Product {
                id: conn.last_insert_rowid(),
                user_id: product.user_id,
                product_name: product.product_name,
                product_description: product.product_description,
                product_images: images.originals,
                compressed_product_images: images.derived,
                product_price: product.product_price,
            })
        })
        .await
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        self.with_conn(move |conn| {
            let product = conn
                .query_row(
                    &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS),
                    [id],
                    product_from_row,
                )
                .optional()?;
            Ok(product)
        })
        .await
    }

    async fn find_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let (clause, values) = filter_clause(filter);
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM products{} ORDER BY id ASC",
                PRODUCT_COLUMNS, clause
            );
            let mut stmt = conn.prepare(&sql)?;
            let products = stmt
                .query_map(params_from_iter(values), product_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(products.into_iter().filter(|p| filter.matches(p)).collect())
        })
        .await
    }
}
