//! Product route handlers.

use super::error::ApiError;
use super::AppState;
use crate::models::{NewProduct, Product, ProductFilter};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;
use tracing::{error, info};

/// Raw query parameters for listing products. Empty values are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub user_id: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub product_name: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_param<T: FromStr>(name: &str, value: &Option<String>) -> Result<Option<T>, ApiError> {
    match non_empty(value) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("Invalid {} parameter", name))),
        None => Ok(None),
    }
}

impl TryFrom<ProductQuery> for ProductFilter {
    type Error = ApiError;

    fn try_from(query: ProductQuery) -> Result<Self, Self::Error> {
        Ok(ProductFilter {
            user_id: parse_param("user_id", &query.user_id)?,
            min_price: parse_param("min_price", &query.min_price)?,
            max_price: parse_param("max_price", &query.max_price)?,
            product_name: non_empty(&query.product_name).map(str::to_string),
        })
    }
}

pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let Json(new_product) = payload.map_err(|e| {
        error!(error = %e, "Invalid request payload");
        ApiError::bad_request("Invalid request payload")
    })?;

    info!(
        user_id = new_product.user_id,
        product_name = %new_product.product_name,
        images = new_product.product_images.len(),
        "Creating product"
    );

    let mut images = state
        .pipeline
        .process_images(&new_product.product_images)
        .await
        .map_err(|e| {
            error!(error = %e, kind = e.kind(), "Image processing error");
            ApiError::internal("Failed to process images")
        })?;
    images.normalize_paths();

    let mut product = match state.db.insert_product(new_product, images.clone()).await {
        Ok(product) => product,
        Err(e) => {
            error!(error = %e, "Database error while creating product");
            state.pipeline.discard(&images).await;
            return Err(ApiError::internal("Failed to create product"));
        }
    };
    product.normalize_paths();

    info!(id = product.id, user_id = product.user_id, "Product created successfully");

    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let not_found = || ApiError::not_found("Product not found");

    let id: i64 = id.parse().map_err(|_| not_found())?;
    let product = state.db.get_product(id).await.map_err(|e| {
        error!(product_id = id, error = %e, "Failed to load product");
        ApiError::internal("Failed to retrieve product")
    })?;

    match product {
        Some(mut product) => {
            product.normalize_paths();
            info!(id, "Product retrieved successfully");
            Ok(Json(product))
        }
        None => {
            info!(product_id = id, "Product not found");
            Err(not_found())
        }
    }
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let filter = ProductFilter::try_from(query)?;

    let mut products = state.db.find_products(&filter).await.map_err(|e| {
        error!(error = %e, "Failed to retrieve products");
        ApiError::internal("Failed to retrieve products")
    })?;
    products.iter_mut().for_each(Product::normalize_paths);

    info!(count = products.len(), "Products retrieved successfully");

    Ok(Json(products))
}
