//! User route handlers.

use super::error::ApiError;
use super::AppState;
use crate::models::{NewUser, User};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{error, info};

pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(new_user) = payload.map_err(|e| {
        error!(error = %e, "Invalid request payload");
        ApiError::bad_request("Invalid request payload")
    })?;

    new_user.validate().map_err(|e| {
        info!(error = %e, "Rejected user");
        ApiError::bad_request("User name must not be empty")
    })?;

    let user = state.db.create_user(new_user).await.map_err(|e| {
        error!(error = %e, "Database error while creating user");
        ApiError::internal("Failed to create user")
    })?;

    info!(id = user.id, "User created successfully");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let not_found = || ApiError::not_found("User not found");

    let id: i64 = id.parse().map_err(|_| not_found())?;
    let user = state.db.get_user(id).await.map_err(|e| {
        error!(user_id = id, error = %e, "Failed to load user");
        ApiError::internal("Failed to retrieve user")
    })?;

    user.map(Json).ok_or_else(not_found)
}
