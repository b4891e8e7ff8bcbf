//! Account management routes

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use playsync_core::credentials::{hash_password, CredentialEntry, CredentialStore, StoreError};
use playsync_core::protocol::{AccountRequest, AccountResponse};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::routes::AppState;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("User already exists")]
    Conflict,

    #[error("User not found")]
    NotFound,

    #[error("{0}")]
    Internal(&'static str),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) | ServerError::Forbidden(_) => StatusCode::BAD_REQUEST,
            ServerError::Conflict => StatusCode::CONFLICT,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn from_store(e: StoreError, context: &'static str) -> Self {
        match e {
            StoreError::Exists(_) => ServerError::Conflict,
            StoreError::NotFound(_) => ServerError::NotFound,
            other => {
                error!("{}: {}", context, other);
                ServerError::Internal(context)
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status(), Json(AccountResponse::failed(self.to_string()))).into_response()
    }
}

/// Keys guarding the account routes. An unset key never matches.
#[derive(Debug, Clone, Default)]
pub struct AccessKeys {
    pub server_key: Option<String>,
    pub admin_key: Option<String>,
}

impl AccessKeys {
    fn matches(expected: &Option<String>, given: &str) -> bool {
        matches!(expected, Some(key) if !key.is_empty() && key == given)
    }

    pub fn is_admin(&self, request: &AccountRequest) -> bool {
        Self::matches(&self.admin_key, &request.admin_key)
    }

    pub fn is_server_or_admin(&self, request: &AccountRequest) -> bool {
        Self::matches(&self.server_key, &request.server_key) || self.is_admin(request)
    }
}

pub async fn create_user(
    store: &dyn CredentialStore,
    keys: &AccessKeys,
    request: AccountRequest,
) -> Result<AccountResponse, ServerError> {
    if request.new_name.is_empty() || request.new_password.is_empty() {
        return Err(ServerError::BadRequest("Must include user and password"));
    }
    if request.new_name.contains(',') {
        return Err(ServerError::BadRequest("User name cannot contain commas"));
    }
    if !keys.is_server_or_admin(&request) {
        return Err(ServerError::Forbidden("Must include valid server or admin key"));
    }

    let entry = CredentialEntry::new(request.new_name.as_str(), &request.new_password)
        .map_err(|e| ServerError::from_store(e, "Error creating user"))?;
    store
        .put(entry, false)
        .await
        .map_err(|e| ServerError::from_store(e, "Error creating user"))?;

    info!(username = %request.new_name, "Created user");
    Ok(AccountResponse::ok())
}

pub async fn delete_user(
    store: &dyn CredentialStore,
    keys: &AccessKeys,
    request: AccountRequest,
) -> Result<AccountResponse, ServerError> {
    if request.current_name.is_empty() {
        return Err(ServerError::BadRequest("Must include username"));
    }
    if !keys.is_admin(&request) {
        return Err(ServerError::Forbidden("Must include valid admin key"));
    }

    store
        .delete(&request.current_name)
        .await
        .map_err(|e| ServerError::from_store(e, "Error deleting user"))?;

    info!(username = %request.current_name, "Deleted user");
    Ok(AccountResponse::ok())
}

pub async fn update_user(
    store: &dyn CredentialStore,
    keys: &AccessKeys,
    request: AccountRequest,
) -> Result<AccountResponse, ServerError> {
    if request.current_name.is_empty() {
        return Err(ServerError::BadRequest("Must include username"));
    }
    if request.new_name.is_empty() && request.new_password.is_empty() {
        return Err(ServerError::BadRequest("Must include a new name or password"));
    }
    if request.new_name.contains(',') {
        return Err(ServerError::BadRequest("User name cannot contain commas"));
    }
    if !keys.is_admin(&request) {
        return Err(ServerError::Forbidden("Must include valid admin key"));
    }

    let mut name = request.current_name.clone();
    if !request.new_name.is_empty() && request.new_name != request.current_name {
        store
            .rename(&request.current_name, &request.new_name)
            .await
            .map_err(|e| ServerError::from_store(e, "Error updating user"))?;
        name = request.new_name.clone();
    }

    if !request.new_password.is_empty() {
        let mut entry = store
            .get(&name)
            .await
            .map_err(|e| ServerError::from_store(e, "Error updating user"))?
            .ok_or(ServerError::NotFound)?;
        entry.password_hash = hash_password(&request.new_password)
            .map_err(|e| ServerError::from_store(e, "Error updating user"))?;
        store
            .put(entry, true)
            .await
            .map_err(|e| ServerError::from_store(e, "Error updating user"))?;
    }

    debug!(old = %request.current_name, username = %name, "Updated user");
    Ok(AccountResponse::ok())
}

pub async fn create_user_route(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AccountRequest>,
) -> Result<Json<AccountResponse>, ServerError> {
    create_user(state.hub.store(), &state.keys, request).await.map(Json)
}

pub async fn delete_user_route(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AccountRequest>,
) -> Result<Json<AccountResponse>, ServerError> {
    delete_user(state.hub.store(), &state.keys, request).await.map(Json)
}

pub async fn update_user_route(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AccountRequest>,
) -> Result<Json<AccountResponse>, ServerError> {
    update_user(state.hub.store(), &state.keys, request).await.map(Json)
}
