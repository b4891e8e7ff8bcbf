//! Account management requests against the server's HTTP routes

use playsync_core::protocol::{AccountRequest, AccountResponse};
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Rejected(String),
}

pub struct AccountClient {
    http: Client,
    base_url: String,
}

impl AccountClient {
    pub fn new(address: &str, use_ssl: bool) -> Self {
        Self::with_base_url(format!("{}://{}", http_scheme(use_ssl), address))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn endpoint(&self, route: &str) -> String {
        format!("{}/api/{}", self.base_url.trim_end_matches('/'), route)
    }

    async fn send(&self, route: &str, request: &AccountRequest) -> Result<(), AccountError> {
        let url = self.endpoint(route);
        debug!(%url, "Sending account request");

        let response: AccountResponse = self.http.post(&url).json(request).send().await?.json().await?;
        if response.success {
            Ok(())
        } else {
            Err(AccountError::Rejected(response.error))
        }
    }

    pub async fn create_user(
        &self,
        name: &str,
        password: &str,
        server_key: &str,
        admin_key: &str,
    ) -> Result<(), AccountError> {
        let request = AccountRequest {
            new_name: name.to_string(),
            new_password: password.to_string(),
            server_key: server_key.to_string(),
            admin_key: admin_key.to_string(),
            ..Default::default()
        };
        self.send("create-user", &request).await
    }

    pub async fn delete_user(&self, name: &str, admin_key: &str) -> Result<(), AccountError> {
        let request = AccountRequest {
            current_name: name.to_string(),
            admin_key: admin_key.to_string(),
            ..Default::default()
        };
        self.send("delete-user", &request).await
    }

    pub async fn update_user(
        &self,
        name: &str,
        new_name: Option<&str>,
        new_password: Option<&str>,
        admin_key: &str,
    ) -> Result<(), AccountError> {
        let request = AccountRequest {
            current_name: name.to_string(),
            new_name: new_name.unwrap_or_default().to_string(),
            new_password: new_password.unwrap_or_default().to_string(),
            admin_key: admin_key.to_string(),
            ..Default::default()
        };
        self.send("update-user", &request).await
    }
}

pub fn http_scheme(use_ssl: bool) -> &'static str {
    if use_ssl {
        "https"
    } else {
        "http"
    }
}
