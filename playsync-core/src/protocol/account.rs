use serde::{Deserialize, Serialize};

/// Body of every account-management request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRequest {
    #[serde(default)]
    pub current_name: String,
    #[serde(default)]
    pub new_name: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub server_key: String,
    #[serde(default)]
    pub admin_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountResponse {
    pub success: bool,
    #[serde(default)]
    pub error: String,
}

impl AccountResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: String::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}
