//! Application settings loaded from environment variables.

use crate::error::{Error, Result};

/// Environment variable naming the Azure AD tenant.
pub const TENANT_ID_VAR: &str = "AZURE_TENANT_ID";

/// Environment variable naming the application (client) registration.
pub const CLIENT_ID_VAR: &str = "AZURE_CLIENT_ID";

/// Azure AD / Microsoft Graph configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub tenant_id: String,
    pub client_id: String,
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// Both identifiers are required; a missing or empty variable is a
    /// configuration error, surfaced before any request is made.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            tenant_id: require_var(TENANT_ID_VAR)?,
            client_id: require_var(CLIENT_ID_VAR)?,
        })
    }
}

fn require_var(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::MissingEnvVar(name.to_string()))
}
