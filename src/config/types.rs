use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// OAuth client credentials read from the bundled `PlusAuth.json` resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub issuer: String,
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            issuer: issuer.into(),
        }
    }

    /// Both values are present. An empty config is what a failed load leaves behind.
    pub fn is_complete(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.issuer.trim().is_empty()
    }
}

/// Top-level shape of the configuration resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResource {
    pub credentials: ClientConfig,
}

pub const DEFAULT_REDIRECT_PORT: u16 = 8765;
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_STORAGE_SUITE: &str = "com.plusauth.starter";

/// Runtime options that are not part of the bundled credentials.
#[derive(Debug, Clone)]
pub struct Settings {
    pub redirect_port: u16,
    pub http_timeout: Duration,
    pub auth_timeout: Duration,
    pub state_dir: PathBuf,
    pub storage_suite: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redirect_port: DEFAULT_REDIRECT_PORT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            state_dir: default_state_dir(),
            storage_suite: DEFAULT_STORAGE_SUITE.to_string(),
        }
    }
}

pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".plusauth")
}
