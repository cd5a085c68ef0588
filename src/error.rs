use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file {} not found", path.display())]
    NotFound { path: PathBuf },

    #[error("Cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Error in config {}: {detail}", path.display())]
    Malformed { path: PathBuf, detail: String },

    #[error("Config environment error: {0}")]
    Env(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Invalid issuer URL '{issuer}': {reason}")]
    InvalidIssuer { issuer: String, reason: String },

    #[error("Failed to fetch provider metadata from {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("Provider metadata endpoint {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to parse provider metadata from {url}: {detail}")]
    Malformed { url: String, detail: String },

    #[error("Provider metadata from {url} failed validation: {detail}")]
    Validation { url: String, detail: String },
}

#[derive(Debug, thiserror::Error)]
pub enum AuthFlowError {
    #[error("Authorization flow was cancelled")]
    Cancelled,

    #[error("Provider returned '{error}'{}", format_description(.description.as_deref()))]
    Provider {
        error: String,
        description: Option<String>,
    },

    #[error("Redirect {found} does not match the registered redirect URI {expected}")]
    RedirectMismatch { expected: String, found: String },

    #[error("Redirect state does not match the pending request")]
    StateMismatch,

    #[error("No authorization code found in redirect")]
    MissingCode,

    #[error("Timed out waiting for the authorization redirect after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Could not open the user agent: {0}")]
    Browser(String),

    #[error("Invalid authorization request: {0}")]
    InvalidRequest(String),

    #[error("Redirect listener error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_description(description: Option<&str>) -> String {
    match description {
        Some(d) => format!(": {d}"),
        None => String::new(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Token endpoint rejected the request with '{error}'{}", format_description(.description.as_deref()))]
    Rejected {
        error: String,
        description: Option<String>,
    },

    #[error("Failed to parse token response: {0}")]
    Decode(String),

    #[error("Provider metadata does not allow this token request: {0}")]
    Configuration(String),

    #[error("Token response carries no ID token")]
    MissingIdToken,

    #[error("ID token failed verification: {0}")]
    InvalidIdToken(String),

    #[error("Access token expired and no refresh token is available")]
    NotRefreshable,
}

impl TokenError {
    /// Whether the grant itself is no longer usable and the user must log in again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, TokenError::Rejected { .. } | TokenError::NotRefreshable)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Failed to serialize session: {0}")]
    Serialize(String),

    #[error("Failed to deserialize session: {0}")]
    Deserialize(String),

    #[error("Unsupported persisted session version {0}")]
    UnsupportedVersion(u32),

    #[error("Session store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Userinfo request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Userinfo request unauthorized{}", format_description(.error.as_deref()))]
    Unauthorized { error: Option<String>, body: String },

    #[error("Userinfo returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to decode userinfo response: {0}")]
    Decode(String),

    #[error("Userinfo response has no string field '{0}'")]
    MissingField(String),

    #[error("Could not obtain a fresh access token: {0}")]
    TokenRefresh(#[from] TokenError),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("No active session")]
    NotLoggedIn,

    #[error("Operation superseded by a newer request")]
    Superseded,

    #[error("Session controller has shut down")]
    ControllerClosed,

    #[error("Provider does not declare a userinfo endpoint")]
    NoUserinfoEndpoint,

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(reqwest::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    AuthFlow(#[from] AuthFlowError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl SessionError {
    /// Error code string for structured output.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotConfigured(_) => "not_configured",
            SessionError::NotLoggedIn => "not_logged_in",
            SessionError::Superseded => "superseded",
            SessionError::ControllerClosed => "closed",
            SessionError::NoUserinfoEndpoint => "no_userinfo_endpoint",
            SessionError::HttpClient(_) => "http_client_error",
            SessionError::TaskFailed(_) => "internal_error",
            SessionError::Config(_) => "config_error",
            SessionError::Discovery(_) => "discovery_error",
            SessionError::AuthFlow(AuthFlowError::Cancelled) => "cancelled",
            SessionError::AuthFlow(_) => "auth_flow_error",
            SessionError::Token(_) => "token_error",
            SessionError::Fetch(FetchError::Unauthorized { .. }) => "unauthorized",
            SessionError::Fetch(_) => "fetch_error",
            SessionError::Persistence(_) => "persistence_error",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "message": self.to_string(),
                "code": self.code(),
            }
        })
    }
}
