pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod oauth;
pub mod profile;
pub mod session;
pub mod view;

pub use config::{load_client_config, load_or_default, ClientConfig, Settings};
pub use controller::{ControllerBuilder, SessionController};
pub use error::{
    AuthFlowError, ConfigError, DiscoveryError, FetchError, PersistenceError, SessionError,
    TokenError,
};
pub use oauth::{ExternalUserAgent, LoopbackUserAgent, ProviderMetadata, SchemeUserAgent, TokenSet};
pub use profile::{fetch_userinfo, ProfileClaims, ProfileDisplay};
pub use session::{AuthSession, FileStore, MemoryStore, SessionStore};
pub use view::{Phase, ViewState};
