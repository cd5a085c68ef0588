//! OpenID Connect plumbing. Discovery, PKCE, the code exchange, ID token
//! verification and refresh are delegated to `openidconnect`; this module
//! adapts it to the application's HTTP client and user agents.

pub mod agent;
pub mod callback;
pub mod client;
pub mod discovery;
pub mod flow;
pub mod http;
pub mod request;
pub mod token;

pub use agent::{ExternalUserAgent, LoopbackUserAgent, SchemeUserAgent, REDIRECT_PATH};
pub use client::{oidc_client, OidcClient};
pub use discovery::{discover, ProviderMetadata};
pub use flow::{authorize, end_session};
pub use http::ProviderHttp;
pub use request::{AuthorizationRequest, EndSessionRequest};
pub use token::{exchange_code, refresh, TokenSet};
