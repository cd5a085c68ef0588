pub mod store;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::TokenError;
use crate::oauth::client::oidc_client;
use crate::oauth::discovery::ProviderMetadata;
use crate::oauth::token::{refresh, TokenSet};

pub use store::{FileStore, MemoryStore, PersistedState, SessionStore, SCHEMA_VERSION, STATE_KEY};

/// Context of the authorization that produced a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub provider: ProviderMetadata,
    pub client_id: String,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
    pub authorized_at: DateTime<Utc>,
}

/// An authenticated session: the last authorization plus the last token response.
///
/// Equality is by [`fingerprint`](AuthSession::fingerprint), so two sessions
/// holding the same tokens compare equal regardless of where they came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub authorization: AuthorizationRecord,
    pub tokens: Option<TokenSet>,
    /// Set when the provider rejected the tokens; cleared only by a new login.
    #[serde(default)]
    pub authorization_error: Option<String>,
}

/// An access token guaranteed fresh at the time it was obtained.
#[derive(Debug, Clone)]
pub struct FreshToken {
    pub access_token: String,
    /// The merged token set when a refresh happened.
    pub refreshed: Option<TokenSet>,
}

impl AuthSession {
    pub fn new(authorization: AuthorizationRecord, tokens: TokenSet) -> Self {
        Self {
            authorization,
            tokens: Some(tokens),
            authorization_error: None,
        }
    }

    /// True while the session holds a usable or refreshable token and the
    /// provider has not rejected it.
    pub fn is_authorized(&self) -> bool {
        self.authorization_error.is_none()
            && self
                .tokens
                .as_ref()
                .is_some_and(|t| !t.is_expired() || t.is_refreshable())
    }

    pub fn id_token(&self) -> Option<&str> {
        self.tokens.as_ref()?.id_token.as_deref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }

    pub fn userinfo_endpoint(&self) -> Option<&Url> {
        self.authorization
            .provider
            .userinfo_endpoint()
            .map(|endpoint| endpoint.url())
    }

    /// SHA-256 over the access, refresh and ID tokens, base64url-encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        if let Some(tokens) = &self.tokens {
            for part in [
                Some(tokens.access_token.as_str()),
                tokens.refresh_token.as_deref(),
                tokens.id_token.as_deref(),
            ] {
                hasher.update(part.unwrap_or_default().as_bytes());
                hasher.update([0u8]);
            }
        }
        if let Some(error) = &self.authorization_error {
            hasher.update(error.as_bytes());
        }
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// Record that the provider rejected the session's tokens.
    pub fn mark_needs_reauthorization(&mut self, error: impl Into<String>) {
        self.authorization_error = Some(error.into());
    }

    pub fn apply_refreshed(&mut self, tokens: TokenSet) {
        self.tokens = Some(tokens);
    }

    /// Return an access token that is not expired, refreshing through the
    /// token endpoint when needed. The session itself is not modified; the
    /// caller applies [`FreshToken::refreshed`].
    pub async fn fresh_access_token(&self, http: &reqwest::Client) -> Result<FreshToken, TokenError> {
        let tokens = self.tokens.as_ref().ok_or(TokenError::NotRefreshable)?;
        if !tokens.is_expired() {
            return Ok(FreshToken {
                access_token: tokens.access_token.clone(),
                refreshed: None,
            });
        }

        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .ok_or(TokenError::NotRefreshable)?;
        tracing::debug!("Access token expired; refreshing");
        let client = oidc_client(
            &self.authorization.provider,
            &self.authorization.client_id,
            &self.authorization.redirect_uri,
        );
        let new_tokens = refresh(http, &client, refresh_token).await?;
        let merged = tokens.merge_refreshed(new_tokens);
        Ok(FreshToken {
            access_token: merged.access_token.clone(),
            refreshed: Some(merged),
        })
    }
}

impl PartialEq for AuthSession {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for AuthSession {}
