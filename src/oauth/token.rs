use chrono::{DateTime, Duration, Utc};
use openidconnect::core::{CoreIdToken, CoreTokenResponse};
use openidconnect::{
    AuthorizationCode, ErrorResponseType, Nonce, OAuth2TokenResponse, PkceCodeVerifier,
    RefreshToken, RequestTokenError, StandardErrorResponse, TokenResponse,
};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;

use super::client::OidcClient;
use super::http::ProviderHttp;

/// Tokens are treated as expired this long before their actual expiry.
pub const EXPIRY_LEEWAY_SECS: i64 = 60;

/// The last token response held by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenSet {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => now + Duration::seconds(EXPIRY_LEEWAY_SECS) >= expires,
            None => false,
        }
    }

    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Combine a refresh response with the tokens it replaces. Providers may omit
    /// the refresh or ID token on refresh, in which case the previous ones stay valid.
    pub fn merge_refreshed(&self, refreshed: TokenSet) -> TokenSet {
        TokenSet {
            refresh_token: refreshed.refresh_token.or_else(|| self.refresh_token.clone()),
            id_token: refreshed.id_token.or_else(|| self.id_token.clone()),
            scope: refreshed.scope.or_else(|| self.scope.clone()),
            ..refreshed
        }
    }

    fn from_response(response: &CoreTokenResponse, now: DateTime<Utc>) -> Result<Self, TokenError> {
        let expires_at = response
            .expires_in()
            .map(|lifetime| expiry_after(now, lifetime))
            .transpose()?;
        let id_token = response.id_token().map(encode_id_token).transpose()?;
        let scope = response.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|scope| scope.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        });

        Ok(TokenSet {
            access_token: response.access_token().secret().clone(),
            token_type: response.token_type().as_ref().to_string(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            id_token,
            expires_at,
            scope,
        })
    }
}

/// `now + lifetime`, or a decode error when the provider's `expires_in` does
/// not fit a timestamp.
fn expiry_after(now: DateTime<Utc>, lifetime: std::time::Duration) -> Result<DateTime<Utc>, TokenError> {
    Duration::from_std(lifetime)
        .ok()
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| {
            TokenError::Decode(format!(
                "expires_in of {}s is out of range",
                lifetime.as_secs()
            ))
        })
}

fn encode_id_token(id_token: &CoreIdToken) -> Result<String, TokenError> {
    match serde_json::to_value(id_token) {
        Ok(serde_json::Value::String(jwt)) => Ok(jwt),
        Ok(other) => Err(TokenError::Decode(format!("unexpected ID token form: {other}"))),
        Err(e) => Err(TokenError::Decode(e.to_string())),
    }
}

/// Parse a stored compact ID token.
pub fn decode_id_token(jwt: &str) -> Result<CoreIdToken, TokenError> {
    serde_json::from_value(serde_json::Value::String(jwt.to_string()))
        .map_err(|e| TokenError::Decode(format!("stored ID token is unreadable: {e}")))
}

fn request_error<T>(err: RequestTokenError<reqwest::Error, StandardErrorResponse<T>>) -> TokenError
where
    T: ErrorResponseType + AsRef<str> + std::fmt::Display + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => TokenError::Rejected {
            error: response.error().as_ref().to_string(),
            description: response.error_description().cloned(),
        },
        RequestTokenError::Request(source) => TokenError::Network(source),
        RequestTokenError::Parse(source, _) => TokenError::Decode(source.to_string()),
        RequestTokenError::Other(detail) => TokenError::Decode(detail),
    }
}

/// Exchange an authorization code (with its PKCE verifier) for tokens and
/// verify the ID token against the provider's keys and the request nonce.
pub async fn exchange_code(
    http: &reqwest::Client,
    client: &OidcClient,
    code: String,
    pkce_verifier: PkceCodeVerifier,
    nonce: &Nonce,
) -> Result<TokenSet, TokenError> {
    let http = ProviderHttp::from(http);
    let response = client
        .exchange_code(AuthorizationCode::new(code))
        .map_err(|e| TokenError::Configuration(e.to_string()))?
        .set_pkce_verifier(pkce_verifier)
        .request_async(&http)
        .await
        .map_err(request_error)?;

    let id_token = response.id_token().ok_or(TokenError::MissingIdToken)?;
    id_token
        .claims(&client.id_token_verifier(), nonce)
        .map_err(|e| TokenError::InvalidIdToken(e.to_string()))?;

    TokenSet::from_response(&response, Utc::now())
}

pub async fn refresh(
    http: &reqwest::Client,
    client: &OidcClient,
    refresh_token: &str,
) -> Result<TokenSet, TokenError> {
    let http = ProviderHttp::from(http);
    let refresh_token = RefreshToken::new(refresh_token.to_string());
    let response = client
        .exchange_refresh_token(&refresh_token)
        .map_err(|e| TokenError::Configuration(e.to_string()))?
        .request_async(&http)
        .await
        .map_err(request_error)?;
    TokenSet::from_response(&response, Utc::now())
}
