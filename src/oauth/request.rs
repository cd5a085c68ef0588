//! Authorization and end-session requests, and validation of the redirects
//! they come back on.

use openidconnect::core::{CoreAuthenticationFlow, CoreIdToken};
use openidconnect::{
    CsrfToken, EndSessionUrl, LogoutRequest, Nonce, PkceCodeChallenge, PkceCodeVerifier,
    PostLogoutRedirectUrl, Scope,
};
use url::Url;

use crate::error::AuthFlowError;

use super::client::OidcClient;

/// Scopes requested on every login. The client adds `openid` on its own.
pub const DEFAULT_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// An authorization code request with its PKCE secret, `state` and `nonce`.
pub struct AuthorizationRequest {
    pub url: Url,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
    state: CsrfToken,
    nonce: Nonce,
    pkce_verifier: PkceCodeVerifier,
}

impl AuthorizationRequest {
    pub fn new(client: &OidcClient, redirect_uri: Url) -> Self {
        let (challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, state, nonce) = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .add_scopes(
                DEFAULT_SCOPES[1..]
                    .iter()
                    .map(|scope| Scope::new(scope.to_string())),
            )
            .set_pkce_challenge(challenge)
            .url();

        Self {
            url,
            redirect_uri,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            state,
            nonce,
            pkce_verifier,
        }
    }

    pub fn state(&self) -> &str {
        self.state.secret()
    }

    /// Extract the authorization code from the captured redirect.
    pub fn authorization_code(&self, redirect: &Url) -> Result<String, AuthFlowError> {
        let params = RedirectParams::parse(&self.redirect_uri, redirect)?;
        params.check_state(self.state())?;
        if let Some(error) = params.error {
            return Err(AuthFlowError::Provider {
                error,
                description: params.error_description,
            });
        }
        params
            .code
            .filter(|c| !c.is_empty())
            .ok_or(AuthFlowError::MissingCode)
    }

    /// The secrets the code exchange needs.
    pub fn into_exchange_secrets(self) -> (PkceCodeVerifier, Nonce) {
        (self.pkce_verifier, self.nonce)
    }
}

/// An RP-initiated logout request.
pub struct EndSessionRequest {
    pub url: Url,
    pub post_logout_redirect_uri: Url,
    state: CsrfToken,
}

impl EndSessionRequest {
    pub fn new(
        end_session_endpoint: EndSessionUrl,
        id_token_hint: &CoreIdToken,
        post_logout_redirect_uri: Url,
    ) -> Self {
        let state = CsrfToken::new_random();
        let url = LogoutRequest::from(end_session_endpoint)
            .set_id_token_hint(id_token_hint)
            .set_post_logout_redirect_uri(PostLogoutRedirectUrl::from_url(
                post_logout_redirect_uri.clone(),
            ))
            .set_state(CsrfToken::new(state.secret().clone()))
            .http_get_url();
        Self {
            url,
            post_logout_redirect_uri,
            state,
        }
    }

    pub fn verify_redirect(&self, redirect: &Url) -> Result<(), AuthFlowError> {
        let params = RedirectParams::parse(&self.post_logout_redirect_uri, redirect)?;
        if let Some(error) = params.error {
            return Err(AuthFlowError::Provider {
                error,
                description: params.error_description,
            });
        }
        // Some providers drop `state` on logout; only a wrong one is rejected.
        if params.state.is_some() {
            params.check_state(self.state.secret())?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl RedirectParams {
    fn parse(expected: &Url, redirect: &Url) -> Result<Self, AuthFlowError> {
        if !matches_redirect(expected, redirect) {
            return Err(AuthFlowError::RedirectMismatch {
                expected: expected.to_string(),
                found: without_query(redirect),
            });
        }

        let mut params = RedirectParams::default();
        for (key, value) in redirect.query_pairs() {
            let value = value.into_owned();
            match &*key {
                "code" => params.code = Some(value),
                "state" => params.state = Some(value),
                "error" => params.error = Some(value),
                "error_description" => params.error_description = Some(value),
                _ => {}
            }
        }
        Ok(params)
    }

    fn check_state(&self, expected: &str) -> Result<(), AuthFlowError> {
        match self.state.as_deref() {
            Some(state) if state == expected => Ok(()),
            _ => Err(AuthFlowError::StateMismatch),
        }
    }
}

/// Scheme, authority and path must match; the query carries the response.
pub fn matches_redirect(expected: &Url, redirect: &Url) -> bool {
    expected.scheme() == redirect.scheme()
        && expected.host_str() == redirect.host_str()
        && expected.port_or_known_default() == redirect.port_or_known_default()
        && expected.path() == redirect.path()
}

fn without_query(url: &Url) -> String {
    let mut stripped = url.clone();
    stripped.set_query(None);
    stripped.set_fragment(None);
    stripped.to_string()
}
