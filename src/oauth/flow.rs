use std::time::Duration;

use chrono::Utc;

use crate::error::{AuthFlowError, SessionError};
use crate::oauth::agent::ExternalUserAgent;
use crate::oauth::client::oidc_client;
use crate::oauth::discovery::ProviderMetadata;
use crate::oauth::request::{AuthorizationRequest, EndSessionRequest};
use crate::oauth::token::{decode_id_token, exchange_code};
use crate::session::{AuthSession, AuthorizationRecord};

/// Run the full authorization code flow and build the resulting session.
pub async fn authorize(
    http: &reqwest::Client,
    agent: &dyn ExternalUserAgent,
    metadata: &ProviderMetadata,
    client_id: &str,
    timeout: Duration,
) -> Result<AuthSession, SessionError> {
    // 1. Build the request with a fresh PKCE pair, state and nonce
    let redirect_uri = agent.redirect_uri();
    let client = oidc_client(metadata, client_id, &redirect_uri);
    let request = AuthorizationRequest::new(&client, redirect_uri);
    tracing::debug!(endpoint = %metadata.authorization_endpoint().url(), "Starting authorization request");

    // 2. Hand it to the user agent and wait for the redirect
    let redirect = tokio::time::timeout(timeout, agent.present(request.url.clone()))
        .await
        .map_err(|_| AuthFlowError::Timeout(timeout))??;

    // 3. Validate the redirect and pull out the code
    let code = request.authorization_code(&redirect)?;

    let record = AuthorizationRecord {
        provider: metadata.clone(),
        client_id: client_id.to_string(),
        redirect_uri: request.redirect_uri.clone(),
        scopes: request.scopes.clone(),
        authorized_at: Utc::now(),
    };

    // 4. Exchange the code and verify the ID token
    let (pkce_verifier, nonce) = request.into_exchange_secrets();
    let tokens = exchange_code(http, &client, code, pkce_verifier, &nonce).await?;

    Ok(AuthSession::new(record, tokens))
}

/// Present an end-session request for `session`.
///
/// Returns `Ok(false)` when there is nothing to present: no usable ID token or
/// no end-session endpoint. The caller clears the local session either way.
pub async fn end_session(
    agent: &dyn ExternalUserAgent,
    metadata: &ProviderMetadata,
    session: &AuthSession,
    timeout: Duration,
) -> Result<bool, AuthFlowError> {
    let Some(raw_id_token) = session.id_token() else {
        tracing::debug!("Session has no ID token; skipping end-session request");
        return Ok(false);
    };
    let Some(endpoint) = metadata.additional_metadata().end_session_endpoint.clone() else {
        tracing::debug!("Provider has no end-session endpoint; clearing locally");
        return Ok(false);
    };
    let id_token = match decode_id_token(raw_id_token) {
        Ok(id_token) => id_token,
        Err(e) => {
            tracing::warn!("Skipping end-session request: {e}");
            return Ok(false);
        }
    };

    let request = EndSessionRequest::new(endpoint, &id_token, agent.redirect_uri());
    let redirect = tokio::time::timeout(timeout, agent.present(request.url.clone()))
        .await
        .map_err(|_| AuthFlowError::Timeout(timeout))??;
    request.verify_redirect(&redirect)?;
    Ok(true)
}
