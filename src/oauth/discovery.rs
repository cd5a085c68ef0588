use openidconnect::{DiscoveryError as OidcDiscoveryError, IssuerUrl, ProviderMetadataWithLogout};
use url::Url;

use crate::error::DiscoveryError;

use super::http::ProviderHttp;

/// Discovered provider metadata, including the RP-initiated logout endpoint.
pub type ProviderMetadata = ProviderMetadataWithLogout;

/// Validate the issuer before handing it to the discovery client.
fn issuer_url(issuer: &str) -> Result<IssuerUrl, DiscoveryError> {
    let trimmed = issuer.trim();
    let invalid = |reason: &str| DiscoveryError::InvalidIssuer {
        issuer: issuer.to_string(),
        reason: reason.to_string(),
    };

    if trimmed.is_empty() {
        return Err(invalid("issuer is empty"));
    }
    let parsed = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "https" | "http") {
        return Err(invalid("issuer must be an http(s) URL"));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid("issuer must not carry a query or fragment"));
    }

    IssuerUrl::new(trimmed.to_string()).map_err(|e| invalid(&e.to_string()))
}

fn well_known_url(issuer: &IssuerUrl) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.url().as_str().trim_end_matches('/')
    )
}

/// Fetch the discovery document and signing keys for `issuer`. Single attempt,
/// no retry. The document's `issuer` must match the requested one exactly.
pub async fn discover(
    http: &reqwest::Client,
    issuer: &str,
) -> Result<ProviderMetadata, DiscoveryError> {
    let issuer = issuer_url(issuer)?;
    let url = well_known_url(&issuer);
    tracing::debug!(%url, "Fetching provider metadata");

    let http = ProviderHttp::from(http);
    let metadata = ProviderMetadata::discover_async(issuer, &http)
        .await
        .map_err(|e| match e {
            OidcDiscoveryError::Request(source) => DiscoveryError::Network {
                url: url.clone(),
                source,
            },
            OidcDiscoveryError::Response(status, _, _) => DiscoveryError::Status {
                url: url.clone(),
                status: status.as_u16(),
            },
            OidcDiscoveryError::Validation(detail) => DiscoveryError::Validation {
                url: url.clone(),
                detail,
            },
            other => DiscoveryError::Malformed {
                url: url.clone(),
                detail: other.to_string(),
            },
        })?;

    if metadata.token_endpoint().is_none() {
        tracing::warn!("Provider metadata declares no token endpoint");
    }
    Ok(metadata)
}
