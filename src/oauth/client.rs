use openidconnect::core::CoreClient;
use openidconnect::{ClientId, EndpointMaybeSet, EndpointNotSet, EndpointSet, RedirectUrl};
use url::Url;

use super::discovery::ProviderMetadata;

/// A public client built from discovered metadata: the authorization endpoint
/// is always known, token and userinfo endpoints only when declared.
pub type OidcClient = CoreClient<
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointMaybeSet,
    EndpointMaybeSet,
>;

pub fn oidc_client(metadata: &ProviderMetadata, client_id: &str, redirect_uri: &Url) -> OidcClient {
    CoreClient::from_provider_metadata(
        metadata.clone(),
        ClientId::new(client_id.to_string()),
        None,
    )
    .set_redirect_uri(RedirectUrl::from_url(redirect_uri.clone()))
}
