use chrono::{Duration, Utc};
use openidconnect::core::{
    CoreIdToken, CoreIdTokenClaims, CoreJsonWebKeySet, CoreJwsSigningAlgorithm,
    CoreRsaPrivateSigningKey,
};
use openidconnect::{
    Audience, EmptyAdditionalClaims, IssuerUrl, JsonWebKeyId, Nonce, PrivateSigningKey,
    StandardClaims, SubjectIdentifier,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use super::CLIENT_ID;

const SIGNING_KEY_PEM: &str = include_str!("../fixtures/provider_key.pem");

fn signing_key() -> CoreRsaPrivateSigningKey {
    CoreRsaPrivateSigningKey::from_pem(SIGNING_KEY_PEM, Some(JsonWebKeyId::new("test-key".into())))
        .expect("fixture key is valid")
}

/// Discovery document for a provider rooted at `issuer`.
pub fn discovery_document(issuer: &str) -> Value {
    json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth2/authorize"),
        "token_endpoint": format!("{issuer}/oauth2/token"),
        "userinfo_endpoint": format!("{issuer}/oauth2/userinfo"),
        "end_session_endpoint": format!("{issuer}/oauth2/logout"),
        "jwks_uri": format!("{issuer}/oauth2/jwks"),
        "response_types_supported": ["code"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["RS256"],
        "scopes_supported": ["openid", "profile", "offline_access"],
        "code_challenge_methods_supported": ["S256"]
    })
}

/// Token response with the usual `rt-1` refresh token. The code exchange
/// adds a signed ID token on the fly.
#[allow(dead_code)]
pub fn token_response(access_token: &str, expires_in: i64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in,
        "refresh_token": "rt-1"
    })
}

/// RS256 ID token for `alice`, issued by `issuer` to the test client.
pub fn sign_id_token(issuer: &str, nonce: &str) -> String {
    let now = Utc::now();
    let claims = CoreIdTokenClaims::new(
        IssuerUrl::new(issuer.to_string()).unwrap(),
        vec![Audience::new(CLIENT_ID.to_string())],
        now + Duration::hours(1),
        now,
        StandardClaims::new(SubjectIdentifier::new("alice".into())),
        EmptyAdditionalClaims {},
    )
    .set_nonce(Some(Nonce::new(nonce.to_string())));
    let id_token = CoreIdToken::new(
        claims,
        &signing_key(),
        CoreJwsSigningAlgorithm::RsaSsaPkcs1V15Sha256,
        None,
        None,
    )
    .unwrap();
    serde_json::to_value(&id_token)
        .unwrap()
        .as_str()
        .unwrap()
        .to_string()
}

/// Answers the code exchange with `body` plus an ID token bound to the nonce
/// the scripted agent folded into the code (`<code>.<nonce>`).
struct CodeExchange {
    issuer: String,
    body: Value,
}

impl Respond for CodeExchange {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let code = url::form_urlencoded::parse(&request.body)
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        let nonce = code.rsplit_once('.').map(|(_, nonce)| nonce).unwrap_or_default();

        let mut body = self.body.clone();
        body["id_token"] = json!(sign_id_token(&self.issuer, nonce));
        ResponseTemplate::new(200).set_body_json(body)
    }
}

/// A mock OpenID provider served by wiremock.
pub struct MockProvider {
    pub server: MockServer,
}

#[allow(dead_code)]
impl MockProvider {
    /// Start a provider that serves the full discovery document.
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Start a provider whose discovery document is `edit`ed first.
    pub async fn start_with(edit: impl FnOnce(&mut Value)) -> Self {
        let server = MockServer::start().await;
        let mut document = discovery_document(&server.uri());
        edit(&mut document);
        Self::mount_discovery(&server, document).await;
        Self { server }
    }

    async fn mount_discovery(server: &MockServer, document: Value) {
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .mount(server)
            .await;
        let keys = CoreJsonWebKeySet::new(vec![signing_key().as_verification_key()]);
        Mock::given(method("GET"))
            .and(path("/oauth2/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(keys))
            .mount(server)
            .await;
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    pub async fn mount_code_exchange(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(CodeExchange {
                issuer: self.issuer(),
                body,
            })
            .mount(&self.server)
            .await;
    }

    pub async fn mount_refresh(&self, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Userinfo answering only requests carrying `access_token`.
    pub async fn mount_userinfo(&self, access_token: &str, status: u16, body: Value) {
        self.userinfo_mock(access_token, ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Userinfo answering the next request only. Mount before the fallback.
    pub async fn mount_userinfo_once(&self, access_token: &str, status: u16, body: Value) {
        self.userinfo_mock(access_token, ResponseTemplate::new(status).set_body_json(body))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Userinfo answering with a raw, possibly non-JSON body.
    pub async fn mount_userinfo_raw(&self, access_token: &str, status: u16, body: &str) {
        self.userinfo_mock(
            access_token,
            ResponseTemplate::new(status)
                .insert_header("content-type", "application/json")
                .set_body_string(body),
        )
        .mount(&self.server)
        .await;
    }

    fn userinfo_mock(&self, access_token: &str, response: ResponseTemplate) -> Mock {
        Mock::given(method("GET"))
            .and(path("/oauth2/userinfo"))
            .and(header("authorization", format!("Bearer {access_token}").as_str()))
            .respond_with(response)
    }

    /// Bodies of every token endpoint request received so far.
    pub async fn token_requests(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == "/oauth2/token")
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .collect()
    }

    pub async fn userinfo_request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == "/oauth2/userinfo")
            .count()
    }
}
