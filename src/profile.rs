use std::collections::BTreeMap;

use serde_json::Value;
use url::Url;

use crate::error::FetchError;

pub const USERNAME_CLAIM: &str = "username";

/// Claims returned by the userinfo endpoint, ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileClaims(BTreeMap<String, Value>);

/// What the presentation shows for a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDisplay {
    pub username: String,
    pub summary: String,
}

impl ProfileClaims {
    pub fn from_json(body: &[u8]) -> Result<Self, FetchError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            other => Err(FetchError::Decode(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.0.get(claim)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn username(&self) -> Result<&str, FetchError> {
        self.0
            .get(USERNAME_CLAIM)
            .and_then(Value::as_str)
            .ok_or_else(|| FetchError::MissingField(USERNAME_CLAIM.to_string()))
    }

    /// `"key: value, "` per claim, `username` first and the rest by key.
    pub fn summary(&self) -> String {
        let username = self.0.get_key_value(USERNAME_CLAIM);
        let rest = self.0.iter().filter(|(k, _)| k.as_str() != USERNAME_CLAIM);

        username
            .into_iter()
            .chain(rest)
            .map(|(key, value)| format!("{key}: {}, ", render_value(value)))
            .collect()
    }

    pub fn display(&self) -> Result<ProfileDisplay, FetchError> {
        Ok(ProfileDisplay {
            username: self.username()?.to_string(),
            summary: self.summary(),
        })
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, serde::Deserialize)]
struct ResourceErrorBody {
    error: Option<String>,
}

/// GET the userinfo endpoint with a bearer token.
pub async fn fetch_userinfo(
    http: &reqwest::Client,
    endpoint: &Url,
    access_token: &str,
) -> Result<ProfileClaims, FetchError> {
    tracing::debug!(%endpoint, "Performing userinfo request");
    let resp = http
        .get(endpoint.clone())
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(FetchError::Network)?;

    let status = resp.status();
    let body = resp.bytes().await.map_err(FetchError::Network)?;

    if status == reqwest::StatusCode::UNAUTHORIZED {
        let error = serde_json::from_slice::<ResourceErrorBody>(&body)
            .ok()
            .and_then(|b| b.error);
        return Err(FetchError::Unauthorized {
            error,
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    if !status.is_success() {
        return Err(FetchError::Http {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    ProfileClaims::from_json(&body)
}
