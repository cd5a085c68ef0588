pub mod provider_mock;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use plusauth_starter::{
    AuthFlowError, ClientConfig, ExternalUserAgent, SessionController, SessionStore, ViewState,
};

pub const CLIENT_ID: &str = "abc";

/// What the scripted browser does with the next request it is shown.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Script {
    /// Redirect back with this code and the request's own state. The request
    /// nonce rides along as `<code>.<nonce>` so the mock provider can bind
    /// its ID token to it.
    Approve(String),
    /// Redirect back with `error=<value>`.
    Deny(String),
    /// Redirect back with the request's state only (end-session).
    Return,
    /// The user closed the browser.
    Cancel,
    /// Never redirect.
    Stall,
}

/// User agent that answers requests from a script instead of a browser.
pub struct ScriptedAgent {
    redirect_uri: Url,
    scripts: Mutex<VecDeque<Script>>,
    presented: Mutex<Vec<Url>>,
}

#[allow(dead_code)]
impl ScriptedAgent {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            redirect_uri: Url::parse("com.plusauth.starter:/oauth2redirect/ios-provider").unwrap(),
            scripts: Mutex::new(scripts.into_iter().collect()),
            presented: Mutex::new(Vec::new()),
        })
    }

    pub fn idle() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn presented(&self) -> Vec<Url> {
        self.presented.lock().unwrap().clone()
    }

    pub async fn wait_presented(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.presented.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("user agent was never presented a request");
    }

    fn redirect_with(&self, pairs: &[(&str, &str)]) -> Url {
        let mut url = self.redirect_uri.clone();
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in pairs {
                query.append_pair(key, value);
            }
        }
        url
    }
}

fn query_param(url: &Url, name: &str) -> String {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl ExternalUserAgent for ScriptedAgent {
    fn redirect_uri(&self) -> Url {
        self.redirect_uri.clone()
    }

    async fn present(&self, request: Url) -> Result<Url, AuthFlowError> {
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script::Cancel);
        self.presented.lock().unwrap().push(request.clone());

        let state = query_param(&request, "state");
        match script {
            Script::Approve(code) => {
                let code = format!("{code}.{}", query_param(&request, "nonce"));
                Ok(self.redirect_with(&[("code", code.as_str()), ("state", state.as_str())]))
            }
            Script::Deny(error) => {
                Ok(self.redirect_with(&[("error", error.as_str()), ("state", state.as_str())]))
            }
            Script::Return => Ok(self.redirect_with(&[("state", state.as_str())])),
            Script::Cancel => Err(AuthFlowError::Cancelled),
            Script::Stall => std::future::pending().await,
        }
    }
}

#[allow(dead_code)]
pub fn controller(
    issuer: &str,
    agent: Arc<ScriptedAgent>,
    store: Option<Arc<dyn SessionStore>>,
) -> SessionController {
    let mut builder = SessionController::builder(ClientConfig::new(CLIENT_ID, issuer), agent)
        .auth_timeout(Duration::from_secs(5));
    if let Some(store) = store {
        builder = builder.store(store);
    }
    builder.spawn().unwrap()
}

/// Wait until the view satisfies `pred`, failing the test after five seconds.
#[allow(dead_code)]
pub async fn wait_for_view(
    controller: &SessionController,
    pred: impl FnMut(&ViewState) -> bool,
) -> ViewState {
    let mut rx = controller.view();
    let view = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("view never reached the expected state")
        .expect("controller closed");
    view.clone()
}
