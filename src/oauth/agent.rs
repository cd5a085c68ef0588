use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

use crate::error::AuthFlowError;

use super::callback::capture_redirect;
use super::request::matches_redirect;

pub const REDIRECT_PATH: &str = "/oauth2redirect/ios-provider";

const BIND_ATTEMPTS: u32 = 20;
const BIND_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Bind the redirect listener, waiting briefly for a superseded flow's
/// listener to release the port.
async fn bind_redirect_listener(port: u16) -> std::io::Result<TcpListener> {
    let mut attempt = 1;
    loop {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && attempt < BIND_ATTEMPTS => {
                tracing::debug!(port, attempt, "Redirect port busy, retrying");
                attempt += 1;
                tokio::time::sleep(BIND_RETRY_DELAY).await;
            }
            result => return result,
        }
    }
}

/// A browser or web view that presents a provider page and hands back the
/// redirect it ends on.
#[async_trait]
pub trait ExternalUserAgent: Send + Sync {
    /// Redirect URI registered with the provider for this agent.
    fn redirect_uri(&self) -> Url;

    /// Present `request` and wait for the redirect to [`redirect_uri`](Self::redirect_uri).
    async fn present(&self, request: Url) -> Result<Url, AuthFlowError>;
}

/// Opens the system browser and captures the redirect on a loopback listener.
pub struct LoopbackUserAgent {
    port: u16,
    redirect_uri: Url,
    timeout: Duration,
}

impl LoopbackUserAgent {
    pub fn new(port: u16, timeout: Duration) -> Result<Self, AuthFlowError> {
        let redirect_uri = Url::parse(&format!("http://127.0.0.1:{port}{REDIRECT_PATH}"))
            .map_err(|e| AuthFlowError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            port,
            redirect_uri,
            timeout,
        })
    }
}

#[async_trait]
impl ExternalUserAgent for LoopbackUserAgent {
    fn redirect_uri(&self) -> Url {
        self.redirect_uri.clone()
    }

    async fn present(&self, request: Url) -> Result<Url, AuthFlowError> {
        // Bind before opening the browser so the redirect cannot race the listener.
        let listener = bind_redirect_listener(self.port).await?;

        if webbrowser::open(request.as_str()).is_err() {
            tracing::warn!("Could not open browser automatically. Please visit:\n{request}");
        }

        capture_redirect(listener, &self.redirect_uri, self.timeout).await
    }
}

type Opener = Box<dyn Fn(&Url) -> std::io::Result<()> + Send + Sync>;

struct PendingFlow {
    id: u64,
    sender: oneshot::Sender<Url>,
}

/// For hosts that register a custom URI scheme: the host routes incoming
/// redirect URLs back through [`resume`](SchemeUserAgent::resume).
///
/// Only one flow is pending at a time. Presenting a new request drops the
/// previous flow's handle, so its `present` resolves as cancelled.
pub struct SchemeUserAgent {
    redirect_uri: Url,
    opener: Opener,
    pending: Mutex<Option<PendingFlow>>,
    next_id: Mutex<u64>,
}

impl SchemeUserAgent {
    /// `app_id` becomes the scheme: `<app_id>:/oauth2redirect/ios-provider`.
    pub fn new(app_id: &str) -> Result<Self, AuthFlowError> {
        let redirect_uri = Url::parse(&format!("{app_id}:{REDIRECT_PATH}"))
            .map_err(|e| AuthFlowError::InvalidRequest(format!("bad app id '{app_id}': {e}")))?;
        Ok(Self {
            redirect_uri,
            opener: Box::new(|url| webbrowser::open(url.as_str())),
            pending: Mutex::new(None),
            next_id: Mutex::new(0),
        })
    }

    /// Replace how the request is shown to the user (web view, test double).
    pub fn with_opener<F>(mut self, opener: F) -> Self
    where
        F: Fn(&Url) -> std::io::Result<()> + Send + Sync + 'static,
    {
        self.opener = Box::new(opener);
        self
    }

    /// Hand an incoming redirect to the pending flow. Returns `false` when the
    /// URL is not ours or no flow is waiting for it.
    pub fn resume(&self, redirect: Url) -> bool {
        if !matches_redirect(&self.redirect_uri, &redirect) {
            return false;
        }
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match pending {
            Some(flow) => {
                tracing::debug!(flow = flow.id, "Resuming pending authorization flow");
                flow.sender.send(redirect).is_ok()
            }
            None => false,
        }
    }

    pub fn has_pending_flow(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    fn install(&self) -> (u64, oneshot::Receiver<Url>) {
        let id = {
            let mut next = self
                .next_id
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *next += 1;
            *next
        };
        let (sender, receiver) = oneshot::channel();
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(PendingFlow { id, sender });
        if let Some(previous) = previous {
            tracing::debug!(flow = previous.id, "Dropping superseded authorization flow");
        }
        (id, receiver)
    }
}

#[async_trait]
impl ExternalUserAgent for SchemeUserAgent {
    fn redirect_uri(&self) -> Url {
        self.redirect_uri.clone()
    }

    async fn present(&self, request: Url) -> Result<Url, AuthFlowError> {
        let (id, receiver) = self.install();
        if let Err(e) = (self.opener)(&request) {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if pending.as_ref().is_some_and(|flow| flow.id == id) {
                pending.take();
            }
            return Err(AuthFlowError::Browser(e.to_string()));
        }
        receiver.await.map_err(|_| AuthFlowError::Cancelled)
    }
}
