//! Auth session controller.
//!
//! A single actor task owns the session, the provider metadata and the view
//! state. [`SessionController`] handles send it commands; network work runs in
//! spawned tasks whose results come back to the actor as messages, so nothing
//! outside the actor ever mutates shared state.
//!
//! Login and logout flows carry a generation number. Starting a new flow
//! aborts the pending one and answers its caller with
//! [`SessionError::Superseded`]; a completion whose generation no longer
//! matches is dropped. Profile fetches are tagged with the session epoch,
//! which moves whenever the session is replaced.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::AbortHandle;

use crate::config::types::{DEFAULT_AUTH_TIMEOUT, DEFAULT_HTTP_TIMEOUT};
use crate::config::ClientConfig;
use crate::error::{FetchError, SessionError};
use crate::oauth::agent::ExternalUserAgent;
use crate::oauth::discovery::{discover, ProviderMetadata};
use crate::oauth::flow::{authorize, end_session};
use crate::oauth::token::TokenSet;
use crate::profile::{fetch_userinfo, ProfileClaims};
use crate::session::{AuthSession, PersistedState, SessionStore, STATE_KEY};
use crate::view::{Phase, ViewState};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Message {
    Discover(Reply<()>),
    Restore(Reply<bool>),
    Login(Reply<()>),
    Logout(Reply<()>),
    FetchProfile(Reply<()>),
    Session(oneshot::Sender<Option<AuthSession>>),
    Shutdown(oneshot::Sender<()>),
    DiscoveryDone {
        result: Result<ProviderMetadata, SessionError>,
    },
    LoginDone {
        generation: u64,
        result: Result<AuthSession, SessionError>,
    },
    LogoutDone {
        generation: u64,
        result: Result<bool, SessionError>,
    },
    ProfileDone {
        epoch: u64,
        refreshed: Option<TokenSet>,
        result: Result<ProfileClaims, SessionError>,
        reply: Option<Reply<()>>,
    },
}

/// Builder for a [`SessionController`].
pub struct ControllerBuilder {
    config: ClientConfig,
    agent: Arc<dyn ExternalUserAgent>,
    http: Option<reqwest::Client>,
    store: Option<Arc<dyn SessionStore>>,
    auth_timeout: Duration,
}

impl ControllerBuilder {
    #[must_use]
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Upper bound on how long the user agent may take to redirect back.
    #[must_use]
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Start the actor on the current tokio runtime. Without an explicit
    /// HTTP client, one bounded by [`DEFAULT_HTTP_TIMEOUT`] is built.
    pub fn spawn(self) -> Result<SessionController, SessionError> {
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .build()
                .map_err(SessionError::HttpClient)?,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ViewState::default());

        let actor = SessionActor {
            config: self.config,
            http,
            agent: self.agent,
            store: self.store,
            auth_timeout: self.auth_timeout,
            metadata: None,
            discovery_waiters: Vec::new(),
            session: None,
            flow_generation: 0,
            session_epoch: 0,
            pending: None,
            view: view_tx,
            tx: tx.downgrade(),
        };
        tokio::spawn(actor.run(rx));

        Ok(SessionController { tx, view: view_rx })
    }
}

/// Handle to the session actor. Cheap to clone; the actor stops once every
/// handle is dropped or [`shutdown`](SessionController::shutdown) is called.
#[derive(Clone)]
pub struct SessionController {
    tx: mpsc::UnboundedSender<Message>,
    view: watch::Receiver<ViewState>,
}

impl SessionController {
    pub fn builder(config: ClientConfig, agent: Arc<dyn ExternalUserAgent>) -> ControllerBuilder {
        ControllerBuilder {
            config,
            agent,
            http: None,
            store: None,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Message,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| SessionError::ControllerClosed)?;
        rx.await.map_err(|_| SessionError::ControllerClosed)?
    }

    /// Resolve the provider metadata. Cached for the life of the controller.
    pub async fn discover(&self) -> Result<(), SessionError> {
        self.request(Message::Discover).await
    }

    /// Load the persisted session, if any. Returns whether one was restored.
    /// Unreadable state is logged and treated as no session.
    pub async fn restore_session(&self) -> Result<bool, SessionError> {
        self.request(Message::Restore).await
    }

    /// Run the authorization code flow. Resolves when the flow completes; the
    /// profile fetch that follows runs in the background.
    pub async fn login(&self) -> Result<(), SessionError> {
        self.request(Message::Login).await
    }

    /// End the session at the provider and clear it locally. The local
    /// session is cleared even when the provider reports an error.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.request(Message::Logout).await
    }

    pub async fn fetch_profile(&self) -> Result<(), SessionError> {
        self.request(Message::FetchProfile).await
    }

    /// Snapshot of the current session.
    pub async fn session(&self) -> Result<Option<AuthSession>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Session(reply))
            .map_err(|_| SessionError::ControllerClosed)?;
        rx.await.map_err(|_| SessionError::ControllerClosed)
    }

    pub fn view(&self) -> watch::Receiver<ViewState> {
        self.view.clone()
    }

    pub fn current_view(&self) -> ViewState {
        self.view.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.view.borrow().phase
    }

    pub async fn shutdown(&self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(Message::Shutdown(ack)).is_ok() {
            let _ = rx.await;
        }
    }
}

struct PendingFlow {
    generation: u64,
    reply: Reply<()>,
    abort: AbortHandle,
}

struct SessionActor {
    config: ClientConfig,
    http: reqwest::Client,
    agent: Arc<dyn ExternalUserAgent>,
    store: Option<Arc<dyn SessionStore>>,
    auth_timeout: Duration,
    metadata: Option<Arc<ProviderMetadata>>,
    discovery_waiters: Vec<Reply<()>>,
    session: Option<AuthSession>,
    flow_generation: u64,
    session_epoch: u64,
    pending: Option<PendingFlow>,
    view: watch::Sender<ViewState>,
    tx: mpsc::WeakUnboundedSender<Message>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        while let Some(msg) = rx.recv().await {
            if self.handle(msg).is_break() {
                return;
            }
        }
        self.cancel_pending(SessionError::ControllerClosed);
    }

    fn handle(&mut self, msg: Message) -> ControlFlow<()> {
        match msg {
            Message::Discover(reply) => self.start_discovery(reply),
            Message::Restore(reply) => self.restore(reply),
            Message::Login(reply) => self.start_login(reply),
            Message::Logout(reply) => self.start_logout(reply),
            Message::FetchProfile(reply) => self.start_profile_fetch(Some(reply)),
            Message::Session(reply) => {
                let _ = reply.send(self.session.clone());
            }
            Message::Shutdown(ack) => {
                self.cancel_pending(SessionError::ControllerClosed);
                let _ = ack.send(());
                return ControlFlow::Break(());
            }
            Message::DiscoveryDone { result } => self.finish_discovery(result),
            Message::LoginDone { generation, result } => self.finish_login(generation, result),
            Message::LogoutDone { generation, result } => self.finish_logout(generation, result),
            Message::ProfileDone {
                epoch,
                refreshed,
                result,
                reply,
            } => self.finish_profile(epoch, refreshed, result, reply),
        }
        ControlFlow::Continue(())
    }

    /// Run `work` off the actor and post its outcome back through `finish`.
    /// A panicking task is reported as [`SessionError::TaskFailed`] so its
    /// caller is always answered; an aborted one posts nothing.
    fn spawn_task<T, F, D>(&self, work: F, finish: D) -> AbortHandle
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
        D: FnOnce(Result<T, SessionError>) -> Message + Send + 'static,
    {
        let tx = self.tx.clone();
        let task = tokio::spawn(work);
        let abort = task.abort_handle();
        tokio::spawn(async move {
            let outcome = match task.await {
                Ok(output) => Ok(output),
                Err(e) if e.is_panic() => {
                    tracing::error!("Background task panicked: {e}");
                    Err(SessionError::TaskFailed(e.to_string()))
                }
                Err(_) => return,
            };
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(finish(outcome));
            }
        });
        abort
    }

    // --- discovery ---

    fn start_discovery(&mut self, reply: Reply<()>) {
        if self.metadata.is_some() {
            let _ = reply.send(Ok(()));
            return;
        }
        self.discovery_waiters.push(reply);
        if self.discovery_waiters.len() > 1 {
            return;
        }

        let http = self.http.clone();
        let issuer = self.config.issuer.clone();
        self.spawn_task(
            async move { discover(&http, &issuer).await },
            |outcome| Message::DiscoveryDone {
                result: outcome.and_then(|result| result.map_err(SessionError::from)),
            },
        );
    }

    fn finish_discovery(&mut self, result: Result<ProviderMetadata, SessionError>) {
        let mut waiters = std::mem::take(&mut self.discovery_waiters).into_iter();
        match result {
            Ok(metadata) => {
                tracing::info!(issuer = metadata.issuer().as_str(), "Provider metadata discovered");
                self.metadata = Some(Arc::new(metadata));
                for waiter in waiters {
                    let _ = waiter.send(Ok(()));
                }
            }
            Err(e) => {
                tracing::warn!("Discovery failed: {e}");
                let message = e.to_string();
                self.show_error(&message);
                if let Some(first) = waiters.next() {
                    let _ = first.send(Err(e));
                }
                for waiter in waiters {
                    let _ = waiter.send(Err(SessionError::NotConfigured(message.clone())));
                }
            }
        }
    }

    fn require_configured(&self) -> Result<Arc<ProviderMetadata>, SessionError> {
        if self.config.client_id.trim().is_empty() {
            return Err(SessionError::NotConfigured("client id is missing".into()));
        }
        self.metadata.clone().ok_or_else(|| {
            SessionError::NotConfigured("provider metadata has not been discovered".into())
        })
    }

    // --- login ---

    fn start_login(&mut self, reply: Reply<()>) {
        let metadata = match self.require_configured() {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("Login unavailable: {e}");
                self.show_error(&e.to_string());
                let _ = reply.send(Err(e));
                return;
            }
        };

        self.cancel_pending(SessionError::Superseded);
        self.flow_generation += 1;
        let generation = self.flow_generation;
        self.update_view(|view| {
            view.phase = Phase::LoggingIn;
            view.error = None;
        });

        let http = self.http.clone();
        let agent = Arc::clone(&self.agent);
        let client_id = self.config.client_id.clone();
        let timeout = self.auth_timeout;
        let abort = self.spawn_task(
            async move { authorize(&http, agent.as_ref(), &metadata, &client_id, timeout).await },
            move |outcome| Message::LoginDone {
                generation,
                result: outcome.and_then(|result| result),
            },
        );
        self.pending = Some(PendingFlow {
            generation,
            reply,
            abort,
        });
    }

    fn finish_login(&mut self, generation: u64, result: Result<AuthSession, SessionError>) {
        let Some(pending) = self.take_pending(generation) else {
            tracing::debug!(generation, "Discarding stale login completion");
            return;
        };

        match result {
            Ok(session) => {
                tracing::info!("Login succeeded");
                self.install_session(Some(session), true);
                self.sync_login_state();
                self.update_view(|view| view.error = None);
                let _ = pending.reply.send(Ok(()));
                self.start_profile_fetch(None);
            }
            Err(e) => {
                tracing::warn!("Authorization error: {e}");
                self.sync_login_state();
                self.show_error(&e.to_string());
                let _ = pending.reply.send(Err(e));
            }
        }
    }

    // --- logout ---

    fn start_logout(&mut self, reply: Reply<()>) {
        let Some(session) = self.session.clone() else {
            self.update_view(|view| {
                view.is_logged_in = false;
                view.reset_profile();
            });
            let _ = reply.send(Err(SessionError::NotLoggedIn));
            return;
        };

        self.cancel_pending(SessionError::Superseded);
        self.flow_generation += 1;
        let generation = self.flow_generation;
        self.update_view(|view| view.phase = Phase::LoggingOut);

        // Prefer freshly discovered endpoints, else the ones the session was issued against.
        let metadata = self
            .metadata
            .clone()
            .unwrap_or_else(|| Arc::new(session.authorization.provider.clone()));
        let agent = Arc::clone(&self.agent);
        let timeout = self.auth_timeout;
        let abort = self.spawn_task(
            async move { end_session(agent.as_ref(), &metadata, &session, timeout).await },
            move |outcome| Message::LogoutDone {
                generation,
                result: outcome.and_then(|result| result.map_err(SessionError::from)),
            },
        );
        self.pending = Some(PendingFlow {
            generation,
            reply,
            abort,
        });
    }

    fn finish_logout(&mut self, generation: u64, result: Result<bool, SessionError>) {
        let Some(pending) = self.take_pending(generation) else {
            tracing::debug!(generation, "Discarding stale logout completion");
            return;
        };

        self.install_session(None, true);
        self.sync_login_state();
        self.update_view(|view| view.reset_profile());

        match result {
            Ok(presented) => {
                tracing::info!(ended_at_provider = presented, "Logged out");
                self.update_view(|view| view.error = None);
                let _ = pending.reply.send(Ok(()));
            }
            Err(e) => {
                tracing::warn!("End-session failed, local session cleared: {e}");
                self.show_error(&e.to_string());
                let _ = pending.reply.send(Err(e));
            }
        }
    }

    fn take_pending(&mut self, generation: u64) -> Option<PendingFlow> {
        match &self.pending {
            Some(pending) if pending.generation == generation => self.pending.take(),
            _ => None,
        }
    }

    fn cancel_pending(&mut self, reason: SessionError) {
        if let Some(pending) = self.pending.take() {
            tracing::debug!(generation = pending.generation, "Cancelling pending flow");
            pending.abort.abort();
            let _ = pending.reply.send(Err(reason));
        }
    }

    // --- restore / persist ---

    fn restore(&mut self, reply: Reply<bool>) {
        let Some(session) = self.load_persisted() else {
            let _ = reply.send(Ok(false));
            return;
        };

        tracing::info!(authorized = session.is_authorized(), "Restored persisted session");
        self.install_session(Some(session), false);
        self.sync_login_state();
        let _ = reply.send(Ok(true));
        self.start_profile_fetch(None);
    }

    fn load_persisted(&self) -> Option<AuthSession> {
        let store = self.store.as_ref()?;
        let data = match store.load(STATE_KEY) {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Could not read persisted session: {e}");
                return None;
            }
        };
        match PersistedState::decode(&data) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Discarding unreadable persisted session: {e}");
                None
            }
        }
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let result = PersistedState::encode(self.session.as_ref())
            .and_then(|data| store.save(STATE_KEY, &data));
        if let Err(e) = result {
            tracing::warn!("Failed to persist session: {e}");
        }
    }

    /// Replace the session wholesale. A session with the same fingerprint as
    /// the current one is ignored.
    fn install_session(&mut self, session: Option<AuthSession>, persist: bool) -> bool {
        if self.session == session {
            tracing::debug!("Session unchanged");
            return false;
        }
        self.session = session;
        self.session_epoch += 1;
        if persist {
            self.persist();
        }
        true
    }

    // --- profile ---

    fn start_profile_fetch(&mut self, reply: Option<Reply<()>>) {
        let respond = |reply: Option<Reply<()>>, err: SessionError| {
            if let Some(reply) = reply {
                let _ = reply.send(Err(err));
            }
        };

        let Some(session) = self.session.clone().filter(AuthSession::is_authorized) else {
            respond(reply, SessionError::NotLoggedIn);
            return;
        };
        let Some(endpoint) = session.userinfo_endpoint().cloned() else {
            tracing::warn!("Userinfo endpoint not declared in discovery document");
            respond(reply, SessionError::NoUserinfoEndpoint);
            return;
        };

        let http = self.http.clone();
        let epoch = self.session_epoch;
        self.spawn_task(
            async move {
                match session.fresh_access_token(&http).await {
                    Ok(fresh) => {
                        let result = fetch_userinfo(&http, &endpoint, &fresh.access_token).await;
                        (fresh.refreshed, result.map_err(SessionError::from))
                    }
                    Err(e) => (None, Err(FetchError::TokenRefresh(e).into())),
                }
            },
            move |outcome| {
                let (refreshed, result) = outcome.unwrap_or_else(|e| (None, Err(e)));
                Message::ProfileDone {
                    epoch,
                    refreshed,
                    result,
                    reply,
                }
            },
        );
    }

    fn finish_profile(
        &mut self,
        epoch: u64,
        refreshed: Option<TokenSet>,
        result: Result<ProfileClaims, SessionError>,
        reply: Option<Reply<()>>,
    ) {
        if epoch != self.session_epoch || self.session.is_none() {
            tracing::debug!(epoch, "Discarding stale profile result");
            if let Some(reply) = reply {
                let _ = reply.send(Err(SessionError::Superseded));
            }
            return;
        }

        if let Some(tokens) = refreshed {
            tracing::info!("Access token was refreshed automatically");
            if let Some(session) = self.session.as_mut() {
                session.apply_refreshed(tokens);
            }
            // in-flight fetches still hold the rotated-out tokens
            self.session_epoch += 1;
            self.persist();
        }

        let outcome = match result.and_then(|claims| claims.display().map_err(SessionError::from)) {
            Ok(display) => {
                self.update_view(|view| {
                    view.username = display.username;
                    view.profile_info = display.summary;
                    view.error = None;
                });
                Ok(())
            }
            Err(e) => {
                let reauth = match &e {
                    SessionError::Fetch(FetchError::Unauthorized { .. }) => true,
                    SessionError::Fetch(FetchError::TokenRefresh(token_err)) => {
                        token_err.requires_reauthorization()
                    }
                    _ => false,
                };
                if reauth {
                    self.mark_needs_reauthorization(&e);
                }
                tracing::warn!("Profile fetch failed: {e}");
                self.show_error(&e.to_string());
                Err(e)
            }
        };

        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }

    fn mark_needs_reauthorization(&mut self, error: &SessionError) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let reason = match error {
            SessionError::Fetch(FetchError::Unauthorized {
                error: Some(code), ..
            }) => code.clone(),
            other => other.to_string(),
        };
        tracing::info!(%reason, "Session needs re-authorization");
        session.mark_needs_reauthorization(reason);
        self.session_epoch += 1;
        self.persist();
        self.sync_login_state();
    }

    // --- view ---

    fn update_view(&self, f: impl FnOnce(&mut ViewState)) {
        self.view.send_if_modified(|view| {
            let before = view.clone();
            f(view);
            *view != before
        });
    }

    fn show_error(&self, message: &str) {
        self.update_view(|view| view.error = Some(message.to_string()));
    }

    /// Derive the login flag and phase from the session. Leaves the phase
    /// alone while a flow is pending.
    fn sync_login_state(&self) {
        let authorized = self
            .session
            .as_ref()
            .is_some_and(AuthSession::is_authorized);
        let flow_pending = self.pending.is_some();
        self.update_view(|view| {
            view.is_logged_in = authorized;
            if !flow_pending {
                view.phase = if authorized {
                    Phase::LoggedIn
                } else {
                    Phase::LoggedOut
                };
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use url::Url;

    use super::*;
    use crate::error::{AuthFlowError, DiscoveryError};
    use crate::session::tests::session_with;
    use crate::session::MemoryStore;

    /// Agent that never redirects back.
    struct StalledAgent;

    #[async_trait]
    impl ExternalUserAgent for StalledAgent {
        fn redirect_uri(&self) -> Url {
            Url::parse("com.plusauth.starter:/oauth2redirect/ios-provider").unwrap()
        }

        async fn present(&self, _request: Url) -> Result<Url, AuthFlowError> {
            std::future::pending().await
        }
    }

    /// A session whose provider has no userinfo endpoint, so restoring it
    /// does not start a network fetch.
    fn offline_session() -> AuthSession {
        let mut session = session_with("at", Some(3600), Some("rt"));
        session.authorization.provider = session
            .authorization
            .provider
            .clone()
            .set_userinfo_endpoint(None);
        session
    }

    fn controller(config: ClientConfig, store: Option<Arc<MemoryStore>>) -> SessionController {
        let mut builder = SessionController::builder(config, Arc::new(StalledAgent));
        if let Some(store) = store {
            builder = builder.store(store);
        }
        builder.spawn().unwrap()
    }

    /// Agent whose browser hand-off blows up.
    struct PanickingAgent;

    #[async_trait]
    impl ExternalUserAgent for PanickingAgent {
        fn redirect_uri(&self) -> Url {
            Url::parse("com.plusauth.starter:/oauth2redirect/ios-provider").unwrap()
        }

        async fn present(&self, _request: Url) -> Result<Url, AuthFlowError> {
            panic!("browser hand-off failed");
        }
    }

    fn idle_actor(store: Arc<MemoryStore>) -> SessionActor {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (view, _) = watch::channel(ViewState::default());
        SessionActor {
            config: ClientConfig::new("abc", "https://x"),
            http: reqwest::Client::new(),
            agent: Arc::new(StalledAgent),
            store: Some(store),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            metadata: None,
            discovery_waiters: Vec::new(),
            session: None,
            flow_generation: 0,
            session_epoch: 0,
            pending: None,
            view,
            tx: tx.downgrade(),
        }
    }

    #[tokio::test]
    async fn login_without_metadata_is_not_configured() {
        let ctl = controller(ClientConfig::new("abc", "https://example.plusauth.com"), None);
        let err = ctl.login().await.unwrap_err();
        assert!(matches!(err, SessionError::NotConfigured(_)));
        assert_eq!(ctl.phase(), Phase::LoggedOut);
        assert!(ctl.current_view().error.is_some());
    }

    #[tokio::test]
    async fn empty_issuer_fails_discovery() {
        let ctl = controller(ClientConfig::new("abc", ""), None);
        let err = ctl.discover().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Discovery(DiscoveryError::InvalidIssuer { .. })
        ));
        assert!(matches!(
            ctl.login().await,
            Err(SessionError::NotConfigured(_))
        ));
    }

    /// Run a hand-built actor behind a fresh handle.
    fn start(mut actor: SessionActor) -> SessionController {
        let (tx, rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ViewState::default());
        actor.tx = tx.downgrade();
        actor.view = view_tx;
        tokio::spawn(actor.run(rx));
        SessionController { tx, view: view_rx }
    }

    #[tokio::test]
    async fn panicking_login_task_answers_caller() {
        let session = offline_session();
        let mut actor = idle_actor(Arc::new(MemoryStore::new()));
        actor.agent = Arc::new(PanickingAgent);
        actor.metadata = Some(Arc::new(session.authorization.provider.clone()));
        let ctl = start(actor);

        let err = tokio::time::timeout(Duration::from_secs(3), ctl.login())
            .await
            .expect("login must resolve after the task panics")
            .unwrap_err();
        assert!(matches!(err, SessionError::TaskFailed(_)), "{err}");
        assert_eq!(ctl.phase(), Phase::LoggedOut);
        assert!(ctl.current_view().error.is_some());
    }

    #[tokio::test]
    async fn installing_same_session_twice_persists_once() {
        let store = Arc::new(MemoryStore::new());
        let mut actor = idle_actor(Arc::clone(&store));
        let session = offline_session();

        assert!(actor.install_session(Some(session.clone()), true));
        let epoch = actor.session_epoch;
        assert!(!actor.install_session(Some(session), true));
        assert_eq!(actor.session_epoch, epoch);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn stale_login_completion_is_discarded() {
        let ctl = controller(ClientConfig::new("abc", "https://x"), None);
        ctl.tx
            .send(Message::LoginDone {
                generation: 42,
                result: Ok(session_with("at", Some(3600), None)),
            })
            .unwrap();
        assert!(ctl.session().await.unwrap().is_none());
        assert!(!ctl.current_view().is_logged_in);
    }

    #[tokio::test]
    async fn restore_installs_without_persisting() {
        let session = offline_session();
        let data = PersistedState::encode(Some(&session)).unwrap();
        let store = Arc::new(MemoryStore::with_entry(STATE_KEY, data));
        let ctl = controller(ClientConfig::new("abc", "https://x"), Some(Arc::clone(&store)));

        assert!(ctl.restore_session().await.unwrap());
        let restored = ctl.session().await.unwrap().unwrap();
        assert_eq!(restored.fingerprint(), session.fingerprint());
        assert!(ctl.current_view().is_logged_in);
        assert_eq!(ctl.phase(), Phase::LoggedIn);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn restore_from_corrupted_store_is_logged_out() {
        let store = Arc::new(MemoryStore::with_entry(STATE_KEY, b"\xffgarbage".to_vec()));
        let ctl = controller(ClientConfig::new("abc", "https://x"), Some(store));
        assert!(!ctl.restore_session().await.unwrap());
        assert!(ctl.session().await.unwrap().is_none());
        assert_eq!(ctl.current_view(), ViewState::default());
    }

    #[tokio::test]
    async fn restore_without_store_is_noop() {
        let ctl = controller(ClientConfig::new("abc", "https://x"), None);
        assert!(!ctl.restore_session().await.unwrap());
    }

    #[tokio::test]
    async fn logout_without_session_resets_view() {
        let ctl = controller(ClientConfig::new("abc", "https://x"), None);
        assert!(matches!(ctl.logout().await, Err(SessionError::NotLoggedIn)));
        let view = ctl.current_view();
        assert!(!view.is_logged_in);
        assert_eq!(view.username, "-");
    }

    #[tokio::test]
    async fn logout_without_id_token_clears_locally() {
        let mut session = offline_session();
        if let Some(tokens) = session.tokens.as_mut() {
            tokens.id_token = None;
        }
        let data = PersistedState::encode(Some(&session)).unwrap();
        let store = Arc::new(MemoryStore::with_entry(STATE_KEY, data));
        let ctl = controller(ClientConfig::new("abc", "https://x"), Some(Arc::clone(&store)));
        ctl.restore_session().await.unwrap();

        ctl.logout().await.unwrap();
        assert!(ctl.session().await.unwrap().is_none());
        assert!(!ctl.current_view().is_logged_in);
        let persisted = PersistedState::decode(&store.get(STATE_KEY).unwrap()).unwrap();
        assert!(persisted.is_none());
    }

    #[tokio::test]
    async fn default_http_client_is_built() {
        let ctl = SessionController::builder(
            ClientConfig::new("abc", "https://x"),
            Arc::new(StalledAgent),
        )
        .spawn();
        assert!(ctl.is_ok());
    }

    #[tokio::test]
    async fn shutdown_answers_pending_login() {
        let session = offline_session();
        let mut actor = idle_actor(Arc::new(MemoryStore::new()));
        actor.metadata = Some(Arc::new(session.authorization.provider.clone()));
        let ctl = start(actor);

        let pending = {
            let ctl = ctl.clone();
            tokio::spawn(async move { ctl.login().await })
        };
        ctl.view()
            .wait_for(|view| view.phase == Phase::LoggingIn)
            .await
            .unwrap();
        ctl.shutdown().await;
        assert!(matches!(
            pending.await.unwrap(),
            Err(SessionError::ControllerClosed)
        ));
    }

    #[tokio::test]
    async fn shutdown_closes_controller() {
        let ctl = controller(ClientConfig::new("abc", "https://x"), None);
        ctl.shutdown().await;
        assert!(matches!(
            ctl.restore_session().await,
            Err(SessionError::ControllerClosed)
        ));
    }
}
