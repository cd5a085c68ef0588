use std::io::IsTerminal;

use colored::Colorize;

use crate::config::Settings;
use crate::error::SessionError;
use crate::session::{AuthSession, FileStore, PersistedState, SessionStore, STATE_KEY};

/// Stored session summary. Reads local state only; no network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub logged_in: bool,
    pub issuer: Option<String>,
    pub client_id: Option<String>,
    pub expires_at: Option<String>,
    pub refreshable: bool,
    pub needs_reauthorization: Option<String>,
    /// Why stored state was ignored, when it was.
    pub warning: Option<String>,
}

impl SessionStatus {
    pub fn from_session(session: Option<&AuthSession>) -> Self {
        let Some(session) = session else {
            return Self {
                logged_in: false,
                issuer: None,
                client_id: None,
                expires_at: None,
                refreshable: false,
                needs_reauthorization: None,
                warning: None,
            };
        };
        let tokens = session.tokens.as_ref();
        Self {
            logged_in: session.is_authorized(),
            issuer: Some(session.authorization.provider.issuer().as_str().to_string()),
            client_id: Some(session.authorization.client_id.clone()),
            expires_at: tokens.and_then(|t| t.expires_at).map(|at| at.to_rfc3339()),
            refreshable: tokens.is_some_and(|t| t.is_refreshable()),
            needs_reauthorization: session.authorization_error.clone(),
            warning: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "loggedIn": self.logged_in,
            "issuer": self.issuer,
            "clientId": self.client_id,
            "expiresAt": self.expires_at,
            "refreshable": self.refreshable,
            "needsReauthorization": self.needs_reauthorization,
            "warning": self.warning,
        })
    }
}

/// Unreadable state is reported as logged out with a warning, the same way a
/// restore treats it.
pub fn load_status(settings: &Settings) -> SessionStatus {
    let store = FileStore::new(&settings.state_dir, &settings.storage_suite);
    let loaded = store
        .load(STATE_KEY)
        .and_then(|data| data.map(|data| PersistedState::decode(&data)).transpose());
    match loaded {
        Ok(session) => SessionStatus::from_session(session.flatten().as_ref()),
        Err(e) => {
            tracing::warn!("Ignoring unreadable session state: {e}");
            SessionStatus {
                warning: Some(format!("Stored session ignored: {e}")),
                ..SessionStatus::from_session(None)
            }
        }
    }
}

pub fn run_status(settings: &Settings, json: bool) -> Result<(), SessionError> {
    let status = load_status(settings);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status.to_json()).unwrap_or_default()
        );
        return Ok(());
    }

    let is_tty = std::io::stdout().is_terminal();
    let headline = if status.logged_in {
        "Logged in"
    } else {
        "Not logged in"
    };
    if is_tty {
        let colored = if status.logged_in {
            headline.green().bold()
        } else {
            headline.yellow().bold()
        };
        println!("{colored}");
    } else {
        println!("{headline}");
    }

    if let Some(issuer) = &status.issuer {
        println!("  Issuer: {issuer}");
    }
    if let Some(client_id) = &status.client_id {
        println!("  Client ID: {client_id}");
    }
    if let Some(expires_at) = &status.expires_at {
        println!("  Access token expires: {expires_at}");
    }
    if status.issuer.is_some() {
        println!("  Refreshable: {}", if status.refreshable { "yes" } else { "no" });
    }
    if let Some(reason) = &status.needs_reauthorization {
        println!("  Needs re-authorization: {reason}");
    }
    if let Some(warning) = &status.warning {
        eprintln!("Warning: {warning}");
    }
    Ok(())
}
