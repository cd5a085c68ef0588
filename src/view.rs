//! Observable presentation state.
//!
//! The controller is the only writer; front-ends subscribe through a
//! [`tokio::sync::watch`] receiver and re-render on every change.

use std::fmt;

pub const PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    LoggedOut,
    LoggingIn,
    LoggedIn,
    LoggingOut,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::LoggedOut => "logged out",
            Phase::LoggingIn => "logging in",
            Phase::LoggedIn => "logged in",
            Phase::LoggingOut => "logging out",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub phase: Phase,
    pub is_logged_in: bool,
    pub username: String,
    pub profile_info: String,
    /// Last failure, shown as a banner until the next success.
    pub error: Option<String>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            phase: Phase::LoggedOut,
            is_logged_in: false,
            username: PLACEHOLDER.to_string(),
            profile_info: PLACEHOLDER.to_string(),
            error: None,
        }
    }
}

impl ViewState {
    pub fn can_login(&self) -> bool {
        !self.is_logged_in && self.phase == Phase::LoggedOut
    }

    pub fn can_logout(&self) -> bool {
        self.is_logged_in && self.phase == Phase::LoggedIn
    }

    pub fn reset_profile(&mut self) {
        self.username = PLACEHOLDER.to_string();
        self.profile_info = PLACEHOLDER.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_logged_out_with_placeholders() {
        let view = ViewState::default();
        assert!(!view.is_logged_in);
        assert_eq!(view.username, "-");
        assert_eq!(view.profile_info, "-");
        assert!(view.can_login());
        assert!(!view.can_logout());
    }

    #[test]
    fn buttons_follow_login_state() {
        let view = ViewState {
            phase: Phase::LoggedIn,
            is_logged_in: true,
            ..ViewState::default()
        };
        assert!(!view.can_login());
        assert!(view.can_logout());

        let pending = ViewState {
            phase: Phase::LoggingIn,
            ..ViewState::default()
        };
        assert!(!pending.can_login());
        assert!(!pending.can_logout());
    }

    #[test]
    fn reset_profile_restores_placeholders() {
        let mut view = ViewState {
            username: "alice".into(),
            profile_info: "username: alice, ".into(),
            ..ViewState::default()
        };
        view.reset_profile();
        assert_eq!(view.username, PLACEHOLDER);
        assert_eq!(view.profile_info, PLACEHOLDER);
    }

    #[test]
    fn phase_labels() {
        assert_eq!(Phase::LoggingOut.to_string(), "logging out");
        assert_eq!(Phase::LoggedIn.to_string(), "logged in");
    }
}
