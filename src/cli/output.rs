use std::fmt::Write as _;

use colored::{ColoredString, Colorize};

use crate::error::SessionError;
use crate::view::ViewState;

fn paint(text: &str, is_tty: bool, style: impl Fn(&str) -> ColoredString) -> String {
    if is_tty {
        style(text).to_string()
    } else {
        text.to_string()
    }
}

fn button(label: &str, enabled: bool, is_tty: bool) -> String {
    let text = format!("[ {label} ]");
    match (enabled, is_tty) {
        (true, true) => text.green().bold().to_string(),
        (false, true) => text.dimmed().to_string(),
        (true, false) => text,
        (false, false) => format!("{text} (busy)"),
    }
}

/// Two-state screen: a Login button while logged out, the profile and a
/// Logout button while logged in. Errors show as a banner underneath.
pub fn render_view(view: &ViewState, is_tty: bool) -> String {
    let mut out = String::new();
    let title = paint("PlusAuth Starter", is_tty, |t| t.bold().cyan());
    let _ = writeln!(out, "{title} ({})", view.phase);

    if view.is_logged_in {
        let username = paint("Username", is_tty, |t| t.dimmed());
        let profile = paint("Profile", is_tty, |t| t.dimmed());
        let _ = writeln!(out, "  {username}: {}", view.username);
        let _ = writeln!(out, "  {profile}: {}", view.profile_info);
        let _ = writeln!(out, "  {}", button("Logout", view.can_logout(), is_tty));
    } else {
        let _ = writeln!(out, "  You are not logged in.");
        let _ = writeln!(out, "  {}", button("Login", view.can_login(), is_tty));
    }

    if let Some(error) = &view.error {
        let label = paint("Error", is_tty, |t| t.red().bold());
        let _ = writeln!(out, "  {label}: {error}");
    }
    out
}

pub fn print_view(view: &ViewState, is_tty: bool) {
    print!("{}", render_view(view, is_tty));
}

pub fn print_error(err: &SessionError, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&err.to_json()).unwrap_or_default());
    } else {
        eprintln!("{}", err);
    }
}
