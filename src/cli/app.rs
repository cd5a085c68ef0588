//! Interactive front-end: re-renders on every view change and reads
//! commands from stdin.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::{ClientConfig, Settings};
use crate::controller::SessionController;
use crate::error::SessionError;
use crate::oauth::agent::LoopbackUserAgent;
use crate::session::FileStore;

use super::output::print_view;

pub const COMMANDS: [&str; 5] = ["login", "logout", "refresh", "help", "quit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Login,
    Logout,
    Refresh,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines are `Ok(None)`.
    pub fn parse(input: &str) -> Result<Option<Command>, String> {
        let word = input.trim().to_ascii_lowercase();
        let command = match word.as_str() {
            "" => return Ok(None),
            "login" => Command::Login,
            "logout" => Command::Logout,
            "refresh" | "profile" => Command::Refresh,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => {
                return Err(match suggest_command(other) {
                    Some(hint) => format!("Unknown command '{other}'. Did you mean '{hint}'?"),
                    None => format!("Unknown command '{other}'. Try 'help'."),
                })
            }
        };
        Ok(Some(command))
    }
}

/// Closest known command within edit distance 2, if unambiguous.
pub fn suggest_command(input: &str) -> Option<&'static str> {
    let mut best_dist = usize::MAX;
    let mut best: Option<&'static str> = None;
    let mut ambiguous = false;

    for &command in &COMMANDS {
        let dist = strsim::levenshtein(input, command);
        if dist < best_dist {
            best_dist = dist;
            best = Some(command);
            ambiguous = false;
        } else if dist == best_dist {
            ambiguous = true;
        }
    }

    if best_dist <= 2 && !ambiguous {
        best
    } else {
        None
    }
}

/// Wire a controller to the system browser and the on-disk store.
pub fn build_controller(config: ClientConfig, settings: &Settings) -> Result<SessionController, SessionError> {
    let http = reqwest::Client::builder()
        .timeout(settings.http_timeout)
        .build()
        .map_err(SessionError::HttpClient)?;
    let agent = LoopbackUserAgent::new(settings.redirect_port, settings.auth_timeout)?;
    let store = FileStore::new(&settings.state_dir, &settings.storage_suite);

    SessionController::builder(config, Arc::new(agent))
        .http_client(http)
        .store(Arc::new(store))
        .auth_timeout(settings.auth_timeout)
        .spawn()
}

fn print_help() {
    println!("Commands: login, logout, refresh, help, quit");
}

/// Run a command without blocking input, so a later command can supersede it.
fn dispatch(controller: &SessionController, command: Command) {
    let view = controller.current_view();
    match command {
        Command::Login if !view.can_login() => {
            eprintln!("Login is unavailable while {}", view.phase);
            return;
        }
        Command::Logout if !view.can_logout() => {
            eprintln!("Logout is unavailable while {}", view.phase);
            return;
        }
        _ => {}
    }

    let controller = controller.clone();
    tokio::spawn(async move {
        let result = match command {
            Command::Login => controller.login().await,
            Command::Logout => controller.logout().await,
            Command::Refresh => controller.fetch_profile().await,
            Command::Help | Command::Quit => Ok(()),
        };
        match result {
            Ok(()) | Err(SessionError::Superseded) => {}
            // not reflected in the banner
            Err(e @ (SessionError::NotLoggedIn | SessionError::NoUserinfoEndpoint)) => {
                eprintln!("{e}")
            }
            Err(e) => tracing::debug!(?command, "Command failed: {e}"),
        }
    });
}

pub async fn run_interactive(controller: SessionController, is_tty: bool) -> Result<(), SessionError> {
    let mut view = controller.view();
    print_view(&view.borrow_and_update(), is_tty);
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = view.borrow_and_update().clone();
                print_view(&snapshot, is_tty);
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Failed to read stdin: {e}");
                        break;
                    }
                };
                match Command::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(Command::Help)) => print_help(),
                    Ok(Some(command)) => dispatch(&controller, command),
                    Err(msg) => eprintln!("{msg}"),
                }
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}
