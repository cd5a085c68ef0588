use std::io::IsTerminal;
use std::path::PathBuf;

use colored::Colorize;

use crate::config::loader::{discover_config_file, load_client_config, CONFIG_FILE_NAME};
use crate::config::{ClientConfig, Settings};
use crate::error::{ConfigError, SessionError};
use crate::oauth::agent::REDIRECT_PATH;
use crate::session::{FileStore, STATE_KEY};

fn label(text: &str, is_tty: bool) -> String {
    if is_tty {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

fn resolve(cli_config: Option<&str>) -> Result<(PathBuf, ClientConfig), SessionError> {
    let path = discover_config_file(cli_config).ok_or_else(|| ConfigError::NotFound {
        path: PathBuf::from(CONFIG_FILE_NAME),
    })?;
    let config = load_client_config(&path)?;
    Ok((path, config))
}

/// Print the resolved credentials and runtime settings with their source.
pub fn run_config_show(
    cli_config: Option<&str>,
    settings: &Settings,
    json: bool,
) -> Result<(), SessionError> {
    let (source, config) = resolve(cli_config)?;
    let redirect_uri = format!("http://127.0.0.1:{}{REDIRECT_PATH}", settings.redirect_port);
    let state_file = FileStore::new(&settings.state_dir, &settings.storage_suite).path_for(STATE_KEY);

    if json {
        let out = serde_json::json!({
            "source": source.display().to_string(),
            "clientId": config.client_id,
            "issuer": config.issuer,
            "complete": config.is_complete(),
            "redirectUri": redirect_uri,
            "stateFile": state_file.display().to_string(),
            "httpTimeoutMs": settings.http_timeout.as_millis() as u64,
            "authTimeoutMs": settings.auth_timeout.as_millis() as u64,
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        return Ok(());
    }

    let is_tty = std::io::stdout().is_terminal();
    let or_missing = |value: &str| {
        if value.trim().is_empty() {
            "(missing)".to_string()
        } else {
            value.to_string()
        }
    };
    println!("{}: {}", label("Source", is_tty), source.display());
    println!("{}: {}", label("Client ID", is_tty), or_missing(&config.client_id));
    println!("{}: {}", label("Issuer", is_tty), or_missing(&config.issuer));
    println!("{}: {}", label("Redirect URI", is_tty), redirect_uri);
    println!("{}: {}", label("State file", is_tty), state_file.display());
    Ok(())
}
