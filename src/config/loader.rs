use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::env::expand_client_config;
use super::types::{ClientConfig, ConfigResource};

pub const CONFIG_FILE_NAME: &str = "PlusAuth.json";

/// Strip JSONC comments (`//` line comments and `/* */` block comments) from input.
pub fn strip_jsonc_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(ch) = chars.next() {
        if escape_next {
            escape_next = false;
            result.push(ch);
            continue;
        }

        if in_string {
            result.push(ch);
            match ch {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (ch, chars.peek()) {
            ('"', _) => {
                in_string = true;
                result.push(ch);
            }
            ('/', Some(&'/')) => {
                chars.next();
                for c in chars.by_ref() {
                    if c == '\n' {
                        result.push('\n');
                        break;
                    }
                }
            }
            ('/', Some(&'*')) => {
                chars.next();
                let mut prev = ' ';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    // keep line numbers stable for serde error positions
                    if c == '\n' {
                        result.push('\n');
                    }
                    prev = c;
                }
            }
            _ => result.push(ch),
        }
    }

    result
}

/// Locate the configuration resource.
///
/// Precedence:
/// 1. `--config` CLI flag
/// 2. `PLUSAUTH_CONFIG` env var
/// 3. `./PlusAuth.json`
/// 4. `~/.plusauth/PlusAuth.json`
///
/// An explicitly requested path is returned even when it does not exist so the
/// caller reports it instead of silently falling through.
pub fn discover_config_file(cli_config: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = cli_config {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var("PLUSAUTH_CONFIG") {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let local = PathBuf::from(".").join(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }

    dirs::home_dir()
        .map(|home| home.join(".plusauth").join(CONFIG_FILE_NAME))
        .filter(|p| p.exists())
}

/// Read and decode the credentials resource at `path`.
pub fn load_client_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    let stripped = strip_jsonc_comments(&content);
    let resource: ConfigResource =
        serde_json::from_str(&stripped).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            detail: format!("Invalid JSON: {e}"),
        })?;

    let mut config = resource.credentials;
    expand_client_config(&mut config)?;
    Ok(config)
}

/// Load the credentials, logging and falling back to an empty config on failure.
///
/// Startup continues with an empty config; login then fails with a
/// not-configured error instead of the process exiting.
pub fn load_or_default(cli_config: Option<&str>) -> ClientConfig {
    let Some(path) = discover_config_file(cli_config) else {
        tracing::error!("No {CONFIG_FILE_NAME} found; continuing without credentials");
        return ClientConfig::default();
    };

    match load_client_config(&path) {
        Ok(config) => {
            tracing::debug!(path = %path.display(), issuer = %config.issuer, "Loaded client config");
            config
        }
        Err(e) => {
            tracing::error!("{e}");
            ClientConfig::default()
        }
    }
}
