use crate::error::ConfigError;

use super::types::ClientConfig;

/// Expand `${VAR}` and `${VAR:-fallback}` references from the process environment.
///
/// A `$` that does not start a `${...}` reference is kept literally.
pub fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }

        chars.next(); // '{'
        let mut expr = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            expr.push(c);
        }
        if !closed {
            return Err(ConfigError::Env(format!(
                "Unclosed variable reference: ${{{expr}"
            )));
        }

        match expr.split_once(":-") {
            Some((name, fallback)) => match std::env::var(name) {
                Ok(val) if !val.is_empty() => result.push_str(&val),
                _ => result.push_str(fallback),
            },
            None => {
                let val = std::env::var(&expr).map_err(|_| {
                    ConfigError::Env(format!("Environment variable '{expr}' is not set"))
                })?;
                result.push_str(&val);
            }
        }
    }

    Ok(result)
}

/// Expand environment references in both credential values.
pub fn expand_client_config(config: &mut ClientConfig) -> Result<(), ConfigError> {
    config.client_id = expand_env_vars(&config.client_id)?;
    config.issuer = expand_env_vars(&config.issuer)?;
    Ok(())
}
