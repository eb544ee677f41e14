use std::path::PathBuf;

use hack2heart_core::{DEFAULT_API_URL, DEFAULT_WS_URL};
use url::Url;

use crate::session::session_path;

const MAX_URL_LEN: usize = 2048;
const DATA_DIR_NAME: &str = ".hack2heart";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} is too long (max {max} chars)")]
    TooLong { field: &'static str, max: usize },
    #[error("invalid {field}: {message}")]
    InvalidUrl {
        field: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub ws_url: String,
    pub data_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            ws_url: DEFAULT_WS_URL.to_owned(),
            data_dir: default_data_dir(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("api_url", &self.api_url, &["http", "https"])?;
        validate_url("ws_url", &self.ws_url, &["ws", "wss"])?;
        Ok(())
    }

    pub fn session_path(&self) -> PathBuf {
        session_path(&self.data_dir)
    }
}

/// `$HOME/.hack2heart`, or `./.hack2heart` when no home directory is set.
pub fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

fn validate_url(field: &'static str, raw: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::Empty { field });
    }
    if raw.len() > MAX_URL_LEN {
        return Err(ConfigError::TooLong {
            field,
            max: MAX_URL_LEN,
        });
    }

    let url = Url::parse(raw).map_err(|err| ConfigError::InvalidUrl {
        field,
        message: err.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidUrl {
            field,
            message: format!("scheme must be one of {}", schemes.join(", ")),
        });
    }
    Ok(())
}
