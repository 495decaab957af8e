//! Server configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use upsync_core::{Error, Result};

/// Default listen port; the port the Windows client is usually pointed at.
pub const DEFAULT_HTTP_PORT: u16 = 8530;

/// Configuration for the upsync server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port.
    pub http_port: u16,

    /// Directory of the update metadata source.
    ///
    /// When absent the server starts with no catalog installed and answers
    /// sync requests with a protocol fault until one is provided.
    #[serde(default)]
    pub metadata_path: Option<PathBuf>,

    /// Path to the JSON server-configuration document whose properties are
    /// passed through in `GetConfig` replies.
    #[serde(default)]
    pub server_config_path: Option<PathBuf>,

    /// Directory of the update content store.
    #[serde(default)]
    pub content_path: Option<PathBuf>,

    /// Base URL clients use to reach the `/Content` routes, e.g.
    /// `http://updates.internal:8530`. Required iff a content store is
    /// configured.
    #[serde(default)]
    pub content_http_root: Option<String>,

    /// Enable debug mode (pretty logs instead of JSON).
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            metadata_path: None,
            server_config_path: None,
            content_path: None,
            content_http_root: None,
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Supported env vars:
    /// - `UPSYNC_HTTP_PORT`
    /// - `UPSYNC_METADATA_PATH`
    /// - `UPSYNC_SERVER_CONFIG`
    /// - `UPSYNC_CONTENT_PATH`
    /// - `UPSYNC_CONTENT_HTTP_ROOT`
    /// - `UPSYNC_DEBUG`
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(port) = env_u16("UPSYNC_HTTP_PORT")? {
            config.http_port = port;
        }
        config.metadata_path = env_string("UPSYNC_METADATA_PATH").map(PathBuf::from);
        config.server_config_path = env_string("UPSYNC_SERVER_CONFIG").map(PathBuf::from);
        config.content_path = env_string("UPSYNC_CONTENT_PATH").map(PathBuf::from);
        config.content_http_root = env_string("UPSYNC_CONTENT_HTTP_ROOT");
        if let Some(debug) = env_bool("UPSYNC_DEBUG")? {
            config.debug = debug;
        }

        Ok(config)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error when a content store is configured without a
    /// content HTTP root, or vice versa: the URL scheme and the store only
    /// make sense together.
    pub fn validate(&self) -> Result<()> {
        match (&self.content_path, &self.content_http_root) {
            (Some(_), None) => Err(Error::InvalidInput(
                "UPSYNC_CONTENT_HTTP_ROOT is required when a content store is configured"
                    .to_string(),
            )),
            (None, Some(_)) => Err(Error::InvalidInput(
                "UPSYNC_CONTENT_PATH is required when a content HTTP root is configured"
                    .to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Loads the `GetConfig` property pass-through document.
    ///
    /// Returns an empty object when no document is configured.
    ///
    /// # Errors
    ///
    /// Returns an error when the configured document is unreadable or not
    /// valid JSON.
    pub fn load_properties(&self) -> Result<serde_json::Value> {
        let Some(path) = &self.server_config_path else {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        };
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidInput(format!("cannot read server config {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| Error::InvalidInput(format!("malformed server config: {e}")))
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_u16(name: &str) -> Result<Option<u16>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u16>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u16: {e}")))
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    match v.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(Some(true)),
        "false" | "0" | "no" => Ok(Some(false)),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}
