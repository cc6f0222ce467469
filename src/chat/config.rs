//! Configuration types for Coastie.
//!
//! This module provides CLI argument parsing via `arrrg`, an optional YAML
//! configuration file, and the resolved [`CoastieConfig`] every component is
//! built from.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::Deserialize;

use crate::client::{DEFAULT_ENDPOINT, ReplyFallback};
use crate::error::{Error, Result};

/// Environment variable that overrides the endpoint.
pub const ENDPOINT_ENV_VAR: &str = "COASTIE_ENDPOINT";

/// Default location of the history database.
pub const DEFAULT_HISTORY_PATH: &str = "coastie-history.sqlite3";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_UPLOAD_WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// Command-line arguments for the coastie-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Endpoint to post chat requests to.
    #[arrrg(optional, "Chat endpoint URL (default: $COASTIE_ENDPOINT or the hosted function)", "URL")]
    pub endpoint: Option<String>,

    /// Path of the history database.
    #[arrrg(optional, "History database path (default: coastie-history.sqlite3)", "PATH")]
    pub history: Option<String>,

    /// YAML configuration file.
    #[arrrg(optional, "YAML configuration file", "PATH")]
    pub config: Option<String>,

    /// Accept response bodies without a reply field as the reply.
    #[arrrg(flag, "Show raw response bodies when no reply field is present")]
    pub raw_replies: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CoastieConfig {
    /// URL every chat request is posted to.
    pub endpoint: String,

    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,

    /// Time allowed for the backend to answer.
    pub read_timeout: Duration,

    /// Time allowed to write a JSON request.
    pub write_timeout: Duration,

    /// Time allowed to write a multipart upload.
    pub upload_write_timeout: Duration,

    /// Handling of success bodies without a reply field.
    pub reply_fallback: ReplyFallback,

    /// Location of the history database.
    pub history_path: PathBuf,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl CoastieConfig {
    /// Creates a new CoastieConfig with default values.
    ///
    /// Defaults:
    /// - Endpoint: the hosted Coastie function
    /// - Timeouts: connect 30s, read 120s, write 30s, upload 60s
    /// - Missing reply field: rejected
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            upload_write_timeout: DEFAULT_UPLOAD_WRITE_TIMEOUT,
            reply_fallback: ReplyFallback::Reject,
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
            use_color: true,
        }
    }

    /// Defaults, with the endpoint taken from `COASTIE_ENDPOINT` when set.
    pub fn from_env() -> Self {
        let config = Self::new();
        match env::var(ENDPOINT_ENV_VAR) {
            Ok(endpoint) if !endpoint.trim().is_empty() => config.with_endpoint(endpoint.trim()),
            _ => config,
        }
    }

    /// Sets the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the JSON write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the multipart write timeout.
    pub fn with_upload_write_timeout(mut self, timeout: Duration) -> Self {
        self.upload_write_timeout = timeout;
        self
    }

    /// Sets the reply fallback policy.
    pub fn with_reply_fallback(mut self, fallback: ReplyFallback) -> Self {
        self.reply_fallback = fallback;
        self
    }

    /// Sets the history database path.
    pub fn with_history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = path.into();
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Overlays the values present in a YAML configuration file.
    pub fn merge_yaml_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        self.merge_yaml(&text)
    }

    /// Overlays the values present in a YAML document.
    pub fn merge_yaml(mut self, text: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(text).map_err(|err| {
            Error::serialization("failed to parse configuration", Some(Box::new(err)))
        })?;
        if let Some(endpoint) = file.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(secs) = file.connect_timeout_secs {
            self.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.read_timeout_secs {
            self.read_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.write_timeout_secs {
            self.write_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.upload_write_timeout_secs {
            self.upload_write_timeout = Duration::from_secs(secs);
        }
        if let Some(fallback) = file.reply_fallback {
            self.reply_fallback = fallback;
        }
        if let Some(path) = file.history_path {
            self.history_path = path;
        }
        if let Some(use_color) = file.use_color {
            self.use_color = use_color;
        }
        Ok(self)
    }
}

impl Default for CoastieConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Precedence, lowest first: defaults, `COASTIE_ENDPOINT`, the YAML file,
/// then explicit flags.
impl TryFrom<ChatArgs> for CoastieConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self> {
        let mut config = CoastieConfig::from_env();
        if let Some(path) = &args.config {
            config = config.merge_yaml_file(path)?;
        }
        if let Some(endpoint) = args.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(history) = args.history {
            config.history_path = PathBuf::from(history);
        }
        if args.raw_replies {
            config.reply_fallback = ReplyFallback::RawBody;
        }
        if args.no_color {
            config.use_color = false;
        }
        Ok(config)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    endpoint: Option<String>,
    connect_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
    write_timeout_secs: Option<u64>,
    upload_write_timeout_secs: Option<u64>,
    reply_fallback: Option<ReplyFallback>,
    history_path: Option<PathBuf>,
    use_color: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = CoastieConfig::new();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.read_timeout, Duration::from_secs(120));
        assert_eq!(config.write_timeout, Duration::from_secs(30));
        assert_eq!(config.upload_write_timeout, Duration::from_secs(60));
        assert_eq!(config.reply_fallback, ReplyFallback::Reject);
        assert_eq!(config.history_path, PathBuf::from(DEFAULT_HISTORY_PATH));
        assert!(config.use_color);
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            endpoint: Some("http://localhost:8888/chat".to_string()),
            history: Some("/tmp/h.sqlite3".to_string()),
            config: None,
            raw_replies: true,
            no_color: true,
        };
        let config = CoastieConfig::try_from(args).unwrap();
        assert_eq!(config.endpoint, "http://localhost:8888/chat");
        assert_eq!(config.history_path, PathBuf::from("/tmp/h.sqlite3"));
        assert_eq!(config.reply_fallback, ReplyFallback::RawBody);
        assert!(!config.use_color);
    }

    #[test]
    fn config_builder_pattern() {
        let config = CoastieConfig::new()
            .with_endpoint("http://localhost/x")
            .with_connect_timeout(Duration::from_secs(1))
            .with_read_timeout(Duration::from_secs(2))
            .with_write_timeout(Duration::from_secs(3))
            .with_upload_write_timeout(Duration::from_secs(4))
            .with_reply_fallback(ReplyFallback::RawBody)
            .with_history_path("h.db")
            .without_color();

        assert_eq!(config.endpoint, "http://localhost/x");
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.read_timeout, Duration::from_secs(2));
        assert_eq!(config.write_timeout, Duration::from_secs(3));
        assert_eq!(config.upload_write_timeout, Duration::from_secs(4));
        assert_eq!(config.reply_fallback, ReplyFallback::RawBody);
        assert_eq!(config.history_path, PathBuf::from("h.db"));
        assert!(!config.use_color);
    }

    #[test]
    fn yaml_overlays_only_present_fields() {
        let config = CoastieConfig::new()
            .merge_yaml(
                "endpoint: http://10.0.0.2/chat\nread_timeout_secs: 5\nreply_fallback: raw_body\n",
            )
            .unwrap();
        assert_eq!(config.endpoint, "http://10.0.0.2/chat");
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.reply_fallback, ReplyFallback::RawBody);
    }

    #[test]
    fn yaml_rejects_unknown_keys() {
        let err = CoastieConfig::new().merge_yaml("endpiont: typo\n").unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn yaml_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coastie.yaml");
        std::fs::write(&path, "endpoint: http://from-file/chat\nuse_color: false\n").unwrap();

        let args = ChatArgs {
            endpoint: Some("http://from-flag/chat".to_string()),
            config: Some(path.to_string_lossy().into_owned()),
            ..ChatArgs::default()
        };
        let config = CoastieConfig::try_from(args).unwrap();
        assert_eq!(config.endpoint, "http://from-flag/chat");
        assert!(!config.use_color);
    }
}
