//! Server configuration with layered loading.
//!
//! Loading flow:
//! 1. Start with compiled [`ServerConfig::default()`]
//! 2. If a config file is given, its keys replace the defaults
//! 3. Apply `HUDDLE_*` environment variable overrides
//! 4. The binary applies CLI flags last, then calls [`ServerConfig::validate`]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Upper bound for the ping period.
const MAX_HEARTBEAT_SECS: u64 = 86_400;

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    /// 0 binds an ephemeral port.
    pub port: u16,
    /// CORS allow-list. Empty allows any origin.
    pub allowed_origins: Vec<String>,
    /// Per-connection outbound queue bound. A full queue drops the frame.
    pub max_send_queue: usize,
    /// Bound of the session actor's inbound channel.
    pub command_queue: usize,
    pub heartbeat_interval_secs: u64,
    /// Clients silent for longer than this are disconnected.
    pub client_timeout_secs: u64,
    /// Timeout for plain HTTP requests (`/health`, `/metrics`).
    pub request_timeout_secs: u64,
    /// Enter review automatically once the session deadline passes.
    pub auto_review_on_deadline: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3001,
            allowed_origins: vec![
                "http://localhost:5173".into(),
                "http://localhost:3000".into(),
            ],
            max_send_queue: 256,
            command_queue: 1024,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            request_timeout_secs: 30,
            auto_review_on_deadline: false,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with an optional file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(?path, "loading config file");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `HUDDLE_*` overrides from `lookup`. Invalid values are logged
    /// and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = read("HUDDLE_HOST") {
            self.host = v.trim().to_string();
        }
        if let Some(v) = read("HUDDLE_PORT") {
            match v.trim().parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => warn!(key = "HUDDLE_PORT", value = %v, "invalid port env var, ignoring"),
            }
        }
        if let Some(v) = lookup("HUDDLE_ALLOWED_ORIGINS") {
            self.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = read("HUDDLE_AUTO_REVIEW") {
            match parse_bool(&v) {
                Some(b) => self.auto_review_on_deadline = b,
                None => warn!(key = "HUDDLE_AUTO_REVIEW", value = %v, "invalid boolean env var, ignoring"),
            }
        }
    }

    /// Clamp values that would leave the server unusable.
    pub fn validate(&mut self) {
        if self.max_send_queue == 0 {
            warn!("maxSendQueue must be positive, using 1");
            self.max_send_queue = 1;
        }
        if self.command_queue == 0 {
            warn!("commandQueue must be positive, using 1");
            self.command_queue = 1;
        }
        if self.heartbeat_interval_secs == 0 {
            warn!("heartbeatIntervalSecs must be positive, using 1");
            self.heartbeat_interval_secs = 1;
        }
        if self.heartbeat_interval_secs > MAX_HEARTBEAT_SECS {
            warn!(
                heartbeat_interval_secs = self.heartbeat_interval_secs,
                "heartbeatIntervalSecs too large, using one day"
            );
            self.heartbeat_interval_secs = MAX_HEARTBEAT_SECS;
        }
        if self.client_timeout_secs <= self.heartbeat_interval_secs {
            let fixed = self.heartbeat_interval_secs.saturating_mul(3);
            warn!(
                client_timeout_secs = self.client_timeout_secs,
                heartbeat_interval_secs = self.heartbeat_interval_secs,
                fixed,
                "clientTimeoutSecs must exceed the heartbeat interval"
            );
            self.client_timeout_secs = fixed;
        }
        if self.request_timeout_secs == 0 {
            warn!("requestTimeoutSecs must be positive, using 30");
            self.request_timeout_secs = 30;
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr(), "0.0.0.0:3001");
        assert_eq!(c.allowed_origins.len(), 2);
        assert!(!c.auto_review_on_deadline);
        assert_eq!(c.client_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn file_overrides_only_given_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 4000, "autoReviewOnDeadline": true}}"#).unwrap();
        let c = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(c.port, 4000);
        assert!(c.auto_review_on_deadline);
        assert_eq!(c.max_send_queue, 256);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = ServerConfig::from_file(Path::new("/nonexistent/huddle.json")).unwrap_err();
        assert_matches!(err, ConfigError::Read { .. });
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ port: }}").unwrap();
        let err = ServerConfig::from_file(file.path()).unwrap_err();
        assert_matches!(err, ConfigError::Parse { .. });
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn env_overrides() {
        let mut c = ServerConfig::default();
        c.apply_env(env(&[
            ("HUDDLE_HOST", "127.0.0.1"),
            ("HUDDLE_PORT", "8080"),
            ("HUDDLE_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("HUDDLE_AUTO_REVIEW", "yes"),
        ]));
        assert_eq!(c.bind_addr(), "127.0.0.1:8080");
        assert_eq!(c.allowed_origins, vec!["https://a.example", "https://b.example"]);
        assert!(c.auto_review_on_deadline);
    }

    #[test]
    fn empty_origins_env_means_permissive() {
        let mut c = ServerConfig::default();
        c.apply_env(env(&[("HUDDLE_ALLOWED_ORIGINS", "")]));
        assert!(c.allowed_origins.is_empty());
    }

    #[test]
    fn invalid_env_values_ignored() {
        let mut c = ServerConfig::default();
        c.apply_env(env(&[("HUDDLE_PORT", "99999"), ("HUDDLE_AUTO_REVIEW", "maybe")]));
        assert_eq!(c.port, 3001);
        assert!(!c.auto_review_on_deadline);
    }

    #[test]
    fn validate_clamps() {
        let mut c = ServerConfig {
            max_send_queue: 0,
            command_queue: 0,
            heartbeat_interval_secs: 10,
            client_timeout_secs: 5,
            ..Default::default()
        };
        c.validate();
        assert_eq!(c.max_send_queue, 1);
        assert_eq!(c.command_queue, 1);
        assert_eq!(c.client_timeout_secs, 30);
    }

    #[test]
    fn validate_saturates_huge_heartbeat() {
        let mut c = ServerConfig {
            heartbeat_interval_secs: u64::MAX,
            client_timeout_secs: 90,
            ..Default::default()
        };
        c.validate();
        assert_eq!(c.heartbeat_interval_secs, MAX_HEARTBEAT_SECS);
        assert_eq!(c.client_timeout_secs, MAX_HEARTBEAT_SECS * 3);

        let mut c = ServerConfig {
            heartbeat_interval_secs: MAX_HEARTBEAT_SECS,
            client_timeout_secs: 1,
            ..Default::default()
        };
        c.validate();
        assert!(c.client_timeout_secs > c.heartbeat_interval_secs);
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nah"), None);
    }
}
