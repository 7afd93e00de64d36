//! Coordinator configuration
//!
//! [`ClientConfig`] carries everything the two coordinators need besides
//! their collaborators: the candidate server list, timer periods and the
//! endpoints of the notification and missed-call services.
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use trac_janus_client_core::ClientConfig;
//!
//! let config = ClientConfig::new()
//!     .with_servers(vec!["wss://janus.example.org:8989".to_string()])
//!     .with_event_uri("https://trac.example.org/janus")
//!     .with_peer_list_interval(Duration::from_secs(5));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.peer_list_interval(), Duration::from_secs(5));
//! ```
//!
//! Configuration files are YAML unless their name ends in `.json`:
//!
//! ```rust
//! use trac_janus_client_core::ClientConfig;
//!
//! let config = ClientConfig::from_yaml_str(
//!     "servers: [\"wss://localhost:8989\"]\navatar_url: \"https://trac.example.org/avatar/\"\n",
//! ).unwrap();
//! assert_eq!(config.servers.len(), 1);
//! assert_eq!(config.peer_list_interval_secs, 10);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Default WebSocket endpoint of a local gateway
pub const DEFAULT_WS_SERVER: &str = "wss://localhost:8989";

/// Default HTTP long-poll endpoint of a local gateway
pub const DEFAULT_HTTP_SERVER: &str = "https://localhost:8089/janus";

fn default_servers() -> Vec<String> {
    vec![DEFAULT_WS_SERVER.to_string(), DEFAULT_HTTP_SERVER.to_string()]
}

fn default_peer_list_interval_secs() -> u64 {
    10
}

fn default_bitrate_interval_ms() -> u64 {
    1000
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_auto_publish() -> bool {
    true
}

/// Configuration shared by the direct-call and room coordinators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Candidate gateway endpoints, tried in order
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,

    /// Period of the peer-list poll once registered
    #[serde(default = "default_peer_list_interval_secs")]
    pub peer_list_interval_secs: u64,

    /// Period of the bitrate sampling while a remote stream is shown
    #[serde(default = "default_bitrate_interval_ms")]
    pub bitrate_interval_ms: u64,

    /// Prefix of the avatar URL used as notification icon; the caller's
    /// username is appended
    #[serde(default)]
    pub avatar_url: Option<String>,

    /// Base URI of the missed-call event endpoint
    #[serde(default)]
    pub event_uri: Option<String>,

    /// Capacity of the client event broadcast channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Publish our own feed as soon as the room is joined
    #[serde(default = "default_auto_publish")]
    pub auto_publish: bool,

    /// Verbose wire logging
    #[serde(default)]
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            peer_list_interval_secs: default_peer_list_interval_secs(),
            bitrate_interval_ms: default_bitrate_interval_ms(),
            avatar_url: None,
            event_uri: None,
            event_channel_capacity: default_event_channel_capacity(),
            auto_publish: default_auto_publish(),
            debug: false,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_servers(mut self, servers: Vec<String>) -> Self {
        self.servers = servers;
        self
    }

    /// Build the usual WebSocket + HTTP pair for `host`
    pub fn with_host(mut self, host: &str) -> Self {
        self.servers = vec![format!("wss://{}:8989", host), format!("https://{}:8089/janus", host)];
        self
    }

    pub fn with_peer_list_interval(mut self, interval: Duration) -> Self {
        self.peer_list_interval_secs = interval.as_secs();
        self
    }

    pub fn with_bitrate_interval(mut self, interval: Duration) -> Self {
        self.bitrate_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    pub fn with_event_uri(mut self, uri: impl Into<String>) -> Self {
        self.event_uri = Some(uri.into());
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn with_auto_publish(mut self, enabled: bool) -> Self {
        self.auto_publish = enabled;
        self
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn peer_list_interval(&self) -> Duration {
        Duration::from_secs(self.peer_list_interval_secs)
    }

    pub fn bitrate_interval(&self) -> Duration {
        Duration::from_millis(self.bitrate_interval_ms)
    }

    /// Notification icon for `username`, if an avatar prefix is configured
    pub fn avatar_for(&self, username: &str) -> Option<String> {
        self.avatar_url.as_ref().map(|prefix| format!("{}{}", prefix, username))
    }

    pub fn from_yaml_str(yaml: &str) -> ClientResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file, or JSON when the file name ends in `.json`
    pub fn from_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClientError::config(format!("cannot read {}: {}", path.display(), e)))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| ClientError::config(e.to_string()))?
        } else {
            serde_yaml::from_str(&contents)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.servers.is_empty() {
            return Err(ClientError::config("at least one server is required"));
        }
        for server in &self.servers {
            let url = Url::parse(server).map_err(|e| ClientError::config(format!("invalid server {}: {}", server, e)))?;
            if !matches!(url.scheme(), "ws" | "wss" | "http" | "https") {
                return Err(ClientError::config(format!("unsupported scheme in {}", server)));
            }
        }
        if self.peer_list_interval_secs == 0 {
            return Err(ClientError::config("peer_list_interval_secs must be positive"));
        }
        if self.bitrate_interval_ms == 0 {
            return Err(ClientError::config("bitrate_interval_ms must be positive"));
        }
        if self.event_channel_capacity == 0 {
            return Err(ClientError::config("event_channel_capacity must be positive"));
        }
        if let Some(uri) = &self.event_uri {
            Url::parse(uri).map_err(|e| ClientError::config(format!("invalid event_uri {}: {}", uri, e)))?;
        }
        Ok(())
    }
}
