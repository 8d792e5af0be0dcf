//! Client configuration
//!
//! Configuration is an explicit value handed to the client at construction.
//! A process-wide default can be installed once at startup with
//! [`ClientConfig::install_default`]; individual mounts may override it
//! through [`MountOptions`](crate::engine::MountOptions).

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::stream::ReconnectPolicy;

/// Default base path for mount/update requests
pub const DEFAULT_ENDPOINT: &str = "/api/livego";

/// Default number of reconnect attempts before the push channel gives up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default base reconnect interval in milliseconds
pub const DEFAULT_BASE_INTERVAL_MS: u64 = 1000;

static GLOBAL_CONFIG: OnceLock<ClientConfig> = OnceLock::new();

/// Credential inclusion policy for requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Credentials {
    /// Send and store cookies for every request, cross-origin included
    #[default]
    Include,
    /// Send and store cookies only for requests to the configured origin
    SameOrigin,
    /// Never send or store cookies
    Omit,
}

impl Credentials {
    pub fn sends_cookies(&self) -> bool {
        !matches!(self, Credentials::Omit)
    }
}

/// Push channel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Base path the `/livego/stream` route hangs off (origin root by default)
    pub endpoint: String,
    pub reconnect: bool,
    pub max_attempts: u32,
    pub base_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            reconnect: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_interval_ms: DEFAULT_BASE_INTERVAL_MS,
        }
    }
}

impl StreamConfig {
    /// Path and query addressing the push channel for one component.
    pub fn stream_path(&self, component_id: &str, signature: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("component_id", component_id)
            .append_pair("signature", signature)
            .finish();
        format!(
            "{}/livego/stream?{}",
            self.endpoint.trim_end_matches('/'),
            query
        )
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.reconnect,
            max_attempts: self.max_attempts,
            base_interval: Duration::from_millis(self.base_interval_ms),
        }
    }
}

/// Transport configuration shared by mount, update and the push channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: String,
    pub credentials: Credentials,
    /// Extra headers; these win over the defaults on name collision
    pub headers: BTreeMap<String, String>,
    pub stream: StreamConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credentials: Credentials::default(),
            headers: BTreeMap::new(),
            stream: StreamConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Install the process-wide default.
    ///
    /// Only the first call succeeds; later calls hand the rejected value back.
    pub fn install_default(config: ClientConfig) -> Result<(), ClientConfig> {
        GLOBAL_CONFIG.set(config)
    }

    /// The installed process-wide default, or the built-in one.
    pub fn global() -> ClientConfig {
        GLOBAL_CONFIG.get().cloned().unwrap_or_default()
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn mount_path(&self) -> String {
        format!("{}/mount", self.endpoint.trim_end_matches('/'))
    }

    pub fn update_path(&self) -> String {
        format!("{}/update", self.endpoint.trim_end_matches('/'))
    }

    /// Default headers with the configured extras merged over them.
    ///
    /// Header names compare case-insensitively; the configured value wins.
    pub fn merged_headers(&self) -> Vec<(String, String)> {
        let mut merged: Vec<(String, String)> = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        for (name, value) in &self.headers {
            match merged
                .iter_mut()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            {
                Some(slot) => *slot = (name.clone(), value.clone()),
                None => merged.push((name.clone(), value.clone())),
            }
        }
        merged
    }
}
