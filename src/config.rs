//! Session configuration.
//!
//! The session core never asks anyone for values interactively. A
//! [`ConfigProvider`] hands it an already-resolved [`SessionConfig`];
//! where those values came from (code, environment, a JSON file, a UI
//! outside this crate) is the provider's business.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::PollPolicy;
use crate::store::Endpoint;
use crate::{Error, Result};

/// How the client-side load path moves rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientTransfer {
    /// Row inserts through `GraphStore::insert`.
    #[default]
    Insert,
    /// Arrow batches through the bulk-transfer writer.
    BulkWriter,
}

impl fmt::Display for ClientTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::BulkWriter => write!(f, "bulk_writer"),
        }
    }
}

/// Fully resolved session parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// Identity; normalized into the namespace name. Defaults to the OS user.
    pub userid: Option<String>,
    pub credentials: Option<String>,
    /// Reattach to an existing namespace instead of purging it.
    pub restore: bool,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    /// Create missing edge endpoints as single-key vertex frames.
    /// When false, a missing endpoint is a `NotFound` error.
    pub auto_create_endpoints: bool,
    pub client_transfer: ClientTransfer,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 4367,
            userid: None,
            credentials: None,
            restore: false,
            poll_interval_ms: 1000,
            max_polls: 600,
            auto_create_endpoints: true,
            client_transfer: ClientTransfer::Insert,
        }
    }
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Self::default() }
    }

    pub fn with_userid(mut self, userid: impl Into<String>) -> Self {
        self.userid = Some(userid.into());
        self
    }

    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    pub fn with_restore(mut self, restore: bool) -> Self {
        self.restore = restore;
        self
    }

    pub fn with_poll(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self.max_polls = max_polls;
        self
    }

    pub fn with_auto_create_endpoints(mut self, enabled: bool) -> Self {
        self.auto_create_endpoints = enabled;
        self
    }

    pub fn with_client_transfer(mut self, transfer: ClientTransfer) -> Self {
        self.client_transfer = transfer;
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_polls: self.max_polls,
        }
    }

    /// The configured identity, or the current OS user.
    pub fn identity(&self) -> Result<String> {
        self.userid
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .ok_or_else(|| Error::Config("no userid configured and no OS user found".into()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be greater than zero".into()));
        }
        if self.max_polls == 0 {
            return Err(Error::Config("max_polls must be greater than zero".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Source of already-resolved session configuration.
pub trait ConfigProvider {
    fn resolve(&self) -> Result<SessionConfig>;
}

impl ConfigProvider for SessionConfig {
    fn resolve(&self) -> Result<SessionConfig> {
        Ok(self.clone())
    }
}

/// Reads `<PREFIX>_HOST`, `_PORT`, `_USERID`, `_CREDENTIALS`, `_RESTORE`,
/// `_POLL_INTERVAL_MS` and `_MAX_POLLS` over the defaults.
#[derive(Clone)]
pub struct EnvProvider {
    prefix: String,
    lookup: Arc<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl fmt::Debug for EnvProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvProvider").field("prefix", &self.prefix).finish_non_exhaustive()
    }
}

impl EnvProvider {
    /// Read from the process environment.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_lookup(prefix, |name| std::env::var(name).ok())
    }

    /// Read variables through `lookup` instead of the process environment.
    pub fn with_lookup<F>(prefix: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self { prefix: prefix.into(), lookup: Arc::new(lookup) }
    }

    fn var(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{}_{name}", self.prefix))
    }

    fn parsed<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.var(name) {
            None => Ok(None),
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
                Error::Config(format!("{}_{name}: cannot parse '{raw}'", self.prefix))
            }),
        }
    }
}

impl ConfigProvider for EnvProvider {
    fn resolve(&self) -> Result<SessionConfig> {
        let mut config = SessionConfig::default();
        if let Some(host) = self.var("HOST") {
            config.host = host;
        }
        if let Some(port) = self.parsed("PORT")? {
            config.port = port;
        }
        config.userid = self.var("USERID").or(config.userid);
        config.credentials = self.var("CREDENTIALS").or(config.credentials);
        if let Some(restore) = self.parsed("RESTORE")? {
            config.restore = restore;
        }
        if let Some(ms) = self.parsed("POLL_INTERVAL_MS")? {
            config.poll_interval_ms = ms;
        }
        if let Some(n) = self.parsed("MAX_POLLS")? {
            config.max_polls = n;
        }
        Ok(config)
    }
}

/// Reads a JSON object; missing fields keep their defaults.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigProvider for JsonFileProvider {
    fn resolve(&self) -> Result<SessionConfig> {
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
