//! Configuration for the RPC provider.
//!
//! Two layers live here: tuning constants (`ProviderDefaults`,
//! `ChannelDefaults`) and the runtime `ProviderConfig`, which is read once at
//! startup from a `key=value` file and handed to the provider by value.
//!
//! ```text
//! # provider.conf
//! rpcserverip=127.0.0.1
//! rpcserverport=8000
//! worker_threads=4
//! ```
//!
//! Any key can be overridden from the environment with an `RPCHOST_` prefix,
//! e.g. `RPCHOST_RPCSERVERPORT=9000`.

use crate::{Result, RpcError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Provider tuning defaults.
pub struct ProviderDefaults;

impl ProviderDefaults {
    pub const WORKER_THREADS: usize = 4;
    pub const READ_BUFFER_SIZE: usize = 64 * 1024;
    pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
    pub const ENV_PREFIX: &'static str = "RPCHOST";
}

/// Consumer-side defaults.
pub struct ChannelDefaults;

impl ChannelDefaults {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Configuration file keys.
pub struct ConfigKeys;

impl ConfigKeys {
    pub const SERVER_IP: &'static str = "rpcserverip";
    pub const SERVER_PORT: &'static str = "rpcserverport";
    pub const WORKER_THREADS: &'static str = "worker_threads";
    pub const READ_BUFFER_SIZE: &'static str = "read_buffer_size";
    pub const IDLE_TIMEOUT_SECS: &'static str = "idle_timeout_secs";
}

/// A source of string configuration values looked up by key.
pub trait ConfigSource {
    fn load(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn load(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Configuration loaded from a `key=value` file plus environment overrides.
#[derive(Debug)]
pub struct FileConfig {
    inner: config::Config,
}

impl FileConfig {
    /// Load a configuration file. Lines are `key=value`; `#` and `;` start
    /// comments. Keys are case-insensitive.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RpcError::Config {
                message: format!("config file not found: {}", path.display()),
            });
        }

        let inner = config::Config::builder()
            .add_source(config::File::new(
                &path.to_string_lossy(),
                config::FileFormat::Ini,
            ))
            .add_source(config::Environment::with_prefix(ProviderDefaults::ENV_PREFIX))
            .build()?;

        Ok(Self { inner })
    }
}

impl ConfigSource for FileConfig {
    fn load(&self, key: &str) -> Option<String> {
        self.inner.get_string(key).ok()
    }
}

/// Runtime configuration for an `RpcProvider`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Address to listen on
    pub ip: String,
    /// Port to listen on (0 = auto-assign)
    pub port: u16,
    /// Number of worker loops; each owns the connections assigned to it
    pub worker_threads: usize,
    /// Size of the single read performed per connection
    pub read_buffer_size: usize,
    /// How long a connection whose request was dropped stays open waiting
    /// for the peer to close it
    pub idle_timeout: Duration,
}

impl ProviderConfig {
    /// Create a configuration with default tuning.
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            worker_threads: ProviderDefaults::WORKER_THREADS,
            read_buffer_size: ProviderDefaults::READ_BUFFER_SIZE,
            idle_timeout: ProviderDefaults::IDLE_TIMEOUT,
        }
    }

    /// Load the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = FileConfig::open(path)?;
        Self::from_source(&source)
    }

    /// Build a configuration from any key/value source.
    ///
    /// `rpcserverip` and `rpcserverport` are required; the tuning keys fall
    /// back to `ProviderDefaults`.
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let ip = require(source, ConfigKeys::SERVER_IP)?;
        let port = parse_key::<u16>(source, ConfigKeys::SERVER_PORT)?.ok_or_else(|| {
            RpcError::Config {
                message: format!("missing required key: {}", ConfigKeys::SERVER_PORT),
            }
        })?;

        let mut config = Self::new(ip, port);

        if let Some(threads) = parse_key::<usize>(source, ConfigKeys::WORKER_THREADS)? {
            config.worker_threads = threads;
        }
        if let Some(size) = parse_key::<usize>(source, ConfigKeys::READ_BUFFER_SIZE)? {
            config.read_buffer_size = size;
        }
        if let Some(secs) = parse_key::<u64>(source, ConfigKeys::IDLE_TIMEOUT_SECS)? {
            config.idle_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Check the tuning values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(RpcError::Config {
                message: format!("{} must be at least 1", ConfigKeys::WORKER_THREADS),
            });
        }
        if self.read_buffer_size < 4 {
            return Err(RpcError::Config {
                message: format!(
                    "{} must hold at least the 4-byte length prefix",
                    ConfigKeys::READ_BUFFER_SIZE
                ),
            });
        }
        Ok(())
    }

    /// Resolve the listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.ip, self.port)
            .parse()
            .map_err(|e| RpcError::Config {
                message: format!("invalid listen address {}:{}: {}", self.ip, self.port, e),
            })
    }
}

fn require(source: &dyn ConfigSource, key: &str) -> Result<String> {
    match source.load(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(RpcError::Config {
            message: format!("missing required key: {}", key),
        }),
    }
}

fn parse_key<T>(source: &dyn ConfigSource, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = source.load(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>().map(Some).map_err(|e| RpcError::Config {
        message: format!("invalid value for {}: {:?} ({})", key, raw, e),
    })
}
