//! Configuration for the relay.
//!
//! All knobs are resolved once at startup into a [`RelayConfig`] that is
//! passed into the limiter, pool, and engine constructors. Core logic never
//! reads the environment; only [`RelayConfig::from_env`] does, with the
//! priority: environment variable, then built-in default. Per-call overrides
//! (e.g. a tool-supplied timeout) are applied by the caller on top of the
//! resolved config.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_ADDRESS` | `127.0.0.1:22` | Target in `host:port` form (port optional) |
//! | `SSH_USERNAME` | `root` | Remote principal |
//! | `SSH_PASSWORD` | unset | Password credential (optional) |
//! | `SSH_KEY_PATH` | unset | Private key file (optional) |
//! | `SSH_CONNECT_TIMEOUT` | 30s | Connection/handshake timeout in seconds |
//! | `SSH_COMMAND_TIMEOUT` | 180s | Default command execution timeout in seconds |
//! | `SSH_COMPRESSION` | true | Enable zlib compression |
//! | `RATE_LIMIT_ENABLED` | true | Gate operations through the admission window |
//! | `RATE_LIMIT_MAX` | 30 | Max admitted requests per window |
//! | `RATE_LIMIT_WINDOW_MS` | 60000ms | Trailing admission window |
//! | `POOL_ENABLED` | true | Reuse idle sessions |
//! | `POOL_MAX_SIZE` | 4 | Max idle sessions kept per target |
//! | `POOL_IDLE_TTL_MS` | 300000ms | Idle expiry for pooled sessions |
//! | `MAX_COMMAND_LEN` | 8192 | Command policy: max accepted command length |

use std::env;
use std::time::Duration;

/// Default SSH connection timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default command execution timeout in seconds
pub(crate) const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 180;

/// Default max admitted requests per window
pub(crate) const DEFAULT_RATE_LIMIT_MAX: usize = 30;

/// Default trailing admission window in milliseconds
pub(crate) const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 60_000;

/// Default max idle sessions kept per target
pub(crate) const DEFAULT_POOL_MAX_SIZE: usize = 4;

/// Default idle expiry for pooled sessions in milliseconds
pub(crate) const DEFAULT_POOL_IDLE_TTL_MS: u64 = 300_000;

/// Default command policy length cap
pub(crate) const DEFAULT_MAX_COMMAND_LEN: usize = 8192;

pub(crate) const ADDRESS_ENV_VAR: &str = "SSH_ADDRESS";
pub(crate) const USERNAME_ENV_VAR: &str = "SSH_USERNAME";
pub(crate) const PASSWORD_ENV_VAR: &str = "SSH_PASSWORD";
pub(crate) const KEY_PATH_ENV_VAR: &str = "SSH_KEY_PATH";
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_CONNECT_TIMEOUT";
pub(crate) const COMMAND_TIMEOUT_ENV_VAR: &str = "SSH_COMMAND_TIMEOUT";
pub(crate) const COMPRESSION_ENV_VAR: &str = "SSH_COMPRESSION";
pub(crate) const RATE_LIMIT_ENABLED_ENV_VAR: &str = "RATE_LIMIT_ENABLED";
pub(crate) const RATE_LIMIT_MAX_ENV_VAR: &str = "RATE_LIMIT_MAX";
pub(crate) const RATE_LIMIT_WINDOW_MS_ENV_VAR: &str = "RATE_LIMIT_WINDOW_MS";
pub(crate) const POOL_ENABLED_ENV_VAR: &str = "POOL_ENABLED";
pub(crate) const POOL_MAX_SIZE_ENV_VAR: &str = "POOL_MAX_SIZE";
pub(crate) const POOL_IDLE_TTL_MS_ENV_VAR: &str = "POOL_IDLE_TTL_MS";
pub(crate) const MAX_COMMAND_LEN_ENV_VAR: &str = "MAX_COMMAND_LEN";

/// One remote target: where to connect and as whom.
#[derive(Debug, Clone)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key_path: Option<String>,
}

impl Target {
    /// Pool key for this target. Credentials are intentionally excluded so a
    /// password rotation does not strand pooled sessions under a stale key.
    pub fn key(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Transport-level knobs consumed by the connector.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub compress: bool,
}

/// Admission window configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max: usize,
    pub window: Duration,
}

/// Session pool configuration.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub enabled: bool,
    pub max_size: usize,
    pub idle_ttl: Duration,
}

/// Command policy configuration.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub max_command_len: usize,
}

/// Everything the relay core needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub target: Target,
    pub transport: TransportConfig,
    pub command_timeout: Duration,
    pub rate_limit: RateLimitConfig,
    pub pool: PoolConfig,
    pub policy: PolicyConfig,
}

impl RelayConfig {
    /// Build the configuration from the environment, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let address = env_string(ADDRESS_ENV_VAR).unwrap_or_else(|| "127.0.0.1:22".to_string());
        let (host, port) = crate::relay::transport::parse_address(&address)
            .unwrap_or_else(|_| (address.clone(), 22));

        Self {
            target: Target {
                host,
                port,
                username: env_string(USERNAME_ENV_VAR).unwrap_or_else(|| "root".to_string()),
                password: env_string(PASSWORD_ENV_VAR),
                key_path: env_string(KEY_PATH_ENV_VAR),
            },
            transport: TransportConfig {
                connect_timeout: Duration::from_secs(env_u64(
                    CONNECT_TIMEOUT_ENV_VAR,
                    DEFAULT_CONNECT_TIMEOUT_SECS,
                )),
                compress: env_bool(COMPRESSION_ENV_VAR, true),
            },
            command_timeout: Duration::from_secs(env_u64(
                COMMAND_TIMEOUT_ENV_VAR,
                DEFAULT_COMMAND_TIMEOUT_SECS,
            )),
            rate_limit: RateLimitConfig {
                enabled: env_bool(RATE_LIMIT_ENABLED_ENV_VAR, true),
                max: env_usize(RATE_LIMIT_MAX_ENV_VAR, DEFAULT_RATE_LIMIT_MAX),
                window: Duration::from_millis(env_u64(
                    RATE_LIMIT_WINDOW_MS_ENV_VAR,
                    DEFAULT_RATE_LIMIT_WINDOW_MS,
                )),
            },
            pool: PoolConfig {
                enabled: env_bool(POOL_ENABLED_ENV_VAR, true),
                max_size: env_usize(POOL_MAX_SIZE_ENV_VAR, DEFAULT_POOL_MAX_SIZE),
                idle_ttl: Duration::from_millis(env_u64(
                    POOL_IDLE_TTL_MS_ENV_VAR,
                    DEFAULT_POOL_IDLE_TTL_MS,
                )),
            },
            policy: PolicyConfig {
                max_command_len: env_usize(MAX_COMMAND_LEN_ENV_VAR, DEFAULT_MAX_COMMAND_LEN),
            },
        }
    }

    /// Effective command timeout for one call: explicit override wins over
    /// the configured default.
    pub fn effective_command_timeout(&self, override_secs: Option<u64>) -> Duration {
        match override_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.command_timeout,
        }
    }
}

fn env_string(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.is_empty())
}

fn env_u64(var: &str, default: u64) -> u64 {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(var: &str, default: usize) -> usize {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_bool(var: &str, default: bool) -> bool {
    match env::var(var) {
        Ok(v) => v.eq_ignore_ascii_case("true") || v == "1",
        Err(_) => default,
    }
}
