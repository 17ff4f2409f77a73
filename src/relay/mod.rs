//! SSH relay: remote command execution and file transfer for LLM-agent
//! callers, behind a fixed configured target.
//!
//! This module is organized into the following submodules:
//!
//! - `types`: Serializable response types for MCP tools
//! - `config`: Injected configuration, built from the environment at startup
//! - `error`: Error taxonomy and transient/permanent classification
//! - `policy`: Command sanitation and shell quoting
//! - `paths`: Local path validation for transfers
//! - `limiter`: Sliding-window admission control
//! - `pool`: Bounded LIFO session pool with idle expiry
//! - `transport`: SSH connect/auth/exec/SFTP behind the session traits
//! - `audit`: Per-operation outcome records
//! - `engine`: The per-request pipeline tying the above together
//! - `commands`: MCP tool implementations

pub mod audit;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod limiter;
pub mod paths;
pub mod policy;
pub mod pool;
#[cfg(test)]
pub(crate) mod testing;
pub mod transport;
pub mod types;

pub use commands::{DefaultEngine, RelayTools};
pub use config::RelayConfig;
pub use engine::Engine;
pub use error::RelayError;
