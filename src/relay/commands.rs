//! MCP tool implementations for the SSH relay.
//!
//! - `ssh_run`: Execute one command on the configured host under a deadline
//! - `ssh_upload`: Upload a local file over the file channel
//! - `ssh_download`: Download a remote file over the file channel
//! - `ssh_list_files`: List one remote directory, non-recursively
//! - `ssh_status`: Report pool and admission-window state
//!
//! Every tool is a single self-contained request against the configured
//! target. There is no connect/disconnect surface and no session handle in
//! the API; sessions live in the pool behind the engine. Failures are
//! rendered as strings carrying the error kind and, for transient faults, a
//! retry hint — the relay itself never retries.

use std::sync::Arc;

use poem_mcpserver::{Tools, tool::StructuredContent};
use tracing::info;

use crate::relay::audit::TracingAuditSink;
use crate::relay::engine::Engine;
use crate::relay::error::RelayError;
use crate::relay::transport::SshConnector;
use crate::relay::types::{
    FileEntry, ListFilesResponse, RelayStatusResponse, RunCommandResponse, TransferResponse,
};

/// Engine wired to the real SSH transport and tracing audit sink.
pub type DefaultEngine = Engine<SshConnector, TracingAuditSink>;

/// MCP tool surface over a shared engine.
pub struct RelayTools {
    engine: Arc<DefaultEngine>,
}

impl RelayTools {
    pub fn new(engine: Arc<DefaultEngine>) -> Self {
        Self { engine }
    }
}

#[Tools]
impl RelayTools {
    /// Execute a shell command on the configured SSH host.
    ///
    /// Blocks until the command finishes or the deadline fires. A non-zero
    /// exit status is reported as an error carrying the exit code and
    /// stderr. On timeout the remote process receives a best-effort kill
    /// and the connection is torn down.
    async fn ssh_run(
        &self,
        /// Shell command to execute on the remote host
        command: String,
        /// Deadline in seconds for this command (default: 180, env: SSH_COMMAND_TIMEOUT)
        timeout_secs: Option<u64>,
    ) -> Result<StructuredContent<RunCommandResponse>, String> {
        let result = self
            .engine
            .run_command(&command, timeout_secs, None)
            .await
            .map_err(render_error)?;

        Ok(StructuredContent(RunCommandResponse {
            stdout: result.stdout,
            duration_ms: result.duration_ms,
        }))
    }

    /// Upload a local file to the remote host.
    ///
    /// The local path must name an existing readable regular file. A
    /// leading `~/` in the remote path is expanded against the remote home
    /// directory.
    async fn ssh_upload(
        &self,
        /// Path of the local file to send
        local_path: String,
        /// Destination path on the remote host ("~/..." is expanded)
        remote_path: String,
    ) -> Result<StructuredContent<TransferResponse>, String> {
        let result = self
            .engine
            .upload(&local_path, &remote_path)
            .await
            .map_err(render_error)?;

        info!(
            bytes = result.bytes,
            remote = %result.remote_path,
            "upload complete"
        );
        Ok(StructuredContent(TransferResponse {
            bytes: result.bytes,
            local_path: result.local_path,
            remote_path: result.remote_path,
            duration_ms: result.duration_ms,
        }))
    }

    /// Download a remote file to a local path.
    ///
    /// The remote path must name an existing regular file and the local
    /// parent directory must exist and be writable.
    async fn ssh_download(
        &self,
        /// Path of the remote file to fetch ("~/..." is expanded)
        remote_path: String,
        /// Local destination path; the parent directory must already exist
        local_path: String,
    ) -> Result<StructuredContent<TransferResponse>, String> {
        let result = self
            .engine
            .download(&remote_path, &local_path)
            .await
            .map_err(render_error)?;

        info!(
            bytes = result.bytes,
            remote = %result.remote_path,
            "download complete"
        );
        Ok(StructuredContent(TransferResponse {
            bytes: result.bytes,
            local_path: result.local_path,
            remote_path: result.remote_path,
            duration_ms: result.duration_ms,
        }))
    }

    /// List the entries of a remote directory, non-recursively.
    async fn ssh_list_files(
        &self,
        /// Remote directory to list ("~/..." is expanded)
        remote_path: String,
    ) -> Result<StructuredContent<ListFilesResponse>, String> {
        let listing = self
            .engine
            .list_files(&remote_path)
            .await
            .map_err(render_error)?;

        let entries: Vec<FileEntry> = listing.entries.into_iter().map(FileEntry::from).collect();
        let count = entries.len();
        Ok(StructuredContent(ListFilesResponse {
            path: listing.path,
            entries,
            count,
            duration_ms: listing.duration_ms,
        }))
    }

    /// Report relay status: configured target, pool occupancy, and the
    /// current admission window.
    async fn ssh_status(&self) -> Result<StructuredContent<RelayStatusResponse>, String> {
        let config = self.engine.config();
        let rate_window_max = if config.rate_limit.enabled {
            config.rate_limit.max
        } else {
            0
        };

        Ok(StructuredContent(RelayStatusResponse {
            target: config.target.key(),
            idle_sessions: self.engine.pool().idle_count(),
            connections_opened: self.engine.pool().opened_count(),
            rate_window_occupancy: self.engine.limiter().occupancy(),
            rate_window_max,
            command_timeout_secs: config.command_timeout.as_secs(),
        }))
    }
}

/// Render an error for the tool caller: kind tag, message, and a retry hint
/// for transient faults. The relay never retries on its own.
fn render_error(err: RelayError) -> String {
    if err.is_transient() {
        format!("[{}] {} (transient: retrying may succeed)", err.kind(), err)
    } else {
        format!("[{}] {}", err.kind(), err)
    }
}
