//! Execution engine: runs one remote operation against a pooled session
//! under a deadline.
//!
//! Per-request pipeline: policy/path validation, admission, session acquire,
//! dispatch, terminal outcome. The execution deadline starts at dispatch —
//! time spent waiting for a session is not charged against it. Exactly one
//! terminal outcome fires per request: the deadline timer, caller
//! cancellation, and normal completion race inside a single `select!`, so
//! double-reporting is impossible by construction.
//!
//! Timeout and cancellation do not just drop the connection. The engine
//! issues a best-effort remote termination (`pkill` against the original
//! command text — pattern-matched, since the remote process handle is not
//! addressable) bounded by [`ABORT_TIMEOUT`], then discards the session.
//! Worst-case teardown is therefore the command timeout plus
//! [`ABORT_TIMEOUT`]. The abort attempt is cleanup only: whatever it does,
//! the caller sees the original timeout (or cancellation) failure.
//!
//! Session hygiene: a session is returned to the pool only after a fully
//! successful operation. Any failure — non-zero exit, transport fault,
//! timeout, cancellation, remote path error — leaves the session in an
//! unknown state and it is discarded.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::relay::audit::{AuditSink, OperationKind, OutcomeRecord, OutcomeStatus};
use crate::relay::config::RelayConfig;
use crate::relay::error::RelayError;
use crate::relay::limiter::RateLimiter;
use crate::relay::paths;
use crate::relay::policy;
use crate::relay::pool::SessionPool;
use crate::relay::transport::{Connector, RemoteDirEntry, RemoteSession};

/// Bound on the best-effort remote abort after a deadline fires. Internal
/// constant, deliberately not part of the configuration surface.
pub const ABORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a successful command execution (exit status 0).
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub duration_ms: u64,
}

/// Result of a successful file transfer.
#[derive(Debug, Clone)]
pub struct TransferResult {
    pub bytes: u64,
    pub local_path: String,
    pub remote_path: String,
    pub duration_ms: u64,
}

/// Result of a successful directory listing.
#[derive(Debug, Clone)]
pub struct ListingResult {
    pub path: String,
    pub entries: Vec<RemoteDirEntry>,
    pub duration_ms: u64,
}

/// The execution engine. Owns the admission window and the session pool;
/// all configuration is injected at construction.
pub struct Engine<C: Connector, A: AuditSink> {
    config: RelayConfig,
    limiter: RateLimiter,
    pool: SessionPool<C>,
    audit: A,
}

impl<C: Connector, A: AuditSink> Engine<C, A> {
    pub fn new(config: RelayConfig, connector: C, audit: A) -> Self {
        let limiter = RateLimiter::new(config.rate_limit);
        let pool = SessionPool::new(config.pool, connector);
        Self {
            config,
            limiter,
            pool,
            audit,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn pool(&self) -> &SessionPool<C> {
        &self.pool
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Close all pooled sessions. Idempotent.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    /// Execute one remote command under the configured (or overridden)
    /// deadline, with optional caller cancellation.
    pub async fn run_command(
        &self,
        command: &str,
        timeout_secs: Option<u64>,
        cancel: Option<CancellationToken>,
    ) -> Result<CommandResult, RelayError> {
        let cleaned = policy::sanitize(command, &self.config.policy)
            .map_err(|e| self.reject(OperationKind::Execute, command, e))?;

        self.admit(OperationKind::Execute, &cleaned)?;

        let session = match self.pool.acquire(&self.config.target).await {
            Ok(session) => session,
            Err(e) => return Err(self.fail(OperationKind::Execute, &cleaned, None, e, 0)),
        };

        let timeout = self.config.effective_command_timeout(timeout_secs);
        let cancel = cancel.unwrap_or_default();

        info!(command = %cleaned, timeout_ms = timeout.as_millis() as u64, "dispatching command");

        // Deadline starts at dispatch, not at request arrival.
        let started = Instant::now();

        let outcome: Result<crate::relay::transport::ExecOutput, RelayError> = tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(RelayError::Cancelled),

            res = tokio::time::timeout(timeout, session.exec(&cleaned)) => match res {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(RelayError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            },
        };

        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) if output.exit_code == 0 => {
                self.pool.release(&self.config.target, session).await;
                self.emit(
                    OperationKind::Execute,
                    &cleaned,
                    OutcomeStatus::Success,
                    Some(0),
                    None,
                    duration_ms,
                );
                Ok(CommandResult {
                    stdout: output.stdout,
                    duration_ms,
                })
            }
            Ok(output) => {
                // Non-zero exit: report stderr if present, else stdout, else
                // a generic message; the exit code travels in the error.
                let stderr = output.stderr.trim();
                let stdout = output.stdout.trim();
                let message = if !stderr.is_empty() {
                    stderr.to_string()
                } else if !stdout.is_empty() {
                    stdout.to_string()
                } else {
                    format!("command exited with code {}", output.exit_code)
                };
                let err = RelayError::RemoteExecution {
                    exit_code: output.exit_code,
                    message,
                };
                self.pool.discard(session).await;
                Err(self.fail(
                    OperationKind::Execute,
                    &cleaned,
                    Some(output.exit_code),
                    err,
                    duration_ms,
                ))
            }
            Err(err @ RelayError::Timeout { .. }) => {
                warn!(command = %cleaned, "deadline fired, attempting remote abort");
                self.abort_remote(&session, &cleaned).await;
                self.pool.discard(session).await;
                self.emit(
                    OperationKind::Execute,
                    &cleaned,
                    OutcomeStatus::Timeout,
                    None,
                    Some(err.to_string()),
                    duration_ms,
                );
                Err(err)
            }
            Err(RelayError::Cancelled) => {
                warn!(command = %cleaned, "cancelled by caller, attempting remote abort");
                self.abort_remote(&session, &cleaned).await;
                self.pool.discard(session).await;
                self.emit(
                    OperationKind::Execute,
                    &cleaned,
                    OutcomeStatus::Cancelled,
                    None,
                    Some(RelayError::Cancelled.to_string()),
                    duration_ms,
                );
                Err(RelayError::Cancelled)
            }
            Err(err) => {
                // Mid-operation transport failure.
                self.pool.discard(session).await;
                Err(self.fail(OperationKind::Execute, &cleaned, None, err, duration_ms))
            }
        }
    }

    /// Upload a local regular file to the remote path.
    pub async fn upload(&self, local: &str, remote: &str) -> Result<TransferResult, RelayError> {
        let detail = format!("{} -> {}", local, remote);

        let source = paths::validate_upload_source(local)
            .map_err(|e| self.reject(OperationKind::Upload, &detail, e))?;

        self.admit(OperationKind::Upload, &detail)?;

        let session = match self.pool.acquire(&self.config.target).await {
            Ok(session) => session,
            Err(e) => return Err(self.fail(OperationKind::Upload, &detail, None, e, 0)),
        };

        let started = Instant::now();
        let remote_path = expand_remote_home(&session, remote).await;

        match session.put(&source, &remote_path).await {
            Ok(bytes) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.pool.release(&self.config.target, session).await;
                self.emit(
                    OperationKind::Upload,
                    &detail,
                    OutcomeStatus::Success,
                    None,
                    None,
                    duration_ms,
                );
                Ok(TransferResult {
                    bytes,
                    local_path: local.to_string(),
                    remote_path,
                    duration_ms,
                })
            }
            Err(err) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.pool.discard(session).await;
                Err(self.fail(OperationKind::Upload, &detail, None, err, duration_ms))
            }
        }
    }

    /// Download a remote regular file to the local path.
    ///
    /// Validation order is deliberate: local target first, then a remote
    /// existence/type pre-check, then the transfer — so a failure is
    /// attributed to local misconfiguration or remote absence rather than
    /// surfacing as an opaque transfer error.
    pub async fn download(&self, remote: &str, local: &str) -> Result<TransferResult, RelayError> {
        let detail = format!("{} -> {}", remote, local);

        let target_path = paths::validate_download_target(local)
            .map_err(|e| self.reject(OperationKind::Download, &detail, e))?;

        self.admit(OperationKind::Download, &detail)?;

        let session = match self.pool.acquire(&self.config.target).await {
            Ok(session) => session,
            Err(e) => return Err(self.fail(OperationKind::Download, &detail, None, e, 0)),
        };

        let started = Instant::now();
        let remote_path = expand_remote_home(&session, remote).await;

        let precheck = match session.stat(&remote_path).await {
            Ok(stat) if stat.is_dir => Err(RelayError::RemotePathInvalid {
                path: remote_path.clone(),
                reason: "is a directory, not a regular file".to_string(),
                suggestion: format!("pass a file path, or list it with list_files {}", remote_path),
            }),
            Ok(stat) if !stat.is_regular => Err(RelayError::RemotePathInvalid {
                path: remote_path.clone(),
                reason: "not a regular file".to_string(),
                suggestion: "only regular files can be downloaded".to_string(),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };

        if let Err(err) = precheck {
            let duration_ms = started.elapsed().as_millis() as u64;
            self.pool.discard(session).await;
            return Err(self.fail(OperationKind::Download, &detail, None, err, duration_ms));
        }

        match session.get(&remote_path, &target_path).await {
            Ok(bytes) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.pool.release(&self.config.target, session).await;
                self.emit(
                    OperationKind::Download,
                    &detail,
                    OutcomeStatus::Success,
                    None,
                    None,
                    duration_ms,
                );
                Ok(TransferResult {
                    bytes,
                    local_path: local.to_string(),
                    remote_path,
                    duration_ms,
                })
            }
            Err(err) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.pool.discard(session).await;
                Err(self.fail(OperationKind::Download, &detail, None, err, duration_ms))
            }
        }
    }

    /// List one remote directory, non-recursively.
    pub async fn list_files(&self, remote: &str) -> Result<ListingResult, RelayError> {
        self.admit(OperationKind::ListFiles, remote)?;

        let session = match self.pool.acquire(&self.config.target).await {
            Ok(session) => session,
            Err(e) => return Err(self.fail(OperationKind::ListFiles, remote, None, e, 0)),
        };

        let started = Instant::now();
        let remote_path = expand_remote_home(&session, remote).await;

        match session.list_dir(&remote_path).await {
            Ok(entries) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.pool.release(&self.config.target, session).await;
                self.emit(
                    OperationKind::ListFiles,
                    remote,
                    OutcomeStatus::Success,
                    None,
                    None,
                    duration_ms,
                );
                Ok(ListingResult {
                    path: remote_path,
                    entries,
                    duration_ms,
                })
            }
            Err(err) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.pool.discard(session).await;
                Err(self.fail(OperationKind::ListFiles, remote, None, err, duration_ms))
            }
        }
    }

    /// Best-effort remote termination of a command that outlived its
    /// deadline, bounded by [`ABORT_TIMEOUT`]. Never surfaced to the caller.
    async fn abort_remote(&self, session: &C::Session, command: &str) {
        let kill = format!("pkill -f -- {}", policy::sh_escape(command));
        match tokio::time::timeout(ABORT_TIMEOUT, session.exec(&kill)).await {
            Ok(Ok(output)) => {
                debug!(exit_code = output.exit_code, "remote abort attempt finished")
            }
            Ok(Err(e)) => debug!("remote abort attempt failed: {}", e),
            Err(_) => debug!("remote abort attempt timed out after {:?}", ABORT_TIMEOUT),
        }
    }

    fn admit(&self, operation: OperationKind, detail: &str) -> Result<(), RelayError> {
        self.limiter
            .check()
            .map_err(|e| self.reject(operation, detail, e))
    }

    /// Audit a pre-network rejection and hand the error back.
    fn reject(&self, operation: OperationKind, detail: &str, err: RelayError) -> RelayError {
        self.emit(
            operation,
            detail,
            OutcomeStatus::Rejected,
            None,
            Some(err.to_string()),
            0,
        );
        err
    }

    /// Audit a failed operation and hand the error back.
    fn fail(
        &self,
        operation: OperationKind,
        detail: &str,
        exit_code: Option<i32>,
        err: RelayError,
        duration_ms: u64,
    ) -> RelayError {
        self.emit(
            operation,
            detail,
            OutcomeStatus::Failure,
            exit_code,
            Some(err.to_string()),
            duration_ms,
        );
        err
    }

    fn emit(
        &self,
        operation: OperationKind,
        detail: &str,
        status: OutcomeStatus,
        exit_code: Option<i32>,
        error: Option<String>,
        duration_ms: u64,
    ) {
        let record =
            OutcomeRecord::new(operation, detail, status, exit_code, error, duration_ms);
        self.audit.record(&record);
    }
}

/// Expand a home-relative remote path to an absolute one via the session's
/// realpath facility.
///
/// Expansion failure is non-fatal and falls back to the original path:
/// compatible with servers that reject realpath, but it masks genuine
/// expansion errors as "path was already fine", so the fallback is traced.
async fn expand_remote_home<S: RemoteSession>(session: &S, path: &str) -> String {
    if !paths::is_home_relative(path) {
        return path.to_string();
    }

    match session.realpath(".").await {
        Ok(home) => paths::join_home(&home, path),
        Err(e) => {
            debug!(path = %path, "home expansion failed, using path as-is: {}", e);
            path.to_string()
        }
    }
}
