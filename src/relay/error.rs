//! Error taxonomy for relay operations.
//!
//! Every failure a caller can observe maps onto one [`RelayError`] variant:
//!
//! - [`RelayError::InvalidCommand`] — command policy rejection (empty,
//!   oversized, forbidden pattern). Detected before any network call.
//! - [`RelayError::RateLimitExceeded`] — admission denied; carries the
//!   configured limit for caller diagnostics.
//! - [`RelayError::Connection`] — session creation or mid-operation
//!   transport failure.
//! - [`RelayError::RemoteExecution`] — the command ran and exited non-zero.
//! - [`RelayError::Timeout`] — the execution deadline fired. Distinct from
//!   `RemoteExecution` even though both are "failures".
//! - [`RelayError::Cancelled`] — the caller cancelled a running command.
//! - [`RelayError::LocalPathInvalid`] / [`RelayError::RemotePathInvalid`] —
//!   pre-flight path validation failures, each carrying a remediation
//!   suggestion since these are the most actionable failures in practice.
//!
//! The core never retries any of these. [`RelayError::is_transient`]
//! classifies connection failures so callers can implement their own retry
//! policy; authentication failures are classified as permanent to avoid
//! account lockouts.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Command rejected by policy before any network interaction.
    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },

    /// Admission denied: more than `max` requests within the trailing window.
    #[error("rate limit exceeded: {max} requests per {window_ms}ms")]
    RateLimitExceeded { max: usize, window_ms: u64 },

    /// Session creation or mid-operation transport failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// The remote command exited with a non-zero status.
    #[error("remote command failed with exit code {exit_code}: {message}")]
    RemoteExecution { exit_code: i32, message: String },

    /// The execution deadline elapsed before the remote process finished.
    #[error("command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The caller cancelled the command while it was running.
    #[error("command cancelled by caller")]
    Cancelled,

    /// A local path failed pre-flight validation.
    #[error("invalid local path {path}: {reason} ({suggestion})")]
    LocalPathInvalid {
        path: String,
        reason: String,
        suggestion: String,
    },

    /// A remote path failed the pre-transfer check.
    #[error("invalid remote path {path}: {reason} ({suggestion})")]
    RemotePathInvalid {
        path: String,
        reason: String,
        suggestion: String,
    },
}

/// Authentication error patterns that indicate permanent failures.
///
/// These will never succeed on a retry and retrying them risks locking out
/// the account.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "password authentication failed",
    "key authentication failed",
    "agent authentication failed",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
];

/// Connection error patterns that indicate transient failures.
const TRANSIENT_ERRORS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "timeout",
    "network is unreachable",
    "no route to host",
    "host is down",
    "temporary failure",
    "resource temporarily unavailable",
    "handshake failed",
    "failed to connect",
    "broken pipe",
    "would block",
];

impl RelayError {
    /// Whether this failure is plausibly transient.
    ///
    /// The core never retries; this is advisory for callers that want to.
    /// Only [`RelayError::Connection`] is ever transient: the classification
    /// checks authentication patterns first (never transient), then known
    /// transient network patterns, and for unknown messages treats anything
    /// that does not look like an SSH protocol error as transient.
    pub fn is_transient(&self) -> bool {
        match self {
            RelayError::Connection(message) => is_transient_message(message),
            _ => false,
        }
    }

    /// Short machine-readable kind tag used in audit records and responses.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::InvalidCommand { .. } => "invalid_command",
            RelayError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            RelayError::Connection(_) => "connection_error",
            RelayError::RemoteExecution { .. } => "remote_execution_failure",
            RelayError::Timeout { .. } => "timeout",
            RelayError::Cancelled => "cancelled",
            RelayError::LocalPathInvalid { .. } => "local_path_invalid",
            RelayError::RemotePathInvalid { .. } => "remote_path_invalid",
        }
    }
}

/// Classify a raw transport error message as transient or permanent.
///
/// Authentication patterns take precedence: a message containing both
/// authentication and connection keywords is permanent.
pub(crate) fn is_transient_message(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    for auth_err in AUTH_ERRORS {
        if error_lower.contains(auth_err) {
            return false;
        }
    }

    for transient_err in TRANSIENT_ERRORS {
        if error_lower.contains(transient_err) {
            return true;
        }
    }

    // Unknown errors default to transient unless they look like SSH protocol
    // errors without a connection/timeout component.
    !error_lower.contains("ssh")
        || error_lower.contains("timeout")
        || error_lower.contains("connect")
}

#[cfg(test)]
mod tests {
    use super::*;

    mod auth_errors_not_transient {
        use super::*;

        #[test]
        fn test_authentication_failed() {
            assert!(!is_transient_message("Authentication failed"));
            assert!(!is_transient_message("authentication failed for user"));
        }

        #[test]
        fn test_permission_denied() {
            assert!(!is_transient_message("Permission denied"));
            assert!(!is_transient_message("permission denied (publickey)"));
        }

        #[test]
        fn test_auth_takes_precedence_over_connection() {
            assert!(!is_transient_message(
                "Connection timeout during authentication failed"
            ));
        }
    }

    mod connection_errors_transient {
        use super::*;

        #[test]
        fn test_connection_refused() {
            assert!(is_transient_message("Connection refused"));
            assert!(is_transient_message("connection refused by server"));
        }

        #[test]
        fn test_timeout() {
            assert!(is_transient_message("Operation timeout"));
            assert!(is_transient_message("connection timed out after 30s"));
        }

        #[test]
        fn test_network_unreachable() {
            assert!(is_transient_message("Network is unreachable"));
            assert!(is_transient_message("no route to host"));
        }

        #[test]
        fn test_broken_pipe() {
            assert!(is_transient_message("Broken pipe"));
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        fn test_unknown_error_without_ssh_is_transient() {
            assert!(is_transient_message("Something went wrong"));
        }

        #[test]
        fn test_ssh_protocol_error_not_transient() {
            assert!(!is_transient_message("SSH protocol error"));
            assert!(!is_transient_message("SSH version mismatch"));
        }

        #[test]
        fn test_ssh_with_connect_is_transient() {
            assert!(is_transient_message("SSH failed to connect"));
        }
    }

    mod relay_error {
        use super::*;

        #[test]
        fn test_only_connection_errors_are_transient() {
            assert!(RelayError::Connection("connection refused".into()).is_transient());
            assert!(!RelayError::Connection("permission denied".into()).is_transient());
            assert!(
                !RelayError::Timeout { timeout_ms: 100 }.is_transient(),
                "timeouts are terminal per-attempt, not transport-transient"
            );
            assert!(
                !RelayError::RemoteExecution {
                    exit_code: 1,
                    message: "boom".into()
                }
                .is_transient()
            );
        }

        #[test]
        fn test_display_carries_limits() {
            let err = RelayError::RateLimitExceeded {
                max: 3,
                window_ms: 5000,
            };
            assert_eq!(err.to_string(), "rate limit exceeded: 3 requests per 5000ms");
            assert_eq!(err.kind(), "rate_limit_exceeded");
        }

        #[test]
        fn test_path_errors_carry_suggestion() {
            let err = RelayError::LocalPathInvalid {
                path: "/tmp/out/file.txt".into(),
                reason: "parent directory does not exist".into(),
                suggestion: "create it with: mkdir -p /tmp/out".into(),
            };
            let rendered = err.to_string();
            assert!(rendered.contains("mkdir -p /tmp/out"));
            assert_eq!(err.kind(), "local_path_invalid");
        }
    }
}
