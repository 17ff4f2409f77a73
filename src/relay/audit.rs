//! Outcome records and the audit sink seam.
//!
//! Every operation produces exactly one [`OutcomeRecord`] on its terminal
//! transition (plus one for admission/validation rejections, which never
//! reach the network). Records are immutable once constructed and are handed
//! to an [`AuditSink`]; sink behavior can never fail a relay operation, so
//! the trait is infallible by construction.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of operation a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Execute,
    Upload,
    Download,
    ListFiles,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Execute => write!(f, "execute"),
            OperationKind::Upload => write!(f, "upload"),
            OperationKind::Download => write!(f, "download"),
            OperationKind::ListFiles => write!(f, "list_files"),
        }
    }
}

/// Terminal status of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Completed with exit status 0 (or a successful transfer/listing).
    Success,
    /// Ran and failed: non-zero exit, transport fault, or remote path error.
    Failure,
    /// The execution deadline fired first.
    Timeout,
    /// The caller cancelled a running command.
    Cancelled,
    /// Rejected before any network interaction (admission or validation).
    Rejected,
}

/// Immutable structured result of one operation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OutcomeRecord {
    pub id: Uuid,
    /// RFC3339 timestamp of the terminal transition.
    pub timestamp: String,
    pub operation: OperationKind,
    /// Command text or the paths involved.
    pub detail: String,
    pub status: OutcomeStatus,
    /// Remote exit status, when one was observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl OutcomeRecord {
    pub fn new(
        operation: OperationKind,
        detail: impl Into<String>,
        status: OutcomeStatus,
        exit_code: Option<i32>,
        error: Option<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            operation,
            detail: detail.into(),
            status,
            exit_code,
            error,
            duration_ms,
        }
    }
}

/// Receives outcome records. Must never fail the operation that produced
/// them; implementations swallow their own errors.
pub trait AuditSink: Send + Sync + 'static {
    fn record(&self, record: &OutcomeRecord);
}

/// Default sink: structured tracing events.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &OutcomeRecord) {
        match record.status {
            OutcomeStatus::Success => tracing::info!(
                id = %record.id,
                operation = %record.operation,
                duration_ms = record.duration_ms,
                "operation succeeded"
            ),
            OutcomeStatus::Rejected => tracing::warn!(
                id = %record.id,
                operation = %record.operation,
                error = record.error.as_deref().unwrap_or(""),
                "operation rejected"
            ),
            _ => tracing::warn!(
                id = %record.id,
                operation = %record.operation,
                status = ?record.status,
                exit_code = record.exit_code,
                error = record.error.as_deref().unwrap_or(""),
                duration_ms = record.duration_ms,
                "operation failed"
            ),
        }
    }
}
