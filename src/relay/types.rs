//! Serializable response types for the MCP tool surface.
//!
//! All types implement `Serialize`, `Deserialize`, and `JsonSchema` for
//! proper MCP protocol compatibility.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::relay::transport::{RemoteDirEntry, RemoteEntryKind};

/// Response from ssh_run.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RunCommandResponse {
    /// Standard output of the command (exit status was 0)
    pub stdout: String,
    /// Wall-clock execution time in milliseconds, measured from dispatch
    pub duration_ms: u64,
}

/// Response from ssh_upload and ssh_download.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TransferResponse {
    /// Number of bytes transferred
    pub bytes: u64,
    pub local_path: String,
    /// Remote path after home-directory expansion
    pub remote_path: String,
    pub duration_ms: u64,
}

/// One entry of a remote directory listing.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FileEntry {
    pub name: String,
    /// "file", "directory", or "other" (sockets, devices, symlinks)
    pub kind: String,
    /// Size in bytes; 0 when the server does not report one
    pub size: u64,
    /// Modification time as a Unix timestamp, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_unix: Option<u64>,
}

impl From<RemoteDirEntry> for FileEntry {
    fn from(entry: RemoteDirEntry) -> Self {
        let kind = match entry.kind {
            RemoteEntryKind::File => "file",
            RemoteEntryKind::Directory => "directory",
            RemoteEntryKind::Other => "other",
        };
        Self {
            name: entry.name,
            kind: kind.to_string(),
            size: entry.size,
            modified_unix: entry.modified_unix,
        }
    }
}

/// Response from ssh_list_files.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListFilesResponse {
    /// Listed directory after home-directory expansion
    pub path: String,
    pub entries: Vec<FileEntry>,
    /// Total number of entries
    pub count: usize,
    pub duration_ms: u64,
}

/// Response from ssh_status.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RelayStatusResponse {
    /// Configured target as user@host:port (credentials excluded)
    pub target: String,
    /// Sessions currently idle in the pool
    pub idle_sessions: usize,
    /// Connections opened since startup
    pub connections_opened: u64,
    /// Requests admitted inside the current rate window
    pub rate_window_occupancy: usize,
    /// Admission window capacity; 0 means rate limiting is disabled
    pub rate_window_max: usize,
    /// Default command deadline in seconds
    pub command_timeout_secs: u64,
}
