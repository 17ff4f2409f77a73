//! Local path validation for file transfers.
//!
//! Both checks run before any network interaction and return
//! [`RelayError::LocalPathInvalid`] with a remediation suggestion — these
//! are the highest-frequency, most actionable failures in practice.

use std::fs;
use std::path::PathBuf;

use crate::relay::error::RelayError;

/// Validate an upload source: must exist, be a regular file, and be
/// readable. Returns the path to stream from.
pub fn validate_upload_source(path: &str) -> Result<PathBuf, RelayError> {
    let source = PathBuf::from(path);

    let metadata = fs::metadata(&source).map_err(|e| RelayError::LocalPathInvalid {
        path: path.to_string(),
        reason: format!("cannot stat: {}", e),
        suggestion: "check that the file exists and the path is spelled correctly".to_string(),
    })?;

    if !metadata.is_file() {
        return Err(RelayError::LocalPathInvalid {
            path: path.to_string(),
            reason: "not a regular file".to_string(),
            suggestion: "pass a regular file, not a directory or special file".to_string(),
        });
    }

    // Readability probe; metadata alone does not prove read permission.
    fs::File::open(&source).map_err(|e| RelayError::LocalPathInvalid {
        path: path.to_string(),
        reason: format!("not readable: {}", e),
        suggestion: format!("check read permissions on {}", source.display()),
    })?;

    Ok(source)
}

/// Validate a download target: its parent directory must exist, be a
/// directory, and be writable. Returns the path to stream into.
pub fn validate_download_target(path: &str) -> Result<PathBuf, RelayError> {
    let target = PathBuf::from(path);

    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let metadata = fs::metadata(&parent).map_err(|_| RelayError::LocalPathInvalid {
        path: path.to_string(),
        reason: format!("parent directory {} does not exist", parent.display()),
        suggestion: format!("create it with: mkdir -p {}", parent.display()),
    })?;

    if !metadata.is_dir() {
        return Err(RelayError::LocalPathInvalid {
            path: path.to_string(),
            reason: format!("{} is not a directory", parent.display()),
            suggestion: "point the target inside an existing directory".to_string(),
        });
    }

    if metadata.permissions().readonly() {
        return Err(RelayError::LocalPathInvalid {
            path: path.to_string(),
            reason: format!("parent directory {} is not writable", parent.display()),
            suggestion: format!("check write permissions on {}", parent.display()),
        });
    }

    Ok(target)
}

/// Whether a remote path is home-relative and needs expansion.
pub fn is_home_relative(path: &str) -> bool {
    path == "~" || path.starts_with("~/")
}

/// Join a home directory and the suffix of a `~`-prefixed path.
pub fn join_home(home: &str, path: &str) -> String {
    if path == "~" {
        home.to_string()
    } else {
        format!("{}/{}", home.trim_end_matches('/'), &path[2..])
    }
}
