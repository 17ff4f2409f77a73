//! Command policy: sanitation and shell escaping.
//!
//! Sanitation runs before admission and before any network interaction.
//! Rejections are [`RelayError::InvalidCommand`]: empty input, input above
//! the configured length cap, or input containing a forbidden pattern.

use crate::relay::config::PolicyConfig;
use crate::relay::error::RelayError;

/// Substrings that are never allowed in a command, regardless of intent.
/// Deliberately short: this is a tripwire for catastrophic mistakes, not a
/// security boundary.
const FORBIDDEN_PATTERNS: &[&str] = &["rm -rf /", "mkfs", ":(){", "> /dev/sda"];

/// Validate and normalize one command per the configured policy.
///
/// Returns the trimmed command text on success.
pub fn sanitize(command: &str, config: &PolicyConfig) -> Result<String, RelayError> {
    let trimmed = command.trim();

    if trimmed.is_empty() {
        return Err(RelayError::InvalidCommand {
            reason: "command is empty".to_string(),
        });
    }

    if trimmed.len() > config.max_command_len {
        return Err(RelayError::InvalidCommand {
            reason: format!(
                "command length {} exceeds limit of {} bytes",
                trimmed.len(),
                config.max_command_len
            ),
        });
    }

    for pattern in FORBIDDEN_PATTERNS {
        if trimmed.contains(pattern) {
            return Err(RelayError::InvalidCommand {
                reason: format!("command contains forbidden pattern {:?}", pattern),
            });
        }
    }

    Ok(trimmed.to_string())
}

/// Single-quote a string for POSIX shells.
pub fn sh_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
