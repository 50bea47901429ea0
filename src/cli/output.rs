//! CLI output: error mapping from engine errors to the CLI surface.

use crate::error::ApiError;

/// Map engine errors to a single line for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::InvalidMetadata(msg) => format!("Invalid submission: {}", msg),
        ApiError::ConfigError(msg) => format!("Configuration problem: {}", msg),
        other => other.to_string(),
    }
}
