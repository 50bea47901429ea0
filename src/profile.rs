//! User profiles and submission metadata.

use crate::error::ApiError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing state attached to a user profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProcessingStatus::NotStarted => "not_started",
            ProcessingStatus::InProgress => "in_progress",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Preference metadata submitted for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub email: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub religions: Vec<String>,
    #[serde(default)]
    pub preferences: Vec<String>,
    pub language: String,
}

impl UserMetadata {
    /// Reject metadata that cannot produce any work.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err(ApiError::InvalidMetadata(format!(
                "invalid email '{}'",
                self.email
            )));
        }
        if self.language.trim().is_empty() {
            return Err(ApiError::InvalidMetadata("language is required".to_string()));
        }
        let has_keys = self.preferences.iter().any(|p| !p.trim().is_empty())
            || self.religions.iter().any(|r| !r.trim().is_empty());
        if !has_keys {
            return Err(ApiError::InvalidMetadata(
                "at least one preference or religion is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Stored user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: String,
    pub metadata: UserMetadata,
    pub status: ProcessingStatus,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(metadata: UserMetadata, status: ProcessingStatus) -> Self {
        Self {
            email: metadata.email.clone(),
            metadata,
            status,
            updated_at: Utc::now(),
        }
    }
}
