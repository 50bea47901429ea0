//! Error types for the Tapestry content generation engine.

use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Engine-level errors.
///
/// Cloneable so a single stage or pipeline result can be both logged and handed back
/// to whoever joins the task.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider returned an empty response: {0}")]
    EmptyResponse(String),

    #[error("No budget policy configured for provider: {0}")]
    BudgetNotConfigured(String),

    #[error("Concurrency limiter closed")]
    LimiterClosed,

    #[error("Timed out after {elapsed_ms}ms waiting for {operation}")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Task '{task}' panicked: {message}")]
    TaskPanicked { task: String, message: String },

    #[error("Task '{task}' was cancelled")]
    TaskCancelled { task: String },

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Category {category} failed for keys: {keys:?}")]
    CategoryFailed { category: String, keys: Vec<String> },

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
