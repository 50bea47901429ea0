//! Configuration System
//!
//! Layered configuration: built-in defaults, then the global config file, then the
//! workspace (or explicitly named) config file, then `TAPESTRY__SECTION__FIELD`
//! environment variables. Validation collects every problem instead of stopping at
//! the first.

use crate::budget::BudgetPolicy;
use crate::error::ApiError;
use crate::generation::EngineSettings;
use crate::logging::LoggingConfig;
use crate::store::{MemoryStore, SledStore, StoreSet};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

pub use crate::provider::{ProviderConfig, ProviderType, ProvidersConfig};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapestryConfig {
    #[serde(default)]
    pub engine: EngineSettings,

    /// Provider for every generation slot
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Budget policy per provider name
    #[serde(default = "default_budget_policies")]
    pub budget: HashMap<String, BudgetPolicy>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Policies for the default primary text and audio providers.
pub fn default_budget_policies() -> HashMap<String, BudgetPolicy> {
    let providers = ProvidersConfig::default();
    let mut policies = HashMap::new();
    policies.insert(
        providers.text_primary.resolved_name(),
        BudgetPolicy::text_default(),
    );
    policies.insert(
        providers.audio_primary.resolved_name(),
        BudgetPolicy::audio_default(),
    );
    policies
}

impl Default for TapestryConfig {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            providers: ProvidersConfig::default(),
            budget: default_budget_policies(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Sled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Sled database directory; defaults to the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Sled
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
        }
    }
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            ProjectDirs::from("", "", "tapestry")
                .map(|dirs| dirs.data_dir().join("store"))
                .unwrap_or_else(|| PathBuf::from(".tapestry/store"))
        })
    }

    /// Open the configured backend.
    pub fn open(&self) -> Result<StoreSet, ApiError> {
        match self.backend {
            StorageBackend::Memory => Ok(StoreSet::shared(Arc::new(MemoryStore::new()))),
            StorageBackend::Sled => {
                let path = self.resolved_path();
                std::fs::create_dir_all(&path).map_err(|e| {
                    ApiError::ConfigError(format!("Failed to create store directory {:?}: {}", path, e))
                })?;
                Ok(StoreSet::shared(Arc::new(SledStore::open(&path)?)))
            }
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Engine(String),
    Provider(String, String),
    Budget(String, String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Engine(msg) => write!(f, "Engine: {}", msg),
            ValidationError::Provider(slot, msg) => write!(f, "Provider '{}': {}", slot, msg),
            ValidationError::Budget(name, msg) => write!(f, "Budget '{}': {}", name, msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl TapestryConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.engine.validate() {
            errors.push(ValidationError::Engine(e));
        }

        for (slot, provider) in self.providers.slots() {
            if let Err(e) = provider.validate() {
                errors.push(ValidationError::Provider(slot.to_string(), e));
            }
        }

        let mut budget_names: Vec<_> = self.budget.keys().collect();
        budget_names.sort();
        for name in budget_names {
            if let Err(e) = self.budget[name].validate() {
                errors.push(ValidationError::Budget(name.clone(), e));
            }
        }

        // A gated primary without a policy would be treated as permanently over budget.
        for primary in [&self.providers.text_primary, &self.providers.audio_primary] {
            let name = primary.resolved_name();
            if !self.budget.contains_key(&name) {
                errors.push(ValidationError::Budget(
                    name,
                    "no budget policy for a gated primary provider".to_string(),
                ));
            }
        }

        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// [`validate`](Self::validate), folded into a single [`ApiError`].
    pub fn validated(self) -> Result<Self, ApiError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(self)
    }
}
