//! CLI route: single route table and run context.

use crate::budget::BudgetGate;
use crate::cli::parse::{Commands, SubmitArgs};
use crate::cli::presentation::{format_budget_table, format_profile, format_run_summary};
use crate::config::{ConfigLoader, StorageBackend, TapestryConfig};
use crate::error::{ApiError, StorageError};
use crate::orchestrator::Orchestrator;
use crate::profile::UserMetadata;
use crate::store::StoreSet;
use std::path::PathBuf;
use tracing::info;

/// Runtime context for CLI execution: workspace and loaded configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: TapestryConfig,
}

impl RunContext {
    /// Load configuration from `config_path` when given, otherwise from the workspace.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn from_config(workspace_root: PathBuf, config: TapestryConfig) -> Self {
        Self {
            workspace_root,
            config,
        }
    }

    pub fn config(&self) -> &TapestryConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    /// Execute a command and return its printable output.
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Submit(args) => self.handle_submit(args).await,
            Commands::Budget { format } => self.handle_budget(format).await,
            Commands::Profile { email, format } => self.handle_profile(email, format).await,
        }
    }

    async fn handle_submit(&self, args: &SubmitArgs) -> Result<String, ApiError> {
        let metadata = metadata_from_args(args)?;
        let orchestrator = Orchestrator::from_config(&self.config)?;
        let handle = orchestrator.submit(metadata).await?;
        info!(email = %handle.email(), "Waiting for run to finish");
        let summary = handle.wait().await?;
        format_run_summary(&summary, &args.format)
    }

    /// Open storage for a read-only inspection command.
    ///
    /// The memory backend starts empty in every process, so inspecting it could only
    /// ever show defaults.
    fn inspection_stores(&self, command: &str) -> Result<StoreSet, ApiError> {
        if self.config.storage.backend == StorageBackend::Memory {
            return Err(ApiError::ConfigError(format!(
                "`{}` needs a persistent storage backend; the memory backend starts empty (set storage.backend = \"sled\")",
                command
            )));
        }
        self.config.storage.open()
    }

    async fn handle_budget(&self, format: &str) -> Result<String, ApiError> {
        let stores = self.inspection_stores("budget")?;
        let gate = BudgetGate::new(stores.budgets, self.config.budget.clone());
        let budgets = gate.snapshot().await?;
        format_budget_table(&budgets, &self.config.budget, format)
    }

    async fn handle_profile(&self, email: &str, format: &str) -> Result<String, ApiError> {
        let stores = self.inspection_stores("profile")?;
        let profile = stores
            .profiles
            .get(email)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("profile {}", email)))?;
        format_profile(&profile, format)
    }
}

/// Build submission metadata from a JSON or TOML file, or from individual flags.
pub(crate) fn metadata_from_args(args: &SubmitArgs) -> Result<UserMetadata, ApiError> {
    if let Some(path) = &args.metadata {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ApiError::InvalidMetadata(format!("cannot read {}: {}", path.display(), e))
        })?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            toml::from_str(&raw).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&raw).map_err(|e| e.to_string())
        };
        return parsed.map_err(|e| {
            ApiError::InvalidMetadata(format!("cannot parse {}: {}", path.display(), e))
        });
    }

    let email = args
        .email
        .clone()
        .ok_or_else(|| ApiError::InvalidMetadata("--email or --metadata is required".to_string()))?;
    Ok(UserMetadata {
        email,
        country: args.country.clone(),
        city: args.city.clone(),
        religions: args.religions.clone(),
        preferences: args.preferences.clone(),
        language: args.language.clone(),
    })
}
