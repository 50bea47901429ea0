//! Single entry point for loading configuration; callers never assemble layers themselves.

use super::merge::merge_policy;
use super::sources::{environment, global_file, workspace_file};
use super::TapestryConfig;
use crate::error::ApiError;
use config::builder::DefaultState;
use config::{ConfigBuilder, File};
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, global file, workspace files, environment.
    pub fn load(workspace_root: &Path) -> Result<TapestryConfig, ApiError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        Self::finish(builder)
    }

    /// Defaults, the given file (required), environment.
    pub fn load_from_file(path: &Path) -> Result<TapestryConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true));
        Self::finish(builder)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<TapestryConfig, ApiError> {
        let config: TapestryConfig = environment::add_to_builder(builder)
            .build()?
            .try_deserialize()?;
        debug!(
            backend = ?config.storage.backend,
            budget_policies = config.budget.len(),
            "Configuration loaded"
        );
        config.validated()
    }
}
