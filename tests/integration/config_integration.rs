//! Integration tests for configuration layering

use super::test_utils::with_isolated_env;
use tapestry::budget::CutoffKind;
use tapestry::config::{ConfigLoader, ProviderType, StorageBackend};
use tempfile::TempDir;

const FILE_CONFIG: &str = r#"
[engine]
target_topic_count = 8
max_topics_per_key = 3
premium_only_language = "nl"

[providers.text_primary]
provider_name = "gateway"
provider_type = "local_custom"
model = "mixtral"
endpoint = "http://localhost:8080/v1"

[budget.gateway]
kind = "cost_ratio"
cutoff = 0.5
budget_amount = 20.0
unit_cost = 0.00001

[budget.openai-tts-hd]
kind = "usage_ratio"
cutoff = 0.9
usage_quota = 500000

[storage]
backend = "memory"
"#;

#[test]
fn test_load_from_file_overrides_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("custom.toml");
    std::fs::write(&config_file, FILE_CONFIG).unwrap();

    let config = with_isolated_env(&temp_dir, &[], || {
        ConfigLoader::load_from_file(&config_file).unwrap()
    });

    assert_eq!(config.engine.target_topic_count, 8);
    assert_eq!(config.engine.max_topics_per_key, 3);
    assert!(config.engine.is_premium_only("NL"));
    assert_eq!(config.engine.asset_deadline_secs, 180);
    assert_eq!(config.providers.text_primary.provider_type, ProviderType::LocalCustom);
    assert_eq!(config.providers.text_primary.resolved_name(), "gateway");
    assert_eq!(config.providers.image.model, "dall-e-3");
    assert_eq!(config.budget["gateway"].kind, CutoffKind::CostRatio);
    assert_eq!(config.budget["gateway"].period_days, 30);
    assert_eq!(config.budget["openai-tts-hd"].usage_quota, 500_000);
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_environment_overrides_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("custom.toml");
    std::fs::write(&config_file, FILE_CONFIG).unwrap();

    let config = with_isolated_env(
        &temp_dir,
        &[
            ("TAPESTRY__ENGINE__TARGET_TOPIC_COUNT", "20"),
            ("TAPESTRY__LOGGING__LEVEL", "debug"),
        ],
        || ConfigLoader::load_from_file(&config_file).unwrap(),
    );

    assert_eq!(config.engine.target_topic_count, 20);
    assert_eq!(config.engine.max_topics_per_key, 3);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_workspace_file_layers_over_global() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    std::fs::create_dir_all(&workspace).unwrap();
    std::fs::write(
        workspace.join("tapestry.toml"),
        "[engine]\ntheme_sample_size = 5\n",
    )
    .unwrap();

    let config = with_isolated_env(&temp_dir, &[], || {
        let global_dir = temp_dir.path().join("config").join("tapestry");
        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::write(
            global_dir.join("config.toml"),
            "[engine]\ntheme_sample_size = 2\nasset_deadline_secs = 60\n",
        )
        .unwrap();
        ConfigLoader::load(&workspace).unwrap()
    });

    assert_eq!(config.engine.theme_sample_size, 5);
    assert_eq!(config.engine.asset_deadline_secs, 60);
}

#[test]
fn test_environment_specific_workspace_file() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    std::fs::create_dir_all(&workspace).unwrap();
    std::fs::write(workspace.join("tapestry.toml"), "[engine]\nmax_topics_per_key = 2\n").unwrap();
    std::fs::write(
        workspace.join("tapestry.staging.toml"),
        "[engine]\nmax_topics_per_key = 6\n",
    )
    .unwrap();

    let config = with_isolated_env(&temp_dir, &[("TAPESTRY_ENV", "staging")], || {
        ConfigLoader::load(&workspace).unwrap()
    });

    assert_eq!(config.engine.max_topics_per_key, 6);
}

#[test]
fn test_invalid_config_reports_every_problem() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("bad.toml");
    std::fs::write(
        &config_file,
        r#"
[engine]
theme_sample_size = 0

[providers.image]
provider_type = "openai"
model = ""

[logging]
format = "yaml"
"#,
    )
    .unwrap();

    let err = with_isolated_env(&temp_dir, &[], || {
        ConfigLoader::load_from_file(&config_file).unwrap_err()
    });
    let message = err.to_string();
    assert!(message.contains("Engine"), "{}", message);
    assert!(message.contains("Provider 'image'"), "{}", message);
    assert!(message.contains("Logging"), "{}", message);
}

#[test]
fn test_missing_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nowhere.toml");

    let err = with_isolated_env(&temp_dir, &[], || {
        ConfigLoader::load_from_file(&missing).unwrap_err()
    });
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_no_files_gives_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("empty");
    std::fs::create_dir_all(&workspace).unwrap();

    let config = with_isolated_env(&temp_dir, &[], || ConfigLoader::load(&workspace).unwrap());
    assert_eq!(config, tapestry::config::TapestryConfig::default());
}
