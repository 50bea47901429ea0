//! Shared test utilities for integration tests
//!
//! Environment isolation for configuration tests. Config loading reads HOME,
//! XDG_CONFIG_HOME, TAPESTRY_ENV and every TAPESTRY__* variable, so tests touching any
//! of them run one at a time and restore the previous values afterwards.

use std::sync::Mutex;
use tempfile::TempDir;

/// Serializes environment access across all tests in this binary
static ENV_MUTEX: Mutex<()> = Mutex::new(());

struct EnvState {
    saved: Vec<(String, Option<String>)>,
}

impl EnvState {
    fn capture(names: &[&str]) -> Self {
        let mut saved: Vec<(String, Option<String>)> = names
            .iter()
            .map(|name| (name.to_string(), std::env::var(name).ok()))
            .collect();
        for (name, value) in std::env::vars() {
            if name.starts_with("TAPESTRY") && !saved.iter().any(|(n, _)| n == &name) {
                saved.push((name, Some(value)));
            }
        }
        Self { saved }
    }

    fn restore(self) {
        for (name, _) in std::env::vars() {
            if name.starts_with("TAPESTRY") {
                std::env::remove_var(name);
            }
        }
        for (name, value) in self.saved {
            match value {
                Some(value) => std::env::set_var(&name, value),
                None => std::env::remove_var(&name),
            }
        }
    }
}

/// Run `f` with HOME and XDG_CONFIG_HOME inside `test_dir`, no inherited TAPESTRY*
/// variables, and `vars` set.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let mut names = vec!["HOME", "XDG_CONFIG_HOME"];
    names.extend(vars.iter().map(|(name, _)| *name));
    let env_state = EnvState::capture(&names);

    for (name, _) in std::env::vars() {
        if name.starts_with("TAPESTRY") {
            std::env::remove_var(name);
        }
    }

    let test_home = test_dir.path().join("home");
    let test_config_home = test_dir.path().join("config");
    std::fs::create_dir_all(&test_home).unwrap();
    std::fs::create_dir_all(&test_config_home).unwrap();
    std::env::set_var("HOME", &test_home);
    std::env::set_var("XDG_CONFIG_HOME", &test_config_home);
    for (name, value) in vars {
        std::env::set_var(name, value);
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
    env_state.restore();
    match result {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
