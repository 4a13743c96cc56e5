use crate::infrastructure::config::{ensure_default_configs, load_scheduler_settings};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
}

/// Lays out `config/`, `state/` and `logs/`, writes missing default configs,
/// checks they parse, and applies the database schema.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("dailyblock.sqlite");

    for dir in [&config_dir, &state_dir, &logs_dir] {
        fs::create_dir_all(dir)?;
    }

    ensure_default_configs(&config_dir)?;
    load_scheduler_settings(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        database_path,
    })
}
