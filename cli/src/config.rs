use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::ffi::OsString;
use std::path::PathBuf;

/// Overrides the platform data directory.
pub const DATA_DIR_ENV: &str = "DIETA_DATA_DIR";

pub struct Config {
    pub db_path: PathBuf,
    pub profile_path: PathBuf,
    /// Default destination for exported documents.
    pub share_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let data_dir = resolve_data_dir(std::env::var_os(DATA_DIR_ENV))?;
        Self::in_dir(data_dir)
    }

    pub fn in_dir(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join("dieta.db"),
            profile_path: data_dir.join("profile.json"),
            share_dir: data_dir.join("exports"),
        })
    }
}

/// An empty variable counts as unset.
fn data_dir_override(env_override: Option<OsString>) -> Option<PathBuf> {
    env_override.filter(|d| !d.is_empty()).map(PathBuf::from)
}

fn resolve_data_dir(env_override: Option<OsString>) -> Result<PathBuf> {
    if let Some(dir) = data_dir_override(env_override) {
        return Ok(dir);
    }
    let proj_dirs =
        ProjectDirs::from("", "", "dieta").context("Could not determine home directory")?;
    Ok(proj_dirs.data_dir().to_path_buf())
}
