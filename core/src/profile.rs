//! User profile persistence.
//!
//! The profile lives outside the food database, so it is restored after the
//! import transaction commits and is not covered by its rollback.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::document::UserProfile;
use crate::import::ImportMode;

pub trait ProfileStore {
    fn load(&self) -> Result<Option<UserProfile>>;
    fn save(&self, profile: &UserProfile) -> Result<()>;
}

/// Profile kept as a pretty-printed JSON file.
pub struct JsonProfileStore {
    path: PathBuf,
}

impl JsonProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProfileStore for JsonProfileStore {
    fn load(&self) -> Result<Option<UserProfile>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read profile: {}", self.path.display())
                });
            }
        };
        let profile = serde_json::from_slice(&raw)
            .with_context(|| format!("Invalid profile file: {}", self.path.display()))?;
        Ok(Some(profile))
    }

    fn save(&self, profile: &UserProfile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(profile)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write profile: {}", self.path.display()))?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryProfileStore {
    profile: Mutex<Option<UserProfile>>,
}

impl MemoryProfileStore {
    #[must_use]
    pub fn with_profile(profile: UserProfile) -> Self {
        Self {
            profile: Mutex::new(Some(profile)),
        }
    }
}

impl ProfileStore for MemoryProfileStore {
    fn load(&self) -> Result<Option<UserProfile>> {
        let guard = self
            .profile
            .lock()
            .map_err(|_| anyhow::anyhow!("profile lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, profile: &UserProfile) -> Result<()> {
        let mut guard = self
            .profile
            .lock()
            .map_err(|_| anyhow::anyhow!("profile lock poisoned"))?;
        *guard = Some(profile.clone());
        Ok(())
    }
}

/// Profile to store after restoring `incoming`. Overwrite takes the incoming
/// profile wholesale; merge only fills fields the local profile lacks.
#[must_use]
pub fn restored_profile(
    local: Option<UserProfile>,
    incoming: &UserProfile,
    mode: ImportMode,
) -> UserProfile {
    let Some(local) = local else {
        return incoming.clone();
    };
    if mode == ImportMode::Overwrite {
        return incoming.clone();
    }
    let incoming = incoming.clone();
    UserProfile {
        name: local.name.or(incoming.name),
        sex: local.sex.or(incoming.sex),
        age_years: local.age_years.or(incoming.age_years),
        height_cm: local.height_cm.or(incoming.height_cm),
        weight_kg: local.weight_kg.or(incoming.weight_kg),
        activity_level: local.activity_level.or(incoming.activity_level),
        objective: local.objective.or(incoming.objective),
        water_goal_ml: local.water_goal_ml.or(incoming.water_goal_ml),
    }
}
