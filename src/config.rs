// ABOUTME: Persisted settings record with atomic JSON writes
// ABOUTME: Default location from the platform config dir, overridable per run

use crate::{Error, Result};
use directories::ProjectDirs;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MIN_SYNC_INTERVAL_MINUTES: u64 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub github_enabled: bool,
    /// `owner/repo` coordinates.
    #[serde(default)]
    pub github_repo: String,
    #[serde(default)]
    pub github_branch: String,
    #[serde(default)]
    pub github_token: String,
    /// Path prefix inside the repository.
    #[serde(default)]
    pub github_path: String,
    #[serde(default)]
    pub drive_enabled: bool,
    #[serde(default)]
    pub drive_folder_id: String,
    #[serde(default)]
    pub drive_token: String,
    #[serde(default)]
    pub drive_client_id: String,
    #[serde(default)]
    pub drive_client_secret: String,
    #[serde(default)]
    pub drive_refresh_token: String,
}

impl SyncSettings {
    pub fn branch(&self) -> &str {
        if self.github_branch.is_empty() {
            "main"
        } else {
            &self.github_branch
        }
    }

    pub fn github_configured(&self) -> bool {
        !self.github_repo.trim().is_empty() && !self.github_token.is_empty()
    }

    pub fn drive_configured(&self) -> bool {
        !self.drive_token.is_empty()
            || (!self.drive_client_id.is_empty()
                && !self.drive_client_secret.is_empty()
                && !self.drive_refresh_token.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub auto_sync: bool,
    #[serde(default)]
    pub auto_sync_interval_minutes: u64,
}

impl Settings {
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "marksync").ok_or_else(|| {
            Error::Filesystem(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            ))
        })?;
        Ok(dirs.config_dir().join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Settings> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        write_atomic(path, raw.as_bytes())
    }

    /// Scheduling interval with the configured floor applied.
    pub fn sync_interval_minutes(&self) -> u64 {
        self.auto_sync_interval_minutes.max(MIN_SYNC_INTERVAL_MINUTES)
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent)?;
            parent.to_path_buf()
        }
        _ => PathBuf::from("."),
    };

    let random: u32 = rand::thread_rng().gen();
    let tmp_path = parent.join(format!("{:x}.part", random));
    fs::write(&tmp_path, content)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
