use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::llm::GenerationParams;

#[derive(Clone, Debug)]
pub struct Config {
    pub user_settings: UserSettings,
    data_dir: PathBuf,
    prefs_dir: PathBuf,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UserSettings {
    /// Sampling parameters used when nothing is passed on the command line.
    pub generation: GenerationParams,
    /// Materialize a mesh asset every N snapshots. Zero disables assets
    /// until the stream is done.
    pub render_every: usize,
    /// Artificial delay between replayed tokens, in milliseconds.
    pub token_delay_ms: u64,
    /// Keep the `.obj` files written while materializing assets.
    pub keep_asset_files: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            generation: GenerationParams::default(),
            render_every: 10,
            token_delay_ms: 0,
            keep_asset_files: false,
        }
    }
}

impl Config {
    fn project_dirs() -> anyhow::Result<ProjectDirs> {
        ProjectDirs::from("com", "llamamesh", "llamamesh")
            .context("Unable to determine home directory")
    }

    /// Load config from the platform specific data & preference folders.
    pub fn new() -> anyhow::Result<Self> {
        let dirs = Self::project_dirs()?;
        Self::with_dirs(dirs.data_dir(), dirs.preference_dir())
    }

    pub fn with_dirs(data_dir: &Path, prefs_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        let prefs_dir = prefs_dir.to_path_buf();

        fs::create_dir_all(&data_dir).context("Unable to create data folder")?;
        fs::create_dir_all(data_dir.join("logs")).context("Unable to create logs folder")?;
        fs::create_dir_all(&prefs_dir).context("Unable to create config folder")?;

        let mut config = Config {
            user_settings: UserSettings::default(),
            data_dir,
            prefs_dir,
        };

        let prefs_file = config.prefs_file();
        if prefs_file.exists() {
            config.user_settings = Self::load_user_settings(&prefs_file)?;
        } else {
            // Write out default settings
            config.save_user_settings(&config.user_settings)?;
        }

        Ok(config)
    }

    pub fn load_user_settings(path: &Path) -> anyhow::Result<UserSettings> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Unable to read user preferences file: {path:?}"))?;
        let settings = ron::from_str(&contents)
            .with_context(|| format!("Invalid user preferences file: {path:?}"))?;
        Ok(settings)
    }

    pub fn save_user_settings(&self, settings: &UserSettings) -> anyhow::Result<()> {
        let serialized = ron::ser::to_string_pretty(settings, Default::default())?;
        fs::write(self.prefs_file(), serialized).context("Unable to save user preferences file")?;
        log::debug!("saved user settings to {:?}", self.prefs_file());
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Where finished meshes are saved when no explicit output path is given.
    pub fn meshes_dir(&self) -> PathBuf {
        self.data_dir.join("meshes")
    }

    pub fn prefs_dir(&self) -> PathBuf {
        self.prefs_dir.clone()
    }

    /// User preferences file
    pub fn prefs_file(&self) -> PathBuf {
        self.prefs_dir.join("settings.ron")
    }
}
