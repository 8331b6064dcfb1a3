use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory used when neither the command line nor the config names one
pub const DEFAULT_STATES_DIR: &str = "states";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("converge"))
}

/// User settings from `config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory of declarations; `~` is expanded
    pub directory: Option<String>,
    /// Resources converged in parallel within one frontier
    pub jobs: usize,
    /// Run package manager commands through sudo
    pub sudo: bool,
    /// Refresh the package index before installing
    pub refresh_index: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: None,
            jobs: 1,
            sudo: false,
            refresh_index: true,
        }
    }
}

impl Config {
    /// Load `path`, or the default location when `path` is `None`
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => config_dir()?.join("config.toml"),
        };
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Configured declarations directory with `~` expanded
    pub fn directory(&self) -> Option<PathBuf> {
        self.directory
            .as_deref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).as_ref()))
    }

    /// Pick the declarations directory: explicit argument, then config,
    /// then `./states`
    pub fn states_dir(&self, explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| self.directory())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATES_DIR))
    }
}
