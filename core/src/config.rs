use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::logger::LogLevel;
use crate::profile::{ProfileFormat, ProfileOutput};

pub const CONFIG_FILE_NAME: &str = "anvil-config.toml";

/// Tool settings, as opposed to the build description in `anvil.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_formats")]
    pub formats: Vec<ProfileFormat>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: LogLevel,
    #[serde(default = "default_true")]
    pub colors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_builds")]
    pub max_builds: usize,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            formats: default_formats(),
            prefix: default_prefix(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            colors: true,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_builds: default_max_builds(),
            storage_path: default_storage_path(),
        }
    }
}

impl ProfileConfig {
    pub fn outputs(&self) -> Vec<ProfileOutput> {
        self.formats
            .iter()
            .map(|format| ProfileOutput::new(self.prefix.clone(), *format))
            .collect()
    }
}

fn default_formats() -> Vec<ProfileFormat> {
    vec![ProfileFormat::Html, ProfileFormat::Text, ProfileFormat::Csv]
}

fn default_prefix() -> String {
    "profile".to_string()
}

fn default_level() -> LogLevel {
    LogLevel::Info
}

fn default_true() -> bool {
    true
}

fn default_max_builds() -> usize {
    50
}

fn default_storage_path() -> String {
    "~/.anvil/build_history.json".to_string()
}

/// Overlays `overlay` onto `base`, recursing into tables.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

impl Config {
    /// Global config overlaid by the project-local one (or `explicit`).
    pub fn load(root_dir: &Path, explicit: Option<&Path>) -> anyhow::Result<Self> {
        let local = match explicit {
            Some(path) => Self::expand_path(&path.to_string_lossy()),
            None => root_dir.join(CONFIG_FILE_NAME),
        };

        if explicit.is_some() && !local.exists() {
            anyhow::bail!("Config file not found: {}", local.display());
        }

        let mut table = Self::read_table(&Self::global_path())?;
        merge_tables(&mut table, Self::read_table(&local)?);

        toml::Value::Table(table)
            .try_into()
            .with_context(|| format!("Invalid configuration in {}", local.display()))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = Self::expand_path(&path.as_ref().to_string_lossy());

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    fn read_table(path: &Path) -> anyhow::Result<toml::Table> {
        if !path.exists() {
            return Ok(toml::Table::new());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn global_path() -> PathBuf {
        Self::expand_path("~/.config/anvil/config.toml")
    }

    pub fn expand_path(path: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path);
        PathBuf::from(expanded.as_ref())
    }

    pub fn storage_path(&self) -> PathBuf {
        Self::expand_path(&self.history.storage_path)
    }
}
