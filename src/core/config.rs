//! Configuration management with layered hierarchy

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the per-directory config file
pub const LOCAL_CONFIG_FILE: &str = ".dilute.yaml";

/// Planner configuration with layered hierarchy
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Default output format for tables and documents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_format: Option<String>,

    /// Candidate concentrations sampled per search step when solving curves
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_samples: Option<usize>,

    /// Add the optional Sample ID column to picklists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picklist_sample_ids: Option<bool>,
}

/// Where each layer of the merged configuration came from
#[derive(Debug, Default, Clone)]
pub struct ConfigSources {
    pub global: Option<PathBuf>,
    pub local: Option<PathBuf>,
    pub env: Vec<String>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Self {
        Self::load_with_sources().0
    }

    /// Load configuration and report the layers that contributed
    pub fn load_with_sources() -> (Self, ConfigSources) {
        let mut config = Config::default();
        let mut sources = ConfigSources::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/dilute/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read_file(&global_path) {
                config.merge(global);
                sources.global = Some(global_path);
            }
        }

        // 3. Working directory config (.dilute.yaml)
        if let Ok(cwd) = std::env::current_dir() {
            let local_path = cwd.join(LOCAL_CONFIG_FILE);
            if let Some(local) = Self::read_file(&local_path) {
                config.merge(local);
                sources.local = Some(local_path);
            }
        }

        // 4. Environment variables
        let env = Self::from_env(|key| std::env::var(key).ok());
        if env.default_format.is_some() {
            sources.env.push("DILUTE_FORMAT".to_string());
        }
        if env.candidate_samples.is_some() {
            sources.env.push("DILUTE_CANDIDATES".to_string());
        }
        config.merge(env);

        (config, sources)
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "dilute")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    fn read_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                None
            }
        }
    }

    fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Config {
        Config {
            default_format: lookup("DILUTE_FORMAT").filter(|s| !s.is_empty()),
            candidate_samples: lookup("DILUTE_CANDIDATES").and_then(|s| s.trim().parse().ok()),
            picklist_sample_ids: None,
        }
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.default_format.is_some() {
            self.default_format = other.default_format;
        }
        if other.candidate_samples.is_some() {
            self.candidate_samples = other.candidate_samples;
        }
        if other.picklist_sample_ids.is_some() {
            self.picklist_sample_ids = other.picklist_sample_ids;
        }
    }

    /// Whether picklists carry a Sample ID column
    pub fn picklist_sample_ids(&self) -> bool {
        self.picklist_sample_ids.unwrap_or(true)
    }
}
