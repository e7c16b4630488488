use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::models::UnrejectPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Worker,
    Anthropic,
    OpenAI,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "worker" => Ok(ProviderKind::Worker),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAI),
            _ => Err(anyhow!(
                "Unknown AI provider '{}'. Available: worker (default), anthropic, openai",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub provider: ProviderKind,
    pub worker_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub restore_status_on_unreject: bool,
}

/// Settings from `config.toml`, overridden by `OFFERFLOW_*` environment
/// variables. A missing file means defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub ai: AiConfig,
    pub tracker: TrackerConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("OFFERFLOW_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup("OFFERFLOW_WORKER_URL") {
            self.ai.worker_url = Some(url);
        }
        if let Some(provider) = lookup("OFFERFLOW_AI_PROVIDER") {
            self.ai.provider = provider.parse()?;
        }
        Ok(())
    }

    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = env::var("OFFERFLOW_CONFIG") {
            return Some(PathBuf::from(path));
        }
        directories::ProjectDirs::from("", "", "offerflow")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        // XDG data directory, or the current directory as a fallback
        directories::ProjectDirs::from("", "", "offerflow")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn unreject_policy(&self) -> UnrejectPolicy {
        if self.tracker.restore_status_on_unreject {
            UnrejectPolicy::Restore
        } else {
            UnrejectPolicy::Interviewing
        }
    }
}
