use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::PufKeyError;
use crate::params::ExtractorParams;

pub const CONFIG_FILE: &str = "pufkey.json";
pub const DATA_DIR_ENV: &str = "PUFKEY_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PufKeyConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub extractor: ExtractorParams,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Steps a blocking driver runs before reporting a stall.
    #[serde(default = "default_step_budget")]
    pub step_budget: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_latency")]
    pub latency_ticks: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            latency_ticks: default_latency(),
        }
    }
}

impl Default for PufKeyConfig {
    fn default() -> Self {
        Self::default_with_dir(&default_data_dir())
    }
}

// Defaults
fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|h| h.join(".pufkey"))
        .unwrap_or_else(|| PathBuf::from(".pufkey"))
}

fn default_latency() -> u32 {
    0
}

fn default_step_budget() -> u64 {
    100_000
}

impl PufKeyConfig {
    pub fn load_or_default(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)?;
            let mut config: PufKeyConfig = serde_json::from_str(&raw)?;
            config.data_dir = data_dir.to_path_buf();
            config.validate()?;
            return Ok(config);
        }

        let config = Self::default_with_dir(data_dir);
        config.persist()?;
        Ok(config)
    }

    pub fn default_with_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            extractor: ExtractorParams::default(),
            engine: EngineConfig::default(),
            step_budget: default_step_budget(),
        }
    }

    pub fn validate(&self) -> crate::errors::Result<()> {
        self.extractor.validate()?;
        if self.step_budget == 0 {
            return Err(PufKeyError::InvalidParams(
                "step_budget must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn persist(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(self.config_path(), raw)?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    pub fn seed_path(&self) -> PathBuf {
        self.data_dir.join("puf_seed")
    }

    pub fn helper_path(&self) -> PathBuf {
        self.data_dir.join("helper.json")
    }
}
