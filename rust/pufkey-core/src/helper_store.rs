//! Persistent helper data.
//!
//! Helper data is public: it is written in the clear, either as the raw
//! 88-byte little-endian block image or as a versioned JSON record that also
//! carries the key fingerprint for later comparison.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::errors::{PufKeyError, Result};
use crate::params::{EntropyMode, ExtractorParams};
use crate::types::HelperData;

// =============================================================================
// Constants
// =============================================================================

pub const RECORD_VERSION: u32 = 1;

// =============================================================================
// Helper Record
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperRecord {
    pub version: u32,
    pub device_id: String,
    pub puf_blocks: usize,
    pub entropy_mode: EntropyMode,
    pub helper_data: HelperData,
    /// Fingerprint of the key derived at enrollment.
    pub key_fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl HelperRecord {
    pub fn new(
        device_id: impl Into<String>,
        params: &ExtractorParams,
        helper_data: HelperData,
        key_fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            version: RECORD_VERSION,
            device_id: device_id.into(),
            puf_blocks: params.puf_blocks,
            entropy_mode: params.entropy_mode,
            helper_data,
            key_fingerprint: key_fingerprint.into(),
            created_at: Utc::now(),
        }
    }

    pub fn params(&self) -> Result<ExtractorParams> {
        ExtractorParams::new(self.puf_blocks, self.entropy_mode)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != RECORD_VERSION {
            return Err(PufKeyError::UnsupportedVersion(self.version));
        }
        self.params()?;
        Ok(())
    }

    /// Writes via a temporary file and rename so a crash never leaves a
    /// truncated record.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        write_atomic(path, raw.as_bytes())?;
        log::info!("helper store: saved record for {}", self.device_id);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let record: HelperRecord = serde_json::from_str(&raw)?;
        record.validate()?;
        Ok(record)
    }
}

// =============================================================================
// Raw Block Image
// =============================================================================

pub fn save_raw(path: &Path, helper: &HelperData) -> Result<()> {
    write_atomic(path, &helper.to_bytes())
}

pub fn load_raw(path: &Path) -> Result<HelperData> {
    HelperData::from_bytes(&fs::read(path)?)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
