use serde::{Deserialize, Serialize};

use crate::errors::{PufKeyError, Result};

/// Width of a PUF block, codeword and sponge word (N).
pub const WORD_BITS: usize = 32;
pub const WORD_BYTES: usize = WORD_BITS / 8;
/// Width of one Reed-Muller message group (K).
pub const GROUP_BITS: usize = 6;
/// Number of blocks in the replicated PUF value and the helper data.
pub const BLOCKS: usize = 22;
pub const DEFAULT_PUF_BLOCKS: usize = 8;

/// Sponge rate in words (576 bits).
pub const RATE_WORDS: usize = 18;
pub const RATE_BYTES: usize = RATE_WORDS * WORD_BYTES;
pub const DIGEST_BYTES: usize = 64;
pub const KEY_BYTES: usize = DIGEST_BYTES;
pub const PADDED_KEY_BYTES: usize = RATE_BYTES;
pub const IPAD_BYTE: u8 = 0x36;

pub const HELPER_DATA_BYTES: usize = BLOCKS * WORD_BYTES;

/// How the extractor spends entropy-source bits on the code message x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntropyMode {
    /// One bit per group, replicated across all K positions.
    #[default]
    Replicated,
    /// K independent bits per group.
    Full,
}

impl EntropyMode {
    pub fn bits_per_group(self) -> usize {
        match self {
            EntropyMode::Replicated => 1,
            EntropyMode::Full => GROUP_BITS,
        }
    }

    pub fn bits_required(self) -> usize {
        BLOCKS * self.bits_per_group()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorParams {
    pub puf_blocks: usize,
    pub entropy_mode: EntropyMode,
}

impl Default for ExtractorParams {
    fn default() -> Self {
        Self {
            puf_blocks: DEFAULT_PUF_BLOCKS,
            entropy_mode: EntropyMode::default(),
        }
    }
}

impl ExtractorParams {
    pub fn new(puf_blocks: usize, entropy_mode: EntropyMode) -> Result<Self> {
        let params = Self {
            puf_blocks,
            entropy_mode,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.puf_blocks == 0 || self.puf_blocks > BLOCKS {
            return Err(PufKeyError::InvalidParams(format!(
                "puf_blocks must be in 1..={BLOCKS}, got {}",
                self.puf_blocks
            )));
        }
        Ok(())
    }

    /// Number of byte requests issued to the PUF source per enrollment.
    pub fn puf_bytes(&self) -> usize {
        self.puf_blocks * WORD_BYTES
    }
}
