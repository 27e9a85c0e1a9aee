//! Fuzzy-extractor enrollment: acquire a raw PUF reading and code message x,
//! then emit the replicated PUF value R′ and public helper data `R′ ^ Enc(x)`.
//!
//! Only helper-data generation lives here. Reconstruction from a noisy replay
//! is not part of this crate.

use std::task::Poll;
use zeroize::Zeroize;

use crate::errors::{PufKeyError, Result};
use crate::params::{EntropyMode, ExtractorParams, BLOCKS, GROUP_BITS, WORD_BYTES};
use crate::reed_muller;
use crate::source::{EntropySource, PufSource};
use crate::types::{EntropyWord, HelperData, ReplicatedPuf};

/// Assembles PUF bytes into little-endian blocks. Trailing partial words are dropped.
pub fn raw_blocks_from_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(WORD_BYTES)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cyclic replication: `R′[i] = raw[i % raw.len()]`.
pub fn replicate(raw: &[u32]) -> Result<ReplicatedPuf> {
    if raw.is_empty() || raw.len() > BLOCKS {
        return Err(PufKeyError::InvalidParams(format!(
            "raw reading must hold 1..={BLOCKS} blocks, got {}",
            raw.len()
        )));
    }
    Ok(cycle_blocks(raw))
}

// Callers guarantee 1..=BLOCKS raw blocks.
fn cycle_blocks(raw: &[u32]) -> ReplicatedPuf {
    let mut words = [0u32; BLOCKS];
    for (slot, block) in words.iter_mut().zip(raw.iter().cycle()) {
        *slot = *block;
    }
    ReplicatedPuf::from_words(words)
}

/// `H[i] = R′[i] ^ encode(x[i])`.
pub fn mask(replicated: &ReplicatedPuf, x: &EntropyWord) -> HelperData {
    let codewords = reed_muller::encode_groups(x.groups());
    let mut words = [0u32; BLOCKS];
    for (i, slot) in words.iter_mut().enumerate() {
        *slot = replicated.words()[i] ^ codewords[i];
    }
    HelperData::from_words(words)
}

/// Output of one enrollment pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub replicated: ReplicatedPuf,
    pub helper: HelperData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorState {
    Idle,
    AcquirePuf { next_address: usize },
    AcquireEntropy { next_bit: usize },
    Emit,
}

pub struct FuzzyExtractor {
    params: ExtractorParams,
    state: ExtractorState,
    raw_bytes: Vec<u8>,
    groups: [u8; BLOCKS],
    output: Option<Extraction>,
}

impl FuzzyExtractor {
    pub fn new(params: ExtractorParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            state: ExtractorState::Idle,
            raw_bytes: Vec::with_capacity(params.puf_bytes()),
            groups: [0u8; BLOCKS],
            output: None,
        })
    }

    pub fn params(&self) -> &ExtractorParams {
        &self.params
    }

    pub fn state(&self) -> ExtractorState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ExtractorState::Idle
    }

    /// Latest extraction; unchanged until the next pass emits.
    pub fn output(&self) -> Option<&Extraction> {
        self.output.as_ref()
    }

    /// Enable pulse. Returns `false` and does nothing unless idle, so a
    /// repeated request while acquiring never restarts the pass.
    pub fn start(&mut self) -> bool {
        if !self.is_idle() {
            return false;
        }
        self.clear_scratch();
        self.state = ExtractorState::AcquirePuf { next_address: 0 };
        log::debug!(
            "extractor: acquiring {} puf bytes",
            self.params.puf_bytes()
        );
        true
    }

    /// Advances by at most one acquired byte or bit. Returns the extraction
    /// exactly once, on the step that leaves `Emit`.
    pub fn step<P, R>(&mut self, puf: &mut P, entropy: &mut R) -> Option<Extraction>
    where
        P: PufSource + ?Sized,
        R: EntropySource + ?Sized,
    {
        match self.state {
            ExtractorState::Idle => None,
            ExtractorState::AcquirePuf { next_address } => {
                if let Poll::Ready(byte) = puf.poll_byte(next_address) {
                    self.raw_bytes.push(byte);
                    let next_address = next_address + 1;
                    self.state = if next_address == self.params.puf_bytes() {
                        log::debug!("extractor: puf reading complete");
                        ExtractorState::AcquireEntropy { next_bit: 0 }
                    } else {
                        ExtractorState::AcquirePuf { next_address }
                    };
                }
                None
            }
            ExtractorState::AcquireEntropy { next_bit } => {
                if let Poll::Ready(bit) = entropy.poll_bit() {
                    self.absorb_entropy_bit(next_bit, bit);
                    let next_bit = next_bit + 1;
                    self.state = if next_bit == self.params.entropy_mode.bits_required() {
                        ExtractorState::Emit
                    } else {
                        ExtractorState::AcquireEntropy { next_bit }
                    };
                }
                None
            }
            ExtractorState::Emit => {
                let extraction = self.emit();
                self.clear_scratch();
                self.state = ExtractorState::Idle;
                Some(extraction)
            }
        }
    }

    /// Returns to `Idle` and drops any latched output.
    pub fn reset(&mut self) {
        self.clear_scratch();
        self.output = None;
        self.state = ExtractorState::Idle;
    }

    fn absorb_entropy_bit(&mut self, index: usize, bit: bool) {
        match self.params.entropy_mode {
            EntropyMode::Replicated => {
                self.groups[index] = if bit { reed_muller::MESSAGE_MASK } else { 0 };
            }
            EntropyMode::Full => {
                let group = index / GROUP_BITS;
                let position = index % GROUP_BITS;
                self.groups[group] |= (bit as u8) << position;
            }
        }
    }

    // Reached only after exactly `params.puf_bytes()` bytes were acquired, and
    // `new` validated `puf_blocks` to 1..=BLOCKS.
    fn emit(&mut self) -> Extraction {
        let mut raw = raw_blocks_from_bytes(&self.raw_bytes);
        let replicated = cycle_blocks(&raw);
        raw.zeroize();

        let x = EntropyWord::from_groups(self.groups);
        let helper = mask(&replicated, &x);
        let extraction = Extraction { replicated, helper };
        self.output = Some(extraction.clone());
        log::debug!("extractor: helper data emitted");
        extraction
    }

    fn clear_scratch(&mut self) {
        self.raw_bytes.zeroize();
        self.raw_bytes.clear();
        self.groups.zeroize();
    }
}

impl Drop for FuzzyExtractor {
    fn drop(&mut self) {
        self.clear_scratch();
    }
}
