use zeroize::Zeroize;

use super::{MessageCollector, SpongeEngine};
use crate::errors::{PufKeyError, Result};
use crate::params::{BLOCKS, DIGEST_BYTES, IPAD_BYTE, KEY_BYTES, RATE_WORDS, WORD_BYTES};
use crate::types::{DerivedKey, ReplicatedPuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMode {
    /// Hash R′ in one final block to obtain the derived key.
    KeyDerivation,
    /// Hash `(key ^ ipad) || message`.
    KeyedHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Idle,
    Direct { next: usize },
    KeyBlock { next: usize },
    Message { cursor: usize },
    AwaitDigest,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestEvent {
    pub mode: HashMode,
    pub digest: [u8; DIGEST_BYTES],
}

/// `(key || 0^64) ^ ipad`, as 18 little-endian words.
pub fn key_block_words(key: &[u8; KEY_BYTES]) -> [u32; RATE_WORDS] {
    let mut words = [0u32; RATE_WORDS];
    for (i, word) in words.iter_mut().enumerate() {
        let mut bytes = [IPAD_BYTE; WORD_BYTES];
        for (j, b) in bytes.iter_mut().enumerate() {
            if let Some(k) = key.get(i * WORD_BYTES + j) {
                *b ^= k;
            }
        }
        *word = u32::from_le_bytes(bytes);
        bytes.zeroize();
    }
    words
}

/// Feeds a [`SpongeEngine`] one word per step, in either key-derivation or
/// keyed-hash mode.
pub struct AbsorptionController<E> {
    engine: E,
    phase: ControllerPhase,
    mode: Option<HashMode>,
    pending: [u32; BLOCKS],
    collector: MessageCollector,
    chunks_absorbed: u64,
    message_words: u64,
}

impl<E: SpongeEngine> AbsorptionController<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            phase: ControllerPhase::Idle,
            mode: None,
            pending: [0u32; BLOCKS],
            collector: MessageCollector::new(),
            chunks_absorbed: 0,
            message_words: 0,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    pub fn mode(&self) -> Option<HashMode> {
        self.mode
    }

    /// No digest in flight; a new one may be started.
    pub fn is_idle(&self) -> bool {
        matches!(self.phase, ControllerPhase::Idle | ControllerPhase::Done)
    }

    /// Message chunks absorbed in the current keyed hash.
    pub fn chunks_absorbed(&self) -> u64 {
        self.chunks_absorbed
    }

    pub fn message_words(&self) -> u64 {
        self.message_words
    }

    pub fn start_key_derivation(&mut self, replicated: &ReplicatedPuf) -> Result<()> {
        self.begin(HashMode::KeyDerivation)?;
        self.pending.copy_from_slice(replicated.words());
        self.phase = ControllerPhase::Direct { next: 0 };
        Ok(())
    }

    pub fn start_keyed_hash(&mut self, key: &DerivedKey) -> Result<()> {
        self.begin(HashMode::KeyedHash)?;
        let mut block = key_block_words(key.as_bytes());
        self.pending[..RATE_WORDS].copy_from_slice(&block);
        block.zeroize();
        self.phase = ControllerPhase::KeyBlock { next: 0 };
        Ok(())
    }

    fn begin(&mut self, mode: HashMode) -> Result<()> {
        if !self.is_idle() {
            return Err(PufKeyError::ControllerBusy);
        }
        self.engine.init();
        self.pending.zeroize();
        self.collector.clear();
        self.chunks_absorbed = 0;
        self.message_words = 0;
        self.mode = Some(mode);
        log::debug!("sponge: starting {:?}", mode);
        Ok(())
    }

    /// Backpressure flag for message producers.
    pub fn ready_for_word(&self) -> bool {
        self.mode == Some(HashMode::KeyedHash)
            && matches!(
                self.phase,
                ControllerPhase::KeyBlock { .. } | ControllerPhase::Message { .. }
            )
            && self.collector.is_ready()
    }

    pub fn offer_word(&mut self, word: u32, is_last: bool) -> Result<()> {
        if !self.ready_for_word() {
            return Err(PufKeyError::Backpressure);
        }
        self.collector.push(word, is_last)
    }

    /// One unit of progress: at most one word reaches the engine. Returns the
    /// digest on the step that observes the engine's ready pulse.
    pub fn step(&mut self) -> Option<DigestEvent> {
        self.engine.tick();

        match self.phase {
            ControllerPhase::Idle | ControllerPhase::Done => None,
            ControllerPhase::Direct { next } => {
                let is_last = next + 1 == BLOCKS;
                if self.engine.offer_word(self.pending[next], is_last) {
                    self.phase = if is_last {
                        self.pending.zeroize();
                        ControllerPhase::AwaitDigest
                    } else {
                        ControllerPhase::Direct { next: next + 1 }
                    };
                }
                None
            }
            ControllerPhase::KeyBlock { next } => {
                if self.engine.offer_word(self.pending[next], false) {
                    self.phase = if next + 1 == RATE_WORDS {
                        self.pending.zeroize();
                        ControllerPhase::Message { cursor: 0 }
                    } else {
                        ControllerPhase::KeyBlock { next: next + 1 }
                    };
                }
                None
            }
            ControllerPhase::Message { cursor } => {
                self.step_message(cursor);
                None
            }
            ControllerPhase::AwaitDigest => {
                if !self.engine.take_digest_ready() {
                    return None;
                }
                let digest = *self.engine.digest()?;
                let mode = self.mode?;
                self.phase = ControllerPhase::Done;
                self.collector.clear();
                log::debug!("sponge: {:?} digest ready", mode);
                Some(DigestEvent { mode, digest })
            }
        }
    }

    fn step_message(&mut self, cursor: usize) {
        if !self.collector.is_sealed() {
            return;
        }
        let chunk_len = self.collector.len();
        let is_final = self.collector.is_final();
        let is_last = is_final && cursor + 1 == chunk_len;
        if !self.engine.offer_word(self.collector.words()[cursor], is_last) {
            return;
        }
        self.message_words += 1;

        let cursor = cursor + 1;
        if cursor < chunk_len {
            self.phase = ControllerPhase::Message { cursor };
            return;
        }

        self.chunks_absorbed += 1;
        log::debug!(
            "sponge: absorbed chunk {} ({} words, final={})",
            self.chunks_absorbed,
            chunk_len,
            is_final
        );
        if is_final {
            self.phase = ControllerPhase::AwaitDigest;
        } else {
            self.collector.clear();
            self.phase = ControllerPhase::Message { cursor: 0 };
        }
    }

    /// Drops any in-flight digest and returns to `Idle`.
    pub fn reset(&mut self) {
        self.engine.init();
        self.pending.zeroize();
        self.collector.clear();
        self.phase = ControllerPhase::Idle;
        self.mode = None;
        self.chunks_absorbed = 0;
        self.message_words = 0;
    }
}
