use super::SpongeEngine;
use crate::params::{DIGEST_BYTES, RATE_BYTES, RATE_WORDS};

const STATE_LANES: usize = 25;
const SHA3_DOMAIN_PAD: u8 = 0x06;
const FINAL_PAD: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnginePhase {
    Absorbing,
    Finalizing,
    Done,
}

/// Software SHA3-512 engine over Keccak-f[1600].
///
/// `latency` models permutation time: after each full block, and after the
/// final block, the engine stays full for that many ticks. With zero latency
/// it never reports busy.
#[derive(Clone)]
pub struct KeccakEngine {
    state: [u64; STATE_LANES],
    words_in_block: usize,
    phase: EnginePhase,
    latency: u32,
    busy_ticks: u32,
    ready_pulse: bool,
    digest: [u8; DIGEST_BYTES],
    words_absorbed: u64,
    permutations: u64,
}

impl Default for KeccakEngine {
    fn default() -> Self {
        Self::new(0)
    }
}

impl KeccakEngine {
    pub fn new(latency: u32) -> Self {
        Self {
            state: [0u64; STATE_LANES],
            words_in_block: 0,
            phase: EnginePhase::Absorbing,
            latency,
            busy_ticks: 0,
            ready_pulse: false,
            digest: [0u8; DIGEST_BYTES],
            words_absorbed: 0,
            permutations: 0,
        }
    }

    pub fn latency(&self) -> u32 {
        self.latency
    }

    /// Words accepted since the last `init`.
    pub fn words_absorbed(&self) -> u64 {
        self.words_absorbed
    }

    /// Keccak-f calls since the last `init`.
    pub fn permutations(&self) -> u64 {
        self.permutations
    }

    fn absorb_word(&mut self, word: u32) {
        let lane = self.words_in_block / 2;
        let shift = 32 * (self.words_in_block % 2);
        self.state[lane] ^= (word as u64) << shift;
        self.words_in_block += 1;
        self.words_absorbed += 1;
    }

    fn xor_byte(&mut self, index: usize, byte: u8) {
        self.state[index / 8] ^= (byte as u64) << (8 * (index % 8));
    }

    fn permute(&mut self) {
        keccak::f1600(&mut self.state);
        self.permutations += 1;
    }

    fn finalize(&mut self) {
        if self.words_in_block == RATE_WORDS {
            self.permute();
            self.words_in_block = 0;
        }
        self.xor_byte(self.words_in_block * 4, SHA3_DOMAIN_PAD);
        self.xor_byte(RATE_BYTES - 1, FINAL_PAD);
        self.permute();

        for (chunk, lane) in self.digest.chunks_exact_mut(8).zip(self.state.iter()) {
            chunk.copy_from_slice(&lane.to_le_bytes());
        }

        if self.latency == 0 {
            self.phase = EnginePhase::Done;
            self.ready_pulse = true;
        } else {
            self.phase = EnginePhase::Finalizing;
            self.busy_ticks = self.latency;
        }
    }
}

impl SpongeEngine for KeccakEngine {
    fn init(&mut self) {
        let latency = self.latency;
        *self = Self::new(latency);
    }

    fn offer_word(&mut self, word: u32, is_last: bool) -> bool {
        if self.is_full() {
            return false;
        }
        self.absorb_word(word);
        if is_last {
            self.finalize();
        } else if self.words_in_block == RATE_WORDS {
            self.permute();
            self.words_in_block = 0;
            self.busy_ticks = self.latency;
        }
        true
    }

    fn is_busy(&self) -> bool {
        self.busy_ticks > 0
    }

    fn is_full(&self) -> bool {
        self.busy_ticks > 0 || self.phase != EnginePhase::Absorbing
    }

    fn tick(&mut self) {
        if self.busy_ticks == 0 {
            return;
        }
        self.busy_ticks -= 1;
        if self.busy_ticks == 0 && self.phase == EnginePhase::Finalizing {
            self.phase = EnginePhase::Done;
            self.ready_pulse = true;
        }
    }

    fn take_digest_ready(&mut self) -> bool {
        std::mem::take(&mut self.ready_pulse)
    }

    fn digest(&self) -> Option<&[u8; DIGEST_BYTES]> {
        match self.phase {
            EnginePhase::Done => Some(&self.digest),
            _ => None,
        }
    }
}
