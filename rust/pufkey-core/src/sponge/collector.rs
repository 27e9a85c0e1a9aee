use crate::errors::{PufKeyError, Result};
use crate::params::RATE_WORDS;

/// Gathers incoming message words into rate-sized chunks.
///
/// A chunk seals when it holds [`RATE_WORDS`] words or when a word arrives
/// with the last-word marker. While sealed the collector is not ready and
/// refuses further words. An empty chunk never seals.
#[derive(Debug, Clone)]
pub struct MessageCollector {
    chunk: [u32; RATE_WORDS],
    len: usize,
    sealed: bool,
    final_chunk: bool,
}

impl Default for MessageCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCollector {
    pub fn new() -> Self {
        Self {
            chunk: [0u32; RATE_WORDS],
            len: 0,
            sealed: false,
            final_chunk: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.sealed
    }

    pub fn push(&mut self, word: u32, is_last: bool) -> Result<()> {
        if self.sealed {
            return Err(PufKeyError::Backpressure);
        }
        self.chunk[self.len] = word;
        self.len += 1;
        if is_last {
            self.final_chunk = true;
            self.sealed = true;
        } else if self.len == RATE_WORDS {
            self.sealed = true;
        }
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Whether the sealed chunk ends the message.
    pub fn is_final(&self) -> bool {
        self.final_chunk
    }

    pub fn words(&self) -> &[u32] {
        &self.chunk[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Releases the current chunk so the next one can be collected.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
