mod collector;
mod controller;
mod keccak;

pub use collector::MessageCollector;
pub use controller::{AbsorptionController, ControllerPhase, DigestEvent, HashMode};
pub use keccak::KeccakEngine;

use crate::params::{DIGEST_BYTES, RATE_WORDS};

/// Word-serial interface to a SHA3-512 sponge with rate [`RATE_WORDS`].
///
/// The engine pulls one word per accepted offer. While `is_full` holds it
/// refuses offers; callers retry on a later step. `take_digest_ready` is a
/// pulse: it reports `true` once per digest. `digest` stays valid from that
/// pulse until the next `init`.
pub trait SpongeEngine {
    fn init(&mut self);
    fn offer_word(&mut self, word: u32, is_last: bool) -> bool;
    fn is_busy(&self) -> bool;
    fn is_full(&self) -> bool;
    /// Advances internal timing by one step.
    fn tick(&mut self);
    fn take_digest_ready(&mut self) -> bool;
    fn digest(&self) -> Option<&[u8; DIGEST_BYTES]>;

    /// Offers up to one rate block, stopping at the first refusal. The last
    /// word of `words` carries the final marker when `is_final_block` is set.
    fn absorb_block(&mut self, words: &[u32], is_final_block: bool) -> usize {
        let words = &words[..words.len().min(RATE_WORDS)];
        let mut accepted = 0;
        for (i, &word) in words.iter().enumerate() {
            let is_last = is_final_block && i + 1 == words.len();
            if !self.offer_word(word, is_last) {
                break;
            }
            accepted += 1;
        }
        accepted
    }
}

impl<T: SpongeEngine + ?Sized> SpongeEngine for Box<T> {
    fn init(&mut self) {
        (**self).init()
    }

    fn offer_word(&mut self, word: u32, is_last: bool) -> bool {
        (**self).offer_word(word, is_last)
    }

    fn is_busy(&self) -> bool {
        (**self).is_busy()
    }

    fn is_full(&self) -> bool {
        (**self).is_full()
    }

    fn tick(&mut self) {
        (**self).tick()
    }

    fn take_digest_ready(&mut self) -> bool {
        (**self).take_digest_ready()
    }

    fn digest(&self) -> Option<&[u8; DIGEST_BYTES]> {
        (**self).digest()
    }
}
