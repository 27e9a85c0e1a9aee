mod software;

pub use software::{NoisyPuf, OsEntropy, SoftwarePuf};

use std::collections::VecDeque;
use std::task::Poll;

/// Byte-addressed physical PUF.
///
/// `Pending` means the byte is not available yet. The caller polls the same
/// address again on its next step, so a source never observes reordering.
pub trait PufSource {
    fn poll_byte(&mut self, address: usize) -> Poll<u8>;

    fn device_id(&self) -> String {
        "unknown".to_string()
    }
}

/// Single-bit true-random source. Same polling contract as [`PufSource`].
pub trait EntropySource {
    fn poll_bit(&mut self) -> Poll<bool>;
}

impl<T: PufSource + ?Sized> PufSource for Box<T> {
    fn poll_byte(&mut self, address: usize) -> Poll<u8> {
        (**self).poll_byte(address)
    }

    fn device_id(&self) -> String {
        (**self).device_id()
    }
}

impl<T: EntropySource + ?Sized> EntropySource for Box<T> {
    fn poll_bit(&mut self) -> Poll<bool> {
        (**self).poll_bit()
    }
}

/// In-memory PUF reading. Addresses past the end stay pending forever.
#[derive(Debug, Clone)]
pub struct FixedPuf {
    bytes: Vec<u8>,
    requests: Vec<usize>,
}

impl FixedPuf {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            requests: Vec::new(),
        }
    }

    /// Every address answered so far, in answer order.
    pub fn requests(&self) -> &[usize] {
        &self.requests
    }
}

impl PufSource for FixedPuf {
    fn poll_byte(&mut self, address: usize) -> Poll<u8> {
        match self.bytes.get(address) {
            Some(&b) => {
                self.requests.push(address);
                Poll::Ready(b)
            }
            None => Poll::Pending,
        }
    }

    fn device_id(&self) -> String {
        "fixed".to_string()
    }
}

/// Scripted entropy bits; pending once exhausted.
#[derive(Debug, Clone, Default)]
pub struct FixedEntropy {
    bits: VecDeque<bool>,
    consumed: usize,
}

impl FixedEntropy {
    pub fn new(bits: impl IntoIterator<Item = bool>) -> Self {
        Self {
            bits: bits.into_iter().collect(),
            consumed: 0,
        }
    }

    /// Repeats `pattern` until `len` bits are queued.
    pub fn cycle(pattern: &[bool], len: usize) -> Self {
        Self::new(pattern.iter().copied().cycle().take(len))
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn remaining(&self) -> usize {
        self.bits.len()
    }
}

impl EntropySource for FixedEntropy {
    fn poll_bit(&mut self) -> Poll<bool> {
        match self.bits.pop_front() {
            Some(bit) => {
                self.consumed += 1;
                Poll::Ready(bit)
            }
            None => Poll::Pending,
        }
    }
}

/// Answers `Pending` `delay` times before forwarding each request.
#[derive(Debug, Clone)]
pub struct Delayed<S> {
    inner: S,
    delay: u32,
    waited: u32,
}

impl<S> Delayed<S> {
    pub fn new(inner: S, delay: u32) -> Self {
        Self {
            inner,
            delay,
            waited: 0,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn gate(&mut self) -> bool {
        if self.waited < self.delay {
            self.waited += 1;
            return false;
        }
        self.waited = 0;
        true
    }
}

impl<S: PufSource> PufSource for Delayed<S> {
    fn poll_byte(&mut self, address: usize) -> Poll<u8> {
        if !self.gate() {
            return Poll::Pending;
        }
        self.inner.poll_byte(address)
    }

    fn device_id(&self) -> String {
        self.inner.device_id()
    }
}

impl<S: EntropySource> EntropySource for Delayed<S> {
    fn poll_bit(&mut self) -> Poll<bool> {
        if !self.gate() {
            return Poll::Pending;
        }
        self.inner.poll_bit()
    }
}
