use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{PufKeyError, Result};
use crate::params::{BLOCKS, DIGEST_BYTES, HELPER_DATA_BYTES, KEY_BYTES, WORD_BYTES};

/// Packs words into their little-endian byte stream.
pub fn words_to_le_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Inverse of [`words_to_le_bytes`]; `bytes.len()` must be a multiple of four.
pub fn le_bytes_to_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % WORD_BYTES != 0 {
        return Err(PufKeyError::InvalidLength {
            expected: bytes.len().next_multiple_of(WORD_BYTES),
            actual: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(WORD_BYTES)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn words_from_exact(bytes: &[u8]) -> Result<[u32; BLOCKS]> {
    if bytes.len() != HELPER_DATA_BYTES {
        return Err(PufKeyError::InvalidLength {
            expected: HELPER_DATA_BYTES,
            actual: bytes.len(),
        });
    }
    let mut out = [0u32; BLOCKS];
    for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(WORD_BYTES)) {
        *slot = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(out)
}

fn pack_blocks(words: &[u32; BLOCKS]) -> [u8; HELPER_DATA_BYTES] {
    let mut out = [0u8; HELPER_DATA_BYTES];
    for (chunk, word) in out.chunks_exact_mut(WORD_BYTES).zip(words.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    out
}

/// R′: the raw PUF blocks cyclically repeated to `BLOCKS` words.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ReplicatedPuf([u32; BLOCKS]);

impl ReplicatedPuf {
    pub fn from_words(words: [u32; BLOCKS]) -> Self {
        Self(words)
    }

    pub fn words(&self) -> &[u32; BLOCKS] {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; HELPER_DATA_BYTES] {
        pack_blocks(&self.0)
    }
}

impl fmt::Debug for ReplicatedPuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReplicatedPuf(<redacted>)")
    }
}

/// Public helper data `H = R′ ^ Enc(x)`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HelperData([u32; BLOCKS]);

impl HelperData {
    pub fn from_words(words: [u32; BLOCKS]) -> Self {
        Self(words)
    }

    pub fn words(&self) -> &[u32; BLOCKS] {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; HELPER_DATA_BYTES] {
        pack_blocks(&self.0)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self(words_from_exact(bytes)?))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_bytes(&hex::decode(s.trim())?)
    }
}

impl fmt::Debug for HelperData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HelperData({})", self.to_hex())
    }
}

impl Serialize for HelperData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_hex().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HelperData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        HelperData::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Code message x, one 6-bit group per block.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EntropyWord([u8; BLOCKS]);

impl EntropyWord {
    pub fn from_groups(groups: [u8; BLOCKS]) -> Self {
        Self(groups.map(|g| g & crate::reed_muller::MESSAGE_MASK))
    }

    pub fn groups(&self) -> &[u8; BLOCKS] {
        &self.0
    }
}

impl fmt::Debug for EntropyWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EntropyWord(<redacted>)")
    }
}

/// The 512-bit key derived from R′. Never serialized or printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_BYTES]);

impl DerivedKey {
    pub(crate) fn from_digest(digest: [u8; DIGEST_BYTES]) -> Self {
        Self(digest)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }

    /// Short public identifier of the key: SHA-256 over the key, first 8 bytes.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.0);
        hex::encode(&digest[0..8])
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKey(fp={})", self.fingerprint())
    }
}

/// 512-bit keyed-hash output.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag([u8; DIGEST_BYTES]);

impl Tag {
    pub fn from_bytes(bytes: [u8; DIGEST_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.to_hex())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
