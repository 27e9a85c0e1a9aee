//! Whole-message software model of the two hash modes, built on `sha3`.
//! Used to check streaming results and by the command-line tools.

use sha3::{Digest, Sha3_512};

use crate::errors::{PufKeyError, Result};
use crate::params::{DIGEST_BYTES, HELPER_DATA_BYTES, IPAD_BYTE, KEY_BYTES, PADDED_KEY_BYTES};
use crate::types::{words_to_le_bytes, ReplicatedPuf, Tag};

fn sha3_512(parts: &[&[u8]]) -> [u8; DIGEST_BYTES] {
    let mut hasher = Sha3_512::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; DIGEST_BYTES];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// SHA3-512 over the 88-byte little-endian form of R′.
pub fn hash_puf_mode(replicated: &ReplicatedPuf) -> [u8; DIGEST_BYTES] {
    sha3_512(&[&replicated.to_bytes()])
}

/// Same as [`hash_puf_mode`] over raw bytes; `bytes` must be 88 long.
pub fn hash_puf_bytes(bytes: &[u8]) -> Result<[u8; DIGEST_BYTES]> {
    if bytes.len() != HELPER_DATA_BYTES {
        return Err(PufKeyError::InvalidLength {
            expected: HELPER_DATA_BYTES,
            actual: bytes.len(),
        });
    }
    Ok(sha3_512(&[bytes]))
}

pub fn hash_words(words: &[u32]) -> [u8; DIGEST_BYTES] {
    sha3_512(&[&words_to_le_bytes(words)])
}

/// `(key || 0^8) ^ ipad`, the 72-byte first block of a keyed hash.
pub fn key_block(key: &[u8; KEY_BYTES]) -> [u8; PADDED_KEY_BYTES] {
    let mut block = [IPAD_BYTE; PADDED_KEY_BYTES];
    for (b, k) in block.iter_mut().zip(key.iter()) {
        *b ^= k;
    }
    block
}

/// `SHA3-512(key_block(key) || LE(words))`.
pub fn keyed_hash(key: &[u8; KEY_BYTES], words: &[u32]) -> Tag {
    Tag::from_bytes(sha3_512(&[&key_block(key), &words_to_le_bytes(words)]))
}

/// Indices of bytes that differ between two digests.
pub fn diff_bytes(a: &[u8], b: &[u8]) -> Vec<usize> {
    let common = a.len().min(b.len());
    let mut out: Vec<usize> = (0..common).filter(|&i| a[i] != b[i]).collect();
    out.extend(common..a.len().max(b.len()));
    out
}
