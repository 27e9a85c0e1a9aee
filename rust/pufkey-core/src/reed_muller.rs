//! First-order Reed-Muller RM(1,5) encoder.
//!
//! A 6-bit message `a` selects the affine Boolean function
//! `f(v) = a0 ^ a1·v0 ^ a2·v1 ^ a3·v2 ^ a4·v3 ^ a5·v4`, and the codeword is
//! that function evaluated at all 32 points of the 5-cube. Codeword bit `u`
//! holds `f(u)`.

use crate::params::{GROUP_BITS, WORD_BITS};

pub const MESSAGE_MASK: u8 = (1 << GROUP_BITS) - 1;

/// Encodes the low six bits of `a`. Higher bits are ignored.
pub fn encode(a: u8) -> u32 {
    let a = a & MESSAGE_MASK;
    let constant = a & 1;
    let mut codeword = 0u32;
    for u in 0..WORD_BITS as u32 {
        let v = (u & 0x1f) as u8;
        let parity = (((a >> 1) & v).count_ones() & 1) as u8;
        let bit = constant ^ parity;
        codeword |= (bit as u32) << u;
    }
    codeword
}

/// Encodes every group of `x` into one codeword each.
pub fn encode_groups<const G: usize>(groups: &[u8; G]) -> [u32; G] {
    let mut out = [0u32; G];
    for (slot, &group) in out.iter_mut().zip(groups.iter()) {
        *slot = encode(group);
    }
    out
}
