#![no_main]
use libfuzzer_sys::fuzz_target;
use pufkey_core::extractor::{raw_blocks_from_bytes, replicate};
use pufkey_core::params::BLOCKS;
use pufkey_core::reference;
use pufkey_core::{ExtractorParams, FixedEntropy, FixedPuf, KeccakEngine, KeyGenerator};

// Streamed tags must match the one-shot reference for any reading, latency
// and message length.
fuzz_target!(|data: &[u8]| {
    if data.len() < 33 { return; }
    let latency = (data[0] % 8) as u32;
    let puf = &data[1..33];
    let words: Vec<u32> = data[33..]
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if words.is_empty() { return; }

    let mut gen = KeyGenerator::new(
        FixedPuf::new(puf.to_vec()),
        FixedEntropy::cycle(&[true, false], BLOCKS),
        KeccakEngine::new(latency),
        ExtractorParams::default(),
    )
    .unwrap();
    gen.run_enrollment(100_000).unwrap();
    let tag = gen.compute_tag(&words, 1_000_000).unwrap();

    let key = reference::hash_puf_mode(&replicate(&raw_blocks_from_bytes(puf)).unwrap());
    assert_eq!(tag, reference::keyed_hash(&key, &words));
});
