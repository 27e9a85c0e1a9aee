use sha2::{Digest, Sha256};
use tempfile::TempDir;

use pufkey_core::extractor::{raw_blocks_from_bytes, replicate};
use pufkey_core::params::{BLOCKS, KEY_BYTES};
use pufkey_core::reed_muller;
use pufkey_core::reference;
use pufkey_core::{
    Delayed, EntropyMode, ExtractorParams, FixedEntropy, FixedPuf, GeneratorEvent, HelperRecord,
    KeccakEngine, KeyGenerator, NoisyPuf, OsEntropy, PufKeyConfig, PufKeyError, PufSource,
    SoftwarePuf,
};

const BUDGET: u64 = 50_000;

fn puf_bytes(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(29).wrapping_add(seed) ^ 0x5A)
        .collect()
}

fn expected_key(bytes: &[u8]) -> [u8; KEY_BYTES] {
    let replicated = replicate(&raw_blocks_from_bytes(bytes)).unwrap();
    reference::hash_puf_mode(&replicated)
}

fn fingerprint(key: &[u8; KEY_BYTES]) -> String {
    hex::encode(&Sha256::digest(key)[0..8])
}

// =============================================================================
// End-to-end against the reference model
// =============================================================================

#[test]
fn test_enrollment_and_tag_match_reference() {
    let bytes = puf_bytes(3, 32);
    let mut gen = KeyGenerator::new(
        FixedPuf::new(bytes.clone()),
        FixedEntropy::cycle(&[true, true, false], BLOCKS),
        KeccakEngine::new(2),
        ExtractorParams::default(),
    )
    .unwrap();

    let enrollment = gen.run_enrollment(BUDGET).unwrap();
    let key = expected_key(&bytes);
    assert_eq!(enrollment.key_fingerprint, fingerprint(&key));

    for len in [1usize, 17, 18, 19, 36, 37, 100] {
        let message: Vec<u32> = (0..len as u32).map(|i| i.wrapping_mul(0x0101_0101)).collect();
        let tag = gen.compute_tag(&message, BUDGET).unwrap();
        assert_eq!(tag, reference::keyed_hash(&key, &message), "len {len}");
    }
}

#[test]
fn test_near_identical_messages_give_distinct_tags() {
    let mut gen = KeyGenerator::new(
        FixedPuf::new(puf_bytes(5, 32)),
        FixedEntropy::cycle(&[false, true], BLOCKS),
        KeccakEngine::new(1),
        ExtractorParams::default(),
    )
    .unwrap();
    gen.run_enrollment(BUDGET).unwrap();

    let base: Vec<u32> = (0..20).collect();
    let mut corpus = vec![base.clone(), base[..19].to_vec(), base[..18].to_vec()];
    for i in [0usize, 17, 18, 19] {
        let mut m = base.clone();
        m[i] ^= 1;
        corpus.push(m);
    }

    let mut tags = Vec::new();
    for message in &corpus {
        tags.push(gen.compute_tag(message, BUDGET).unwrap());
    }
    for i in 0..tags.len() {
        for j in i + 1..tags.len() {
            assert_ne!(tags[i], tags[j], "messages {i} and {j} collide");
        }
    }
}

#[test]
fn test_helper_data_masks_replicated_reading() {
    let bytes = puf_bytes(9, 16);
    let params = ExtractorParams::new(4, EntropyMode::Replicated).unwrap();
    let bits: Vec<bool> = (0..BLOCKS).map(|i| i % 3 == 0).collect();
    let mut gen = KeyGenerator::new(
        FixedPuf::new(bytes.clone()),
        FixedEntropy::new(bits.clone()),
        KeccakEngine::new(0),
        params,
    )
    .unwrap();
    let enrollment = gen.run_enrollment(BUDGET).unwrap();

    let raw = raw_blocks_from_bytes(&bytes);
    for (i, word) in enrollment.helper.words().iter().enumerate() {
        let group = if bits[i] { reed_muller::MESSAGE_MASK } else { 0 };
        assert_eq!(*word ^ reed_muller::encode(group), raw[i % raw.len()], "block {i}");
    }
}

#[test]
fn test_only_configured_addresses_are_read() {
    let params = ExtractorParams::new(2, EntropyMode::Replicated).unwrap();
    let mut gen = KeyGenerator::new(
        FixedPuf::new(puf_bytes(1, 88)),
        FixedEntropy::cycle(&[false], BLOCKS),
        KeccakEngine::new(0),
        params,
    )
    .unwrap();
    gen.run_enrollment(BUDGET).unwrap();
    assert_eq!(gen.puf_mut().requests(), &[0, 1, 2, 3, 4, 5, 6, 7]);
}

// =============================================================================
// Event surface
// =============================================================================

#[test]
fn test_events_fire_once_per_result() {
    let mut gen = KeyGenerator::new(
        Delayed::new(FixedPuf::new(puf_bytes(2, 32)), 1),
        FixedEntropy::cycle(&[true], BLOCKS * 2),
        KeccakEngine::new(3),
        ExtractorParams::default(),
    )
    .unwrap();
    gen.enroll().unwrap();

    let mut events = Vec::new();
    for _ in 0..BUDGET {
        gen.step();
        while let Some(e) = gen.poll_event() {
            events.push(e);
        }
        if gen.is_key_ready() {
            break;
        }
    }
    gen.begin_tag().unwrap();
    gen.offer_word(0xABCD, true).unwrap();
    for _ in 0..BUDGET {
        gen.step();
        while let Some(e) = gen.poll_event() {
            events.push(e);
        }
        if !gen.is_tag_in_flight() {
            break;
        }
    }
    for _ in 0..10 {
        gen.step();
    }
    assert!(gen.poll_event().is_none());

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            GeneratorEvent::HelperDataReady(_) => "helper",
            GeneratorEvent::KeyReady { .. } => "key",
            GeneratorEvent::TagReady(_) => "tag",
        })
        .collect();
    assert_eq!(kinds, vec!["helper", "key", "tag"]);
}

#[test]
fn test_reset_clears_everything() {
    let mut gen = KeyGenerator::new(
        FixedPuf::new(puf_bytes(4, 32)),
        FixedEntropy::cycle(&[true], BLOCKS * 2),
        KeccakEngine::new(0),
        ExtractorParams::default(),
    )
    .unwrap();
    gen.run_enrollment(BUDGET).unwrap();
    gen.reset();
    assert!(gen.key_fingerprint().is_none());
    assert!(matches!(gen.begin_tag(), Err(PufKeyError::NotReady)));

    // A fresh enrollment after reset reaches the same key.
    let again = gen.run_enrollment(BUDGET).unwrap();
    assert_eq!(again.key_fingerprint, fingerprint(&expected_key(&puf_bytes(4, 32))));
}

// =============================================================================
// Software sources
// =============================================================================

#[test]
fn test_software_puf_enrollment_is_stable() {
    let dir = TempDir::new().unwrap();
    let seed_path = dir.path().join("puf_seed");

    let first = {
        let mut gen = KeyGenerator::new(
            SoftwarePuf::new_with_path(&seed_path).unwrap(),
            OsEntropy,
            KeccakEngine::new(1),
            ExtractorParams::default(),
        )
        .unwrap();
        gen.run_enrollment(BUDGET).unwrap()
    };
    let second = {
        let mut gen = KeyGenerator::new(
            SoftwarePuf::new_with_path(&seed_path).unwrap(),
            OsEntropy,
            KeccakEngine::new(0),
            ExtractorParams::default(),
        )
        .unwrap();
        gen.run_enrollment(BUDGET).unwrap()
    };
    assert_eq!(first.key_fingerprint, second.key_fingerprint);
}

#[test]
fn test_noisy_reading_changes_key() {
    let bytes = puf_bytes(6, 32);
    let noisy = NoisyPuf::new(FixedPuf::new(bytes.clone()), 1.0, 42).unwrap();
    let mut gen = KeyGenerator::new(
        noisy,
        FixedEntropy::cycle(&[false], BLOCKS),
        KeccakEngine::new(0),
        ExtractorParams::default(),
    )
    .unwrap();
    let enrollment = gen.run_enrollment(BUDGET).unwrap();
    assert_ne!(enrollment.key_fingerprint, fingerprint(&expected_key(&bytes)));
}

// =============================================================================
// Config and helper store
// =============================================================================

#[test]
fn test_config_driven_enrollment_persists_record() {
    let dir = TempDir::new().unwrap();
    let mut config = PufKeyConfig::load_or_default(dir.path()).unwrap();
    config.extractor = ExtractorParams::new(5, EntropyMode::Full).unwrap();
    config.engine.latency_ticks = 4;
    config.persist().unwrap();

    let config = PufKeyConfig::load_or_default(dir.path()).unwrap();
    let puf = FixedPuf::new(puf_bytes(8, 20));
    let device_id = puf.device_id();
    let mut gen = KeyGenerator::from_config(
        &config,
        puf,
        FixedEntropy::cycle(&[true, false], BLOCKS * 6),
    )
    .unwrap();
    let enrollment = gen.run_enrollment(config.step_budget).unwrap();

    let record = HelperRecord::new(
        device_id,
        &config.extractor,
        enrollment.helper,
        enrollment.key_fingerprint.clone(),
    );
    record.save(&config.helper_path()).unwrap();

    let loaded = HelperRecord::load(&config.helper_path()).unwrap();
    assert_eq!(loaded.helper_data, enrollment.helper);
    assert_eq!(loaded.params().unwrap(), config.extractor);
    assert_eq!(loaded.key_fingerprint, enrollment.key_fingerprint);
}
