//! Key-derivation orchestrator.
//!
//! Sequences enrollment (fuzzy extraction, then hashing R′ into the derived
//! key) and keyed-hash requests over that key. Everything advances through
//! [`KeyGenerator::step`]; results surface as single-fire events.

use std::collections::VecDeque;

use crate::config::PufKeyConfig;
use crate::errors::{PufKeyError, Result};
use crate::extractor::FuzzyExtractor;
use crate::params::ExtractorParams;
use crate::source::{EntropySource, PufSource};
use crate::sponge::{AbsorptionController, HashMode, KeccakEngine, SpongeEngine};
use crate::types::{DerivedKey, HelperData, ReplicatedPuf, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Idle,
    Extracting,
    KeyHashing,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorEvent {
    HelperDataReady(HelperData),
    KeyReady { fingerprint: String },
    TagReady(Tag),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub helper: HelperData,
    pub key_fingerprint: String,
    pub steps: u64,
}

pub struct KeyGenerator<P, R, E> {
    puf: P,
    entropy: R,
    extractor: FuzzyExtractor,
    controller: AbsorptionController<E>,
    state: GeneratorState,
    replicated: Option<ReplicatedPuf>,
    staged_helper: Option<HelperData>,
    helper: Option<HelperData>,
    key: Option<DerivedKey>,
    key_hash_started: bool,
    tag_in_flight: bool,
    events: VecDeque<GeneratorEvent>,
    enrollments_completed: u64,
    tags_completed: u64,
}

impl<P: PufSource, R: EntropySource> KeyGenerator<P, R, KeccakEngine> {
    pub fn from_config(config: &PufKeyConfig, puf: P, entropy: R) -> Result<Self> {
        config.validate()?;
        Self::new(
            puf,
            entropy,
            KeccakEngine::new(config.engine.latency_ticks),
            config.extractor,
        )
    }
}

impl<P: PufSource, R: EntropySource, E: SpongeEngine> KeyGenerator<P, R, E> {
    pub fn new(puf: P, entropy: R, engine: E, params: ExtractorParams) -> Result<Self> {
        Ok(Self {
            puf,
            entropy,
            extractor: FuzzyExtractor::new(params)?,
            controller: AbsorptionController::new(engine),
            state: GeneratorState::Idle,
            replicated: None,
            staged_helper: None,
            helper: None,
            key: None,
            key_hash_started: false,
            tag_in_flight: false,
            events: VecDeque::new(),
            enrollments_completed: 0,
            tags_completed: 0,
        })
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    /// Helper data of the last completed enrollment.
    pub fn helper_data(&self) -> Option<&HelperData> {
        self.helper.as_ref()
    }

    pub fn is_key_ready(&self) -> bool {
        self.key.is_some()
    }

    pub fn key_fingerprint(&self) -> Option<String> {
        self.key.as_ref().map(DerivedKey::fingerprint)
    }

    pub fn device_id(&self) -> String {
        self.puf.device_id()
    }

    pub fn is_tag_in_flight(&self) -> bool {
        self.tag_in_flight
    }

    pub fn enrollments_completed(&self) -> u64 {
        self.enrollments_completed
    }

    pub fn tags_completed(&self) -> u64 {
        self.tags_completed
    }

    pub fn controller(&self) -> &AbsorptionController<E> {
        &self.controller
    }

    pub fn puf_mut(&mut self) -> &mut P {
        &mut self.puf
    }

    pub fn entropy_mut(&mut self) -> &mut R {
        &mut self.entropy
    }

    /// Starts a fresh enrollment. Allowed from `Idle` and `Ready`; the
    /// previous key and helper data stay observable until the new pair is
    /// latched.
    pub fn enroll(&mut self) -> Result<()> {
        match self.state {
            GeneratorState::Extracting | GeneratorState::KeyHashing => {
                Err(PufKeyError::EnrollmentInProgress)
            }
            GeneratorState::Idle | GeneratorState::Ready => {
                if !self.extractor.start() {
                    return Err(PufKeyError::EnrollmentInProgress);
                }
                if self.tag_in_flight {
                    log::warn!("generator: re-enrolling while a keyed hash is in flight");
                }
                log::info!("generator: enrollment started for {}", self.puf.device_id());
                self.state = GeneratorState::Extracting;
                self.key_hash_started = false;
                Ok(())
            }
        }
    }

    /// Opens a keyed-hash session over the current key.
    pub fn begin_tag(&mut self) -> Result<()> {
        if self.state != GeneratorState::Ready {
            return Err(PufKeyError::NotReady);
        }
        if self.tag_in_flight {
            return Err(PufKeyError::TagInProgress);
        }
        let key = self.key.as_ref().ok_or(PufKeyError::NotReady)?;
        self.controller.start_keyed_hash(key)?;
        self.tag_in_flight = true;
        Ok(())
    }

    pub fn ready_for_word(&self) -> bool {
        self.tag_in_flight && self.controller.ready_for_word()
    }

    pub fn offer_word(&mut self, word: u32, is_last: bool) -> Result<()> {
        if !self.tag_in_flight {
            return Err(PufKeyError::NoTagSession);
        }
        self.controller.offer_word(word, is_last).inspect_err(|_| {
            log::warn!("generator: message word offered while collector not ready");
        })
    }

    pub fn poll_event(&mut self) -> Option<GeneratorEvent> {
        self.events.pop_front()
    }

    /// One unit of progress across the extractor and the sponge controller.
    pub fn step(&mut self) {
        if self.state == GeneratorState::Extracting {
            if let Some(extraction) = self.extractor.step(&mut self.puf, &mut self.entropy) {
                self.staged_helper = Some(extraction.helper);
                self.replicated = Some(extraction.replicated);
                self.events
                    .push_back(GeneratorEvent::HelperDataReady(extraction.helper));
                self.state = GeneratorState::KeyHashing;
                log::debug!("generator: extraction complete, hashing key");
            }
        }

        if self.state == GeneratorState::KeyHashing
            && !self.key_hash_started
            && self.controller.is_idle()
        {
            if let Some(replicated) = self.replicated.as_ref() {
                match self.controller.start_key_derivation(replicated) {
                    Ok(()) => self.key_hash_started = true,
                    Err(e) => log::warn!("generator: {e}"),
                }
            }
        }

        if let Some(event) = self.controller.step() {
            match event.mode {
                HashMode::KeyDerivation => {
                    let key = DerivedKey::from_digest(event.digest);
                    let fingerprint = key.fingerprint();
                    self.key = Some(key);
                    if let Some(helper) = self.staged_helper.take() {
                        self.helper = Some(helper);
                    }
                    self.state = GeneratorState::Ready;
                    self.enrollments_completed += 1;
                    log::info!("generator: key ready (fp={fingerprint})");
                    self.events
                        .push_back(GeneratorEvent::KeyReady { fingerprint });
                }
                HashMode::KeyedHash => {
                    self.tag_in_flight = false;
                    self.tags_completed += 1;
                    log::info!(
                        "generator: tag ready after {} message words",
                        self.controller.message_words()
                    );
                    self.events
                        .push_back(GeneratorEvent::TagReady(Tag::from_bytes(event.digest)));
                }
            }
        }
    }

    /// Returns every component to its initial state and clears all latches.
    pub fn reset(&mut self) {
        self.extractor.reset();
        self.controller.reset();
        self.state = GeneratorState::Idle;
        self.replicated = None;
        self.staged_helper = None;
        self.helper = None;
        self.key = None;
        self.key_hash_started = false;
        self.tag_in_flight = false;
        self.events.clear();
        self.enrollments_completed = 0;
        self.tags_completed = 0;
        log::debug!("generator: reset");
    }

    /// Enrolls and steps until the key is ready, giving up after `max_steps`.
    pub fn run_enrollment(&mut self, max_steps: u64) -> Result<Enrollment> {
        self.enroll()?;
        let target = self.enrollments_completed + 1;
        let mut steps = 0;
        while self.enrollments_completed < target {
            if steps == max_steps {
                return Err(PufKeyError::Stalled { steps });
            }
            self.step();
            steps += 1;
        }
        self.discard_events(|e| {
            matches!(
                e,
                GeneratorEvent::HelperDataReady(_) | GeneratorEvent::KeyReady { .. }
            )
        });

        let helper = self.helper.ok_or(PufKeyError::NotReady)?;
        let key_fingerprint = self.key_fingerprint().ok_or(PufKeyError::NotReady)?;
        Ok(Enrollment {
            helper,
            key_fingerprint,
            steps,
        })
    }

    /// Streams `words` through a keyed hash, honouring backpressure. The last
    /// word carries the end-of-message marker. An empty message never
    /// completes and surfaces as `Stalled`.
    pub fn compute_tag(&mut self, words: &[u32], max_steps: u64) -> Result<Tag> {
        self.begin_tag()?;
        let mut next = 0;
        let mut steps = 0;
        loop {
            if steps == max_steps {
                return Err(PufKeyError::Stalled { steps });
            }
            if next < words.len() && self.ready_for_word() {
                self.offer_word(words[next], next + 1 == words.len())?;
                next += 1;
            }
            self.step();
            steps += 1;

            if !self.tag_in_flight {
                break;
            }
        }

        let mut tag = None;
        self.discard_events(|e| match e {
            GeneratorEvent::TagReady(t) => {
                tag = Some(*t);
                true
            }
            _ => false,
        });
        tag.ok_or(PufKeyError::NoTagSession)
    }

    fn discard_events(&mut self, mut matches: impl FnMut(&GeneratorEvent) -> bool) {
        self.events.retain(|e| !matches(e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{EntropyMode, BLOCKS};
    use crate::source::{Delayed, FixedEntropy, FixedPuf};

    const BUDGET: u64 = 10_000;

    fn generator(
        puf_bytes: Vec<u8>,
        latency: u32,
    ) -> KeyGenerator<Box<dyn PufSource>, FixedEntropy, KeccakEngine> {
        KeyGenerator::new(
            Box::new(FixedPuf::new(puf_bytes)) as Box<dyn PufSource>,
            FixedEntropy::cycle(&[true, false, true], BLOCKS * 64),
            KeccakEngine::new(latency),
            ExtractorParams::default(),
        )
        .unwrap()
    }

    fn bytes(seed: u8) -> Vec<u8> {
        (0..32u8).map(|i| i.wrapping_mul(13).wrapping_add(seed)).collect()
    }

    #[test]
    fn test_state_sequence_and_events() {
        let mut gen = generator(bytes(1), 1);
        assert_eq!(gen.state(), GeneratorState::Idle);
        gen.enroll().unwrap();
        assert_eq!(gen.state(), GeneratorState::Extracting);

        let mut seen = Vec::new();
        for _ in 0..BUDGET {
            gen.step();
            while let Some(e) = gen.poll_event() {
                seen.push(e);
            }
            if gen.state() == GeneratorState::Ready {
                break;
            }
        }
        assert_eq!(gen.state(), GeneratorState::Ready);
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], GeneratorEvent::HelperDataReady(_)));
        assert!(matches!(seen[1], GeneratorEvent::KeyReady { .. }));
        assert!(gen.is_key_ready());
    }

    #[test]
    fn test_enroll_rejected_while_in_progress() {
        let mut gen = generator(bytes(1), 0);
        gen.enroll().unwrap();
        assert!(matches!(gen.enroll(), Err(PufKeyError::EnrollmentInProgress)));
    }

    #[test]
    fn test_tag_requires_ready() {
        let mut gen = generator(bytes(1), 0);
        assert!(matches!(gen.begin_tag(), Err(PufKeyError::NotReady)));
        assert!(matches!(
            gen.offer_word(1, true),
            Err(PufKeyError::NoTagSession)
        ));
    }

    #[test]
    fn test_tag_is_deterministic() {
        let mut gen = generator(bytes(3), 2);
        gen.run_enrollment(BUDGET).unwrap();
        let a = gen.compute_tag(&[0xDEADBEEF, 0xCAFEBABE], BUDGET).unwrap();
        let b = gen.compute_tag(&[0xDEADBEEF, 0xCAFEBABE], BUDGET).unwrap();
        assert_eq!(a, b);
        assert_eq!(gen.state(), GeneratorState::Ready);
        assert_eq!(gen.tags_completed(), 2);
    }

    #[test]
    fn test_key_depends_only_on_puf() {
        // Different entropy yields different helper data but the same key.
        let mut a = generator(bytes(5), 0);
        let mut b = KeyGenerator::new(
            Box::new(FixedPuf::new(bytes(5))) as Box<dyn PufSource>,
            FixedEntropy::cycle(&[false], BLOCKS * 4),
            KeccakEngine::new(0),
            ExtractorParams::default(),
        )
        .unwrap();
        let ea = a.run_enrollment(BUDGET).unwrap();
        let eb = b.run_enrollment(BUDGET).unwrap();
        assert_ne!(ea.helper, eb.helper);
        assert_eq!(ea.key_fingerprint, eb.key_fingerprint);
    }

    #[test]
    fn test_re_enrollment_keeps_old_key_until_ready() {
        let mut gen = generator(bytes(7), 1);
        let first = gen.run_enrollment(BUDGET).unwrap();

        *gen.puf_mut() = Box::new(FixedPuf::new(bytes(8)));
        gen.enroll().unwrap();
        gen.step();
        assert_eq!(gen.state(), GeneratorState::Extracting);
        assert_eq!(gen.key_fingerprint(), Some(first.key_fingerprint.clone()));

        let mut staged = None;
        for _ in 0..BUDGET {
            gen.step();
            if let Some(GeneratorEvent::HelperDataReady(h)) = gen.poll_event() {
                staged = Some(h);
            }
            if gen.state() == GeneratorState::KeyHashing {
                assert_eq!(gen.helper_data(), Some(&first.helper));
                assert_eq!(gen.key_fingerprint(), Some(first.key_fingerprint.clone()));
            }
            if gen.state() == GeneratorState::Ready {
                break;
            }
        }
        let second = gen.key_fingerprint().unwrap();
        assert_ne!(second, first.key_fingerprint);
        assert_eq!(gen.helper_data(), staged.as_ref());
        assert_ne!(staged, Some(first.helper));
    }

    #[test]
    fn test_re_enrollment_during_tag_uses_old_key() {
        let mut gen = generator(bytes(9), 0);
        gen.run_enrollment(BUDGET).unwrap();
        let expected = gen.compute_tag(&[1, 2, 3], BUDGET).unwrap();

        gen.begin_tag().unwrap();
        gen.offer_word(1, false).unwrap();
        *gen.puf_mut() = Box::new(FixedPuf::new(bytes(10)));
        gen.enroll().unwrap();
        assert!(matches!(gen.begin_tag(), Err(PufKeyError::NotReady)));

        let message = [1u32, 2, 3];
        let mut next = 1;
        let mut tag = None;
        for _ in 0..BUDGET {
            if next < message.len() && gen.ready_for_word() {
                gen.offer_word(message[next], next + 1 == message.len())
                    .unwrap();
                next += 1;
            }
            gen.step();
            while let Some(event) = gen.poll_event() {
                if let GeneratorEvent::TagReady(t) = event {
                    tag = Some(t);
                }
            }
            if gen.state() == GeneratorState::Ready && tag.is_some() {
                break;
            }
        }
        assert_eq!(tag, Some(expected));
        assert_eq!(gen.state(), GeneratorState::Ready);
        assert_eq!(gen.enrollments_completed(), 2);
    }

    #[test]
    fn test_empty_message_stalls_until_reset() {
        let mut gen = generator(bytes(11), 0);
        gen.run_enrollment(BUDGET).unwrap();
        assert!(matches!(
            gen.compute_tag(&[], 500),
            Err(PufKeyError::Stalled { steps: 500 })
        ));
        assert!(gen.is_tag_in_flight());

        gen.reset();
        assert_eq!(gen.state(), GeneratorState::Idle);
        assert!(!gen.is_key_ready());
        assert!(gen.helper_data().is_none());
        assert!(gen.poll_event().is_none());
    }

    #[test]
    fn test_reset_clears_counters() {
        let mut gen = generator(bytes(12), 0);
        gen.run_enrollment(BUDGET).unwrap();
        gen.compute_tag(&[7], BUDGET).unwrap();
        assert_eq!(gen.enrollments_completed(), 1);
        assert_eq!(gen.tags_completed(), 1);

        gen.reset();
        assert_eq!(gen.enrollments_completed(), 0);
        assert_eq!(gen.tags_completed(), 0);
        assert!(gen.controller().is_idle());
        assert_eq!(gen.controller().mode(), None);

        // Counters restart from zero, so the blocking drivers still terminate.
        gen.run_enrollment(BUDGET).unwrap();
        assert_eq!(gen.enrollments_completed(), 1);
    }

    #[test]
    fn test_long_message_absorbs_in_chunks() {
        let mut gen = generator(bytes(13), 1);
        gen.run_enrollment(BUDGET).unwrap();
        let message: Vec<u32> = (0..19).collect();
        gen.compute_tag(&message, BUDGET).unwrap();
        assert_eq!(gen.controller().message_words(), 19);
        assert_eq!(gen.controller().chunks_absorbed(), 2);
        assert_eq!(gen.controller().engine().latency(), 1);
    }

    #[test]
    fn test_silent_puf_stalls_enrollment() {
        let mut gen = generator(vec![0u8; 5], 0);
        assert!(matches!(
            gen.run_enrollment(300),
            Err(PufKeyError::Stalled { steps: 300 })
        ));
        assert_eq!(gen.state(), GeneratorState::Extracting);
    }

    #[test]
    fn test_slow_sources_and_engine() {
        let mut fast = generator(bytes(12), 0);
        let mut slow = KeyGenerator::new(
            Delayed::new(FixedPuf::new(bytes(12)), 4),
            Delayed::new(FixedEntropy::cycle(&[true, false, true], BLOCKS), 3),
            KeccakEngine::new(7),
            ExtractorParams::default(),
        )
        .unwrap();

        let a = fast.run_enrollment(BUDGET).unwrap();
        let b = slow.run_enrollment(BUDGET).unwrap();
        assert_eq!(a.helper, b.helper);
        assert_eq!(a.key_fingerprint, b.key_fingerprint);
        assert!(b.steps > a.steps);

        let msg: Vec<u32> = (0..40).collect();
        assert_eq!(
            fast.compute_tag(&msg, BUDGET).unwrap(),
            slow.compute_tag(&msg, BUDGET).unwrap()
        );
    }

    #[test]
    fn test_full_entropy_mode_enrolls() {
        let params = ExtractorParams::new(4, EntropyMode::Full).unwrap();
        let mut gen = KeyGenerator::new(
            FixedPuf::new(vec![0x42u8; 16]),
            FixedEntropy::cycle(&[true, false, false, true], params.entropy_mode.bits_required()),
            KeccakEngine::new(0),
            params,
        )
        .unwrap();
        let enrollment = gen.run_enrollment(BUDGET).unwrap();
        assert_eq!(enrollment.key_fingerprint.len(), 16);
        assert_eq!(gen.entropy_mut().remaining(), 0);
    }
}
