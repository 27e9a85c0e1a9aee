use chrono::Utc;
use hkdf::Hkdf;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::task::Poll;
use zeroize::Zeroize;

use super::{EntropySource, PufSource};
use crate::errors::{PufKeyError, Result};
use crate::params::{BLOCKS, WORD_BYTES};

const SEED_LEN: usize = 32;
const READING_LEN: usize = BLOCKS * WORD_BYTES;
const SOFTWARE_PUF_DOMAIN: &[u8] = b"pufkey-software-puf-v1";
const READING_INFO: &[u8] = b"puf-reading-v1";

/// File-seeded stand-in for a hardware PUF.
///
/// The reading is expanded once from the seed with HKDF-SHA256, so every
/// enrollment against the same seed file sees the same bytes.
pub struct SoftwarePuf {
    device_id: String,
    seed: Vec<u8>,
    seed_path: PathBuf,
    reading: [u8; READING_LEN],
}

impl SoftwarePuf {
    pub fn new_with_path(seed_path: impl AsRef<Path>) -> Result<Self> {
        let seed_path = seed_path.as_ref().to_path_buf();
        let seed = load_or_create_seed(&seed_path)?;
        Self::build(seed, seed_path)
    }

    pub fn new_from_seed(seed: Vec<u8>) -> Result<Self> {
        Self::build(seed, PathBuf::new())
    }

    fn build(seed: Vec<u8>, seed_path: PathBuf) -> Result<Self> {
        if seed.len() != SEED_LEN {
            return Err(PufKeyError::InvalidLength {
                expected: SEED_LEN,
                actual: seed.len(),
            });
        }
        let hk = Hkdf::<Sha256>::new(Some(SOFTWARE_PUF_DOMAIN), &seed);
        let mut reading = [0u8; READING_LEN];
        hk.expand(READING_INFO, &mut reading)
            .map_err(|_| PufKeyError::Crypto("HKDF expand failed".to_string()))?;

        let digest = Sha256::digest(&seed);
        Ok(Self {
            device_id: format!("swpuf-{}", hex::encode(&digest[0..4])),
            seed,
            seed_path,
            reading,
        })
    }

    pub fn seed_path(&self) -> &Path {
        &self.seed_path
    }
}

impl Drop for SoftwarePuf {
    fn drop(&mut self) {
        self.seed.zeroize();
        self.reading.zeroize();
    }
}

impl PufSource for SoftwarePuf {
    fn poll_byte(&mut self, address: usize) -> Poll<u8> {
        match self.reading.get(address) {
            Some(&b) => Poll::Ready(b),
            None => Poll::Pending,
        }
    }

    fn device_id(&self) -> String {
        self.device_id.clone()
    }
}

fn load_or_create_seed(seed_path: &Path) -> Result<Vec<u8>> {
    if let Some(parent) = seed_path.parent() {
        fs::create_dir_all(parent)?;
    }

    if let Ok(data) = fs::read(seed_path) {
        if data.len() == SEED_LEN {
            return Ok(data);
        }
        log::warn!(
            "software puf: ignoring seed file of {} bytes at {:?}",
            data.len(),
            seed_path
        );
    }

    let seed = generate_seed();
    let tmp_path = seed_path.with_extension("tmp");
    fs::write(&tmp_path, &seed)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }
    fs::rename(tmp_path, seed_path)?;
    log::info!("software puf: created new seed at {:?}", seed_path);
    Ok(seed)
}

fn generate_seed() -> Vec<u8> {
    let mut hasher = Sha256::new();

    let mut random_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut random_bytes);
    hasher.update(random_bytes);
    hasher.update(SOFTWARE_PUF_DOMAIN);
    hasher.update(std::env::consts::OS.as_bytes());
    hasher.update(std::env::consts::ARCH.as_bytes());
    hasher.update(Utc::now().to_rfc3339().as_bytes());
    random_bytes.zeroize();

    hasher.finalize().to_vec()
}

/// Flips each bit of the wrapped reading with probability `flip_probability`.
pub struct NoisyPuf<P> {
    inner: P,
    flip_probability: f64,
    rng: StdRng,
}

impl<P: PufSource> NoisyPuf<P> {
    pub fn new(inner: P, flip_probability: f64, noise_seed: u64) -> Result<Self> {
        if !(0.0..=1.0).contains(&flip_probability) {
            return Err(PufKeyError::InvalidParams(format!(
                "flip probability must be within [0, 1], got {flip_probability}"
            )));
        }
        Ok(Self {
            inner,
            flip_probability,
            rng: StdRng::seed_from_u64(noise_seed),
        })
    }
}

impl<P: PufSource> PufSource for NoisyPuf<P> {
    fn poll_byte(&mut self, address: usize) -> Poll<u8> {
        self.inner.poll_byte(address).map(|byte| {
            let mut noise = 0u8;
            for bit in 0..8 {
                if self.rng.random_bool(self.flip_probability) {
                    noise |= 1 << bit;
                }
            }
            byte ^ noise
        })
    }

    fn device_id(&self) -> String {
        self.inner.device_id()
    }
}

/// Operating-system randomness; always ready.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn poll_bit(&mut self) -> Poll<bool> {
        Poll::Ready(rand::rng().random())
    }
}
