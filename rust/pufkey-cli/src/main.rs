use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use pufkey_core::config::DATA_DIR_ENV;
use pufkey_core::params::{HELPER_DATA_BYTES, KEY_BYTES};
use pufkey_core::{helper_store, reference};
use pufkey_core::{
    FixedPuf, HelperRecord, KeyGenerator, OsEntropy, PufKeyConfig, PufSource, SoftwarePuf, Tag,
};

#[derive(Parser)]
#[command(author, version, about = "PUF-based key derivation and keyed hashing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, config and software PUF seed
    Init,
    /// Enroll the PUF and store the helper record
    Enroll {
        /// Use this PUF reading (hex) instead of the software PUF
        #[arg(long)]
        puf_hex: Option<String>,
        /// Print the helper record as JSON
        #[arg(long)]
        json: bool,
        /// Also write the raw 88-byte helper data to this path
        #[arg(long)]
        raw_out: Option<PathBuf>,
    },
    /// Enroll, then compute a keyed hash over hex message words
    Tag {
        /// Use this PUF reading (hex) instead of the software PUF
        #[arg(long)]
        puf_hex: Option<String>,
        /// Message words as 32-bit hex values
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Plain SHA3-512 over a replicated PUF value or message words
    Hash {
        #[command(subcommand)]
        target: HashTarget,
    },
    /// Keyed hash over message words using an explicit 64-byte key
    ReferenceTag {
        /// Key as 128 hex characters
        key: String,
        words: Vec<String>,
    },
    /// Compare a keyed hash against an expected tag
    Verify {
        /// Key as 128 hex characters
        key: String,
        /// Expected tag as 128 hex characters
        expected: String,
        words: Vec<String>,
    },
    /// Show configuration, seed and helper record
    Status,
}

#[derive(Subcommand)]
enum HashTarget {
    /// Hash a 704-bit replicated PUF value given as 176 hex characters,
    /// most-significant byte first; it is absorbed least-significant byte first
    Puf {
        hex: String,
        /// Compare against this digest (128 hex characters) and fail on mismatch
        #[arg(long)]
        expect: Option<String>,
    },
    /// Hash message words
    Words {
        words: Vec<String>,
        /// Compare against this digest (128 hex characters) and fail on mismatch
        #[arg(long)]
        expect: Option<String>,
    },
}

/// Get the pufkey data directory
fn pufkey_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(home.join(".pufkey"))
}

fn ensure_dirs() -> Result<PufKeyConfig> {
    let dir = pufkey_dir()?;
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create directory: {:?}", dir))?;
    PufKeyConfig::load_or_default(&dir)
}

/// Accepts `0x` prefixes and Verilog-style `_` separators.
fn clean_hex(s: &str) -> String {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    digits.chars().filter(|c| *c != '_').collect()
}

fn decode_hex(s: &str, what: &str) -> Result<Vec<u8>> {
    hex::decode(clean_hex(s)).with_context(|| format!("Invalid {what} hex"))
}

fn parse_word(s: &str) -> Result<u32> {
    u32::from_str_radix(&clean_hex(s), 16).with_context(|| format!("Invalid message word: {s}"))
}

fn parse_words(words: &[String]) -> Result<Vec<u32>> {
    words.iter().map(|w| parse_word(w)).collect()
}

fn parse_key(s: &str) -> Result<[u8; KEY_BYTES]> {
    let bytes = decode_hex(s, "key")?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow!("Key must be {} bytes, got {}", KEY_BYTES, b.len()))
}

fn open_puf(config: &PufKeyConfig, puf_hex: Option<&str>) -> Result<Box<dyn PufSource>> {
    match puf_hex {
        Some(h) => {
            let bytes = decode_hex(h, "PUF")?;
            let needed = config.extractor.puf_bytes();
            if bytes.len() < needed {
                bail!("PUF reading must hold at least {} bytes, got {}", needed, bytes.len());
            }
            Ok(Box::new(FixedPuf::new(bytes)))
        }
        None => {
            let puf = SoftwarePuf::new_with_path(config.seed_path())
                .map_err(|e| anyhow!("Failed to load PUF: {}", e))?;
            Ok(Box::new(puf))
        }
    }
}

fn enrolled_generator(
    config: &PufKeyConfig,
    puf_hex: Option<&str>,
) -> Result<(KeyGenerator<Box<dyn PufSource>, OsEntropy, pufkey_core::KeccakEngine>, HelperRecord)>
{
    let puf = open_puf(config, puf_hex)?;
    let device_id = puf.device_id();
    let mut gen = KeyGenerator::from_config(config, puf, OsEntropy)?;
    let enrollment = gen
        .run_enrollment(config.step_budget)
        .context("Enrollment did not complete")?;
    let record = HelperRecord::new(
        device_id,
        &config.extractor,
        enrollment.helper,
        enrollment.key_fingerprint,
    );
    Ok((gen, record))
}

fn cmd_init() -> Result<()> {
    let config = ensure_dirs()?;
    let seed_path = config.seed_path();

    if !seed_path.exists() {
        println!("Creating software PUF seed...");
    }
    let puf = SoftwarePuf::new_with_path(&seed_path)
        .map_err(|e| anyhow!("Failed to create PUF seed: {}", e))?;

    println!("  Device ID: {}", puf.device_id());
    println!("  Config: {}", config.config_path().display());
    println!();
    println!("pufkey initialized!");
    println!();
    println!("Next steps:");
    println!("  1. Run 'pufkey enroll' to derive a key and store helper data");
    println!("  2. Run 'pufkey tag <words>' to compute a keyed hash");

    Ok(())
}

fn cmd_enroll(puf_hex: Option<String>, json: bool, raw_out: Option<PathBuf>) -> Result<()> {
    let config = ensure_dirs()?;
    let (_gen, record) = enrolled_generator(&config, puf_hex.as_deref())?;
    record.save(&config.helper_path())?;
    if let Some(path) = &raw_out {
        helper_store::save_raw(path, &record.helper_data)
            .with_context(|| format!("Failed to write {:?}", path))?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("Enrollment complete");
    println!("  Device ID:       {}", record.device_id);
    println!("  Helper data:     {}", record.helper_data.to_hex());
    println!("  Key fingerprint: {}", record.key_fingerprint);
    println!("  Record:          {}", config.helper_path().display());
    Ok(())
}

fn cmd_tag(puf_hex: Option<String>, words: &[String]) -> Result<()> {
    let config = ensure_dirs()?;
    let words = parse_words(words)?;
    let (mut gen, record) = enrolled_generator(&config, puf_hex.as_deref())?;
    let tag = gen
        .compute_tag(&words, config.step_budget)
        .context("Keyed hash did not complete")?;

    println!("Key fingerprint: {}", record.key_fingerprint);
    println!("Tag: {}", tag);
    Ok(())
}

fn cmd_hash(target: HashTarget) -> Result<()> {
    let (digest, expect) = match target {
        HashTarget::Puf { hex: h, expect } => {
            let mut bytes = decode_hex(&h, "PUF")?;
            if bytes.len() != HELPER_DATA_BYTES {
                bail!(
                    "Replicated PUF value must be {} bytes, got {}",
                    HELPER_DATA_BYTES,
                    bytes.len()
                );
            }
            // Integer notation to absorption order.
            bytes.reverse();
            (reference::hash_puf_bytes(&bytes)?, expect)
        }
        HashTarget::Words { words, expect } => {
            (reference::hash_words(&parse_words(&words)?), expect)
        }
    };

    let Some(expected) = expect else {
        println!("{}", hex::encode(digest));
        return Ok(());
    };
    let expected = decode_hex(&expected, "expected digest")?;
    check_expected("Digest", &digest, &expected)
}

fn cmd_reference_tag(key: &str, words: &[String]) -> Result<()> {
    let key = parse_key(key)?;
    let tag = reference::keyed_hash(&key, &parse_words(words)?);
    println!("{}", tag);
    Ok(())
}

/// Prints `VERIFIED` on a match, otherwise a per-byte diff, and fails.
fn check_expected(label: &str, computed: &[u8], expected: &[u8]) -> Result<()> {
    let mismatches = reference::diff_bytes(computed, expected);
    if mismatches.is_empty() {
        println!("{}: {}", label, hex::encode(computed));
        println!("VERIFIED");
        return Ok(());
    }

    println!("Computed: {}", hex::encode(computed));
    println!("Expected: {}", hex::encode(expected));
    for i in &mismatches {
        let got = computed.get(*i).map(|b| format!("{b:02x}"));
        let want = expected.get(*i).map(|b| format!("{b:02x}"));
        println!(
            "  byte {:>2}: computed {} expected {}",
            i,
            got.as_deref().unwrap_or("--"),
            want.as_deref().unwrap_or("--")
        );
    }
    bail!("{} mismatch in {} bytes", label, mismatches.len())
}

fn cmd_verify(key: &str, expected: &str, words: &[String]) -> Result<()> {
    let key = parse_key(key)?;
    let expected = decode_hex(expected, "expected tag")?;
    let tag: Tag = reference::keyed_hash(&key, &parse_words(words)?);
    check_expected("Tag", tag.as_bytes(), &expected)
}

fn cmd_status() -> Result<()> {
    let config = ensure_dirs()?;

    println!("=== pufkey Status ===");
    println!();
    println!("Data directory: {}", config.data_dir.display());
    println!("Config:         {}", config.config_path().display());
    println!();
    println!("Extractor:");
    println!("  PUF blocks:   {}", config.extractor.puf_blocks);
    println!("  Entropy mode: {:?}", config.extractor.entropy_mode);
    println!("Engine latency: {} ticks", config.engine.latency_ticks);
    println!("Step budget:    {}", config.step_budget);
    println!();

    let seed_path = config.seed_path();
    if seed_path.exists() {
        match SoftwarePuf::new_with_path(&seed_path) {
            Ok(puf) => println!("Software PUF: {}", puf.device_id()),
            Err(e) => println!("Software PUF: unreadable ({})", e),
        }
    } else {
        println!("Software PUF: not initialized (run 'pufkey init')");
    }

    let helper_path = config.helper_path();
    if helper_path.exists() {
        match HelperRecord::load(&helper_path) {
            Ok(record) => {
                println!("Helper record:");
                println!("  Device ID:       {}", record.device_id);
                println!("  Key fingerprint: {}", record.key_fingerprint);
                println!("  Created:         {}", record.created_at.to_rfc3339());
            }
            Err(e) => println!("Helper record: invalid ({})", e),
        }
    } else {
        println!("Helper record: none (run 'pufkey enroll')");
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            cmd_init()?;
        }
        Commands::Enroll {
            puf_hex,
            json,
            raw_out,
        } => {
            cmd_enroll(puf_hex, json, raw_out)?;
        }
        Commands::Tag { puf_hex, words } => {
            cmd_tag(puf_hex, &words)?;
        }
        Commands::Hash { target } => {
            cmd_hash(target)?;
        }
        Commands::ReferenceTag { key, words } => {
            cmd_reference_tag(&key, &words)?;
        }
        Commands::Verify {
            key,
            expected,
            words,
        } => {
            cmd_verify(&key, &expected, &words)?;
        }
        Commands::Status => {
            cmd_status()?;
        }
    }

    Ok(())
}
