pub mod config;
pub mod errors;
pub mod extractor;
pub mod generator;
pub mod helper_store;
pub mod params;
pub mod reed_muller;
pub mod reference;
pub mod source;
pub mod sponge;
pub mod types;

// Re-export common types
pub use crate::config::PufKeyConfig;
pub use crate::errors::{PufKeyError, Result};
pub use crate::extractor::{Extraction, ExtractorState, FuzzyExtractor};
pub use crate::generator::{Enrollment, GeneratorEvent, GeneratorState, KeyGenerator};
pub use crate::helper_store::HelperRecord;
pub use crate::params::{EntropyMode, ExtractorParams};
pub use crate::source::{
    Delayed, EntropySource, FixedEntropy, FixedPuf, NoisyPuf, OsEntropy, PufSource, SoftwarePuf,
};
pub use crate::sponge::{AbsorptionController, HashMode, KeccakEngine, SpongeEngine};
pub use crate::types::{DerivedKey, HelperData, ReplicatedPuf, Tag};
