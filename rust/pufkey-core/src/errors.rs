#[derive(Debug, thiserror::Error)]
pub enum PufKeyError {
    #[error("params: {0}")]
    InvalidParams(String),
    #[error("generator: enrollment already in progress")]
    EnrollmentInProgress,
    #[error("generator: derived key not ready")]
    NotReady,
    #[error("generator: keyed hash already in progress")]
    TagInProgress,
    #[error("generator: no keyed hash session active")]
    NoTagSession,
    #[error("sponge: word offered while collector not ready")]
    Backpressure,
    #[error("sponge: controller busy with another digest")]
    ControllerBusy,
    #[error("driver: no progress after {steps} steps")]
    Stalled { steps: u64 },
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("helper store: unsupported record version {0}")]
    UnsupportedVersion(u32),
    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("crypto error: {0}")]
    Crypto(String),
}

pub type Result<T> = std::result::Result<T, PufKeyError>;
