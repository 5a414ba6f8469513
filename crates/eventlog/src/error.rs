//! Error types for measurement-block validation and event-log construction.

use thiserror::Error;

/// A bounded read ran past the end of its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("truncated input: need {needed} bytes at offset {offset}, {remaining} left")]
pub struct Truncated {
    pub offset: usize,
    pub needed: usize,
    pub remaining: usize,
}

/// Structural failures of one SPDM measurement block.
///
/// Every variant is a hard failure; callers treat it as a security violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Block does not extend past the common + DMTF headers
    #[error("measurement block too short: {len} bytes")]
    TooShort { len: usize },

    /// DMTF bit missing from the measurement specification field
    #[error("measurement specification {0:#04x} is not DMTF")]
    UnknownSpecification(u8),

    /// A declared size disagrees with the bytes actually present
    #[error("size mismatch in {field}: declared {declared}, expected {expected}")]
    SizeMismatch {
        field: &'static str,
        declared: usize,
        expected: usize,
    },

    /// Semantic value type outside the defined set
    #[error("unknown measurement value type {0:#04x}")]
    UnknownType(u8),
}

impl From<Truncated> for ValidationError {
    fn from(t: Truncated) -> Self {
        ValidationError::TooShort {
            len: t.offset + t.remaining,
        }
    }
}

/// Errors raised by the measurement-log collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    /// PCR index outside the bank, or an NV index used with an extending event
    #[error("invalid PCR index {0:#x}")]
    InvalidPcr(u32),

    /// The TPM refused the extend or log operation
    #[error("TPM rejected event: {0}")]
    Rejected(String),
}

/// Errors raised while building TCG device-security records.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// Measurement block failed validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Device IO collaborator failed or is missing
    #[error("Device IO error: {0}")]
    DeviceIo(String),

    /// Record does not fit the length field of its layout
    #[error("record of {size} bytes exceeds layout maximum {max}")]
    RecordTooLarge { size: usize, max: usize },

    /// Bytes written disagree with the length computed before allocation
    #[error("record length mismatch: computed {computed}, written {written}")]
    LengthMismatch { computed: usize, written: usize },

    /// Input record could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Bounded read ran out of input
    #[error(transparent)]
    Truncated(#[from] Truncated),

    /// Encoding into the record buffer failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for event-log operations.
pub type EventLogResult<T> = Result<T, EventLogError>;
