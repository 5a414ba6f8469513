//! Error types for device trust orchestration.

use devsec_core::StateCode;
use devsec_eventlog::{EventLogError, LogError, ValidationError};
use thiserror::Error;

/// Failure of one trust flow or of the orchestration around it.
#[derive(Debug, Error)]
pub enum TrustError {
    /// Device lacks the capability the flow needs
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Evidence failed verification or validation
    #[error("Security violation: {0}")]
    SecurityViolation(String),

    /// SPDM transport or protocol failure
    #[error("Device error: {0}")]
    DeviceError(String),

    /// Policy collaborator could not answer
    #[error("Policy query failed: {0}")]
    PolicyQuery(String),

    /// No SPDM session could be established with the device
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Measurement log refused an event
    #[error("Measurement log error: {0}")]
    Log(#[from] LogError),

    /// Record construction failed
    #[error("Event log error: {0}")]
    EventLog(#[from] EventLogError),

    /// Measurement block failed structural validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl TrustError {
    /// Code reported to the policy collaborator for this failure.
    pub fn state_code(&self) -> StateCode {
        match self {
            TrustError::Unsupported(_) | TrustError::ConnectionFailed(_) => StateCode::UNSUPPORTED,
            TrustError::SecurityViolation(_) | TrustError::Validation(_) => {
                StateCode::SECURITY_VIOLATION
            }
            TrustError::DeviceError(_) | TrustError::EventLog(_) => StateCode::DEVICE_ERROR,
            TrustError::PolicyQuery(_) => StateCode::GET_POLICY_PROTOCOL,
            TrustError::Log(_) => StateCode::TCG_EXTEND_TPM_PCR,
        }
    }
}

/// Result type for trust operations.
pub type TrustResult<T> = Result<T, TrustError>;
