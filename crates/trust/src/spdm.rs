//! SPDM requester session collaborator.
//!
//! The trust flows drive a live session through [`SpdmSession`]. Every call
//! returns a coarse result; the authoritative status is read from
//! [`SpdmSession::last_error`] right after the call that produced it.

use std::fmt;

use devsec_core::{Nonce, NoncePair, NONCE_SIZE};
use rand::rngs::OsRng;
use rand::RngCore;

/// Responder can return certificate chains.
pub const SPDM_CAP_CERT: u32 = 1 << 1;
/// Responder can answer CHALLENGE.
pub const SPDM_CAP_CHAL: u32 = 1 << 2;
/// Responder can return unsigned measurements.
pub const SPDM_CAP_MEAS_NO_SIG: u32 = 1 << 3;
/// Responder can return signed measurements.
pub const SPDM_CAP_MEAS_SIG: u32 = 1 << 4;
/// Either measurement capability bit.
pub const SPDM_CAP_MEAS: u32 = SPDM_CAP_MEAS_NO_SIG | SPDM_CAP_MEAS_SIG;

/// GET_MEASUREMENTS attribute: sign the response.
pub const GENERATE_SIGNATURE: u8 = 1 << 0;
/// GET_MEASUREMENTS operation: report the block count only.
pub const MEASUREMENT_OPERATION_TOTAL_NUMBER: u8 = 0;
/// GET_MEASUREMENTS operation: return every block.
pub const MEASUREMENT_OPERATION_ALL: u8 = 0xFF;

pub const NO_MEASUREMENT_SUMMARY_HASH: u8 = 0;
pub const TCB_MEASUREMENT_SUMMARY_HASH: u8 = 1;
pub const ALL_MEASUREMENTS_SUMMARY_HASH: u8 = 0xFF;

/// Status code of the last SPDM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpdmStatus {
    Success,
    /// Signature or freshness verification failed on the requester side
    VerifFail,
    /// Responder returned an ERROR message
    ErrorResponse(u8),
    /// Transport send or receive failed
    Transport,
    /// Responder did not answer in time
    Timeout,
    /// Request not supported by the negotiated session
    Unsupported,
}

impl SpdmStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SpdmStatus::Success)
    }

    pub fn is_verif_fail(&self) -> bool {
        matches!(self, SpdmStatus::VerifFail)
    }
}

impl fmt::Display for SpdmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpdmStatus::Success => write!(f, "SUCCESS"),
            SpdmStatus::VerifFail => write!(f, "VERIF_FAIL"),
            SpdmStatus::ErrorResponse(code) => write!(f, "ERROR_RESPONSE({:#04x})", code),
            SpdmStatus::Transport => write!(f, "TRANSPORT"),
            SpdmStatus::Timeout => write!(f, "TIMEOUT"),
            SpdmStatus::Unsupported => write!(f, "UNSUPPORTED"),
        }
    }
}

/// DIGESTS response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestResponse {
    /// Bit per provisioned certificate slot
    pub slot_mask: u8,
    /// Concatenated digests, one per set bit
    pub digests: Vec<u8>,
}

/// Certificate chain for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateResponse {
    pub cert_chain: Vec<u8>,
    /// Provisioned root the chain validated against, if any
    pub trust_anchor: Option<Vec<u8>>,
}

/// CHALLENGE_AUTH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeResponse {
    pub measurement_hash: Option<Vec<u8>>,
    pub nonces: NoncePair,
}

/// One GET_MEASUREMENTS request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementRequest {
    pub attributes: u8,
    /// Block index, or one of the `MEASUREMENT_OPERATION_*` values
    pub operation: u8,
    pub slot_id: u8,
    pub requester_nonce: Nonce,
}

impl MeasurementRequest {
    pub fn new(operation: u8, signed: bool) -> Self {
        Self {
            attributes: if signed { GENERATE_SIGNATURE } else { 0 },
            operation,
            slot_id: 0,
            requester_nonce: fresh_nonce(),
        }
    }

    pub fn is_signed(&self) -> bool {
        self.attributes & GENERATE_SIGNATURE != 0
    }
}

/// MEASUREMENTS response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementResponse {
    /// Blocks in `record`, or the total count for `TOTAL_NUMBER`
    pub block_count: u8,
    /// Concatenated measurement blocks
    pub record: Vec<u8>,
    /// Present on signed responses
    pub nonces: Option<NoncePair>,
}

/// Live SPDM requester session bound to one device.
pub trait SpdmSession {
    /// Negotiated responder capability flags.
    fn capability_flags(&self) -> u32;

    /// Negotiated SPDM version, major in the high nibble of the low byte.
    fn spdm_version(&self) -> u16;

    /// Negotiated base hash algorithm bit.
    fn base_hash_algo(&self) -> u32;

    /// Negotiated measurement hash algorithm bit.
    fn measurement_hash_algo(&self) -> u32;

    fn get_digest(&mut self) -> Result<DigestResponse, SpdmStatus>;

    fn get_certificate(&mut self, slot_id: u8) -> Result<CertificateResponse, SpdmStatus>;

    fn challenge(
        &mut self,
        slot_id: u8,
        summary_hash_type: u8,
        requester_nonce: Nonce,
    ) -> Result<ChallengeResponse, SpdmStatus>;

    fn get_measurement(
        &mut self,
        request: &MeasurementRequest,
    ) -> Result<MeasurementResponse, SpdmStatus>;

    /// Status of the most recent call.
    fn last_error(&self) -> SpdmStatus;
}

impl<S: SpdmSession + ?Sized> SpdmSession for Box<S> {
    fn capability_flags(&self) -> u32 {
        (**self).capability_flags()
    }

    fn spdm_version(&self) -> u16 {
        (**self).spdm_version()
    }

    fn base_hash_algo(&self) -> u32 {
        (**self).base_hash_algo()
    }

    fn measurement_hash_algo(&self) -> u32 {
        (**self).measurement_hash_algo()
    }

    fn get_digest(&mut self) -> Result<DigestResponse, SpdmStatus> {
        (**self).get_digest()
    }

    fn get_certificate(&mut self, slot_id: u8) -> Result<CertificateResponse, SpdmStatus> {
        (**self).get_certificate(slot_id)
    }

    fn challenge(
        &mut self,
        slot_id: u8,
        summary_hash_type: u8,
        requester_nonce: Nonce,
    ) -> Result<ChallengeResponse, SpdmStatus> {
        (**self).challenge(slot_id, summary_hash_type, requester_nonce)
    }

    fn get_measurement(
        &mut self,
        request: &MeasurementRequest,
    ) -> Result<MeasurementResponse, SpdmStatus> {
        (**self).get_measurement(request)
    }

    fn last_error(&self) -> SpdmStatus {
        (**self).last_error()
    }
}

/// Combine a call result with the status read right after it.
///
/// A non-success `last_error` overrides an `Ok` result.
pub fn settle<T>(result: Result<T, SpdmStatus>, status: SpdmStatus) -> Result<T, SpdmStatus> {
    match (result, status) {
        (Ok(value), SpdmStatus::Success) => Ok(value),
        (Ok(_), status) => Err(status),
        (Err(err), SpdmStatus::Success) => Err(err),
        (Err(_), status) => Err(status),
    }
}

/// Random requester nonce.
pub fn fresh_nonce() -> Nonce {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}
