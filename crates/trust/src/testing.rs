//! Scripted SPDM responder shared by the unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use devsec_core::{Nonce, NoncePair, NONCE_SIZE};

use crate::registry::DeviceBinding;
use crate::spdm::*;

pub(crate) const RESPONDER_NONCE: Nonce = [0x5A; NONCE_SIZE];

/// One request seen by the responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Digest,
    Certificate(u8),
    Challenge { slot_id: u8, summary_hash_type: u8 },
    Measurement { operation: u8, signed: bool },
}

pub(crate) struct ScriptedSession {
    pub caps: u32,
    pub digest: Result<DigestResponse, SpdmStatus>,
    pub certificate: Result<CertificateResponse, SpdmStatus>,
    pub challenge: Result<(), SpdmStatus>,
    /// Response to `MEASUREMENT_OPERATION_ALL`
    pub bulk: Result<(u8, Vec<u8>), SpdmStatus>,
    /// Response to `MEASUREMENT_OPERATION_TOTAL_NUMBER`
    pub total: Result<u8, SpdmStatus>,
    /// Per-index responses; missing indices answer `ErrorResponse`
    pub blocks: HashMap<u8, Result<Vec<u8>, SpdmStatus>>,
    pub calls: Rc<RefCell<Vec<Call>>>,
    last: SpdmStatus,
}

impl ScriptedSession {
    pub fn new(caps: u32) -> Self {
        Self {
            caps,
            digest: Ok(DigestResponse {
                slot_mask: 0x01,
                digests: vec![0xD1; 48],
            }),
            certificate: Ok(CertificateResponse {
                cert_chain: vec![0xCE; 96],
                trust_anchor: Some(vec![0xAA; 32]),
            }),
            challenge: Ok(()),
            bulk: Err(SpdmStatus::Unsupported),
            total: Err(SpdmStatus::Unsupported),
            blocks: HashMap::new(),
            calls: Rc::new(RefCell::new(Vec::new())),
            last: SpdmStatus::Success,
        }
    }

    pub fn into_binding(self) -> DeviceBinding {
        DeviceBinding::new(Box::new(self), vec![0x01, 0x01, 0x06, 0x00])
    }

    fn record<T>(&mut self, call: Call, result: Result<T, SpdmStatus>) -> Result<T, SpdmStatus> {
        self.calls.borrow_mut().push(call);
        self.last = match &result {
            Ok(_) => SpdmStatus::Success,
            Err(status) => *status,
        };
        result
    }
}

impl SpdmSession for ScriptedSession {
    fn capability_flags(&self) -> u32 {
        self.caps
    }

    fn spdm_version(&self) -> u16 {
        0x12
    }

    fn base_hash_algo(&self) -> u32 {
        1 << 1
    }

    fn measurement_hash_algo(&self) -> u32 {
        1 << 1
    }

    fn get_digest(&mut self) -> Result<DigestResponse, SpdmStatus> {
        let result = self.digest.clone();
        self.record(Call::Digest, result)
    }

    fn get_certificate(&mut self, slot_id: u8) -> Result<CertificateResponse, SpdmStatus> {
        let result = self.certificate.clone();
        self.record(Call::Certificate(slot_id), result)
    }

    fn challenge(
        &mut self,
        slot_id: u8,
        summary_hash_type: u8,
        requester_nonce: Nonce,
    ) -> Result<ChallengeResponse, SpdmStatus> {
        let result = self.challenge.map(|()| ChallengeResponse {
            measurement_hash: None,
            nonces: NoncePair {
                requester: requester_nonce,
                responder: RESPONDER_NONCE,
            },
        });
        self.record(
            Call::Challenge {
                slot_id,
                summary_hash_type,
            },
            result,
        )
    }

    fn get_measurement(
        &mut self,
        request: &MeasurementRequest,
    ) -> Result<MeasurementResponse, SpdmStatus> {
        let nonces = request.is_signed().then(|| NoncePair {
            requester: request.requester_nonce,
            responder: RESPONDER_NONCE,
        });
        let result = match request.operation {
            MEASUREMENT_OPERATION_ALL => self.bulk.clone(),
            MEASUREMENT_OPERATION_TOTAL_NUMBER => self.total.map(|count| (count, Vec::new())),
            index => self
                .blocks
                .get(&index)
                .cloned()
                .unwrap_or(Err(SpdmStatus::ErrorResponse(0x01)))
                .map(|record| (1, record)),
        }
        .map(|(block_count, record)| MeasurementResponse {
            block_count,
            record,
            nonces: if request.operation == MEASUREMENT_OPERATION_TOTAL_NUMBER {
                None
            } else {
                nonces
            },
        });
        self.record(
            Call::Measurement {
                operation: request.operation,
                signed: request.is_signed(),
            },
            result,
        )
    }

    fn last_error(&self) -> SpdmStatus {
        self.last
    }
}
