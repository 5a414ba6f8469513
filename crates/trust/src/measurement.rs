//! Measurement retrieval and logging for one device.
//!
//! The flow asks for every block in one signed exchange and falls back to
//! per-index requests when the responder cannot serve the bulk request.
//! Each accepted block becomes one device-security record extended into the
//! PCR its category selects; manifest blocks are never logged.

use devsec_core::{AuthState, MeasurementConfig, NoncePair};
use devsec_eventlog::{
    split_record, validate_and_classify, Classification, DeviceDescriptor, EventLogBuilder,
    MeasurementCategory, MeasurementLog, ValidatedBlock,
};
use tracing::{debug, info, warn};

use crate::error::{TrustError, TrustResult};
use crate::registry::DeviceContext;
use crate::spdm::{
    settle, MeasurementRequest, MeasurementResponse, SpdmSession, SpdmStatus,
    MEASUREMENT_OPERATION_ALL, MEASUREMENT_OPERATION_TOTAL_NUMBER, SPDM_CAP_MEAS,
};

/// Runs the measurement exchange for one device context.
#[derive(Debug, Clone, Copy)]
pub struct MeasurementFlow<'a> {
    builder: &'a EventLogBuilder,
    config: &'a MeasurementConfig,
}

/// Builds records for one device and hands them to the log.
struct Recorder<'r, 'd> {
    builder: &'r EventLogBuilder,
    device: DeviceDescriptor<'d>,
    hash_algo: u32,
    is_embedded: bool,
}

impl Recorder<'_, '_> {
    /// Failure record without measurement, logged in the firmware-blob slot.
    fn log_failure(&self, log: &mut dyn MeasurementLog, state: AuthState) -> TrustResult<()> {
        let record = self
            .builder
            .build(&self.device, state, self.hash_algo, None, None)?;
        let category = MeasurementCategory::FirmwareBlob;
        log.measure_and_log(
            category.pcr_index(self.is_embedded),
            category.event_type(),
            &record.bytes,
        )?;
        Ok(())
    }

    fn log_block(
        &self,
        log: &mut dyn MeasurementLog,
        block: &ValidatedBlock<'_>,
        nonces: Option<&NoncePair>,
    ) -> TrustResult<()> {
        let record = self.builder.build(
            &self.device,
            AuthState::Success,
            self.hash_algo,
            Some(block),
            nonces,
        )?;
        log.measure_and_log(block.pcr_index, block.event_type, &record.bytes)?;
        for event in &record.nonce_events {
            log.log_nv_event(event)?;
        }
        debug!(
            index = block.block.index,
            pcr_index = block.pcr_index,
            value = %hex::encode(block.payload()),
            "MeasurementFlow :: block logged"
        );
        Ok(())
    }
}

impl<'a> MeasurementFlow<'a> {
    pub fn new(builder: &'a EventLogBuilder, config: &'a MeasurementConfig) -> Self {
        Self { builder, config }
    }

    /// Measure the device behind `ctx`.
    ///
    /// The context is marked measured only when every expected block was
    /// processed. A device without the measurement capability gets one
    /// `FAIL_NO_SIG` record and an [`TrustError::Unsupported`] result.
    pub fn measure(&self, ctx: &mut DeviceContext, log: &mut dyn MeasurementLog) -> TrustResult<()> {
        if ctx.trust().measured() {
            debug!(device = %ctx.id(), "MeasurementFlow :: already measured");
            return Ok(());
        }

        let id = *ctx.id();
        let is_embedded = ctx.is_embedded();
        let (session, device) = ctx.split();
        let recorder = Recorder {
            builder: self.builder,
            device,
            hash_algo: session.measurement_hash_algo(),
            is_embedded,
        };

        if session.capability_flags() & SPDM_CAP_MEAS == 0 {
            warn!(device = %id, "MeasurementFlow :: responder lacks MEAS_CAP");
            recorder.log_failure(log, AuthState::FailNoSig)?;
            return Err(TrustError::Unsupported(
                "responder does not support measurements".to_string(),
            ));
        }

        let request = MeasurementRequest::new(MEASUREMENT_OPERATION_ALL, self.config.request_signature);
        let response = session.get_measurement(&request);
        match settle(response, session.last_error()) {
            Ok(response) => self.log_bulk(&recorder, log, &response)?,
            Err(SpdmStatus::VerifFail) => {
                warn!(device = %id, "MeasurementFlow :: bulk MEASUREMENTS verification failed");
                recorder.log_failure(log, AuthState::FailInvalid)?;
                return Err(TrustError::SecurityViolation(
                    "MEASUREMENTS signature verification failed".to_string(),
                ));
            }
            Err(status) => {
                warn!(
                    device = %id,
                    %status,
                    "MeasurementFlow :: bulk request failed, falling back to per-index requests"
                );
                self.measure_incremental(session, &recorder, log)?;
            }
        }

        ctx.trust_mut().mark_measured();
        info!("STATUS: MeasurementFlow :: {} :: MEASURED", id);
        Ok(())
    }

    /// Validate every block of a bulk response, then log the extendable ones.
    ///
    /// Nothing is logged as a measurement unless the whole set validates.
    /// The exchange nonces go with the last logged block.
    fn log_bulk(
        &self,
        recorder: &Recorder<'_, '_>,
        log: &mut dyn MeasurementLog,
        response: &MeasurementResponse,
    ) -> TrustResult<()> {
        let blocks = match split_record(&response.record, response.block_count) {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(error = %e, "MeasurementFlow :: malformed measurement record");
                recorder.log_failure(log, AuthState::FailInvalid)?;
                return Err(e.into());
            }
        };

        let mut validated = Vec::with_capacity(blocks.len());
        for block in blocks {
            match validate_and_classify(block, recorder.is_embedded) {
                Ok(Classification::Extend(v)) => validated.push(v),
                Ok(Classification::Skip { index, .. }) => {
                    debug!(index, "MeasurementFlow :: manifest block skipped");
                }
                Err(e) => {
                    warn!(error = %e, "MeasurementFlow :: measurement block rejected");
                    recorder.log_failure(log, AuthState::FailInvalid)?;
                    return Err(e.into());
                }
            }
        }

        let last = validated.len().checked_sub(1);
        for (i, block) in validated.iter().enumerate() {
            let nonces = if Some(i) == last {
                response.nonces.as_ref()
            } else {
                None
            };
            recorder.log_block(log, block, nonces)?;
        }

        debug!(
            blocks = response.block_count,
            logged = validated.len(),
            "MeasurementFlow :: bulk measurements logged"
        );
        Ok(())
    }

    /// Per-index retrieval after the bulk request failed.
    ///
    /// A block that fails verification or validation is logged
    /// `FAIL_INVALID` and skipped; the scan continues until the received
    /// count reaches the reported total.
    fn measure_incremental(
        &self,
        session: &mut dyn SpdmSession,
        recorder: &Recorder<'_, '_>,
        log: &mut dyn MeasurementLog,
    ) -> TrustResult<()> {
        let request = MeasurementRequest::new(MEASUREMENT_OPERATION_TOTAL_NUMBER, false);
        let response = session.get_measurement(&request);
        let total = settle(response, session.last_error())
            .map_err(|status| {
                TrustError::DeviceError(format!("GET_MEASUREMENTS block count: {}", status))
            })?
            .block_count;

        // 0xFF is the "all blocks" operation, never an index
        let last_index = self
            .config
            .max_incremental_index
            .min(MEASUREMENT_OPERATION_ALL - 1);
        let mut received: u8 = 0;

        for index in 1..=last_index {
            if received == total {
                break;
            }
            let signed = self.config.request_signature && received + 1 == total;
            let request = MeasurementRequest::new(index, signed);
            let response = session.get_measurement(&request);
            let response = match settle(response, session.last_error()) {
                Ok(response) => response,
                Err(SpdmStatus::VerifFail) => {
                    warn!(index, "MeasurementFlow :: block verification failed");
                    recorder.log_failure(log, AuthState::FailInvalid)?;
                    continue;
                }
                Err(status) => {
                    debug!(index, %status, "MeasurementFlow :: index skipped");
                    continue;
                }
            };

            match validate_and_classify(&response.record, recorder.is_embedded) {
                Ok(Classification::Extend(block)) => {
                    let nonces = if signed { response.nonces.as_ref() } else { None };
                    recorder.log_block(log, &block, nonces)?;
                    received += 1;
                }
                Ok(Classification::Skip { .. }) => {
                    debug!(index, "MeasurementFlow :: manifest block skipped");
                    received += 1;
                }
                Err(e) => {
                    warn!(index, error = %e, "MeasurementFlow :: measurement block rejected");
                    recorder.log_failure(log, AuthState::FailInvalid)?;
                }
            }
        }

        if received != total {
            warn!(received, total, "MeasurementFlow :: incomplete measurement set");
            return Err(TrustError::DeviceError(format!(
                "received {} of {} measurement blocks",
                received, total
            )));
        }
        Ok(())
    }
}
