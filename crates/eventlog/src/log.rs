//! Measurement-log collaborator contract and an in-memory TPM model.

use std::fmt;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::authority::PcrEvent;
use crate::error::LogError;
use crate::nv_index::NvIndexEvent;
use crate::tcg::{event_type_name, EV_NO_ACTION};

/// Number of PCRs in a bank.
pub const PCR_COUNT: usize = 24;

pub type PcrValue = [u8; 32];

/// Extend-and-log primitive of the platform TPM.
///
/// Write-only from the caller's point of view; the log is never read back.
pub trait MeasurementLog {
    /// Hash `data` into `pcr_index` (unless `event_type` is `EV_NO_ACTION`)
    /// and append it to the event log.
    fn measure_and_log(&mut self, pcr_index: u32, event_type: u32, data: &[u8])
        -> Result<(), LogError>;

    /// Log an NV-index event.
    fn log_nv_event(&mut self, event: &NvIndexEvent) -> Result<(), LogError> {
        self.measure_and_log(event.nv_index, event.event_type, &event.data)
    }

    /// Extend and log a PCR event.
    fn log_pcr_event(&mut self, event: &PcrEvent) -> Result<(), LogError> {
        self.measure_and_log(event.pcr_index, event.event_type, &event.data)
    }
}

impl<L: MeasurementLog + ?Sized> MeasurementLog for &mut L {
    fn measure_and_log(
        &mut self,
        pcr_index: u32,
        event_type: u32,
        data: &[u8],
    ) -> Result<(), LogError> {
        (**self).measure_and_log(pcr_index, event_type, data)
    }
}

impl<L: MeasurementLog + ?Sized> MeasurementLog for Box<L> {
    fn measure_and_log(
        &mut self,
        pcr_index: u32,
        event_type: u32,
        data: &[u8],
    ) -> Result<(), LogError> {
        (**self).measure_and_log(pcr_index, event_type, data)
    }
}

/// One logged event.
#[derive(Clone, PartialEq, Eq)]
pub struct TcgEvent {
    pub pcr_index: u32,
    pub event_type: u32,
    pub digest: PcrValue,
    pub data: Vec<u8>,
}

impl TcgEvent {
    /// Event changed a PCR value.
    pub fn is_extend(&self) -> bool {
        self.event_type != EV_NO_ACTION
    }
}

impl fmt::Debug for TcgEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcgEvent")
            .field("pcr_index", &format_args!("{:#x}", self.pcr_index))
            .field("event_type", &event_type_name(self.event_type))
            .field("digest", &hex::encode(self.digest))
            .field("data", &hex::encode(&self.data))
            .finish()
    }
}

/// SHA-256 PCR bank plus append-only event list.
#[derive(Debug, Clone)]
pub struct InMemoryEventLog {
    pcrs: [PcrValue; PCR_COUNT],
    events: Vec<TcgEvent>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        info!("STATUS: InMemoryEventLog :: SHA-256 bank :: READY");
        Self {
            pcrs: [[0u8; 32]; PCR_COUNT],
            events: Vec::new(),
        }
    }

    pub fn pcr(&self, index: u32) -> Option<&PcrValue> {
        self.pcrs.get(index as usize)
    }

    pub fn events(&self) -> &[TcgEvent] {
        &self.events
    }

    /// Events that extended a PCR.
    pub fn extend_events(&self) -> impl Iterator<Item = &TcgEvent> {
        self.events.iter().filter(|e| e.is_extend())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Recompute every PCR from the event list alone.
    pub fn replay(&self) -> [PcrValue; PCR_COUNT] {
        let mut pcrs = [[0u8; 32]; PCR_COUNT];
        for event in self.extend_events() {
            let pcr = &mut pcrs[event.pcr_index as usize];
            *pcr = extend(pcr, &event.digest);
        }
        pcrs
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

fn extend(current: &PcrValue, digest: &PcrValue) -> PcrValue {
    let mut hasher = Sha256::new();
    hasher.update(current);
    hasher.update(digest);
    hasher.finalize().into()
}

impl MeasurementLog for InMemoryEventLog {
    fn measure_and_log(
        &mut self,
        pcr_index: u32,
        event_type: u32,
        data: &[u8],
    ) -> Result<(), LogError> {
        let digest: PcrValue = Sha256::digest(data).into();

        if event_type != EV_NO_ACTION {
            let pcr = self
                .pcrs
                .get_mut(pcr_index as usize)
                .ok_or(LogError::InvalidPcr(pcr_index))?;
            *pcr = extend(pcr, &digest);
        }

        debug!(
            pcr_index,
            event_type = event_type_name(event_type),
            len = data.len(),
            "InMemoryEventLog :: event logged"
        );

        self.events.push(TcgEvent {
            pcr_index,
            event_type,
            digest,
            data: data.to_vec(),
        });
        Ok(())
    }
}
