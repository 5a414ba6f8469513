//! EventLogBuilder: serialises validated measurements and failure indications
//! into TCG device-security records.

use devsec_core::{AuthState, DeviceClass, EventLogVersion, NoncePair};
use tracing::debug;

use crate::authority::{self, PcrEvent};
use crate::device_context::DeviceIo;
use crate::error::{EventLogError, EventLogResult};
use crate::format::{format_for, EventLogFormat};
use crate::measurement_block::ValidatedBlock;
use crate::nv_index::{self, NvIndexEvent};

/// Identity of the device a record describes.
#[derive(Clone, Copy)]
pub struct DeviceDescriptor<'a> {
    pub class: DeviceClass,
    /// Encoded platform device path
    pub device_path: &'a [u8],
    /// Registry-assigned UID written into v2 headers and NV-index events
    pub uid: u64,
    /// Negotiated SPDM version of the session
    pub spdm_version: u16,
    /// Register access used for the class-specific context block
    pub io: Option<&'a dyn DeviceIo>,
}

impl std::fmt::Debug for DeviceDescriptor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDescriptor")
            .field("class", &self.class)
            .field("device_path", &hex::encode(self.device_path))
            .field("uid", &self.uid)
            .field("spdm_version", &format_args!("{:#06x}", self.spdm_version))
            .field("io", &self.io.is_some())
            .finish()
    }
}

/// A built record plus the NV-index events that accompany it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLogRecord {
    pub bytes: Vec<u8>,
    pub nonce_events: Vec<NvIndexEvent>,
}

impl EventLogRecord {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Builds device-security records in one fixed layout.
#[derive(Debug)]
pub struct EventLogBuilder {
    format: Box<dyn EventLogFormat>,
}

impl EventLogBuilder {
    pub fn new(version: EventLogVersion) -> Self {
        Self {
            format: format_for(version),
        }
    }

    pub fn with_format(format: Box<dyn EventLogFormat>) -> Self {
        Self { format }
    }

    pub fn version(&self) -> EventLogVersion {
        self.format.version()
    }

    pub fn format(&self) -> &dyn EventLogFormat {
        self.format.as_ref()
    }

    /// Build one measurement record.
    ///
    /// With `measurement = None` the measurement section and its length
    /// fields are left out entirely. Nonce events are produced only when
    /// `nonces` is given and the layout supports NV-index events.
    pub fn build(
        &self,
        device: &DeviceDescriptor<'_>,
        auth_state: AuthState,
        hash_algo: u32,
        measurement: Option<&ValidatedBlock<'_>>,
        nonces: Option<&NoncePair>,
    ) -> EventLogResult<EventLogRecord> {
        let block = measurement.map(|m| m.bytes()).filter(|b| !b.is_empty());

        let total_len = self.format.record_len(device, block);
        let mut bytes = Vec::with_capacity(total_len);
        self.format
            .write_record(device, auth_state, hash_algo, block, total_len, &mut bytes)?;

        if bytes.len() != total_len {
            return Err(EventLogError::LengthMismatch {
                computed: total_len,
                written: bytes.len(),
            });
        }

        let nonce_events = match nonces {
            Some(pair) if self.format.supports_nv_index_events() => {
                nv_index::measurement_nonce_events(device.uid, pair)?
            }
            _ => Vec::new(),
        };

        debug!(
            version = ?self.version(),
            auth_state = ?auth_state,
            len = total_len,
            nonce_events = nonce_events.len(),
            "EventLogBuilder :: record built"
        );

        Ok(EventLogRecord {
            bytes,
            nonce_events,
        })
    }

    /// Certificate-chain instance record, or `None` when the layout has no NV-index events.
    pub fn build_certificate_record(
        &self,
        device: &DeviceDescriptor<'_>,
        auth_state: AuthState,
        hash_algo: u32,
        slot_id: u8,
        cert_chain: Option<&[u8]>,
    ) -> EventLogResult<Option<NvIndexEvent>> {
        if !self.format.supports_nv_index_events() {
            return Ok(None);
        }
        nv_index::certificate_record(device, auth_state, hash_algo, slot_id, cert_chain).map(Some)
    }

    /// PCR 7 authority event for a chain that rooted in `trust_anchor`, or
    /// `None` when the layout has no NV-index events.
    pub fn build_authority_record(&self, trust_anchor: &[u8]) -> EventLogResult<Option<PcrEvent>> {
        if !self.format.supports_nv_index_events() {
            return Ok(None);
        }
        authority::authority_event(trust_anchor).map(Some)
    }

    /// Challenge nonce events; empty when the layout has no NV-index events.
    pub fn challenge_nonce_events(
        &self,
        device: &DeviceDescriptor<'_>,
        nonces: &NoncePair,
    ) -> EventLogResult<Vec<NvIndexEvent>> {
        if !self.format.supports_nv_index_events() {
            return Ok(Vec::new());
        }
        nv_index::challenge_nonce_events(device.uid, nonces)
    }
}

impl Default for EventLogBuilder {
    fn default() -> Self {
        Self::new(EventLogVersion::default())
    }
}
