//! NV-index event structures logged with `EV_NO_ACTION`.
//!
//! Dynamic events carry the nonces of a signed exchange. Instance events
//! carry a certificate chain wrapped in a v2 device-security header.

use std::fmt;

use byteorder::{LittleEndian, WriteBytesExt};
use devsec_core::{AuthState, Nonce, NoncePair, NONCE_SIZE};

use crate::builder::DeviceDescriptor;
use crate::device_context::{context_size, device_type, write_context};
use crate::error::{EventLogError, EventLogResult};
use crate::format::{checked_u32, write_header_v2, HeaderV2Fields};
use crate::reader::ByteReader;
use crate::tcg::*;

/// An event destined for an NV index rather than a PCR.
#[derive(Clone, PartialEq, Eq)]
pub struct NvIndexEvent {
    pub nv_index: u32,
    pub event_type: u32,
    pub data: Vec<u8>,
}

impl fmt::Debug for NvIndexEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NvIndexEvent")
            .field("nv_index", &format_args!("{:#010x}", self.nv_index))
            .field("event_type", &event_type_name(self.event_type))
            .field("data", &hex::encode(&self.data))
            .finish()
    }
}

/// Build one TCG_NV_INDEX_DYNAMIC_EVENT_LOG_STRUCT carrying a nonce.
pub fn dynamic_event(uid: u64, description: &[u8], nonce: &Nonce) -> EventLogResult<NvIndexEvent> {
    let description_size = u16::try_from(description.len()).map_err(|_| {
        EventLogError::RecordTooLarge {
            size: description.len(),
            max: u16::MAX as usize,
        }
    })?;

    let mut data =
        Vec::with_capacity(NV_INDEX_DYNAMIC_HEADER_SIZE + 2 + description.len() + 2 + NONCE_SIZE);
    data.extend_from_slice(NV_INDEX_DYNAMIC_SIGNATURE);
    data.write_u16::<LittleEndian>(NV_INDEX_EVENT_LOG_STRUCT_VERSION)?;
    data.extend_from_slice(&[0u8; 6]);
    data.write_u64::<LittleEndian>(uid)?;
    data.write_u16::<LittleEndian>(description_size)?;
    data.extend_from_slice(description);
    data.write_u16::<LittleEndian>(NONCE_SIZE as u16)?;
    data.extend_from_slice(nonce);

    Ok(NvIndexEvent {
        nv_index: NV_EXTEND_INDEX_FOR_DYNAMIC,
        event_type: EV_NO_ACTION,
        data,
    })
}

/// Requester/responder nonce events for a GET_MEASUREMENTS exchange.
pub fn measurement_nonce_events(uid: u64, nonces: &NoncePair) -> EventLogResult<Vec<NvIndexEvent>> {
    Ok(vec![
        dynamic_event(uid, SPDM_GET_MEASUREMENTS_DESCRIPTION, &nonces.requester)?,
        dynamic_event(uid, SPDM_MEASUREMENTS_DESCRIPTION, &nonces.responder)?,
    ])
}

/// Requester/responder nonce events for a CHALLENGE exchange.
pub fn challenge_nonce_events(uid: u64, nonces: &NoncePair) -> EventLogResult<Vec<NvIndexEvent>> {
    Ok(vec![
        dynamic_event(uid, SPDM_CHALLENGE_DESCRIPTION, &nonces.requester)?,
        dynamic_event(uid, SPDM_CHALLENGE_AUTH_DESCRIPTION, &nonces.responder)?,
    ])
}

/// Decoded dynamic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicEvent<'a> {
    pub uid: u64,
    /// Description without its NUL terminator
    pub description: &'a [u8],
    pub data: &'a [u8],
}

impl<'a> DynamicEvent<'a> {
    pub fn parse(bytes: &'a [u8]) -> EventLogResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let signature: [u8; 16] = reader.read_array()?;
        if &signature != NV_INDEX_DYNAMIC_SIGNATURE {
            return Err(EventLogError::Parse(
                "not an NvIndexDynamic event".to_string(),
            ));
        }
        let _version = reader.read_u16()?;
        reader.skip(6)?;
        let uid = reader.read_u64()?;
        let description_size = reader.read_u16()? as usize;
        let description = reader.read_bytes(description_size)?;
        let description = description.strip_suffix(&[0]).unwrap_or(description);
        let data_size = reader.read_u16()? as usize;
        let data = reader.read_bytes(data_size)?;

        Ok(Self {
            uid,
            description,
            data,
        })
    }
}

/// Build the certificate-chain instance record.
///
/// `cert_chain` is written only when `auth_state` carries evidence; failure
/// states produce a record with a zero sub-header length and no chain.
pub fn certificate_record(
    device: &DeviceDescriptor<'_>,
    auth_state: AuthState,
    hash_algo: u32,
    slot_id: u8,
    cert_chain: Option<&[u8]>,
) -> EventLogResult<NvIndexEvent> {
    let chain = cert_chain
        .filter(|c| !c.is_empty())
        .filter(|_| auth_state.carries_evidence());
    let sub_header_length = chain.map_or(0, |c| CERT_CHAIN_SUB_HEADER_SIZE + c.len());

    let total_len = NV_INDEX_INSTANCE_HEADER_SIZE
        + HEADER_V2_SIZE
        + DEVICE_PATH_LENGTH_SIZE
        + device.device_path.len()
        + sub_header_length
        + context_size(device.class);

    let mut data = Vec::with_capacity(total_len);
    data.extend_from_slice(NV_INDEX_INSTANCE_SIGNATURE);
    data.write_u16::<LittleEndian>(NV_INDEX_EVENT_LOG_STRUCT_VERSION)?;
    data.extend_from_slice(&[0u8; 6]);

    write_header_v2(
        HeaderV2Fields {
            auth_state,
            length: checked_u32(total_len)?,
            device_type: device_type(device.class),
            sub_header_type: SUB_HEADER_TYPE_SPDM_CERT_CHAIN,
            sub_header_length: checked_u32(sub_header_length)?,
            uid: device.uid,
        },
        &mut data,
    )?;

    data.write_u64::<LittleEndian>(device.device_path.len() as u64)?;
    data.extend_from_slice(device.device_path);

    if let Some(chain) = chain {
        data.write_u16::<LittleEndian>(device.spdm_version)?;
        data.write_u8(slot_id)?;
        data.write_u8(0)?;
        data.write_u32::<LittleEndian>(hash_algo)?;
        data.extend_from_slice(chain);
    }

    write_context(device.class, device.io, &mut data)?;

    if data.len() != total_len {
        return Err(EventLogError::LengthMismatch {
            computed: total_len,
            written: data.len(),
        });
    }

    Ok(NvIndexEvent {
        nv_index: NV_EXTEND_INDEX_FOR_INSTANCE,
        event_type: EV_NO_ACTION,
        data,
    })
}
