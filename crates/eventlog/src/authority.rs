//! Device-authority event: the trust anchor a device's certificate chain
//! rooted in, measured into PCR 7 as a UEFI_VARIABLE_DATA of the device
//! signature database.

use std::fmt;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{EventLogError, EventLogResult};
use crate::reader::ByteReader;
use crate::tcg::*;

/// An event extended into a PCR.
#[derive(Clone, PartialEq, Eq)]
pub struct PcrEvent {
    pub pcr_index: u32,
    pub event_type: u32,
    pub data: Vec<u8>,
}

impl fmt::Debug for PcrEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcrEvent")
            .field("pcr_index", &self.pcr_index)
            .field("event_type", &event_type_name(self.event_type))
            .field("data", &hex::encode(&self.data))
            .finish()
    }
}

/// EFI_SIGNATURE_DATA: owner GUID followed by the signature bytes.
pub fn signature_data(owner: &[u8; 16], trust_anchor: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(owner.len() + trust_anchor.len());
    data.extend_from_slice(owner);
    data.extend_from_slice(trust_anchor);
    data
}

/// Serialise a UEFI_VARIABLE_DATA. The name is UTF-16LE without a terminator.
pub fn variable_data(vendor_guid: &[u8; 16], name: &str, value: &[u8]) -> EventLogResult<Vec<u8>> {
    let name: Vec<u16> = name.encode_utf16().collect();
    let mut data =
        Vec::with_capacity(UEFI_VARIABLE_DATA_HEADER_SIZE + name.len() * 2 + value.len());
    data.extend_from_slice(vendor_guid);
    data.write_u64::<LittleEndian>(name.len() as u64)?;
    data.write_u64::<LittleEndian>(value.len() as u64)?;
    for unit in name {
        data.write_u16::<LittleEndian>(unit)?;
    }
    data.extend_from_slice(value);
    Ok(data)
}

/// PCR 7 event naming `trust_anchor` as the authority a device chained to.
pub fn authority_event(trust_anchor: &[u8]) -> EventLogResult<PcrEvent> {
    let value = signature_data(&DEVICE_AUTHORITY_OWNER_GUID, trust_anchor);
    Ok(PcrEvent {
        pcr_index: PCR_DEVICE_AUTHORITY,
        event_type: EV_EFI_SPDM_DEVICE_AUTHORITY,
        data: variable_data(
            &DEVICE_SIGNATURE_DATABASE_GUID,
            DEVICE_SECURITY_DATABASE_NAME,
            &value,
        )?,
    })
}

/// Decoded UEFI_VARIABLE_DATA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableData<'a> {
    pub vendor_guid: [u8; 16],
    pub name: String,
    pub value: &'a [u8],
}

impl<'a> VariableData<'a> {
    pub fn parse(bytes: &'a [u8]) -> EventLogResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let vendor_guid: [u8; 16] = reader.read_array()?;
        let name_len = usize::try_from(reader.read_u64()?)
            .map_err(|_| EventLogError::Parse("variable name length overflows".to_string()))?;
        let value_len = usize::try_from(reader.read_u64()?)
            .map_err(|_| EventLogError::Parse("variable data length overflows".to_string()))?;

        let raw_name = reader.read_bytes(name_len.checked_mul(2).ok_or_else(|| {
            EventLogError::Parse("variable name length overflows".to_string())
        })?)?;
        let units: Vec<u16> = raw_name
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let name = String::from_utf16(&units)
            .map_err(|_| EventLogError::Parse("variable name is not UTF-16".to_string()))?;
        let value = reader.read_bytes(value_len)?;

        Ok(Self {
            vendor_guid,
            name,
            value,
        })
    }
}
