//! The two TCG device-security record layouts.
//!
//! `V1Format` writes the legacy "SPDM Device Sec" record, `V2Format` the
//! current "SPDM Device Sec2" record. The layout is chosen once when the
//! builder is created and never negotiated per device.

use std::fmt;

use byteorder::{LittleEndian, WriteBytesExt};
use devsec_core::{AuthState, EventLogVersion};

use crate::builder::DeviceDescriptor;
use crate::device_context::{context_size, device_type, write_context};
use crate::error::{EventLogError, EventLogResult};
use crate::reader::ByteReader;
use crate::tcg::*;

/// One record layout.
pub trait EventLogFormat: Send + Sync + fmt::Debug {
    fn version(&self) -> EventLogVersion;

    /// Fixed header size of this layout.
    fn header_size(&self) -> usize;

    /// Exact record length for `device` with an optional measurement block.
    fn record_len(&self, device: &DeviceDescriptor<'_>, measurement: Option<&[u8]>) -> usize;

    /// Append the record to `out`. `total_len` is the value from [`record_len`](Self::record_len).
    fn write_record(
        &self,
        device: &DeviceDescriptor<'_>,
        auth_state: AuthState,
        hash_algo: u32,
        measurement: Option<&[u8]>,
        total_len: usize,
        out: &mut Vec<u8>,
    ) -> EventLogResult<()>;

    /// Whether nonce and certificate evidence is logged through NV-index events.
    fn supports_nv_index_events(&self) -> bool;
}

/// Format object for a configured version.
pub fn format_for(version: EventLogVersion) -> Box<dyn EventLogFormat> {
    match version {
        EventLogVersion::V1 => Box::new(V1Format),
        EventLogVersion::V2 => Box::new(V2Format),
    }
}

fn write_device_path(device: &DeviceDescriptor<'_>, out: &mut Vec<u8>) -> EventLogResult<()> {
    out.write_u64::<LittleEndian>(device.device_path.len() as u64)?;
    out.extend_from_slice(device.device_path);
    Ok(())
}

/// Legacy layout: no auth-state byte, 16-bit length, measurement before the device path.
#[derive(Debug, Clone, Copy, Default)]
pub struct V1Format;

impl EventLogFormat for V1Format {
    fn version(&self) -> EventLogVersion {
        EventLogVersion::V1
    }

    fn header_size(&self) -> usize {
        HEADER_V1_SIZE
    }

    fn record_len(&self, device: &DeviceDescriptor<'_>, measurement: Option<&[u8]>) -> usize {
        HEADER_V1_SIZE
            + measurement.map_or(0, <[u8]>::len)
            + DEVICE_PATH_LENGTH_SIZE
            + device.device_path.len()
            + context_size(device.class)
    }

    fn write_record(
        &self,
        device: &DeviceDescriptor<'_>,
        _auth_state: AuthState,
        hash_algo: u32,
        measurement: Option<&[u8]>,
        total_len: usize,
        out: &mut Vec<u8>,
    ) -> EventLogResult<()> {
        let length = u16::try_from(total_len).map_err(|_| EventLogError::RecordTooLarge {
            size: total_len,
            max: u16::MAX as usize,
        })?;

        out.extend_from_slice(DEVICE_SECURITY_SIGNATURE_V1);
        out.write_u16::<LittleEndian>(DEVICE_SECURITY_VERSION_1)?;
        out.write_u16::<LittleEndian>(length)?;
        out.write_u32::<LittleEndian>(hash_algo)?;
        out.write_u32::<LittleEndian>(device_type(device.class))?;

        if let Some(block) = measurement {
            out.extend_from_slice(block);
        }
        write_device_path(device, out)?;
        write_context(device.class, device.io, out)
    }

    fn supports_nv_index_events(&self) -> bool {
        false
    }
}

/// Current layout: auth-state byte, sub-header descriptor and device UID.
#[derive(Debug, Clone, Copy, Default)]
pub struct V2Format;

/// Fields of the 44-byte v2 header that vary per record.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeaderV2Fields {
    pub auth_state: AuthState,
    pub length: u32,
    pub device_type: u32,
    pub sub_header_type: u32,
    pub sub_header_length: u32,
    pub uid: u64,
}

pub(crate) fn write_header_v2(fields: HeaderV2Fields, out: &mut Vec<u8>) -> EventLogResult<()> {
    out.extend_from_slice(DEVICE_SECURITY_SIGNATURE_V2);
    out.write_u16::<LittleEndian>(DEVICE_SECURITY_VERSION_2)?;
    out.write_u8(fields.auth_state.as_u8())?;
    out.write_u8(0)?;
    out.write_u32::<LittleEndian>(fields.length)?;
    out.write_u32::<LittleEndian>(fields.device_type)?;
    out.write_u32::<LittleEndian>(fields.sub_header_type)?;
    out.write_u32::<LittleEndian>(fields.sub_header_length)?;
    out.write_u64::<LittleEndian>(fields.uid)?;
    Ok(())
}

pub(crate) fn checked_u32(total_len: usize) -> EventLogResult<u32> {
    u32::try_from(total_len).map_err(|_| EventLogError::RecordTooLarge {
        size: total_len,
        max: u32::MAX as usize,
    })
}

impl EventLogFormat for V2Format {
    fn version(&self) -> EventLogVersion {
        EventLogVersion::V2
    }

    fn header_size(&self) -> usize {
        HEADER_V2_SIZE
    }

    fn record_len(&self, device: &DeviceDescriptor<'_>, measurement: Option<&[u8]>) -> usize {
        HEADER_V2_SIZE
            + DEVICE_PATH_LENGTH_SIZE
            + device.device_path.len()
            + measurement.map_or(0, |m| MEASUREMENT_SUB_HEADER_SIZE + m.len())
            + context_size(device.class)
    }

    fn write_record(
        &self,
        device: &DeviceDescriptor<'_>,
        auth_state: AuthState,
        hash_algo: u32,
        measurement: Option<&[u8]>,
        total_len: usize,
        out: &mut Vec<u8>,
    ) -> EventLogResult<()> {
        let sub_header_length = measurement.map_or(0, |m| MEASUREMENT_SUB_HEADER_SIZE + m.len());

        write_header_v2(
            HeaderV2Fields {
                auth_state,
                length: checked_u32(total_len)?,
                device_type: device_type(device.class),
                sub_header_type: SUB_HEADER_TYPE_SPDM_MEASUREMENT_BLOCK,
                sub_header_length: checked_u32(sub_header_length)?,
                uid: device.uid,
            },
            out,
        )?;
        write_device_path(device, out)?;

        if let Some(block) = measurement {
            out.write_u16::<LittleEndian>(device.spdm_version)?;
            out.write_u8(1)?; // one block per record
            out.write_u8(0)?;
            out.write_u32::<LittleEndian>(hash_algo)?;
            out.extend_from_slice(block);
        }

        write_context(device.class, device.io, out)
    }

    fn supports_nv_index_events(&self) -> bool {
        true
    }
}

/// Fixed-offset header of a v1 record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderV1 {
    pub length: u16,
    pub hash_algo: u32,
    pub device_type: u32,
}

/// Fixed-offset header of a v2 record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderV2 {
    pub auth_state: u8,
    pub length: u32,
    pub device_type: u32,
    pub sub_header_type: u32,
    pub sub_header_length: u32,
    pub uid: u64,
}

/// Header of a device-security record, as read back from the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordHeader {
    V1(HeaderV1),
    V2(HeaderV2),
}

impl RecordHeader {
    pub fn parse(bytes: &[u8]) -> EventLogResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let signature: [u8; 16] = reader.read_array()?;
        let version = reader.read_u16()?;

        match (&signature, version) {
            (DEVICE_SECURITY_SIGNATURE_V1, DEVICE_SECURITY_VERSION_1) => {
                Ok(RecordHeader::V1(HeaderV1 {
                    length: reader.read_u16()?,
                    hash_algo: reader.read_u32()?,
                    device_type: reader.read_u32()?,
                }))
            }
            (DEVICE_SECURITY_SIGNATURE_V2, DEVICE_SECURITY_VERSION_2) => {
                let auth_state = reader.read_u8()?;
                reader.skip(1)?;
                Ok(RecordHeader::V2(HeaderV2 {
                    auth_state,
                    length: reader.read_u32()?,
                    device_type: reader.read_u32()?,
                    sub_header_type: reader.read_u32()?,
                    sub_header_length: reader.read_u32()?,
                    uid: reader.read_u64()?,
                }))
            }
            _ => Err(EventLogError::Parse(format!(
                "unrecognised signature {:?} version {}",
                String::from_utf8_lossy(&signature),
                version
            ))),
        }
    }

    pub fn version(&self) -> EventLogVersion {
        match self {
            RecordHeader::V1(_) => EventLogVersion::V1,
            RecordHeader::V2(_) => EventLogVersion::V2,
        }
    }

    pub fn length(&self) -> usize {
        match self {
            RecordHeader::V1(h) => h.length as usize,
            RecordHeader::V2(h) => h.length as usize,
        }
    }

    pub fn device_type(&self) -> u32 {
        match self {
            RecordHeader::V1(h) => h.device_type,
            RecordHeader::V2(h) => h.device_type,
        }
    }
}

/// Body of a v2 measurement record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordV2<'a> {
    pub header: HeaderV2,
    pub device_path: &'a [u8],
    pub spdm_version: Option<u16>,
    pub hash_algo: Option<u32>,
    pub measurement: Option<&'a [u8]>,
    pub device_context: &'a [u8],
}

impl<'a> RecordV2<'a> {
    pub fn parse(bytes: &'a [u8]) -> EventLogResult<Self> {
        let header = match RecordHeader::parse(bytes)? {
            RecordHeader::V2(h) => h,
            RecordHeader::V1(_) => {
                return Err(EventLogError::Parse("expected a v2 record".to_string()))
            }
        };
        if header.length as usize != bytes.len() {
            return Err(EventLogError::Parse(format!(
                "header length {} but record has {} bytes",
                header.length,
                bytes.len()
            )));
        }

        let mut reader = ByteReader::new(bytes);
        reader.skip(HEADER_V2_SIZE)?;
        let path_len = reader.read_u64()?;
        let path_len = usize::try_from(path_len)
            .map_err(|_| EventLogError::Parse(format!("device path length {}", path_len)))?;
        let device_path = reader.read_bytes(path_len)?;

        let (spdm_version, hash_algo, measurement) = if header.sub_header_length == 0 {
            (None, None, None)
        } else {
            let spdm_version = reader.read_u16()?;
            let _block_count = reader.read_u8()?;
            reader.skip(1)?;
            let hash_algo = reader.read_u32()?;
            let measurement_len = (header.sub_header_length as usize)
                .checked_sub(MEASUREMENT_SUB_HEADER_SIZE)
                .ok_or_else(|| {
                    EventLogError::Parse(format!(
                        "sub-header length {} below minimum",
                        header.sub_header_length
                    ))
                })?;
            let measurement = reader.read_bytes(measurement_len)?;
            (Some(spdm_version), Some(hash_algo), Some(measurement))
        };

        Ok(Self {
            header,
            device_path,
            spdm_version,
            hash_algo,
            measurement,
            device_context: reader.rest(),
        })
    }
}
