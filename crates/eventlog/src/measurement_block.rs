//! SPDM measurement block validation and classification.
//!
//! A block is a 4-byte common header (index, measurement specification,
//! measurement size), a 3-byte DMTF header (value type, value size) and the
//! value itself. Both size fields must agree with the bytes actually present
//! before anything in the block is trusted.

use std::fmt;

use crate::error::{EventLogError, EventLogResult, ValidationError};
use crate::reader::ByteReader;
use crate::tcg::*;

/// Fully validated view over one measurement block.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MeasurementBlock<'a> {
    pub index: u8,
    pub measurement_specification: u8,
    pub measurement_size: u16,
    pub value_type: u8,
    pub value_size: u16,
    pub value: &'a [u8],
    raw: &'a [u8],
}

impl<'a> MeasurementBlock<'a> {
    /// Parse and structurally validate `block`.
    ///
    /// Checks run in a fixed order and the first failure wins.
    pub fn parse(block: &'a [u8]) -> Result<Self, ValidationError> {
        let len = block.len();
        if len <= MEASUREMENT_BLOCK_COMMON_HEADER_SIZE + MEASUREMENT_BLOCK_DMTF_HEADER_SIZE {
            return Err(ValidationError::TooShort { len });
        }

        let mut reader = ByteReader::new(block);
        let index = reader.read_u8()?;
        let measurement_specification = reader.read_u8()?;
        let measurement_size = reader.read_u16()?;

        if measurement_specification & MEASUREMENT_SPECIFICATION_DMTF == 0 {
            return Err(ValidationError::UnknownSpecification(
                measurement_specification,
            ));
        }

        let expected = len - MEASUREMENT_BLOCK_COMMON_HEADER_SIZE;
        if measurement_size as usize != expected {
            return Err(ValidationError::SizeMismatch {
                field: "measurement_size",
                declared: measurement_size as usize,
                expected,
            });
        }

        let value_type = reader.read_u8()?;
        let value_size = reader.read_u16()?;

        let expected = measurement_size as usize - MEASUREMENT_BLOCK_DMTF_HEADER_SIZE;
        if value_size as usize != expected {
            return Err(ValidationError::SizeMismatch {
                field: "value_size",
                declared: value_size as usize,
                expected,
            });
        }

        let value = reader.read_bytes(value_size as usize)?;

        Ok(Self {
            index,
            measurement_specification,
            measurement_size,
            value_type,
            value_size,
            value,
            raw: block,
        })
    }

    /// Semantic type with the raw-bit-stream flag masked off.
    pub fn semantic_type(&self) -> u8 {
        self.value_type & MEASUREMENT_VALUE_TYPE_MASK
    }

    /// Value is a raw bit stream rather than a digest.
    pub fn is_raw_bit_stream(&self) -> bool {
        self.value_type & MEASUREMENT_VALUE_TYPE_RAW_BIT_STREAM != 0
    }

    /// The whole block, headers included, as it is logged.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.raw
    }
}

impl fmt::Debug for MeasurementBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasurementBlock")
            .field("index", &self.index)
            .field(
                "measurement_specification",
                &format_args!("{:#04x}", self.measurement_specification),
            )
            .field("measurement_size", &self.measurement_size)
            .field("value_type", &format_args!("{:#04x}", self.value_type))
            .field("value_size", &self.value_size)
            .field("value", &hex::encode(self.value))
            .finish()
    }
}

/// Trust-log category a block is extended into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementCategory {
    /// ROM, mutable firmware, version, SVN
    FirmwareBlob,
    /// Hardware config, firmware config, device mode
    FirmwareConfig,
}

impl MeasurementCategory {
    pub fn pcr_index(&self, is_embedded: bool) -> u32 {
        match (self, is_embedded) {
            (MeasurementCategory::FirmwareBlob, false) => PCR_FIRMWARE_BLOB,
            (MeasurementCategory::FirmwareBlob, true) => PCR_FIRMWARE_BLOB_EMBEDDED,
            (MeasurementCategory::FirmwareConfig, false) => PCR_FIRMWARE_CONFIG,
            (MeasurementCategory::FirmwareConfig, true) => PCR_FIRMWARE_CONFIG_EMBEDDED,
        }
    }

    pub fn event_type(&self) -> u32 {
        match self {
            MeasurementCategory::FirmwareBlob => EV_EFI_SPDM_FIRMWARE_BLOB,
            MeasurementCategory::FirmwareConfig => EV_EFI_SPDM_FIRMWARE_CONFIG,
        }
    }
}

/// A block that passed validation, with the log slot selected for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedBlock<'a> {
    pub block: MeasurementBlock<'a>,
    pub category: MeasurementCategory,
    pub pcr_index: u32,
    pub event_type: u32,
}

impl<'a> ValidatedBlock<'a> {
    /// Bytes copied into the event record.
    pub fn bytes(&self) -> &'a [u8] {
        self.block.as_bytes()
    }

    /// Digest or raw value carried by the block.
    pub fn payload(&self) -> &'a [u8] {
        self.block.value
    }
}

/// Result of classifying a structurally valid block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification<'a> {
    /// Extend into the selected PCR
    Extend(ValidatedBlock<'a>),
    /// Informational block that is never logged
    Skip { index: u8, semantic_type: u8 },
}

/// Validate one block and select its PCR index and event type.
///
/// Manifest blocks come back as [`Classification::Skip`]. Any semantic type
/// outside the defined set is an [`ValidationError::UnknownType`].
pub fn validate_and_classify(
    block: &[u8],
    is_embedded: bool,
) -> Result<Classification<'_>, ValidationError> {
    let block = MeasurementBlock::parse(block)?;

    let category = match block.semantic_type() {
        MEASUREMENT_TYPE_IMMUTABLE_ROM
        | MEASUREMENT_TYPE_MUTABLE_FIRMWARE
        | MEASUREMENT_TYPE_VERSION
        | MEASUREMENT_TYPE_SECURE_VERSION_NUMBER => MeasurementCategory::FirmwareBlob,
        MEASUREMENT_TYPE_HARDWARE_CONFIGURATION
        | MEASUREMENT_TYPE_FIRMWARE_CONFIGURATION
        | MEASUREMENT_TYPE_DEVICE_MODE => MeasurementCategory::FirmwareConfig,
        MEASUREMENT_TYPE_MEASUREMENT_MANIFEST => {
            return Ok(Classification::Skip {
                index: block.index,
                semantic_type: MEASUREMENT_TYPE_MEASUREMENT_MANIFEST,
            })
        }
        other => return Err(ValidationError::UnknownType(other)),
    };

    Ok(Classification::Extend(ValidatedBlock {
        block,
        category,
        pcr_index: category.pcr_index(is_embedded),
        event_type: category.event_type(),
    }))
}

/// Split a concatenated measurement record into `count` block slices.
///
/// Each slice spans the common header, the DMTF header and `value_size`
/// bytes. The slices are not validated here; run [`validate_and_classify`]
/// on each one.
pub fn split_record(record: &[u8], count: u8) -> Result<Vec<&[u8]>, ValidationError> {
    let header = MEASUREMENT_BLOCK_COMMON_HEADER_SIZE + MEASUREMENT_BLOCK_DMTF_HEADER_SIZE;
    let mut blocks = Vec::with_capacity(count as usize);
    let mut reader = ByteReader::new(record);

    for _ in 0..count {
        let rest = reader.clone().rest();
        if rest.len() < header {
            return Err(ValidationError::TooShort { len: rest.len() });
        }
        // value_size sits after the common header and the value type byte
        let value_size = u16::from_le_bytes([
            rest[MEASUREMENT_BLOCK_COMMON_HEADER_SIZE + 1],
            rest[MEASUREMENT_BLOCK_COMMON_HEADER_SIZE + 2],
        ]) as usize;
        let block = reader.read_bytes(header + value_size)?;
        blocks.push(block);
    }

    if !reader.is_empty() {
        return Err(ValidationError::SizeMismatch {
            field: "measurement_record_length",
            declared: record.len(),
            expected: reader.offset(),
        });
    }

    Ok(blocks)
}

/// Encode a well-formed DMTF measurement block.
///
/// Fails when the value plus the DMTF header does not fit the 16-bit
/// measurement size field.
pub fn encode_block(index: u8, value_type: u8, value: &[u8]) -> EventLogResult<Vec<u8>> {
    let max_value = u16::MAX as usize - MEASUREMENT_BLOCK_DMTF_HEADER_SIZE;
    if value.len() > max_value {
        return Err(EventLogError::RecordTooLarge {
            size: value.len(),
            max: max_value,
        });
    }
    let value_size = value.len() as u16;
    let measurement_size = value_size + MEASUREMENT_BLOCK_DMTF_HEADER_SIZE as u16;

    let mut out = Vec::with_capacity(
        MEASUREMENT_BLOCK_COMMON_HEADER_SIZE + MEASUREMENT_BLOCK_DMTF_HEADER_SIZE + value.len(),
    );
    out.push(index);
    out.push(MEASUREMENT_SPECIFICATION_DMTF);
    out.extend_from_slice(&measurement_size.to_le_bytes());
    out.push(value_type);
    out.extend_from_slice(&value_size.to_le_bytes());
    out.extend_from_slice(value);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_block(value_type: u8) -> Vec<u8> {
        encode_block(1, value_type, &[0xAB; 32]).unwrap()
    }

    fn extend_of(classification: Classification<'_>) -> ValidatedBlock<'_> {
        match classification {
            Classification::Extend(v) => v,
            other => panic!("expected Extend, got {:?}", other),
        }
    }

    #[test]
    fn test_firmware_types_go_to_firmware_blob() {
        for ty in [
            MEASUREMENT_TYPE_IMMUTABLE_ROM,
            MEASUREMENT_TYPE_MUTABLE_FIRMWARE,
            MEASUREMENT_TYPE_VERSION,
            MEASUREMENT_TYPE_SECURE_VERSION_NUMBER,
        ] {
            let block = create_test_block(ty);
            let v = extend_of(validate_and_classify(&block, false).unwrap());
            assert_eq!(v.pcr_index, 2);
            assert_eq!(v.event_type, EV_EFI_SPDM_FIRMWARE_BLOB);

            let v = extend_of(validate_and_classify(&block, true).unwrap());
            assert_eq!(v.pcr_index, 0);
        }
    }

    #[test]
    fn test_config_types_go_to_firmware_config() {
        for ty in [
            MEASUREMENT_TYPE_HARDWARE_CONFIGURATION,
            MEASUREMENT_TYPE_FIRMWARE_CONFIGURATION,
            MEASUREMENT_TYPE_DEVICE_MODE,
        ] {
            let block = create_test_block(ty);
            let v = extend_of(validate_and_classify(&block, false).unwrap());
            assert_eq!(v.pcr_index, 3);
            assert_eq!(v.event_type, EV_EFI_SPDM_FIRMWARE_CONFIG);

            let v = extend_of(validate_and_classify(&block, true).unwrap());
            assert_eq!(v.pcr_index, 1);
        }
    }

    #[test]
    fn test_raw_bit_stream_flag_is_masked() {
        let block = create_test_block(MEASUREMENT_TYPE_MUTABLE_FIRMWARE | 0x80);
        let v = extend_of(validate_and_classify(&block, false).unwrap());
        assert!(v.block.is_raw_bit_stream());
        assert_eq!(v.block.semantic_type(), MEASUREMENT_TYPE_MUTABLE_FIRMWARE);
        assert_eq!(v.category, MeasurementCategory::FirmwareBlob);
    }

    #[test]
    fn test_manifest_is_skipped() {
        let block = create_test_block(MEASUREMENT_TYPE_MEASUREMENT_MANIFEST);
        assert_eq!(
            validate_and_classify(&block, false).unwrap(),
            Classification::Skip {
                index: 1,
                semantic_type: MEASUREMENT_TYPE_MEASUREMENT_MANIFEST
            }
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let block = create_test_block(0x7E);
        assert_eq!(
            validate_and_classify(&block, false).unwrap_err(),
            ValidationError::UnknownType(0x7E)
        );
    }

    #[test]
    fn test_encode_rejects_value_past_size_field() {
        let largest = vec![0u8; u16::MAX as usize - 3];
        let block = encode_block(1, MEASUREMENT_TYPE_VERSION, &largest).unwrap();
        assert_eq!(&block[2..4], &u16::MAX.to_le_bytes());
        assert!(MeasurementBlock::parse(&block).is_ok());

        for len in [u16::MAX as usize - 2, u16::MAX as usize + 1] {
            let err = encode_block(1, MEASUREMENT_TYPE_VERSION, &vec![0u8; len]).unwrap_err();
            assert!(matches!(
                err,
                EventLogError::RecordTooLarge { size, max } if size == len && max == 65532
            ));
        }
    }

    #[test]
    fn test_too_short() {
        // headers only, no payload
        let block = encode_block(1, MEASUREMENT_TYPE_VERSION, &[]).unwrap();
        assert_eq!(block.len(), 7);
        assert_eq!(
            MeasurementBlock::parse(&block).unwrap_err(),
            ValidationError::TooShort { len: 7 }
        );
        assert!(matches!(
            MeasurementBlock::parse(&[]),
            Err(ValidationError::TooShort { len: 0 })
        ));
    }

    #[test]
    fn test_specification_bit_required() {
        let mut block = create_test_block(MEASUREMENT_TYPE_VERSION);
        block[1] = 0x02;
        assert_eq!(
            MeasurementBlock::parse(&block).unwrap_err(),
            ValidationError::UnknownSpecification(0x02)
        );
    }

    #[test]
    fn test_measurement_size_mismatch() {
        let mut block = create_test_block(MEASUREMENT_TYPE_VERSION);
        block[2] ^= 0x01;
        assert!(matches!(
            MeasurementBlock::parse(&block),
            Err(ValidationError::SizeMismatch {
                field: "measurement_size",
                ..
            })
        ));
    }

    #[test]
    fn test_value_size_mismatch() {
        let mut block = create_test_block(MEASUREMENT_TYPE_VERSION);
        block[5] = block[5].wrapping_add(1);
        assert!(matches!(
            MeasurementBlock::parse(&block),
            Err(ValidationError::SizeMismatch {
                field: "value_size",
                ..
            })
        ));
    }

    #[test]
    fn test_every_size_byte_corruption_rejected() {
        let block = create_test_block(MEASUREMENT_TYPE_MUTABLE_FIRMWARE);
        for offset in [2usize, 3, 5, 6] {
            for flip in [0x01u8, 0x10, 0x80, 0xFF] {
                let mut corrupt = block.clone();
                corrupt[offset] ^= flip;
                assert!(
                    MeasurementBlock::parse(&corrupt).is_err(),
                    "corruption at offset {} with {:#x} accepted",
                    offset,
                    flip
                );
            }
        }
    }

    #[test]
    fn test_split_record() {
        let mut record = encode_block(1, MEASUREMENT_TYPE_IMMUTABLE_ROM, &[1; 32]).unwrap();
        record.extend(encode_block(2, MEASUREMENT_TYPE_DEVICE_MODE, &[2; 4]).unwrap());
        record.extend(encode_block(3, MEASUREMENT_TYPE_VERSION, &[3; 48]).unwrap());

        let blocks = split_record(&record, 3).unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].len(), 39);
        assert_eq!(blocks[1].len(), 11);
        assert_eq!(blocks[2][0], 3);
    }

    #[test]
    fn test_split_record_rejects_trailing_and_short() {
        let mut record = encode_block(1, MEASUREMENT_TYPE_VERSION, &[1; 8]).unwrap();
        record.push(0);
        assert!(split_record(&record, 1).is_err());

        let record = encode_block(1, MEASUREMENT_TYPE_VERSION, &[1; 8]).unwrap();
        assert!(split_record(&record[..10], 1).is_err());
        assert!(split_record(&record, 2).is_err());
    }
}
