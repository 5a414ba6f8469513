//! TCG and SPDM constants used by the device-security event records.
//!
//! All multi-byte fields are little-endian on the wire.

pub const EV_NO_ACTION: u32 = 0x3;

pub const EV_EFI_EVENT_BASE: u32 = 0x80000000;
pub const EV_EFI_SPDM_FIRMWARE_BLOB: u32 = EV_EFI_EVENT_BASE + 0xE1;
pub const EV_EFI_SPDM_FIRMWARE_CONFIG: u32 = EV_EFI_EVENT_BASE + 0xE2;
pub const EV_EFI_SPDM_DEVICE_POLICY: u32 = EV_EFI_EVENT_BASE + 0xE3;
pub const EV_EFI_SPDM_DEVICE_AUTHORITY: u32 = EV_EFI_EVENT_BASE + 0xE4;

/// Human-readable name for the event types this crate emits.
pub fn event_type_name(event_type: u32) -> &'static str {
    match event_type {
        EV_NO_ACTION => "EV_NO_ACTION",
        EV_EFI_SPDM_FIRMWARE_BLOB => "EV_EFI_SPDM_FIRMWARE_BLOB",
        EV_EFI_SPDM_FIRMWARE_CONFIG => "EV_EFI_SPDM_FIRMWARE_CONFIG",
        EV_EFI_SPDM_DEVICE_POLICY => "EV_EFI_SPDM_DEVICE_POLICY",
        EV_EFI_SPDM_DEVICE_AUTHORITY => "EV_EFI_SPDM_DEVICE_AUTHORITY",
        _ => "EV_UNKNOWN",
    }
}

// PCR selection for SPDM evidence
pub const PCR_FIRMWARE_BLOB: u32 = 2;
pub const PCR_FIRMWARE_BLOB_EMBEDDED: u32 = 0;
pub const PCR_FIRMWARE_CONFIG: u32 = 3;
pub const PCR_FIRMWARE_CONFIG_EMBEDDED: u32 = 1;
pub const PCR_DEVICE_AUTHORITY: u32 = 7;

/// EFI_GUID in its in-memory layout (first three fields little-endian).
pub const fn efi_guid(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> [u8; 16] {
    let a = data1.to_le_bytes();
    let b = data2.to_le_bytes();
    let c = data3.to_le_bytes();
    [
        a[0], a[1], a[2], a[3], b[0], b[1], c[0], c[1], data4[0], data4[1], data4[2], data4[3],
        data4[4], data4[5], data4[6], data4[7],
    ]
}

// Device signature database the authority event is recorded against
pub const DEVICE_SIGNATURE_DATABASE_GUID: [u8; 16] = efi_guid(
    0xb9c2b4f4,
    0xbf5f,
    0x462d,
    [0x8a, 0xdf, 0xc5, 0xc7, 0x0a, 0xc3, 0x5d, 0xad],
);
pub const DEVICE_SECURITY_DATABASE_NAME: &str = "devdb";

/// SignatureOwner written ahead of each trust anchor.
pub const DEVICE_AUTHORITY_OWNER_GUID: [u8; 16] = efi_guid(
    0x3f6a1c2e,
    0x5d84,
    0x4b1f,
    [0x9e, 0x27, 0x6c, 0xd0, 0x41, 0xb8, 0x73, 0x15],
);

/// VariableName GUID plus the two u64 length fields of UEFI_VARIABLE_DATA.
pub const UEFI_VARIABLE_DATA_HEADER_SIZE: usize = 32;

// TCG_DEVICE_SECURITY_EVENT_DATA
pub const DEVICE_SECURITY_SIGNATURE_V1: &[u8; 16] = b"SPDM Device Sec\0";
pub const DEVICE_SECURITY_SIGNATURE_V2: &[u8; 16] = b"SPDM Device Sec2";
pub const DEVICE_SECURITY_VERSION_1: u16 = 1;
pub const DEVICE_SECURITY_VERSION_2: u16 = 2;

/// Signature[16] + Version u16 + Length u16 + SpdmHashAlgo u32 + DeviceType u32.
pub const HEADER_V1_SIZE: usize = 28;
/// Signature[16] + Version u16 + AuthState u8 + Reserved u8 + Length u32 + DeviceType u32
/// + SubHeaderType u32 + SubHeaderLength u32 + SubHeaderUID u64.
pub const HEADER_V2_SIZE: usize = 44;
/// Width of the device-path length prefix.
pub const DEVICE_PATH_LENGTH_SIZE: usize = 8;

pub const DEVICE_TYPE_NULL: u32 = 0;
pub const DEVICE_TYPE_PCI: u32 = 1;
pub const DEVICE_TYPE_USB: u32 = 2;

pub const SUB_HEADER_TYPE_SPDM_MEASUREMENT_BLOCK: u32 = 0;
pub const SUB_HEADER_TYPE_SPDM_CERT_CHAIN: u32 = 1;

/// SpdmVersion u16 + SpdmMeasurementBlockCount u8 + Reserved u8 + SpdmMeasurementHashAlgo u32.
pub const MEASUREMENT_SUB_HEADER_SIZE: usize = 8;
/// SpdmVersion u16 + SpdmSlotId u8 + Reserved u8 + SpdmHashAlgo u32.
pub const CERT_CHAIN_SUB_HEADER_SIZE: usize = 8;

pub const PCI_CONTEXT_VERSION: u16 = 0;
pub const PCI_CONTEXT_SIZE: usize = 16;

// TCG NV index event log structures
pub const NV_EXTEND_INDEX_FOR_INSTANCE: u32 = 0x01C40200;
pub const NV_EXTEND_INDEX_FOR_DYNAMIC: u32 = 0x01C40201;
pub const NV_INDEX_INSTANCE_SIGNATURE: &[u8; 16] = b"NvIndexInstance\0";
pub const NV_INDEX_DYNAMIC_SIGNATURE: &[u8; 16] = b"NvIndexDynamic \0";
pub const NV_INDEX_EVENT_LOG_STRUCT_VERSION: u16 = 1;
/// Signature[16] + Version u16 + Reserved[6].
pub const NV_INDEX_INSTANCE_HEADER_SIZE: usize = 24;
/// Signature[16] + Version u16 + Reserved[6] + Uid u64.
pub const NV_INDEX_DYNAMIC_HEADER_SIZE: usize = 32;

pub const SPDM_GET_MEASUREMENTS_DESCRIPTION: &[u8] = b"SPDM GET_MEASUREMENTS\0";
pub const SPDM_MEASUREMENTS_DESCRIPTION: &[u8] = b"SPDM MEASUREMENTS\0";
pub const SPDM_CHALLENGE_DESCRIPTION: &[u8] = b"SPDM CHALLENGE\0";
pub const SPDM_CHALLENGE_AUTH_DESCRIPTION: &[u8] = b"SPDM CHALLENGE_AUTH\0";

// SPDM measurement block
pub const MEASUREMENT_BLOCK_COMMON_HEADER_SIZE: usize = 4;
pub const MEASUREMENT_BLOCK_DMTF_HEADER_SIZE: usize = 3;
pub const MEASUREMENT_SPECIFICATION_DMTF: u8 = 0x01;
pub const MEASUREMENT_VALUE_TYPE_RAW_BIT_STREAM: u8 = 0x80;
pub const MEASUREMENT_VALUE_TYPE_MASK: u8 = 0x7F;

pub const MEASUREMENT_TYPE_IMMUTABLE_ROM: u8 = 0;
pub const MEASUREMENT_TYPE_MUTABLE_FIRMWARE: u8 = 1;
pub const MEASUREMENT_TYPE_HARDWARE_CONFIGURATION: u8 = 2;
pub const MEASUREMENT_TYPE_FIRMWARE_CONFIGURATION: u8 = 3;
pub const MEASUREMENT_TYPE_MEASUREMENT_MANIFEST: u8 = 4;
pub const MEASUREMENT_TYPE_DEVICE_MODE: u8 = 5;
pub const MEASUREMENT_TYPE_VERSION: u8 = 6;
pub const MEASUREMENT_TYPE_SECURE_VERSION_NUMBER: u8 = 7;

// SPDM_ALGORITHMS base / measurement hash bits
pub const SPDM_HASH_ALGO_SHA_256: u32 = 1 << 0;
pub const SPDM_HASH_ALGO_SHA_384: u32 = 1 << 1;
pub const SPDM_HASH_ALGO_SHA_512: u32 = 1 << 2;

/// Digest length for a single negotiated SPDM hash algorithm bit.
pub fn spdm_hash_size(algo: u32) -> Option<usize> {
    match algo {
        SPDM_HASH_ALGO_SHA_256 => Some(32),
        SPDM_HASH_ALGO_SHA_384 => Some(48),
        SPDM_HASH_ALGO_SHA_512 => Some(64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_values() {
        assert_eq!(EV_EFI_SPDM_FIRMWARE_BLOB, 0x800000E1);
        assert_eq!(EV_EFI_SPDM_FIRMWARE_CONFIG, 0x800000E2);
        assert_eq!(event_type_name(EV_NO_ACTION), "EV_NO_ACTION");
        assert_eq!(event_type_name(0x1234), "EV_UNKNOWN");
    }

    #[test]
    fn test_signature_widths() {
        assert_eq!(DEVICE_SECURITY_SIGNATURE_V1.len(), 16);
        assert_eq!(NV_INDEX_DYNAMIC_SIGNATURE.len(), 16);
        assert_eq!(NV_INDEX_INSTANCE_SIGNATURE.len(), 16);
    }

    #[test]
    fn test_guid_layout() {
        assert_eq!(
            DEVICE_SIGNATURE_DATABASE_GUID,
            [
                0xf4, 0xb4, 0xc2, 0xb9, 0x5f, 0xbf, 0x2d, 0x46, 0x8a, 0xdf, 0xc5, 0xc7, 0x0a, 0xc3,
                0x5d, 0xad
            ]
        );
        assert_eq!(EV_EFI_SPDM_DEVICE_AUTHORITY, 0x800000E4);
    }

    #[test]
    fn test_hash_sizes() {
        assert_eq!(spdm_hash_size(SPDM_HASH_ALGO_SHA_384), Some(48));
        assert_eq!(spdm_hash_size(0b11), None);
    }
}
