//! Device-class specific identity carried at the end of every record.
//!
//! The class tag decides three things at once: the TCG device type, the
//! size of the context block and how that block is filled from the device's
//! register space.

use byteorder::{LittleEndian, WriteBytesExt};
use devsec_core::DeviceClass;
use tracing::debug;

use crate::error::{EventLogError, EventLogResult};
use crate::tcg::*;

/// Class-specific register access for one device (PCI config space, etc).
pub trait DeviceIo {
    /// Fill `buf` with registers starting at `offset`.
    fn read(&self, offset: u32, buf: &mut [u8]) -> EventLogResult<()>;
}

/// Size of the PCI type-00 configuration header.
pub const PCI_TYPE00_HEADER_SIZE: usize = 64;

const PCI_VENDOR_ID_OFFSET: usize = 0x00;
const PCI_DEVICE_ID_OFFSET: usize = 0x02;
const PCI_REVISION_ID_OFFSET: usize = 0x08;
const PCI_CLASS_CODE_OFFSET: usize = 0x09;
const PCI_HEADER_TYPE_OFFSET: usize = 0x0E;
const PCI_SUBSYSTEM_VENDOR_ID_OFFSET: usize = 0x2C;
const PCI_SUBSYSTEM_ID_OFFSET: usize = 0x2E;
const HEADER_LAYOUT_CODE: u8 = 0x7F;
const HEADER_TYPE_DEVICE: u8 = 0x00;

/// TCG device type for a class.
pub fn device_type(class: DeviceClass) -> u32 {
    match class {
        DeviceClass::Pci => DEVICE_TYPE_PCI,
        DeviceClass::Usb => DEVICE_TYPE_USB,
        DeviceClass::Unknown => DEVICE_TYPE_NULL,
    }
}

/// Bytes the context block occupies; zero means the section is omitted.
pub fn context_size(class: DeviceClass) -> usize {
    match class {
        DeviceClass::Pci => PCI_CONTEXT_SIZE,
        DeviceClass::Usb | DeviceClass::Unknown => 0,
    }
}

/// Append the context block for `class` to `out`.
pub fn write_context(
    class: DeviceClass,
    io: Option<&dyn DeviceIo>,
    out: &mut Vec<u8>,
) -> EventLogResult<()> {
    match class {
        DeviceClass::Pci => {
            let io = io.ok_or_else(|| {
                EventLogError::DeviceIo("PCI device has no config-space accessor".to_string())
            })?;
            PciContext::read(io)?.write_to(out)
        }
        DeviceClass::Usb | DeviceClass::Unknown => Ok(()),
    }
}

/// TCG_DEVICE_SECURITY_EVENT_DATA_PCI_CONTEXT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PciContext {
    pub vendor_id: u16,
    pub device_id: u16,
    pub revision_id: u8,
    pub class_code: [u8; 3],
    pub subsystem_vendor_id: u16,
    pub subsystem_id: u16,
}

impl PciContext {
    /// Read the type-00 header and pick out the identity fields.
    pub fn read(io: &dyn DeviceIo) -> EventLogResult<Self> {
        let mut cfg = [0u8; PCI_TYPE00_HEADER_SIZE];
        io.read(0, &mut cfg)?;
        Ok(Self::from_config_space(&cfg))
    }

    pub fn from_config_space(cfg: &[u8; PCI_TYPE00_HEADER_SIZE]) -> Self {
        let word = |at: usize| u16::from_le_bytes([cfg[at], cfg[at + 1]]);

        let header_type = cfg[PCI_HEADER_TYPE_OFFSET];
        let (subsystem_vendor_id, subsystem_id) =
            if header_type & HEADER_LAYOUT_CODE == HEADER_TYPE_DEVICE {
                (
                    word(PCI_SUBSYSTEM_VENDOR_ID_OFFSET),
                    word(PCI_SUBSYSTEM_ID_OFFSET),
                )
            } else {
                debug!(header_type, "PciContext :: bridge layout, subsystem ids zeroed");
                (0, 0)
            };

        Self {
            vendor_id: word(PCI_VENDOR_ID_OFFSET),
            device_id: word(PCI_DEVICE_ID_OFFSET),
            revision_id: cfg[PCI_REVISION_ID_OFFSET],
            class_code: [
                cfg[PCI_CLASS_CODE_OFFSET],
                cfg[PCI_CLASS_CODE_OFFSET + 1],
                cfg[PCI_CLASS_CODE_OFFSET + 2],
            ],
            subsystem_vendor_id,
            subsystem_id,
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> EventLogResult<()> {
        out.write_u16::<LittleEndian>(PCI_CONTEXT_VERSION)?;
        out.write_u16::<LittleEndian>(PCI_CONTEXT_SIZE as u16)?;
        out.write_u16::<LittleEndian>(self.vendor_id)?;
        out.write_u16::<LittleEndian>(self.device_id)?;
        out.write_u8(self.revision_id)?;
        out.extend_from_slice(&self.class_code);
        out.write_u16::<LittleEndian>(self.subsystem_vendor_id)?;
        out.write_u16::<LittleEndian>(self.subsystem_id)?;
        Ok(())
    }
}
