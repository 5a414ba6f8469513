//! TCG device-security event records for SPDM evidence.
//!
//! This crate validates SPDM measurement blocks, selects the PCR and event
//! type each block is extended into, and builds the byte-exact v1/v2 device
//! security records (plus NV-index nonce and certificate events) that are
//! handed to the platform measurement log.
//!
//! # Layout
//!
//! - [`measurement_block`]: bounded parsing and classification of one block
//! - [`format`]: the two record layouts behind [`EventLogFormat`]
//! - [`builder`]: [`EventLogBuilder`], the single entry point for records
//! - [`nv_index`]: `EV_NO_ACTION` events for nonces and certificate chains
//! - [`authority`]: the PCR 7 device-authority event
//! - [`log`]: the [`MeasurementLog`] collaborator and an in-memory PCR bank

pub mod authority;
pub mod builder;
pub mod device_context;
pub mod error;
pub mod format;
pub mod log;
pub mod measurement_block;
pub mod nv_index;
pub mod reader;
pub mod tcg;

pub use authority::{PcrEvent, VariableData};
pub use builder::{DeviceDescriptor, EventLogBuilder, EventLogRecord};
pub use device_context::{DeviceIo, PciContext, PCI_TYPE00_HEADER_SIZE};
pub use error::{EventLogError, EventLogResult, LogError, Truncated, ValidationError};
pub use format::{EventLogFormat, RecordHeader, RecordV2, V1Format, V2Format};
pub use log::{InMemoryEventLog, MeasurementLog, TcgEvent, PCR_COUNT};
pub use measurement_block::{
    split_record, validate_and_classify, Classification, MeasurementBlock, MeasurementCategory,
    ValidatedBlock,
};
pub use nv_index::{DynamicEvent, NvIndexEvent};
pub use reader::ByteReader;
