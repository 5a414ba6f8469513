//! Core functionality for the devsec device-trust stack.
//!
//! This crate provides the shared data model (device identifiers, policy,
//! security state codes, auth-state bytes), the error type, logging
//! initialisation and configuration used by the event-log and trust crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{Config, ConnectionConfig, EventLogConfig, MeasurementConfig, PolicyConfig};
pub use error::{CoreError, CoreResult};
pub use types::{
    AuthState, DeviceClass, DeviceHandle, DeviceIdentifier, DevicePolicy, EventLogVersion, Nonce,
    NoncePair, SecurityState, StateCode, NONCE_SIZE,
};
