//! Core types shared by the event-log and trust crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Size in bytes of an SPDM nonce.
pub const NONCE_SIZE: usize = 32;

/// A fresh random value exchanged in one SPDM transaction.
pub type Nonce = [u8; NONCE_SIZE];

/// Bus class of an attached component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// PCI / PCIe function
    Pci,
    /// USB device
    Usb,
    /// Any class without a dedicated event-log context
    Unknown,
}

impl DeviceClass {
    /// Short lowercase tag used in identifiers and configuration keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Pci => "pci",
            DeviceClass::Usb => "usb",
            DeviceClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pci" => Ok(DeviceClass::Pci),
            "usb" => Ok(DeviceClass::Usb),
            "unknown" => Ok(DeviceClass::Unknown),
            other => Err(CoreError::InvalidIdentifier(format!(
                "unknown device class '{}'",
                other
            ))),
        }
    }
}

/// Opaque handle to a physical device, assigned by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceHandle(pub u64);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Immutable registry key: device class plus platform handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentifier {
    /// Bus class of the device
    pub class: DeviceClass,
    /// Platform handle of the device
    pub handle: DeviceHandle,
}

impl DeviceIdentifier {
    /// Create a new identifier.
    pub fn new(class: DeviceClass, handle: u64) -> Self {
        Self {
            class,
            handle: DeviceHandle(handle),
        }
    }

    /// Shorthand for a PCI identifier.
    pub fn pci(handle: u64) -> Self {
        Self::new(DeviceClass::Pci, handle)
    }

    /// Shorthand for a USB identifier.
    pub fn usb(handle: u64) -> Self {
        Self::new(DeviceClass::Usb, handle)
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class, self.handle)
    }
}

impl FromStr for DeviceIdentifier {
    type Err = CoreError;

    /// Parses `"<class>:<handle>"`, handle in decimal or `0x` hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (class, handle) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidIdentifier(format!("missing ':' in '{}'", s)))?;

        let class = class.trim().parse::<DeviceClass>()?;
        let handle = handle.trim();
        let parsed = match handle
            .strip_prefix("0x")
            .or_else(|| handle.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => handle.parse::<u64>(),
        }
        .map_err(|e| CoreError::InvalidIdentifier(format!("bad handle '{}': {}", handle, e)))?;

        Ok(Self::new(class, parsed))
    }
}

/// Per-device requirements supplied by the platform policy service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DevicePolicy {
    /// Device must pass certificate + challenge authentication
    pub authentication_required: bool,
    /// Device firmware/configuration must be measured
    pub measurement_required: bool,
}

impl DevicePolicy {
    /// Require both authentication and measurement.
    pub fn strict() -> Self {
        Self {
            authentication_required: true,
            measurement_required: true,
        }
    }

    /// Require nothing.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Numeric device-security state reported to the policy service.
///
/// Zero is success. Error codes carry bit 31.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateCode(pub u32);

impl StateCode {
    pub const SUCCESS: StateCode = StateCode(0);
    pub const ERROR: u32 = 0x8000_0000;
    pub const UNSUPPORTED: StateCode = StateCode(Self::ERROR);
    pub const SECURITY_VIOLATION: StateCode = StateCode(Self::ERROR + 0x01);
    pub const BUFFER_TOO_SMALL: StateCode = StateCode(Self::ERROR + 0x02);
    pub const OUT_OF_RESOURCE: StateCode = StateCode(Self::ERROR + 0x03);
    pub const DEVICE_ERROR: StateCode = StateCode(Self::ERROR + 0x04);
    pub const GET_POLICY_PROTOCOL: StateCode = StateCode(Self::ERROR + 0x10);
    pub const PCI_NO_CAPABILITIES: StateCode = StateCode(Self::ERROR + 0x20);
    pub const TCG_EXTEND_TPM_PCR: StateCode = StateCode(Self::ERROR + 0x30);

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }

    pub fn is_error(&self) -> bool {
        self.0 & Self::ERROR != 0
    }

    fn name(&self) -> Option<&'static str> {
        Some(match *self {
            StateCode::SUCCESS => "SUCCESS",
            StateCode::UNSUPPORTED => "UNSUPPORTED",
            StateCode::SECURITY_VIOLATION => "SECURITY_VIOLATION",
            StateCode::BUFFER_TOO_SMALL => "BUFFER_TOO_SMALL",
            StateCode::OUT_OF_RESOURCE => "OUT_OF_RESOURCE",
            StateCode::DEVICE_ERROR => "DEVICE_ERROR",
            StateCode::GET_POLICY_PROTOCOL => "GET_POLICY_PROTOCOL",
            StateCode::PCI_NO_CAPABILITIES => "PCI_NO_CAPABILITIES",
            StateCode::TCG_EXTEND_TPM_PCR => "TCG_EXTEND_TPM_PCR",
            _ => return None,
        })
    }
}

impl Default for StateCode {
    fn default() -> Self {
        StateCode::SUCCESS
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({:#010x})", name, self.0),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

/// Outcome of one orchestration, one code per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecurityState {
    pub measurement_state: StateCode,
    pub authentication_state: StateCode,
}

impl SecurityState {
    /// Both axes successful.
    pub fn success() -> Self {
        Self::default()
    }

    /// Same code on both axes.
    pub fn both(code: StateCode) -> Self {
        Self {
            measurement_state: code,
            authentication_state: code,
        }
    }

    pub fn is_success(&self) -> bool {
        self.measurement_state.is_success() && self.authentication_state.is_success()
    }
}

/// Authentication state byte carried in TCG device-security records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AuthState {
    Success = 0,
    NoAuth = 1,
    NoBinding = 2,
    FailNoSig = 3,
    FailInvalid = 4,
    NoSpdm = 0xFF,
}

impl AuthState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Records in a failure state never carry measurement or certificate data.
    pub fn carries_evidence(self) -> bool {
        matches!(
            self,
            AuthState::Success | AuthState::NoAuth | AuthState::NoBinding
        )
    }
}

impl TryFrom<u8> for AuthState {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AuthState::Success),
            1 => Ok(AuthState::NoAuth),
            2 => Ok(AuthState::NoBinding),
            3 => Ok(AuthState::FailNoSig),
            4 => Ok(AuthState::FailInvalid),
            0xFF => Ok(AuthState::NoSpdm),
            other => Err(CoreError::InvalidValue(format!(
                "unknown auth state {:#04x}",
                other
            ))),
        }
    }
}

/// Requester and responder nonces of one signed exchange.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NoncePair {
    pub requester: Nonce,
    pub responder: Nonce,
}

impl fmt::Debug for NoncePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoncePair")
            .field("requester", &hex::encode(self.requester))
            .field("responder", &hex::encode(self.responder))
            .finish()
    }
}

/// Layout of the TCG device-security event data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLogVersion {
    /// Legacy "SPDM Device Sec" layout
    V1,
    /// Current "SPDM Device Sec2" layout
    #[default]
    V2,
}
