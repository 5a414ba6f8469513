//! SPDM device trust orchestration.
//!
//! For every device the platform reaches, [`DeviceAuthenticationOrchestrator`]
//! asks the policy collaborator what is required, runs the
//! [`AuthenticationFlow`] and [`MeasurementFlow`] against the device's SPDM
//! session and reports both outcomes back. Evidence is written to the
//! platform measurement log as TCG device-security records built by
//! `devsec-eventlog`.
//!
//! Outcomes are sticky per device: a device that authenticated or measured
//! successfully is not challenged again until [`DeviceRegistry::invalidate`]
//! is called for it.

pub mod authentication;
pub mod error;
pub mod measurement;
pub mod orchestrator;
pub mod policy;
pub mod registry;
pub mod spdm;

#[cfg(test)]
mod testing;

pub use authentication::AuthenticationFlow;
pub use error::{TrustError, TrustResult};
pub use measurement::MeasurementFlow;
pub use orchestrator::{DeviceAuthenticationOrchestrator, DeviceConnector};
pub use policy::{ConfiguredPolicy, SecurityPolicy};
pub use registry::{DeviceBinding, DeviceContext, DeviceRegistry, TrustRecord};
pub use spdm::{
    CertificateResponse, ChallengeResponse, DigestResponse, MeasurementRequest,
    MeasurementResponse, SpdmSession, SpdmStatus,
};
