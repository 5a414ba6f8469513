//! Certificate retrieval and challenge-response authentication of a device.

use devsec_core::{AuthState, NoncePair};
use devsec_eventlog::{DeviceDescriptor, EventLogBuilder, MeasurementLog};
use tracing::{debug, info, warn};

use crate::error::{TrustError, TrustResult};
use crate::registry::DeviceContext;
use crate::spdm::{
    fresh_nonce, settle, SpdmStatus, NO_MEASUREMENT_SUMMARY_HASH, SPDM_CAP_CERT,
};

/// Certificate slot used for authentication.
pub const AUTH_SLOT_ID: u8 = 0;

/// Runs the authentication exchange for one device context.
///
/// Once a device authenticates the context stays authenticated; the flow
/// returns immediately on later calls.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticationFlow<'a> {
    builder: &'a EventLogBuilder,
}

impl<'a> AuthenticationFlow<'a> {
    pub fn new(builder: &'a EventLogBuilder) -> Self {
        Self { builder }
    }

    /// Authenticate the device behind `ctx`.
    ///
    /// With the certificate capability the digests and the slot 0 chain are
    /// fetched first; a failure there is a device error. The challenge is
    /// always issued. Evidence records go to `log` in the v2 layout: a chain
    /// rooted in a provisioned anchor is followed by the PCR 7 authority
    /// event, while a chain without one is logged as `NO_AUTH` and the device
    /// still counts as authenticated.
    pub fn authenticate(
        &self,
        ctx: &mut DeviceContext,
        log: &mut dyn MeasurementLog,
    ) -> TrustResult<()> {
        if ctx.trust().authenticated() {
            debug!(device = %ctx.id(), "AuthenticationFlow :: already authenticated");
            return Ok(());
        }

        let id = *ctx.id();
        let (session, device) = ctx.split();
        let caps = session.capability_flags();
        let hash_algo = session.base_hash_algo();

        let certificate = if caps & SPDM_CAP_CERT != 0 {
            let digest = session.get_digest();
            let digest = settle(digest, session.last_error()).map_err(|status| {
                warn!(device = %id, %status, "AuthenticationFlow :: GET_DIGESTS failed");
                TrustError::DeviceError(format!("GET_DIGESTS: {}", status))
            })?;
            debug!(
                device = %id,
                slot_mask = digest.slot_mask,
                digests = %hex::encode(&digest.digests),
                "AuthenticationFlow :: digests received"
            );

            let chain = session.get_certificate(AUTH_SLOT_ID);
            match settle(chain, session.last_error()) {
                Ok(chain) => Some(chain),
                Err(status) => {
                    warn!(device = %id, %status, "AuthenticationFlow :: GET_CERTIFICATE failed");
                    if status.is_verif_fail() {
                        self.log_certificate(log, &device, AuthState::FailInvalid, hash_algo, None)?;
                    }
                    return Err(TrustError::DeviceError(format!("GET_CERTIFICATE: {}", status)));
                }
            }
        } else {
            debug!(device = %id, "AuthenticationFlow :: no CERT_CAP, challenge only");
            None
        };

        let challenge = session.challenge(AUTH_SLOT_ID, NO_MEASUREMENT_SUMMARY_HASH, fresh_nonce());
        let challenge = match settle(challenge, session.last_error()) {
            Ok(challenge) => challenge,
            Err(SpdmStatus::VerifFail) => {
                warn!(device = %id, "AuthenticationFlow :: CHALLENGE_AUTH verification failed");
                self.log_certificate(log, &device, AuthState::FailInvalid, hash_algo, None)?;
                return Err(TrustError::SecurityViolation(
                    "CHALLENGE_AUTH signature verification failed".to_string(),
                ));
            }
            Err(status) => {
                warn!(device = %id, %status, "AuthenticationFlow :: CHALLENGE failed");
                return Err(TrustError::DeviceError(format!("CHALLENGE: {}", status)));
            }
        };

        match &certificate {
            Some(chain) => match &chain.trust_anchor {
                Some(anchor) => {
                    self.log_certificate(
                        log,
                        &device,
                        AuthState::Success,
                        hash_algo,
                        Some(&chain.cert_chain),
                    )?;
                    if let Some(event) = self.builder.build_authority_record(anchor)? {
                        log.log_pcr_event(&event)?;
                    }
                    self.log_challenge_nonces(log, &device, &challenge.nonces)?;
                }
                None => {
                    // NO_AUTH record only, no nonce events
                    info!(
                        device = %id,
                        "AuthenticationFlow :: chain has no provisioned trust anchor"
                    );
                    self.log_certificate(
                        log,
                        &device,
                        AuthState::NoAuth,
                        hash_algo,
                        Some(&chain.cert_chain),
                    )?;
                }
            },
            None => self.log_challenge_nonces(log, &device, &challenge.nonces)?,
        }

        ctx.trust_mut().mark_authenticated();
        info!("STATUS: AuthenticationFlow :: {} :: AUTHENTICATED", id);
        Ok(())
    }

    fn log_challenge_nonces(
        &self,
        log: &mut dyn MeasurementLog,
        device: &DeviceDescriptor<'_>,
        nonces: &NoncePair,
    ) -> TrustResult<()> {
        for event in self.builder.challenge_nonce_events(device, nonces)? {
            log.log_nv_event(&event)?;
        }
        Ok(())
    }

    fn log_certificate(
        &self,
        log: &mut dyn MeasurementLog,
        device: &DeviceDescriptor<'_>,
        state: AuthState,
        hash_algo: u32,
        cert_chain: Option<&[u8]>,
    ) -> TrustResult<()> {
        if let Some(event) =
            self.builder
                .build_certificate_record(device, state, hash_algo, AUTH_SLOT_ID, cert_chain)?
        {
            log.log_nv_event(&event)?;
        }
        Ok(())
    }
}
