//! Policy-driven authentication and measurement of devices.

use devsec_core::{
    Config, ConnectionConfig, DeviceIdentifier, EventLogVersion, MeasurementConfig,
    SecurityState, StateCode,
};
use devsec_eventlog::{EventLogBuilder, MeasurementLog};
use tracing::{error, info, warn};

use crate::authentication::AuthenticationFlow;
use crate::error::{TrustError, TrustResult};
use crate::measurement::MeasurementFlow;
use crate::policy::SecurityPolicy;
use crate::registry::{DeviceBinding, DeviceRegistry};

/// Establishes the SPDM session for a device reached for the first time.
pub trait DeviceConnector {
    fn connect(
        &mut self,
        id: &DeviceIdentifier,
        preferences: &ConnectionConfig,
    ) -> TrustResult<DeviceBinding>;
}

impl<F> DeviceConnector for F
where
    F: FnMut(&DeviceIdentifier, &ConnectionConfig) -> TrustResult<DeviceBinding>,
{
    fn connect(
        &mut self,
        id: &DeviceIdentifier,
        preferences: &ConnectionConfig,
    ) -> TrustResult<DeviceBinding> {
        self(id, preferences)
    }
}

/// Entry point for device trust: owns the registry, the record builder and
/// the collaborators every flow reports to.
pub struct DeviceAuthenticationOrchestrator<C, L, P> {
    connector: C,
    log: L,
    policy: Option<P>,
    registry: DeviceRegistry,
    builder: EventLogBuilder,
    measurement: MeasurementConfig,
    connection: ConnectionConfig,
}

impl<C, L, P> DeviceAuthenticationOrchestrator<C, L, P>
where
    C: DeviceConnector,
    L: MeasurementLog,
    P: SecurityPolicy,
{
    /// Create an orchestrator. The record layout is fixed from `config` here.
    pub fn new(config: &Config, connector: C, log: L, policy: Option<P>) -> Self {
        info!(
            "STATUS: DeviceAuthenticationOrchestrator :: event log {:?} :: policy {}",
            config.event_log.version,
            if policy.is_some() { "ATTACHED" } else { "ABSENT" }
        );
        Self {
            connector,
            log,
            policy,
            registry: DeviceRegistry::new(),
            builder: EventLogBuilder::new(config.event_log.version),
            measurement: config.measurement.clone(),
            connection: config.connection.clone(),
        }
    }

    /// Authenticate and measure `id` as its policy requires.
    ///
    /// Without a policy collaborator every device is accepted. Otherwise
    /// both state codes are reported to the policy and the device is
    /// accepted only when both are success.
    pub fn authenticate_and_measure(&mut self, id: DeviceIdentifier) -> TrustResult<()> {
        let policy = match self.policy.as_mut() {
            Some(policy) => policy,
            None => {
                warn!(device = %id, "DeviceAuthenticationOrchestrator :: no policy, device accepted");
                return Ok(());
            }
        };

        let connector = &mut self.connector;
        let connection = &self.connection;
        let ctx = match self
            .registry
            .find_or_create(id, |id| connector.connect(id, connection))
        {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(device = %id, error = %e, "DeviceAuthenticationOrchestrator :: no SPDM session");
                return Err(TrustError::Unsupported(format!(
                    "no SPDM session with {}: {}",
                    id, e
                )));
            }
        };

        let state = match policy.get_device_policy(&id) {
            Ok(device_policy) => {
                let mut state = SecurityState::success();
                if device_policy.authentication_required {
                    if let Err(e) =
                        AuthenticationFlow::new(&self.builder).authenticate(ctx, &mut self.log)
                    {
                        warn!(device = %id, error = %e, "DeviceAuthenticationOrchestrator :: authentication failed");
                        state.authentication_state = e.state_code();
                    }
                }
                if device_policy.measurement_required {
                    if let Err(e) = MeasurementFlow::new(&self.builder, &self.measurement)
                        .measure(ctx, &mut self.log)
                    {
                        warn!(device = %id, error = %e, "DeviceAuthenticationOrchestrator :: measurement failed");
                        state.measurement_state = e.state_code();
                    }
                }
                state
            }
            Err(e) => {
                warn!(device = %id, error = %e, "DeviceAuthenticationOrchestrator :: policy query failed");
                SecurityState::both(StateCode::GET_POLICY_PROTOCOL)
            }
        };

        if let Err(e) = policy.notify_device_state(&id, &state) {
            warn!(device = %id, error = %e, "DeviceAuthenticationOrchestrator :: state notification failed");
        }

        if state.is_success() {
            info!("STATUS: DeviceAuthenticationOrchestrator :: {} :: TRUSTED", id);
            Ok(())
        } else {
            warn!(
                "STATUS: DeviceAuthenticationOrchestrator :: {} :: REJECTED (authentication {}, measurement {})",
                id, state.authentication_state, state.measurement_state
            );
            Err(TrustError::SecurityViolation(format!(
                "{} rejected: authentication {}, measurement {}",
                id, state.authentication_state, state.measurement_state
            )))
        }
    }

    /// Forget the trust outcome of `id`; the next call re-runs both flows.
    pub fn invalidate(&mut self, id: &DeviceIdentifier) -> bool {
        self.registry.invalidate(id)
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn policy(&self) -> Option<&P> {
        self.policy.as_ref()
    }

    pub fn event_log_version(&self) -> EventLogVersion {
        self.builder.version()
    }
}
