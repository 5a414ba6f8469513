//! Platform security policy collaborator.

use std::collections::HashMap;

use devsec_core::{DeviceIdentifier, DevicePolicy, PolicyConfig, SecurityState};
use tracing::{debug, info};

use crate::error::{TrustError, TrustResult};

/// Supplies per-device requirements and receives the outcome of each
/// orchestration.
pub trait SecurityPolicy {
    fn get_device_policy(&mut self, id: &DeviceIdentifier) -> TrustResult<DevicePolicy>;

    fn notify_device_state(&mut self, id: &DeviceIdentifier, state: &SecurityState)
        -> TrustResult<()>;
}

impl<P: SecurityPolicy + ?Sized> SecurityPolicy for &mut P {
    fn get_device_policy(&mut self, id: &DeviceIdentifier) -> TrustResult<DevicePolicy> {
        (**self).get_device_policy(id)
    }

    fn notify_device_state(
        &mut self,
        id: &DeviceIdentifier,
        state: &SecurityState,
    ) -> TrustResult<()> {
        (**self).notify_device_state(id, state)
    }
}

impl<P: SecurityPolicy + ?Sized> SecurityPolicy for Box<P> {
    fn get_device_policy(&mut self, id: &DeviceIdentifier) -> TrustResult<DevicePolicy> {
        (**self).get_device_policy(id)
    }

    fn notify_device_state(
        &mut self,
        id: &DeviceIdentifier,
        state: &SecurityState,
    ) -> TrustResult<()> {
        (**self).notify_device_state(id, state)
    }
}

/// Policy built from configuration: per-device overrides, then the default.
///
/// Remembers the last state notified for each device.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredPolicy {
    default: DevicePolicy,
    overrides: HashMap<DeviceIdentifier, DevicePolicy>,
    notified: HashMap<DeviceIdentifier, SecurityState>,
}

impl ConfiguredPolicy {
    pub fn new(default: DevicePolicy) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
            notified: HashMap::new(),
        }
    }

    /// Build from the `[policy]` configuration section.
    pub fn from_config(config: &PolicyConfig) -> TrustResult<Self> {
        let overrides = config
            .overrides()
            .map_err(|e| TrustError::PolicyQuery(e.to_string()))?;
        info!(
            "STATUS: ConfiguredPolicy :: default {:?} :: {} override(s)",
            config.default,
            overrides.len()
        );
        Ok(Self {
            default: config.default,
            overrides,
            notified: HashMap::new(),
        })
    }

    pub fn with_override(mut self, id: DeviceIdentifier, policy: DevicePolicy) -> Self {
        self.overrides.insert(id, policy);
        self
    }

    /// Last state reported for `id`.
    pub fn last_state(&self, id: &DeviceIdentifier) -> Option<&SecurityState> {
        self.notified.get(id)
    }
}

impl SecurityPolicy for ConfiguredPolicy {
    fn get_device_policy(&mut self, id: &DeviceIdentifier) -> TrustResult<DevicePolicy> {
        Ok(self.overrides.get(id).copied().unwrap_or(self.default))
    }

    fn notify_device_state(
        &mut self,
        id: &DeviceIdentifier,
        state: &SecurityState,
    ) -> TrustResult<()> {
        debug!(
            device = %id,
            measurement = %state.measurement_state,
            authentication = %state.authentication_state,
            "ConfiguredPolicy :: device state recorded"
        );
        self.notified.insert(*id, *state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devsec_core::StateCode;

    #[test]
    fn test_override_wins_over_default() {
        let mut policy = ConfiguredPolicy::new(DevicePolicy::strict())
            .with_override(DeviceIdentifier::usb(2), DevicePolicy::none());

        assert_eq!(
            policy.get_device_policy(&DeviceIdentifier::usb(1)).unwrap(),
            DevicePolicy::strict()
        );
        assert_eq!(
            policy.get_device_policy(&DeviceIdentifier::usb(2)).unwrap(),
            DevicePolicy::none()
        );
    }

    #[test]
    fn test_from_config() {
        let mut config = PolicyConfig::default();
        config.devices.insert(
            "pci:0x1f".to_string(),
            DevicePolicy {
                authentication_required: true,
                measurement_required: false,
            },
        );
        let mut policy = ConfiguredPolicy::from_config(&config).unwrap();
        let p = policy.get_device_policy(&DeviceIdentifier::pci(0x1f)).unwrap();
        assert!(p.authentication_required);
        assert!(!p.measurement_required);
        assert_eq!(
            policy.get_device_policy(&DeviceIdentifier::pci(0x20)).unwrap(),
            DevicePolicy::default()
        );
    }

    #[test]
    fn test_bad_override_key_rejected() {
        let mut config = PolicyConfig::default();
        config
            .devices
            .insert("scsi:1".to_string(), DevicePolicy::strict());
        assert!(matches!(
            ConfiguredPolicy::from_config(&config),
            Err(TrustError::PolicyQuery(_))
        ));
    }

    #[test]
    fn test_notified_state_is_recorded() {
        let mut policy = ConfiguredPolicy::default();
        let id = DeviceIdentifier::usb(5);
        assert!(policy.last_state(&id).is_none());

        let state = SecurityState {
            measurement_state: StateCode::UNSUPPORTED,
            authentication_state: StateCode::SUCCESS,
        };
        policy.notify_device_state(&id, &state).unwrap();
        assert_eq!(policy.last_state(&id), Some(&state));
    }
}
