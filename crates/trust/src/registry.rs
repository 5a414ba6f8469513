//! Per-device trust contexts, created on first use and kept for the life of
//! the process.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use devsec_core::DeviceIdentifier;
use devsec_eventlog::{DeviceDescriptor, DeviceIo};
use tracing::{debug, info, warn};

use crate::error::TrustResult;
use crate::spdm::SpdmSession;

/// Sticky outcome of the two trust flows for one device.
///
/// Flags only move from `false` to `true`; [`DeviceRegistry::invalidate`]
/// is the single reset path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustRecord {
    authenticated: bool,
    measured: bool,
}

impl TrustRecord {
    pub fn authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn measured(&self) -> bool {
        self.measured
    }

    pub(crate) fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }

    pub(crate) fn mark_measured(&mut self) {
        self.measured = true;
    }
}

/// Everything a connector hands over for a newly reached device.
pub struct DeviceBinding {
    /// Established SPDM session
    pub session: Box<dyn SpdmSession>,
    /// Register access for the device-class context block
    pub io: Option<Box<dyn DeviceIo>>,
    /// Encoded platform device path
    pub device_path: Vec<u8>,
    /// Device is embedded in the platform (selects PCR 0/1 over 2/3)
    pub is_embedded: bool,
}

impl DeviceBinding {
    pub fn new(session: Box<dyn SpdmSession>, device_path: Vec<u8>) -> Self {
        Self {
            session,
            io: None,
            device_path,
            is_embedded: false,
        }
    }

    pub fn with_io(mut self, io: Box<dyn DeviceIo>) -> Self {
        self.io = Some(io);
        self
    }

    pub fn embedded(mut self, is_embedded: bool) -> Self {
        self.is_embedded = is_embedded;
        self
    }
}

impl fmt::Debug for DeviceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBinding")
            .field("device_path", &hex::encode(&self.device_path))
            .field("io", &self.io.is_some())
            .field("is_embedded", &self.is_embedded)
            .finish()
    }
}

/// Trust state and collaborators for one physical device.
pub struct DeviceContext {
    id: DeviceIdentifier,
    uid: u64,
    device_path: Vec<u8>,
    is_embedded: bool,
    io: Option<Box<dyn DeviceIo>>,
    session: Box<dyn SpdmSession>,
    trust: TrustRecord,
}

impl DeviceContext {
    fn new(id: DeviceIdentifier, uid: u64, binding: DeviceBinding) -> Self {
        Self {
            id,
            uid,
            device_path: binding.device_path,
            is_embedded: binding.is_embedded,
            io: binding.io,
            session: binding.session,
            trust: TrustRecord::default(),
        }
    }

    pub fn id(&self) -> &DeviceIdentifier {
        &self.id
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn device_path(&self) -> &[u8] {
        &self.device_path
    }

    pub fn is_embedded(&self) -> bool {
        self.is_embedded
    }

    pub fn trust(&self) -> &TrustRecord {
        &self.trust
    }

    pub(crate) fn trust_mut(&mut self) -> &mut TrustRecord {
        &mut self.trust
    }

    pub fn session(&self) -> &dyn SpdmSession {
        self.session.as_ref()
    }

    /// Session plus the record descriptor, borrowed together.
    pub fn split(&mut self) -> (&mut dyn SpdmSession, DeviceDescriptor<'_>) {
        let descriptor = DeviceDescriptor {
            class: self.id.class,
            device_path: &self.device_path,
            uid: self.uid,
            spdm_version: self.session.spdm_version(),
            io: self.io.as_deref(),
        };
        (self.session.as_mut(), descriptor)
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("id", &self.id)
            .field("uid", &self.uid)
            .field("device_path", &hex::encode(&self.device_path))
            .field("is_embedded", &self.is_embedded)
            .field("trust", &self.trust)
            .finish()
    }
}

/// Registry of device contexts keyed by identifier.
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceIdentifier, DeviceContext>,
    next_uid: u64,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
            next_uid: 1,
        }
    }

    /// Return the context for `id`, creating it through `factory` on first use.
    ///
    /// A failing factory leaves the registry untouched.
    pub fn find_or_create<F>(
        &mut self,
        id: DeviceIdentifier,
        factory: F,
    ) -> TrustResult<&mut DeviceContext>
    where
        F: FnOnce(&DeviceIdentifier) -> TrustResult<DeviceBinding>,
    {
        match self.devices.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let binding = factory(&id).map_err(|e| {
                    warn!(device = %id, error = %e, "DeviceRegistry :: context creation failed");
                    e
                })?;
                let uid = self.next_uid;
                self.next_uid += 1;
                info!("STATUS: DeviceRegistry :: {} registered as uid {}", id, uid);
                Ok(entry.insert(DeviceContext::new(id, uid, binding)))
            }
        }
    }

    pub fn get(&self, id: &DeviceIdentifier) -> Option<&DeviceContext> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: &DeviceIdentifier) -> bool {
        self.devices.contains_key(id)
    }

    pub fn is_authenticated(&self, id: &DeviceIdentifier) -> bool {
        self.get(id).map_or(false, |ctx| ctx.trust.authenticated)
    }

    pub fn is_measured(&self, id: &DeviceIdentifier) -> bool {
        self.get(id).map_or(false, |ctx| ctx.trust.measured)
    }

    /// Clear the trust record of `id` so the next orchestration re-runs both flows.
    pub fn invalidate(&mut self, id: &DeviceIdentifier) -> bool {
        match self.devices.get_mut(id) {
            Some(ctx) => {
                ctx.trust = TrustRecord::default();
                info!("STATUS: DeviceRegistry :: {} trust record invalidated", id);
                true
            }
            None => {
                debug!(device = %id, "DeviceRegistry :: invalidate on unknown device");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceContext> {
        self.devices.values()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrustError;
    use crate::spdm::*;
    use devsec_core::Nonce;

    /// Session that refuses every request.
    struct IdleSession;

    impl SpdmSession for IdleSession {
        fn capability_flags(&self) -> u32 {
            0
        }
        fn spdm_version(&self) -> u16 {
            0x12
        }
        fn base_hash_algo(&self) -> u32 {
            1
        }
        fn measurement_hash_algo(&self) -> u32 {
            1
        }
        fn get_digest(&mut self) -> Result<DigestResponse, SpdmStatus> {
            Err(SpdmStatus::Unsupported)
        }
        fn get_certificate(&mut self, _slot_id: u8) -> Result<CertificateResponse, SpdmStatus> {
            Err(SpdmStatus::Unsupported)
        }
        fn challenge(
            &mut self,
            _slot_id: u8,
            _summary_hash_type: u8,
            _requester_nonce: Nonce,
        ) -> Result<ChallengeResponse, SpdmStatus> {
            Err(SpdmStatus::Unsupported)
        }
        fn get_measurement(
            &mut self,
            _request: &MeasurementRequest,
        ) -> Result<MeasurementResponse, SpdmStatus> {
            Err(SpdmStatus::Unsupported)
        }
        fn last_error(&self) -> SpdmStatus {
            SpdmStatus::Unsupported
        }
    }

    fn create_test_binding() -> DeviceBinding {
        DeviceBinding::new(Box::new(IdleSession), vec![0x01, 0x01, 0x06, 0x00])
    }

    #[test]
    fn test_uids_are_sequential() {
        let mut registry = DeviceRegistry::new();
        let a = registry
            .find_or_create(DeviceIdentifier::pci(0x10), |_| Ok(create_test_binding()))
            .unwrap()
            .uid();
        let b = registry
            .find_or_create(DeviceIdentifier::usb(0x10), |_| Ok(create_test_binding()))
            .unwrap()
            .uid();
        assert_eq!((a, b), (1, 2));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_existing_context_skips_factory() {
        let mut registry = DeviceRegistry::new();
        let id = DeviceIdentifier::pci(1);
        registry.find_or_create(id, |_| Ok(create_test_binding())).unwrap();

        let ctx = registry
            .find_or_create(id, |_| panic!("factory must not run twice"))
            .unwrap();
        assert_eq!(ctx.uid(), 1);
    }

    #[test]
    fn test_failed_factory_registers_nothing() {
        let mut registry = DeviceRegistry::new();
        let id = DeviceIdentifier::pci(7);
        let err = registry
            .find_or_create(id, |_| Err(TrustError::ConnectionFailed("no VCA".into())))
            .unwrap_err();
        assert!(matches!(err, TrustError::ConnectionFailed(_)));
        assert!(registry.is_empty());
        assert!(!registry.contains(&id));

        // next attempt still allocates the first uid
        let ctx = registry.find_or_create(id, |_| Ok(create_test_binding())).unwrap();
        assert_eq!(ctx.uid(), 1);
    }

    #[test]
    fn test_invalidate_resets_flags() {
        let mut registry = DeviceRegistry::new();
        let id = DeviceIdentifier::usb(3);
        {
            let ctx = registry.find_or_create(id, |_| Ok(create_test_binding())).unwrap();
            ctx.trust_mut().mark_authenticated();
            ctx.trust_mut().mark_measured();
        }
        assert!(registry.is_authenticated(&id));
        assert!(registry.is_measured(&id));

        assert!(registry.invalidate(&id));
        assert!(!registry.is_authenticated(&id));
        assert!(!registry.is_measured(&id));
        assert!(!registry.invalidate(&DeviceIdentifier::usb(4)));
    }

    #[test]
    fn test_split_descriptor() {
        let mut registry = DeviceRegistry::new();
        let id = DeviceIdentifier::pci(0x1f);
        let ctx = registry
            .find_or_create(id, |_| Ok(create_test_binding().embedded(true)))
            .unwrap();
        assert!(ctx.is_embedded());

        let (session, descriptor) = ctx.split();
        assert_eq!(session.spdm_version(), 0x12);
        assert_eq!(descriptor.uid, 1);
        assert_eq!(descriptor.device_path, &[0x01, 0x01, 0x06, 0x00]);
        assert!(descriptor.io.is_none());
    }
}
