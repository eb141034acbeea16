use parking_lot::Mutex;
use std::{collections::BTreeSet, sync::Arc};

use super::port::PortId;

/// Ports excluded from every later round of a campaign.
///
/// Cheap to clone; clones share the same set. Exclusion is permanent for the
/// lifetime of the registry.
#[derive(Debug, Clone, Default)]
pub struct QuarantineRegistry {
    ports: Arc<Mutex<BTreeSet<PortId>>>,
}

impl QuarantineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the port was not excluded before.
    pub fn exclude(&self, port: &PortId) -> bool {
        let newly = self.ports.lock().insert(port.clone());
        if newly {
            log::warn!("[port = {port}] excluded from further rounds");
        }
        newly
    }

    pub fn is_excluded(&self, port: &PortId) -> bool {
        self.ports.lock().contains(port)
    }

    /// `all` minus excluded ports, order kept.
    pub fn active_ports(&self, all: &[PortId]) -> Vec<PortId> {
        let excluded = self.ports.lock();
        all.iter()
            .filter(|port| !excluded.contains(*port))
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<PortId> {
        self.ports.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion_is_monotonic_and_shared() {
        let ports = vec![
            PortId::new("PCAN_USBBUS3", 2),
            PortId::new("PCAN_USBBUS1", 2),
            PortId::new("PCAN_USBBUS2", 2),
        ];
        let registry = QuarantineRegistry::new();
        let shared = registry.clone();

        assert!(registry.exclude(&ports[1]));
        assert!(!shared.exclude(&ports[1]));
        assert!(shared.is_excluded(&ports[1]));
        assert_eq!(
            registry.active_ports(&ports),
            vec![ports[0].clone(), ports[2].clone()]
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot(), vec![ports[1].clone()]);
    }

    #[test]
    fn test_empty_registry_keeps_everything() {
        let ports = vec![PortId::new("PCAN_USBBUS1", 2), PortId::new("PCAN_USBBUS1", 3)];
        let registry = QuarantineRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.active_ports(&ports), ports);
    }
}
