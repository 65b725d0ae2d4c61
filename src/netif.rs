//! Network interface registry
//!
//! The daemon's interface enumerator feeds this registry; the access-control
//! code only ever consumes it through the [`InterfaceRegistry`] trait so the
//! host filter can be exercised with synthetic interfaces.

use std::sync::atomic::{AtomicU32, Ordering};

/// One local network interface address record.
///
/// Addresses and netmasks are kept in network byte order, exactly as the
/// kernel hands them out. A record normally carries one family; both may be
/// populated for dual-homed entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetIf {
    pub name: String,
    /// False for entries learned from remote announcements.
    pub is_local: bool,
    /// IPv4 (address, netmask), network byte order.
    pub ipv4: Option<(u32, u32)>,
    /// IPv6 (address, netmask) as four 32-bit words, network byte order.
    pub ipv6: Option<([u32; 4], [u32; 4])>,
}

impl NetIf {
    /// Convenience constructor for an IPv4-only local interface.
    pub fn v4(name: &str, address: u32, netmask: u32) -> Self {
        Self {
            name: name.to_string(),
            is_local: true,
            ipv4: Some((address, netmask)),
            ipv6: None,
        }
    }
}

/// Access to the daemon's interface list.
///
/// `update` is invoked lazily whenever a wildcard interface mask is
/// evaluated; implementations refresh their snapshot there.
pub trait InterfaceRegistry {
    /// Refresh the interface list if stale.
    fn update(&self);

    /// Look up an interface by name, case-insensitive.
    fn find(&self, name: &str) -> Option<NetIf>;

    /// All currently known local interfaces.
    fn local(&self) -> Vec<NetIf>;
}

/// A fixed interface set.
///
/// Used by the test suites and by deployments with static addressing; the
/// update counter lets tests verify the lazy-refresh contract.
#[derive(Debug, Default)]
pub struct StaticInterfaces {
    interfaces: Vec<NetIf>,
    updates: AtomicU32,
}

impl StaticInterfaces {
    pub fn new(interfaces: Vec<NetIf>) -> Self {
        Self {
            interfaces,
            updates: AtomicU32::new(0),
        }
    }

    /// Number of `update` calls seen so far.
    pub fn update_count(&self) -> u32 {
        self.updates.load(Ordering::Relaxed)
    }
}

impl InterfaceRegistry for StaticInterfaces {
    fn update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    fn find(&self, name: &str) -> Option<NetIf> {
        self.interfaces
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    fn local(&self) -> Vec<NetIf> {
        self.interfaces
            .iter()
            .filter(|i| i.is_local)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_is_case_insensitive() {
        let reg = StaticInterfaces::new(vec![NetIf::v4("eth0", 0, 0)]);
        assert!(reg.find("ETH0").is_some());
        assert!(reg.find("eth1").is_none());
    }

    #[test]
    fn test_local_filters_remote_entries() {
        let mut remote = NetIf::v4("tun0", 0, 0);
        remote.is_local = false;
        let reg = StaticInterfaces::new(vec![NetIf::v4("lo", 0, 0), remote]);
        let local = reg.local();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].name, "lo");
    }

    #[test]
    fn test_update_counter() {
        let reg = StaticInterfaces::default();
        assert_eq!(reg.update_count(), 0);
        reg.update();
        reg.update();
        assert_eq!(reg.update_count(), 2);
    }
}
