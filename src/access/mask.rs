//! Allow/deny mask matching
//!
//! Replaces the legacy C authorization masks with a tagged enum. A mask
//! matches a peer by network interface, by host or domain name, or by
//! IP network, and an ordered mask list is evaluated first-match-wins.

use crate::netif::{InterfaceRegistry, NetIf};

/// One entry in a location's allow or deny list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMask {
    /// A local network interface; the name `"*"` means any local interface.
    Interface { name: String },
    /// A host name, or a domain suffix when the name starts with `.`.
    Named { name: String },
    /// An IP network. Four 32-bit words in big-endian word order; IPv4 sits
    /// in word 3 with words 0..3 zero.
    Ip {
        address: [u32; 4],
        netmask: [u32; 4],
    },
}

impl AuthMask {
    /// Build a mask from a host-form rule string.
    ///
    /// `@LOCAL` becomes the wildcard interface mask, `@IF(name)` the named
    /// interface mask (trailing `)` stripped), anything else a name mask.
    pub fn from_host(name: &str) -> Self {
        if name.eq_ignore_ascii_case("@LOCAL") {
            AuthMask::Interface {
                name: "*".to_string(),
            }
        } else if name.len() >= 4 && name.as_bytes()[..4].eq_ignore_ascii_case(b"@IF(") {
            let ifname = name[4..].strip_suffix(')').unwrap_or(&name[4..]);
            AuthMask::Interface {
                name: ifname.to_string(),
            }
        } else {
            AuthMask::Named {
                name: name.to_string(),
            }
        }
    }

    /// Build an IPv4 network mask from an address and prefix length.
    pub fn from_ipv4(address: u32, prefix: u32) -> Self {
        let mask = if prefix == 0 {
            0
        } else if prefix >= 32 {
            0xFFFF_FFFF
        } else {
            0xFFFF_FFFF_u32 << (32 - prefix)
        };
        AuthMask::Ip {
            address: [0, 0, 0, address & mask],
            netmask: [0xFFFF_FFFF, 0xFFFF_FFFF, 0xFFFF_FFFF, mask],
        }
    }
}

/// Check an ordered mask list against a peer; true on the first match.
///
/// `ip` is the peer address as four host-order words (IPv4 embedded in word
/// 3). IP masks compare words directly; interface records hold network-order
/// addresses, so those comparisons convert the peer words with `to_be`.
pub fn check_auth(
    ip: &[u32; 4],
    host: &str,
    masks: &[AuthMask],
    interfaces: &dyn InterfaceRegistry,
) -> bool {
    for mask in masks {
        match mask {
            AuthMask::Interface { name } => {
                let netip4 = ip[3].to_be();
                let netip6 = [ip[0].to_be(), ip[1].to_be(), ip[2].to_be(), ip[3].to_be()];

                if name == "*" {
                    // Wildcard: refresh and scan every local interface.
                    interfaces.update();

                    for iface in interfaces.local() {
                        if iface_matches(&iface, netip4, &netip6) {
                            return true;
                        }
                    }
                } else if let Some(iface) = interfaces.find(name) {
                    if iface_matches(&iface, netip4, &netip6) {
                        return true;
                    }
                }
            }

            AuthMask::Named { name } => {
                if host.eq_ignore_ascii_case(name) {
                    return true;
                }

                // Domain suffix match for ".example.com" style names.
                if name.starts_with('.')
                    && host.len() >= name.len()
                    && host.as_bytes()[host.len() - name.len()..]
                        .eq_ignore_ascii_case(name.as_bytes())
                {
                    return true;
                }
            }

            AuthMask::Ip { address, netmask } => {
                if (0..4).all(|i| ip[i] & netmask[i] == address[i]) {
                    return true;
                }
            }
        }
    }

    false
}

fn iface_matches(iface: &NetIf, netip4: u32, netip6: &[u32; 4]) -> bool {
    if let Some((addr, mask)) = iface.ipv4 {
        if netip4 & mask == addr & mask {
            return true;
        }
    }

    if let Some((addr, mask)) = iface.ipv6 {
        if (0..4).all(|i| netip6[i] & mask[i] == addr[i] & mask[i]) {
            return true;
        }
    }

    false
}
