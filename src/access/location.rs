//! Location rule table
//!
//! A location is a policy record governing one resource path prefix: which
//! verbs it limits, which hosts and networks may reach it, what credentials
//! it demands, and which principals it accepts. The table is built during
//! configuration load, is read-only while requests are served, and is
//! rebuilt wholesale on reload.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::access::mask::{check_auth, AuthMask};
use crate::netif::InterfaceRegistry;

/// Verb bits for a location's `limit` field.
pub mod limit {
    pub const DELETE: u16 = 1;
    pub const GET: u16 = 2;
    pub const HEAD: u16 = 4;
    pub const OPTIONS: u16 = 8;
    pub const POST: u16 = 16;
    pub const PUT: u16 = 32;
    pub const TRACE: u16 = 64;
    pub const ALL: u16 = 127;
    pub const IPP: u16 = 128;
}

/// HTTP request state, as tracked by the connection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpState {
    #[default]
    Waiting,
    Options,
    Get,
    GetSend,
    Head,
    Post,
    PostRecv,
    PostSend,
    Put,
    PutRecv,
    Delete,
    Trace,
    Close,
    Status,
}

impl HttpState {
    /// The verb bit this state gates on.
    pub fn limit_bit(self) -> u16 {
        match self {
            HttpState::Options => limit::OPTIONS,
            HttpState::Get | HttpState::GetSend => limit::GET,
            HttpState::Head => limit::HEAD,
            HttpState::Post | HttpState::PostRecv | HttpState::PostSend => limit::POST,
            HttpState::Put | HttpState::PutRecv => limit::PUT,
            HttpState::Delete => limit::DELETE,
            HttpState::Trace => limit::TRACE,
            HttpState::Waiting | HttpState::Close | HttpState::Status => limit::ALL,
        }
    }

    /// The method string used when finalizing Digest responses.
    pub fn verb_str(self) -> &'static str {
        match self {
            HttpState::Waiting => "WAITING",
            HttpState::Options => "OPTIONS",
            HttpState::Get | HttpState::GetSend => "GET",
            HttpState::Head => "HEAD",
            HttpState::Post | HttpState::PostRecv | HttpState::PostSend => "POST",
            HttpState::Put | HttpState::PutRecv => "PUT",
            HttpState::Delete => "DELETE",
            HttpState::Trace => "TRACE",
            HttpState::Close => "CLOSE",
            HttpState::Status => "STATUS",
        }
    }
}

/// Allow/deny evaluation order, Apache semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// `Order Deny,Allow`: allow by default; deny rules apply first, then
    /// allow rules override.
    #[default]
    DenyAllow,
    /// `Order Allow,Deny`: deny by default; allow rules apply first, then
    /// deny rules override.
    AllowDeny,
}

/// Credential scheme demanded by a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    None,
    Basic,
    Digest,
    BasicDigest,
}

/// Access level demanded by a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthLevel {
    #[default]
    Anonymous,
    User,
    Group,
}

/// How the host filter and the credential check combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Satisfy {
    /// Both must pass.
    #[default]
    All,
    /// Either may pass.
    Any,
}

/// TLS requirement for a location. Ordered so that `>= Required` covers
/// both `Required` and `Always`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Encryption {
    #[default]
    IfRequested,
    Never,
    Required,
    Always,
}

/// Errors from table mutation during configuration load.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Invalid location path {0:?}: must be non-empty and begin with '/'")]
    InvalidPath(String),

    #[error("Duplicate location path {0:?}")]
    DuplicatePath(String),
}

/// A policy record governing one path prefix.
///
/// Owned value type: cloning yields an independent deep copy, so rule lists
/// copied during configuration load can never alias the original.
#[derive(Debug, Clone)]
pub struct Location {
    /// Absolute path prefix, non-empty, beginning with `/`.
    pub path: String,
    /// Verb bitmask, see [`limit`].
    pub limit: u16,
    pub order: Order,
    pub auth_type: AuthType,
    pub level: AuthLevel,
    pub satisfy: Satisfy,
    pub encryption: Encryption,
    /// IPP operation id, recorded for logging when `limit` carries
    /// [`limit::IPP`].
    pub op: Option<u16>,
    /// Required principals: usernames, `@group`, `@OWNER`, `@SYSTEM`.
    pub names: Vec<String>,
    pub allow: Vec<AuthMask>,
    pub deny: Vec<AuthMask>,
}

impl Location {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            limit: limit::ALL,
            order: Order::default(),
            auth_type: AuthType::default(),
            level: AuthLevel::default(),
            satisfy: Satisfy::default(),
            encryption: Encryption::default(),
            op: None,
            names: Vec::new(),
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }

    /// Add a required principal.
    pub fn add_name(&mut self, name: &str) {
        tracing::debug!("[auth] add_name location={} name={:?}", self.path, name);
        self.names.push(name.to_string());
    }

    /// Add a host-form allow rule (`@LOCAL`, `@IF(name)`, or a name).
    pub fn allow_host(&mut self, name: &str) {
        tracing::debug!("[auth] allow_host location={} name={:?}", self.path, name);
        self.allow.push(AuthMask::from_host(name));
    }

    /// Add an IP-network allow rule.
    pub fn allow_ip(&mut self, address: [u32; 4], netmask: [u32; 4]) {
        tracing::debug!(
            "[auth] allow_ip location={} address={:x?} netmask={:x?}",
            self.path,
            address,
            netmask
        );
        self.allow.push(AuthMask::Ip { address, netmask });
    }

    /// Add a host-form deny rule.
    pub fn deny_host(&mut self, name: &str) {
        tracing::debug!("[auth] deny_host location={} name={:?}", self.path, name);
        self.deny.push(AuthMask::from_host(name));
    }

    /// Add an IP-network deny rule.
    pub fn deny_ip(&mut self, address: [u32; 4], netmask: [u32; 4]) {
        tracing::debug!(
            "[auth] deny_ip location={} address={:x?} netmask={:x?}",
            self.path,
            address,
            netmask
        );
        self.deny.push(AuthMask::Ip { address, netmask });
    }

    /// Evaluate the allow/deny lists for a peer under this location's order
    /// mode. Returns true when the peer is host-admitted.
    ///
    /// The `localhost` hostname override lives in the authorizer, not here.
    pub fn check_access(
        &self,
        ip: &[u32; 4],
        host: &str,
        interfaces: &dyn InterfaceRegistry,
    ) -> bool {
        match self.order {
            Order::DenyAllow => {
                let mut allowed = true;
                if check_auth(ip, host, &self.deny, interfaces) {
                    allowed = false;
                }
                if check_auth(ip, host, &self.allow, interfaces) {
                    allowed = true;
                }
                allowed
            }
            Order::AllowDeny => {
                let mut allowed = false;
                if check_auth(ip, host, &self.allow, interfaces) {
                    allowed = true;
                }
                if check_auth(ip, host, &self.deny, interfaces) {
                    allowed = false;
                }
                allowed
            }
        }
    }
}

/// The daemon's location rule table, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct LocationTable {
    locations: Vec<Location>,
}

impl LocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fresh location for `path`.
    ///
    /// Paths must be absolute and unique; a duplicate (case-insensitive,
    /// matching [`LocationTable::find`]) is rejected so that the longest
    /// prefix selection stays deterministic.
    pub fn add(&mut self, path: &str) -> Result<&mut Location, LocationError> {
        if path.is_empty() || !path.starts_with('/') {
            return Err(LocationError::InvalidPath(path.to_string()));
        }
        if self.find(path).is_some() {
            return Err(LocationError::DuplicatePath(path.to_string()));
        }

        tracing::debug!("[auth] added location {:?}", path);
        self.locations.push(Location::new(path));
        Ok(self.locations.last_mut().unwrap())
    }

    /// Find a location by exact path, case-insensitive.
    pub fn find(&self, path: &str) -> Option<&Location> {
        self.locations
            .iter()
            .find(|loc| loc.path.eq_ignore_ascii_case(path))
    }

    /// Find the location that best governs a request.
    ///
    /// Longest matching path prefix wins, gated on the request verb. Under
    /// `/printers/` and `/classes/` a trailing `.ppd` is stripped first and
    /// the prefix comparison is case-insensitive (queue names are
    /// case-insensitive identifiers); elsewhere it is case-sensitive. Ties
    /// cannot arise between distinct paths; the scan uses strictly-greater
    /// length over insertion order, so the first-inserted entry would win.
    pub fn find_best(&self, path: &str, state: HttpState) -> Option<&Location> {
        let mut uri = path;

        let queue = is_queue_uri(uri);
        if queue && uri.ends_with(".ppd") {
            uri = &uri[..uri.len() - 4];
        }

        let verb = state.limit_bit();
        let mut best: Option<&Location> = None;
        let mut best_len = 0;

        for loc in &self.locations {
            if loc.path.len() <= best_len
                || !loc.path.starts_with('/')
                || verb & loc.limit == 0
            {
                continue;
            }

            let matched = if queue {
                uri.len() >= loc.path.len()
                    && uri.as_bytes()[..loc.path.len()].eq_ignore_ascii_case(loc.path.as_bytes())
            } else {
                uri.as_bytes().starts_with(loc.path.as_bytes())
            };

            if matched {
                best = Some(loc);
                best_len = loc.path.len();
            }
        }

        tracing::debug!(
            "[auth] find_best uri={:?} best={:?}",
            uri,
            best.map(|b| b.path.as_str())
        );

        best
    }

    /// Drop every location. Reload builds a fresh table and swaps it in.
    pub fn clear(&mut self) {
        self.locations.clear();
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.iter()
    }
}

fn is_queue_uri(uri: &str) -> bool {
    starts_with_ci(uri, "/printers/") || starts_with_ci(uri, "/classes/")
}

fn starts_with_ci(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netif::StaticInterfaces;

    fn v4_words(a: u8, b: u8, c: u8, d: u8) -> [u32; 4] {
        [0, 0, 0, u32::from_be_bytes([a, b, c, d])]
    }

    #[test]
    fn test_add_rejects_invalid_paths() {
        let mut table = LocationTable::new();
        assert!(matches!(table.add(""), Err(LocationError::InvalidPath(_))));
        assert!(matches!(
            table.add("printers"),
            Err(LocationError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut table = LocationTable::new();
        table.add("/admin").unwrap();
        assert!(matches!(
            table.add("/admin"),
            Err(LocationError::DuplicatePath(_))
        ));
        // Duplicate detection matches find(), which is case-insensitive.
        assert!(matches!(
            table.add("/ADMIN"),
            Err(LocationError::DuplicatePath(_))
        ));
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let mut table = LocationTable::new();
        table.add("/printers").unwrap();
        assert!(table.find("/PRINTERS").is_some());
        assert!(table.find("/classes").is_none());
    }

    #[test]
    fn test_find_best_longest_prefix_wins() {
        let mut table = LocationTable::new();
        table.add("/").unwrap();
        table.add("/admin/").unwrap();

        let best = table.find_best("/admin/log", HttpState::Get).unwrap();
        assert_eq!(best.path, "/admin/");
    }

    #[test]
    fn test_find_best_verb_gates_longer_prefix() {
        let mut table = LocationTable::new();
        table.add("/").unwrap();
        table.add("/admin/").unwrap().limit = limit::POST;

        // The longer prefix does not cover GET, so the shorter one governs.
        let best = table.find_best("/admin/log", HttpState::Get).unwrap();
        assert_eq!(best.path, "/");

        let best = table.find_best("/admin/log", HttpState::Post).unwrap();
        assert_eq!(best.path, "/admin/");
    }

    #[test]
    fn test_find_best_strips_ppd_under_queue_prefixes() {
        let mut table = LocationTable::new();
        table.add("/printers/foo").unwrap();

        let best = table.find_best("/printers/foo.ppd", HttpState::Get).unwrap();
        assert_eq!(best.path, "/printers/foo");
    }

    #[test]
    fn test_find_best_keeps_ppd_elsewhere() {
        let mut table = LocationTable::new();
        table.add("/admin/foo").unwrap();

        // "/admin/foo.ppd" is matched verbatim; the prefix "/admin/foo"
        // still matches, but a location for exactly "/admin/foo.ppd" would
        // be preferred.
        table.add("/admin/foo.ppd").unwrap();
        let best = table.find_best("/admin/foo.ppd", HttpState::Get).unwrap();
        assert_eq!(best.path, "/admin/foo.ppd");
    }

    #[test]
    fn test_find_best_case_policy() {
        let mut table = LocationTable::new();
        table.add("/printers/").unwrap();
        table.add("/admin/").unwrap();

        // Queue URIs compare case-insensitively.
        assert!(table.find_best("/PRINTERS/Foo", HttpState::Get).is_some());
        // Other URIs do not.
        assert!(table.find_best("/Admin/x", HttpState::Get).is_none());
    }

    #[test]
    fn test_find_best_strip_then_case_insensitive() {
        let mut table = LocationTable::new();
        table.add("/printers/foo").unwrap();

        let best = table
            .find_best("/printers/FOO.ppd", HttpState::Get)
            .unwrap();
        assert_eq!(best.path, "/printers/foo");
    }

    #[test]
    fn test_find_best_none_when_nothing_matches() {
        let mut table = LocationTable::new();
        table.add("/admin/").unwrap();
        assert!(table.find_best("/jobs/", HttpState::Get).is_none());
    }

    #[test]
    fn test_order_deny_allow_allow_overrides() {
        // Allow 10.0.0.0/8, deny 10.1.0.0/16. Under Order Deny,Allow the
        // allow pass runs last, so 10.1.2.3 is admitted.
        let mut loc = Location::new("/");
        loc.order = Order::DenyAllow;
        loc.allow_ip(
            [0, 0, 0, u32::from_be_bytes([10, 0, 0, 0])],
            [!0, !0, !0, 0xFF00_0000],
        );
        loc.deny_ip(
            [0, 0, 0, u32::from_be_bytes([10, 1, 0, 0])],
            [!0, !0, !0, 0xFFFF_0000],
        );

        let reg = StaticInterfaces::default();
        assert!(loc.check_access(&v4_words(10, 1, 2, 3), "host", &reg));
    }

    #[test]
    fn test_order_allow_deny_deny_overrides() {
        let mut loc = Location::new("/");
        loc.order = Order::AllowDeny;
        loc.allow_ip(
            [0, 0, 0, u32::from_be_bytes([10, 0, 0, 0])],
            [!0, !0, !0, 0xFF00_0000],
        );
        loc.deny_ip(
            [0, 0, 0, u32::from_be_bytes([10, 1, 0, 0])],
            [!0, !0, !0, 0xFFFF_0000],
        );

        let reg = StaticInterfaces::default();
        assert!(!loc.check_access(&v4_words(10, 1, 2, 3), "host", &reg));
        // Outside the deny net the allow still admits.
        assert!(loc.check_access(&v4_words(10, 2, 0, 1), "host", &reg));
    }

    #[test]
    fn test_default_order_allows_unlisted_peers() {
        let loc = Location::new("/");
        let reg = StaticInterfaces::default();
        assert!(loc.check_access(&v4_words(203, 0, 113, 9), "host", &reg));
    }

    #[test]
    fn test_clone_is_deep() {
        let mut original = Location::new("/admin/");
        original.add_name("@SYSTEM");
        original.allow_host("@LOCAL");
        original.deny_host(".example.com");

        let copy = original.clone();
        drop(original);

        // The copy owns everything the original did.
        assert_eq!(copy.names, vec!["@SYSTEM".to_string()]);
        assert_eq!(copy.allow.len(), 1);
        assert_eq!(copy.deny.len(), 1);

        let mut fresh = Location::new("/admin/");
        fresh.add_name("@SYSTEM");
        fresh.allow_host("@LOCAL");
        fresh.deny_host(".example.com");
        assert_eq!(copy.names, fresh.names);
        assert_eq!(copy.allow, fresh.allow);
        assert_eq!(copy.deny, fresh.deny);
    }

    #[test]
    fn test_clear_empties_table() {
        let mut table = LocationTable::new();
        table.add("/").unwrap();
        table.add("/admin/").unwrap();
        assert_eq!(table.len(), 2);
        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn test_http_state_limits() {
        assert_eq!(HttpState::Get.limit_bit(), limit::GET);
        assert_eq!(HttpState::PostRecv.limit_bit(), limit::POST);
        assert_eq!(HttpState::Waiting.limit_bit(), limit::ALL);
        assert_eq!(HttpState::GetSend.verb_str(), "GET");
    }
}
