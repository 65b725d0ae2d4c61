//! Request authorization
//!
//! The top-level decision function for inbound HTTP/IPP requests. Given the
//! location selected for the request path and verb, the authorizer runs the
//! host filter, the encryption requirement, credential verification, and the
//! principal check, in that order, and collapses every outcome into one of
//! four HTTP statuses. The evaluation order is load-bearing: a misordered
//! check grants unauthenticated access.

use std::net::IpAddr;

use crate::access::{
    limit, AuthLevel, AuthType, Encryption, HttpState, Location, LocationTable, Satisfy,
};
use crate::accounts::{AccountDb, UserRecord};
use crate::config::AuthConfig;
use crate::digest::{self, DigestFile, BASIC_REALM};
use crate::netif::InterfaceRegistry;
use crate::osauth::OsAuth;

/// Authorization verdict, as an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Ok,
    Unauthorized,
    Forbidden,
    UpgradeRequired,
}

impl AuthStatus {
    /// The HTTP status code for this verdict.
    pub fn code(self) -> u16 {
        match self {
            AuthStatus::Ok => 200,
            AuthStatus::Unauthorized => 401,
            AuthStatus::Forbidden => 403,
            AuthStatus::UpgradeRequired => 426,
        }
    }
}

/// Everything the transport layer learned about a request that the
/// authorizer needs. Header parsing happens upstream; fields arrive here
/// already split out.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Resource path of the request.
    pub uri: String,
    /// HTTP request state (carries the verb).
    pub state: HttpState,
    /// Peer address, when the transport knows one.
    pub address: Option<IpAddr>,
    /// Resolved peer host name.
    pub hostname: String,
    /// Username from the Authorization header, empty when absent.
    pub username: String,
    /// Password or digest response from the Authorization header.
    pub password: String,
    /// Raw Authorization header value (scheme prefix included).
    pub authorization: String,
    /// Digest nonce subfield, when present.
    pub nonce: Option<String>,
    /// True when the connection is TLS.
    pub tls: bool,
    /// IPP `requesting-user-name` attribute, when the payload carries one.
    pub ipp_user: Option<String>,
}

/// The authorization engine.
///
/// Owns the configuration and the three collaborators the checks consult:
/// the OS account database, the password backend, and the interface
/// registry. One instance lives for the process lifetime; the location
/// table is passed in per call because reload swaps it.
pub struct Authorizer<A, P, I>
where
    A: AccountDb,
    P: OsAuth,
    I: InterfaceRegistry,
{
    config: AuthConfig,
    accounts: A,
    passwords: P,
    interfaces: I,
    digest: DigestFile,
}

impl<A, P, I> Authorizer<A, P, I>
where
    A: AccountDb,
    P: OsAuth,
    I: InterfaceRegistry,
{
    pub fn new(config: AuthConfig, accounts: A, passwords: P, interfaces: I) -> Self {
        let digest = DigestFile::new(&config.server_root);
        Self {
            config,
            accounts,
            passwords,
            interfaces,
            digest,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn accounts(&self) -> &A {
        &self.accounts
    }

    pub fn passwords(&self) -> &P {
        &self.passwords
    }

    /// Select the governing location and authorize in one step.
    pub fn authorize(
        &self,
        table: &LocationTable,
        req: &RequestContext,
        owner: Option<&str>,
    ) -> AuthStatus {
        let best = table.find_best(&req.uri, req.state);
        self.is_authorized(best, req, owner)
    }

    /// Decide whether the request may proceed under `best`.
    ///
    /// The step order here is normative and observable through the returned
    /// status; every check short-circuits at the first decision.
    pub fn is_authorized(
        &self,
        best: Option<&Location>,
        req: &RequestContext,
        owner: Option<&str>,
    ) -> AuthStatus {
        // Without a governing location, access is allowed from the local
        // system only.
        let Some(best) = best else {
            return if req.hostname == "localhost" || req.hostname == self.config.server_name {
                AuthStatus::Ok
            } else {
                AuthStatus::Forbidden
            };
        };

        tracing::debug!(
            "[auth] is_authorized uri={:?} location={} level={:?} type={:?} satisfy={:?} num_names={}",
            req.uri,
            best.path,
            best.level,
            best.auth_type,
            best.satisfy,
            best.names.len()
        );
        if best.limit & limit::IPP != 0 {
            if let Some(op) = best.op {
                tracing::debug!("[auth] is_authorized op={:#x}", op);
            }
        }

        let address = normalize_address(req.address);

        // Host/address admission. localhost always passes.
        let host_allowed = if req.hostname.eq_ignore_ascii_case("localhost") {
            true
        } else {
            best.check_access(&address, &req.hostname, &self.interfaces)
        };

        tracing::debug!(
            "[auth] is_authorized host_verdict={}",
            if host_allowed { "allow" } else { "deny" }
        );

        if !host_allowed && best.satisfy == Satisfy::All {
            return AuthStatus::Forbidden;
        }

        if best.encryption >= Encryption::Required && !req.tls {
            tracing::debug!("[auth] is_authorized needs upgrade to TLS");
            return AuthStatus::UpgradeRequired;
        }

        // Anonymous access, or no credential policy at all.
        if best.level == AuthLevel::Anonymous
            || (best.auth_type == AuthType::None && best.names.is_empty())
        {
            return AuthStatus::Ok;
        }

        // IPP requests may carry an unauthenticated identity; accept it when
        // the policy demanded no scheme.
        if best.auth_type == AuthType::None && best.limit & limit::IPP != 0 {
            if let Some(user) = &req.ipp_user {
                tracing::debug!("[auth] is_authorized requesting-user-name={:?}", user);
                return AuthStatus::Ok;
            }
        }

        if req.username.is_empty() {
            return if best.satisfy == Satisfy::All || !host_allowed {
                AuthStatus::Unauthorized
            } else {
                AuthStatus::Ok
            };
        }

        tracing::debug!(
            "[auth] is_authorized checking {:?} address={:x?} hostname={:?}",
            req.username,
            address,
            req.hostname
        );

        // A local client that already holds a certificate skips the password
        // check but still runs the principal check below.
        let local_cert = req.hostname.eq_ignore_ascii_case("localhost")
            && req.authorization.starts_with("Local");

        let mut pw: Option<UserRecord> = None;

        if !local_cert {
            if req.password.is_empty() {
                return AuthStatus::Unauthorized;
            }

            let scheme = if best.auth_type != AuthType::None {
                best.auth_type
            } else {
                self.config.default_auth_type
            };

            match scheme {
                AuthType::None | AuthType::Basic => {
                    pw = self.accounts.user_by_name(&req.username);

                    if !self.passwords.authenticate(&req.username, &req.password) {
                        tracing::warn!(
                            "[auth] password verification failed for {:?}",
                            req.username
                        );
                        return AuthStatus::Unauthorized;
                    }
                }

                AuthType::Digest => {
                    let Some(nonce) = req.nonce.as_deref() else {
                        tracing::error!("[auth] no nonce value for Digest authentication");
                        return AuthStatus::Unauthorized;
                    };

                    // The nonce is bound to the peer hostname.
                    if nonce != req.hostname {
                        tracing::error!(
                            "[auth] nonce mismatch: expected {:?}, got {:?}",
                            req.hostname,
                            nonce
                        );
                        return AuthStatus::Unauthorized;
                    }

                    let Some(stored) = self.stored_md5(best, &req.username) else {
                        tracing::debug!(
                            "[auth] no matching user:group for {:?} in digest file",
                            req.username
                        );
                        return AuthStatus::Unauthorized;
                    };

                    let expected =
                        digest::md5_final(&stored, req.state.verb_str(), &req.uri, nonce);
                    if expected != req.password {
                        tracing::debug!("[auth] digest response mismatch for {:?}", req.username);
                        return AuthStatus::Unauthorized;
                    }
                }

                AuthType::BasicDigest => {
                    let Some(stored) = self.stored_md5(best, &req.username) else {
                        tracing::debug!(
                            "[auth] no matching user:group for {:?} in digest file",
                            req.username
                        );
                        return AuthStatus::Unauthorized;
                    };

                    let supplied =
                        digest::md5_basic(&req.username, BASIC_REALM, &req.password);
                    if stored != supplied {
                        tracing::debug!("[auth] digest mismatch for {:?}", req.username);
                        return AuthStatus::Unauthorized;
                    }
                }
            }
        } else {
            pw = self.accounts.user_by_name(&req.username);
        }

        // The password is good. root always passes the principal check.
        if req.username == "root" {
            return AuthStatus::Ok;
        }

        if best.level == AuthLevel::User {
            // No principals means any authenticated user.
            if best.names.is_empty() {
                return AuthStatus::Ok;
            }

            for name in &best.names {
                if name.eq_ignore_ascii_case("@OWNER") {
                    if let Some(owner) = owner {
                        if req.username.eq_ignore_ascii_case(owner) {
                            return AuthStatus::Ok;
                        }
                    }
                } else if name.eq_ignore_ascii_case("@SYSTEM") {
                    for group in &self.config.system_groups {
                        if self.check_group(&req.username, pw.as_ref(), group) {
                            return AuthStatus::Ok;
                        }
                    }
                } else if let Some(group) = name.strip_prefix('@') {
                    if self.check_group(&req.username, pw.as_ref(), group) {
                        return AuthStatus::Ok;
                    }
                } else if req.username.eq_ignore_ascii_case(name) {
                    return AuthStatus::Ok;
                }
            }

            return AuthStatus::Unauthorized;
        }

        // Group-level policies on the Basic path treat the principal list
        // purely as group names.
        if best.auth_type == AuthType::Basic {
            for name in &best.names {
                tracing::debug!("[auth] is_authorized checking group {:?} membership", name);

                if name.eq_ignore_ascii_case("@SYSTEM") {
                    for group in &self.config.system_groups {
                        if self.check_group(&req.username, pw.as_ref(), group) {
                            return AuthStatus::Ok;
                        }
                    }
                } else if self.check_group(&req.username, pw.as_ref(), name) {
                    return AuthStatus::Ok;
                }
            }

            tracing::debug!("[auth] is_authorized user not in group(s)");
            return AuthStatus::Unauthorized;
        }

        AuthStatus::Ok
    }

    /// Is `username` a member of `groupname`?
    ///
    /// Three sources, in order: the OS group member list, the user's primary
    /// gid, and a `(user, group)` entry in the digest file. The last one
    /// deliberately lets the digest file grant membership to accounts the OS
    /// does not know.
    pub fn check_group(
        &self,
        username: &str,
        user: Option<&UserRecord>,
        groupname: &str,
    ) -> bool {
        if username.is_empty() || groupname.is_empty() {
            return false;
        }

        let group = self.accounts.group_by_name(groupname);

        if let Some(group) = &group {
            if group
                .members
                .iter()
                .any(|m| m.eq_ignore_ascii_case(username))
            {
                return true;
            }

            if let Some(user) = user {
                if group.gid == user.gid {
                    return true;
                }
            }
        }

        self.digest.lookup(username, Some(groupname)).is_some()
    }

    /// Resolve the stored MD5 digest for a user under a location's policy.
    ///
    /// Group-level policies constrain the lookup to the named groups, with
    /// `@SYSTEM` expanding to the configured system groups; otherwise any
    /// group's entry will do. No entry means failure upstream.
    fn stored_md5(&self, best: &Location, username: &str) -> Option<String> {
        if !best.names.is_empty() && best.level == AuthLevel::Group {
            for name in &best.names {
                if name.eq_ignore_ascii_case("@SYSTEM") {
                    for group in &self.config.system_groups {
                        if let Some(md5) = self.digest.lookup(username, Some(group.as_str())) {
                            return Some(md5);
                        }
                    }
                } else if let Some(md5) = self.digest.lookup(username, Some(name.as_str())) {
                    return Some(md5);
                }
            }
            None
        } else {
            self.digest.lookup(username, None)
        }
    }
}

/// Normalize a peer address into four host-order words, IPv4 in word 3.
fn normalize_address(address: Option<IpAddr>) -> [u32; 4] {
    match address {
        Some(IpAddr::V4(v4)) => [0, 0, 0, u32::from(v4)],
        Some(IpAddr::V6(v6)) => {
            let o = v6.octets();
            let mut words = [0u32; 4];
            for (i, word) in words.iter_mut().enumerate() {
                *word = u32::from_be_bytes([o[4 * i], o[4 * i + 1], o[4 * i + 2], o[4 * i + 3]]);
            }
            words
        }
        None => [0; 4],
    }
}
