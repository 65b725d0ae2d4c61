//! Quill - Print Server
//!
//! A Rust reimplementation of a legacy C print-server daemon.
//! Migrating incrementally from C to Rust for memory safety.
//!
//! This crate holds the access-control core: the location rule table, the
//! host/address admission filter, and the authentication resolver the
//! request loop consults before serving any resource.

/// Path-based access control (masks, locations, rule table)
pub mod access;
/// OS account database access (users, groups)
pub mod accounts;
/// Top-level request authorization
pub mod authorize;
/// Access-control configuration
pub mod config;
/// Digest password file and MD5 helpers
pub mod digest;
/// Network interface registry
pub mod netif;
/// OS password verification backends
pub mod osauth;
