//! Digest password file and MD5 credential helpers
//!
//! The daemon keeps a private password file `passwd.md5` under the server
//! root, one `user:group:md5hex` record per line, maintained by the password
//! utility. Lookups scan the file on every call; nothing is cached, so
//! password changes take effect immediately.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

/// Maximum length of the user and group fields in a record.
pub const MAX_NAME_LEN: usize = 32;

/// Realm used when hashing Basic credentials against the digest file.
pub const BASIC_REALM: &str = "CUPS";

/// Read access to the `passwd.md5` file.
#[derive(Debug, Clone)]
pub struct DigestFile {
    path: PathBuf,
}

impl DigestFile {
    /// The digest file under a server root directory.
    pub fn new<P: AsRef<Path>>(server_root: P) -> Self {
        Self {
            path: server_root.as_ref().join("passwd.md5"),
        }
    }

    /// Use an explicit file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().into(),
        }
    }

    /// Look up the stored MD5 digest for a user.
    ///
    /// The user must match exactly; the group must match exactly when given
    /// and is unconstrained when `None`. Malformed lines are logged and
    /// skipped. An unreadable file yields `None`, so a missing or broken
    /// password file denies rather than grants.
    pub fn lookup(&self, username: &str, group: Option<&str>) -> Option<String> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                tracing::error!("[auth] unable to open {}: {}", self.path.display(), e);
                return None;
            }
        };

        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!("[auth] error reading {}: {}", self.path.display(), e);
                    return None;
                }
            };

            let Some((user, grp, md5)) = parse_line(&line) else {
                if !line.is_empty() {
                    tracing::error!("[auth] bad digest password line: {}", line);
                }
                continue;
            };

            if user == username && group.map_or(true, |g| g == grp) {
                tracing::debug!("[auth] found digest entry user={} group={}", user, grp);
                return Some(md5.to_string());
            }
        }

        None
    }
}

/// Split a `user:group:md5hex` record; None when the line doesn't fit the
/// three-field pattern.
fn parse_line(line: &str) -> Option<(&str, &str, &str)> {
    let mut fields = line.splitn(3, ':');
    let user = fields.next()?;
    let group = fields.next()?;
    let md5 = fields.next()?;

    if user.is_empty() || user.len() > MAX_NAME_LEN || group.len() > MAX_NAME_LEN {
        return None;
    }
    if md5.len() != 32 || !md5.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
        return None;
    }

    Some((user, group, md5))
}

/// MD5 of `user:realm:password` as lowercase hex.
///
/// With [`BASIC_REALM`] this produces the digest stored in `passwd.md5` for
/// Basic-over-digest validation.
pub fn md5_basic(username: &str, realm: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(username.as_bytes());
    hasher.update(b":");
    hasher.update(realm.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Finalize an HTTP Digest response from a stored digest.
///
/// `MD5(ha1:nonce:MD5(method:uri))`, all lowercase hex.
pub fn md5_final(ha1: &str, method: &str, uri: &str, nonce: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(method.as_bytes());
    hasher.update(b":");
    hasher.update(uri.as_bytes());
    let ha2 = hex::encode(hasher.finalize());

    let mut hasher = Md5::new();
    hasher.update(ha1.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.as_bytes());
    hasher.update(b":");
    hasher.update(ha2.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn digest_file(contents: &str) -> (tempfile::TempDir, DigestFile) {
        let dir = tempfile::tempdir().unwrap();
        let mut f = File::create(dir.path().join("passwd.md5")).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        let df = DigestFile::new(dir.path());
        (dir, df)
    }

    #[test]
    fn test_lookup_exact_group() {
        let (_dir, df) = digest_file(
            "alice:admins:0123456789abcdef0123456789abcdef\n\
             bob:users:fedcba9876543210fedcba9876543210\n",
        );

        assert_eq!(
            df.lookup("alice", Some("admins")).as_deref(),
            Some("0123456789abcdef0123456789abcdef")
        );
        assert!(df.lookup("alice", Some("users")).is_none());
        assert!(df.lookup("carol", Some("admins")).is_none());
    }

    #[test]
    fn test_lookup_unconstrained_group() {
        let (_dir, df) = digest_file("alice:admins:0123456789abcdef0123456789abcdef\n");
        assert!(df.lookup("alice", None).is_some());
    }

    #[test]
    fn test_lookup_skips_malformed_lines() {
        let (_dir, df) = digest_file(
            "garbage\n\
             missing:fields\n\
             toolong:group:abc\n\
             alice:admins:0123456789abcdef0123456789abcdef\n",
        );
        assert!(df.lookup("alice", Some("admins")).is_some());
        assert!(df.lookup("garbage", None).is_none());
    }

    #[test]
    fn test_lookup_missing_file_denies() {
        let dir = tempfile::tempdir().unwrap();
        let df = DigestFile::new(dir.path());
        assert!(df.lookup("alice", None).is_none());
    }

    #[test]
    fn test_parse_line_rejects_uppercase_hex() {
        assert!(parse_line("a:b:0123456789ABCDEF0123456789ABCDEF").is_none());
        assert!(parse_line("a:b:0123456789abcdef0123456789abcdef").is_some());
    }

    #[test]
    fn test_md5_basic_known_value() {
        // MD5("alice:CUPS:secret")
        let mut hasher = Md5::new();
        hasher.update(b"alice:CUPS:secret");
        let expected = hex::encode(hasher.finalize());
        assert_eq!(md5_basic("alice", BASIC_REALM, "secret"), expected);
    }

    #[test]
    fn test_md5_final_structure() {
        let ha1 = "0123456789abcdef0123456789abcdef";

        let mut hasher = Md5::new();
        hasher.update(b"GET:/printers/foo");
        let ha2 = hex::encode(hasher.finalize());

        let mut hasher = Md5::new();
        hasher.update(format!("{}:printhost:{}", ha1, ha2).as_bytes());
        let expected = hex::encode(hasher.finalize());

        assert_eq!(md5_final(ha1, "GET", "/printers/foo", "printhost"), expected);
    }
}
