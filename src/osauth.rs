//! OS password verification backends
//!
//! Basic credentials are checked against the operating system by a backend
//! chosen when the daemon starts. The trait is the whole contract: a PAM
//! adapter (service name `"cups"`, conversation answering echo-on prompts
//! with the username and echo-off prompts with the password, authenticate
//! then account management, handle always finalized) or an AIX
//! `authenticate()` adapter plug in the same way as the crypt+shadow
//! backend shipped here.

/// Password verification capability.
pub trait OsAuth {
    /// True when `password` is valid for `username`.
    fn authenticate(&self, username: &str, password: &str) -> bool;
}

/// Fixed username/password pairs, for tests and the daemon's self-test mode.
#[derive(Debug, Default)]
pub struct StaticPasswords {
    entries: Vec<(String, String)>,
}

impl StaticPasswords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, username: &str, password: &str) -> &mut Self {
        self.entries
            .push((username.to_string(), password.to_string()));
        self
    }
}

impl OsAuth for StaticPasswords {
    fn authenticate(&self, username: &str, password: &str) -> bool {
        self.entries
            .iter()
            .any(|(u, p)| u == username && p == password)
    }
}

/// Classic Unix password file authentication via `crypt(3)`, consulting the
/// shadow file where one exists.
#[cfg(target_os = "linux")]
#[derive(Debug, Default)]
pub struct CryptShadow;

#[cfg(target_os = "linux")]
impl CryptShadow {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
#[link(name = "crypt")]
extern "C" {
    fn crypt(key: *const libc::c_char, setting: *const libc::c_char) -> *mut libc::c_char;
}

#[cfg(target_os = "linux")]
impl OsAuth for CryptShadow {
    fn authenticate(&self, username: &str, password: &str) -> bool {
        use std::ffi::{CStr, CString};

        let Ok(cname) = CString::new(username) else {
            return false;
        };
        let Ok(cpass) = CString::new(password) else {
            return false;
        };

        // Fetch the passwd entry with the reentrant call.
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut pwbuf = vec![0u8; 1024];
        let mut pwres: *mut libc::passwd = std::ptr::null_mut();
        loop {
            let rc = unsafe {
                libc::getpwnam_r(
                    cname.as_ptr(),
                    &mut pwd,
                    pwbuf.as_mut_ptr().cast(),
                    pwbuf.len(),
                    &mut pwres,
                )
            };
            if rc == libc::ERANGE {
                pwbuf.resize(pwbuf.len() * 2, 0);
                continue;
            }
            if rc != 0 || pwres.is_null() {
                tracing::warn!("[auth] unknown username {:?}; access denied", username);
                return false;
            }
            break;
        }
        let pw_passwd = unsafe { CStr::from_ptr(pwd.pw_passwd).to_owned() };

        // Shadow entry, when the system keeps one for this user.
        let mut spw: libc::spwd = unsafe { std::mem::zeroed() };
        let mut spbuf = vec![0u8; 1024];
        let mut spres: *mut libc::spwd = std::ptr::null_mut();
        loop {
            let rc = unsafe {
                libc::getspnam_r(
                    cname.as_ptr(),
                    &mut spw,
                    spbuf.as_mut_ptr().cast(),
                    spbuf.len(),
                    &mut spres,
                )
            };
            if rc == libc::ERANGE {
                spbuf.resize(spbuf.len() * 2, 0);
                continue;
            }
            break;
        }
        let sp_pwdp = if spres.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(spw.sp_pwdp).to_owned() })
        };

        if sp_pwdp.is_none() && pw_passwd.to_bytes() == b"x" {
            tracing::warn!(
                "[auth] username {:?} has no shadow password; access denied",
                username
            );
            return false;
        }

        // Blank stored passwords never authenticate.
        let shadow_blank = sp_pwdp.as_deref().map_or(true, |s| s.to_bytes().is_empty());
        if pw_passwd.to_bytes().is_empty() && shadow_blank {
            tracing::warn!(
                "[auth] username {:?} has no password; access denied",
                username
            );
            return false;
        }

        // Try the passwd hash first, then the shadow hash.
        if crypt_matches(&cpass, &pw_passwd) {
            return true;
        }
        if let Some(sp) = &sp_pwdp {
            if crypt_matches(&cpass, sp) {
                return true;
            }
        }

        false
    }
}

#[cfg(target_os = "linux")]
fn crypt_matches(password: &std::ffi::CStr, stored: &std::ffi::CStr) -> bool {
    if stored.to_bytes().is_empty() {
        return false;
    }
    let hashed = unsafe { crypt(password.as_ptr(), stored.as_ptr()) };
    if hashed.is_null() {
        return false;
    }
    let hashed = unsafe { std::ffi::CStr::from_ptr(hashed) };
    hashed.to_bytes() == stored.to_bytes()
}
