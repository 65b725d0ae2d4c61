//! OS account database access
//!
//! User and group lookups go through the [`AccountDb`] trait so the
//! authorizer can run against the real account database in the daemon and
//! against synthetic accounts in the test suites. The system implementation
//! uses the reentrant `getpwnam_r`/`getgrnam_r` calls; the authorization
//! path runs inline on the request thread and must not touch the
//! non-reentrant name service iterators.

/// A system user record, trimmed to what authorization needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

/// A system group record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

/// User/group lookup capability.
pub trait AccountDb {
    fn user_by_name(&self, name: &str) -> Option<UserRecord>;
    fn group_by_name(&self, name: &str) -> Option<GroupRecord>;
}

/// In-memory accounts for tests and for the daemon's self-test mode.
#[derive(Debug, Default)]
pub struct MemoryAccounts {
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, name: &str, uid: u32, gid: u32) -> &mut Self {
        self.users.push(UserRecord {
            name: name.to_string(),
            uid,
            gid,
        });
        self
    }

    pub fn add_group(&mut self, name: &str, gid: u32, members: &[&str]) -> &mut Self {
        self.groups.push(GroupRecord {
            name: name.to_string(),
            gid,
            members: members.iter().map(|m| m.to_string()).collect(),
        });
        self
    }
}

impl AccountDb for MemoryAccounts {
    fn user_by_name(&self, name: &str) -> Option<UserRecord> {
        self.users.iter().find(|u| u.name == name).cloned()
    }

    fn group_by_name(&self, name: &str) -> Option<GroupRecord> {
        self.groups.iter().find(|g| g.name == name).cloned()
    }
}

/// The real OS account database.
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct SystemAccounts;

#[cfg(unix)]
impl SystemAccounts {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl AccountDb for SystemAccounts {
    fn user_by_name(&self, name: &str) -> Option<UserRecord> {
        use std::ffi::CString;

        let cname = CString::new(name).ok()?;
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut buf = vec![0u8; 1024];
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        loop {
            let rc = unsafe {
                libc::getpwnam_r(
                    cname.as_ptr(),
                    &mut pwd,
                    buf.as_mut_ptr().cast(),
                    buf.len(),
                    &mut result,
                )
            };
            if rc == libc::ERANGE {
                buf.resize(buf.len() * 2, 0);
                continue;
            }
            if rc != 0 || result.is_null() {
                return None;
            }
            break;
        }

        Some(UserRecord {
            name: unsafe { cstr_to_string(pwd.pw_name) },
            uid: pwd.pw_uid as u32,
            gid: pwd.pw_gid as u32,
        })
    }

    fn group_by_name(&self, name: &str) -> Option<GroupRecord> {
        use std::ffi::CString;

        let cname = CString::new(name).ok()?;
        let mut grp: libc::group = unsafe { std::mem::zeroed() };
        let mut buf = vec![0u8; 2048];
        let mut result: *mut libc::group = std::ptr::null_mut();

        loop {
            let rc = unsafe {
                libc::getgrnam_r(
                    cname.as_ptr(),
                    &mut grp,
                    buf.as_mut_ptr().cast(),
                    buf.len(),
                    &mut result,
                )
            };
            if rc == libc::ERANGE {
                buf.resize(buf.len() * 2, 0);
                continue;
            }
            if rc != 0 || result.is_null() {
                return None;
            }
            break;
        }

        let mut members = Vec::new();
        let mut mem = grp.gr_mem;
        unsafe {
            while !mem.is_null() && !(*mem).is_null() {
                members.push(cstr_to_string(*mem));
                mem = mem.add(1);
            }
        }

        Some(GroupRecord {
            name: unsafe { cstr_to_string(grp.gr_name) },
            gid: grp.gr_gid as u32,
            members,
        })
    }
}

#[cfg(unix)]
unsafe fn cstr_to_string(ptr: *const libc::c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
}
