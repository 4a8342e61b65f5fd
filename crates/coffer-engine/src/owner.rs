//! Process-wide caches for owner lookups and existence checks.
//!
//! User/group resolution hits the OS once per distinct id or name and
//! memoizes both directions behind a mutex. Restore applies ownership
//! best-effort: a name that does not exist on this system is logged and
//! skipped, leaving the file owned by the restoring process.

use std::collections::{HashMap, HashSet};
use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing::warn;

use coffer_core::{CofferError, CofferResult};
use coffer_meta::Entry;

#[derive(Default)]
struct OwnerCache {
    users_by_uid: HashMap<u32, String>,
    uids_by_user: HashMap<String, u32>,
    groups_by_gid: HashMap<u32, String>,
    gids_by_group: HashMap<String, u32>,
}

fn cache() -> &'static Mutex<OwnerCache> {
    static CACHE: OnceLock<Mutex<OwnerCache>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(OwnerCache::default()))
}

/// Resolve a uid to its user name.
pub fn user_name(uid: u32) -> CofferResult<String> {
    if let Some(name) = cache().lock().unwrap().users_by_uid.get(&uid) {
        return Ok(name.clone());
    }
    let name = lookup_by_id(uid, IdKind::User)?;
    let mut cache = cache().lock().unwrap();
    cache.users_by_uid.insert(uid, name.clone());
    cache.uids_by_user.insert(name.clone(), uid);
    Ok(name)
}

/// Resolve a user name to its uid.
pub fn user_id(name: &str) -> CofferResult<u32> {
    if let Some(uid) = cache().lock().unwrap().uids_by_user.get(name) {
        return Ok(*uid);
    }
    let uid = lookup_by_name(name, IdKind::User)?;
    let mut cache = cache().lock().unwrap();
    cache.uids_by_user.insert(name.to_string(), uid);
    cache.users_by_uid.insert(uid, name.to_string());
    Ok(uid)
}

/// Resolve a gid to its group name.
pub fn group_name(gid: u32) -> CofferResult<String> {
    if let Some(name) = cache().lock().unwrap().groups_by_gid.get(&gid) {
        return Ok(name.clone());
    }
    let name = lookup_by_id(gid, IdKind::Group)?;
    let mut cache = cache().lock().unwrap();
    cache.groups_by_gid.insert(gid, name.clone());
    cache.gids_by_group.insert(name.clone(), gid);
    Ok(name)
}

/// Resolve a group name to its gid.
pub fn group_id(name: &str) -> CofferResult<u32> {
    if let Some(gid) = cache().lock().unwrap().gids_by_group.get(name) {
        return Ok(*gid);
    }
    let gid = lookup_by_name(name, IdKind::Group)?;
    let mut cache = cache().lock().unwrap();
    cache.gids_by_group.insert(name.to_string(), gid);
    cache.groups_by_gid.insert(gid, name.to_string());
    Ok(gid)
}

/// Apply the entry's recorded owner to `path`. Best-effort: unresolvable
/// names and a failed chown are logged, never fatal.
pub fn apply_owner(path: &Path, name_for_logs: &str, entry: &Entry) {
    let uid = match user_id(&entry.user) {
        Ok(uid) => uid,
        Err(e) => {
            warn!(user = %entry.user, for_path = %name_for_logs, "skipping chown: {e}");
            return;
        }
    };
    let gid = match group_id(&entry.group) {
        Ok(gid) => gid,
        Err(e) => {
            warn!(group = %entry.group, for_path = %name_for_logs, "skipping chown: {e}");
            return;
        }
    };
    if let Err(e) = std::os::unix::fs::chown(path, Some(uid), Some(gid)) {
        warn!(path = %path.display(), for_path = %name_for_logs, "chown failed: {e}");
    }
}

/// Stat-with-memoization for directories the restore has already seen
/// or created. Only positive results are cached, keyed by absolute path
/// so relative targets stay correct across working directories.
pub fn path_exists(path: &Path) -> bool {
    static SEEN: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    let seen = SEEN.get_or_init(|| Mutex::new(HashSet::new()));

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    if seen.lock().unwrap().contains(&absolute) {
        return true;
    }
    if absolute.exists() {
        seen.lock().unwrap().insert(absolute);
        return true;
    }
    false
}

#[derive(Clone, Copy)]
enum IdKind {
    User,
    Group,
}

impl IdKind {
    fn label(self) -> &'static str {
        match self {
            IdKind::User => "user",
            IdKind::Group => "group",
        }
    }
}

fn lookup_by_id(id: u32, kind: IdKind) -> CofferResult<String> {
    let mut buf = vec![0u8; 1024];
    loop {
        let (rc, name_ptr) = unsafe {
            match kind {
                IdKind::User => {
                    let mut pwd: libc::passwd = std::mem::zeroed();
                    let mut result: *mut libc::passwd = std::ptr::null_mut();
                    let rc = libc::getpwuid_r(
                        id,
                        &mut pwd,
                        buf.as_mut_ptr() as *mut libc::c_char,
                        buf.len(),
                        &mut result,
                    );
                    (rc, if result.is_null() { std::ptr::null() } else { pwd.pw_name as *const libc::c_char })
                }
                IdKind::Group => {
                    let mut grp: libc::group = std::mem::zeroed();
                    let mut result: *mut libc::group = std::ptr::null_mut();
                    let rc = libc::getgrgid_r(
                        id,
                        &mut grp,
                        buf.as_mut_ptr() as *mut libc::c_char,
                        buf.len(),
                        &mut result,
                    );
                    (rc, if result.is_null() { std::ptr::null() } else { grp.gr_name as *const libc::c_char })
                }
            }
        };

        if rc == libc::ERANGE {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 {
            return Err(CofferError::Io(std::io::Error::from_raw_os_error(rc)));
        }
        if name_ptr.is_null() {
            return Err(CofferError::NotFound(format!("{} id {id}", kind.label())));
        }
        let name = unsafe { CStr::from_ptr(name_ptr) };
        return Ok(name.to_string_lossy().into_owned());
    }
}

fn lookup_by_name(name: &str, kind: IdKind) -> CofferResult<u32> {
    let c_name = CString::new(name)
        .map_err(|_| CofferError::NotFound(format!("{} {name:?}", kind.label())))?;
    let mut buf = vec![0u8; 1024];
    loop {
        let (rc, id) = unsafe {
            match kind {
                IdKind::User => {
                    let mut pwd: libc::passwd = std::mem::zeroed();
                    let mut result: *mut libc::passwd = std::ptr::null_mut();
                    let rc = libc::getpwnam_r(
                        c_name.as_ptr(),
                        &mut pwd,
                        buf.as_mut_ptr() as *mut libc::c_char,
                        buf.len(),
                        &mut result,
                    );
                    (rc, if result.is_null() { None } else { Some(pwd.pw_uid) })
                }
                IdKind::Group => {
                    let mut grp: libc::group = std::mem::zeroed();
                    let mut result: *mut libc::group = std::ptr::null_mut();
                    let rc = libc::getgrnam_r(
                        c_name.as_ptr(),
                        &mut grp,
                        buf.as_mut_ptr() as *mut libc::c_char,
                        buf.len(),
                        &mut result,
                    );
                    (rc, if result.is_null() { None } else { Some(grp.gr_gid) })
                }
            }
        };

        if rc == libc::ERANGE {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 {
            return Err(CofferError::Io(std::io::Error::from_raw_os_error(rc)));
        }
        match id {
            Some(id) => return Ok(id),
            None => {
                return Err(CofferError::NotFound(format!("{} {name:?}", kind.label())))
            }
        }
    }
}
