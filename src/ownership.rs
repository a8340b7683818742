// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resolution of user and group names to numeric ids through the system's name service.

use crate::error::{Result, SyncError};
use std::ffi::{CStr, CString};
use std::fmt;
use std::io;

const INITIAL_BUFFER: usize = 1024;
const MAX_BUFFER: usize = 1 << 20;

/// Numeric owner applied to written secrets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

impl Ownership {
    /// Resolve names against the user and group databases. Empty names resolve to root.
    pub fn resolve(user: &str, group: &str) -> Result<Self> {
        Ok(Ownership {
            uid: lookup_id(user, Database::User)?,
            gid: lookup_id(group, Database::Group)?,
        })
    }

    /// Apply per-secret owner/group overrides on top of `self`
    pub fn with_overrides(self, owner: Option<&str>, group: Option<&str>) -> Result<Self> {
        let uid = match owner.filter(|o| !o.is_empty()) {
            Some(owner) => lookup_id(owner, Database::User)?,
            None => self.uid,
        };
        let gid = match group.filter(|g| !g.is_empty()) {
            Some(group) => lookup_id(group, Database::Group)?,
            None => self.gid,
        };
        Ok(Ownership { uid, gid })
    }
}

#[derive(Debug, Clone, Copy)]
enum Database {
    User,
    Group,
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Database::User => write!(f, "user"),
            Database::Group => write!(f, "group"),
        }
    }
}

fn lookup_id(name: &str, database: Database) -> Result<u32> {
    if name.is_empty() {
        return Ok(0);
    }
    if let Ok(id) = name.parse::<u32>() {
        return Ok(id);
    }

    let c_name = CString::new(name)
        .map_err(|_| SyncError::Ownership(format!("Invalid {} name {:?}", database, name)))?;

    let mut buffer: Vec<libc::c_char> = vec![0; INITIAL_BUFFER];
    loop {
        let found = match database {
            Database::User => lookup_user(&c_name, &mut buffer),
            Database::Group => lookup_group(&c_name, &mut buffer),
        };
        match found {
            Ok(Some(id)) => return Ok(id),
            Ok(None) => {
                return Err(SyncError::Ownership(format!("{} '{}' not found", database, name)))
            }
            Err(e) if e.raw_os_error() == Some(libc::ERANGE) && buffer.len() < MAX_BUFFER => {
                let len = buffer.len() * 2;
                buffer.resize(len, 0);
            }
            Err(e) => {
                return Err(SyncError::Ownership(format!(
                    "Failed looking up {} '{}': {}",
                    database, name, e
                )))
            }
        }
    }
}

/// Map the `*nam_r` return code to an io result. No entry is reported as `Ok(false)`.
fn entry_found(rc: libc::c_int, found: bool) -> io::Result<bool> {
    match rc {
        0 => Ok(found),
        libc::ENOENT | libc::ESRCH => Ok(false),
        rc => Err(io::Error::from_raw_os_error(rc)),
    }
}

fn lookup_user(name: &CStr, buffer: &mut [libc::c_char]) -> io::Result<Option<u32>> {
    let mut entry: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();
    // SAFETY: all pointers are valid for the call and buffer.len() is the real buffer size.
    let rc = unsafe {
        libc::getpwnam_r(
            name.as_ptr(),
            &mut entry,
            buffer.as_mut_ptr(),
            buffer.len(),
            &mut result,
        )
    };
    Ok(entry_found(rc, !result.is_null())?.then_some(entry.pw_uid))
}

fn lookup_group(name: &CStr, buffer: &mut [libc::c_char]) -> io::Result<Option<u32>> {
    let mut entry: libc::group = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::group = std::ptr::null_mut();
    // SAFETY: all pointers are valid for the call and buffer.len() is the real buffer size.
    let rc = unsafe {
        libc::getgrnam_r(
            name.as_ptr(),
            &mut entry,
            buffer.as_mut_ptr(),
            buffer.len(),
            &mut result,
        )
    };
    Ok(entry_found(rc, !result.is_null())?.then_some(entry.gr_gid))
}
