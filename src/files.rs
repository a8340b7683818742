// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Atomic secret file writes and on-disk attribute inspection.

use crate::constants::{fs_magic, modes};
use crate::error::{Result, SyncError};
use crate::ownership::Ownership;
use crate::remote::{validate_secret_name, Secret};
use std::fs::{Metadata, Permissions};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Filesystems a client directory can be pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesystemType {
    Tmpfs,
    Ramfs,
}

impl FilesystemType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tmpfs" => Some(FilesystemType::Tmpfs),
            "ramfs" => Some(FilesystemType::Ramfs),
            _ => None,
        }
    }

    fn magic(self) -> i64 {
        match self {
            FilesystemType::Tmpfs => fs_magic::TMPFS,
            FilesystemType::Ramfs => fs_magic::RAMFS,
        }
    }
}

/// How and where one client's secrets are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConfig {
    pub directory: PathBuf,
    pub enforce_filesystem: Option<FilesystemType>,
    pub chown_files: bool,
    pub default_ownership: Ownership,
}

/// Attributes of a written file that we record and later compare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// Permission bits only
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl From<&Metadata> for FileInfo {
    fn from(metadata: &Metadata) -> Self {
        FileInfo {
            mode: metadata.mode() & modes::PERMISSION_MASK,
            uid: metadata.uid(),
            gid: metadata.gid(),
        }
    }
}

/// Read permission bits and owner from an open file
pub async fn file_info(file: &File) -> std::io::Result<FileInfo> {
    let metadata = file.metadata().await?;
    Ok(FileInfo::from(&metadata))
}

/// Write a secret under its final name without ever exposing a partial file.
///
/// Content goes to a hidden temporary file in the same directory, which is synced,
/// given its mode and owner, and then renamed over the final path. On failure the
/// temporary file is removed and any previous file is left as it was.
pub async fn atomic_write(secret: &Secret, config: &WriteConfig) -> Result<FileInfo> {
    validate_secret_name(&secret.name)?;
    if let Some(fs_type) = config.enforce_filesystem {
        ensure_filesystem(&config.directory, fs_type)?;
    }

    let mode = file_mode(secret)?;
    let ownership = if config.chown_files {
        Some(
            config
                .default_ownership
                .with_overrides(secret.owner.as_deref(), secret.group.as_deref())?,
        )
    } else {
        None
    };

    let final_path = config.directory.join(&secret.name);
    let temp_path = config
        .directory
        .join(format!(".{}.{:016x}.tmp", secret.name, rand::random::<u64>()));

    let result = match write_temp(&temp_path, secret, mode, ownership).await {
        Ok(info) => fs::rename(&temp_path, &final_path)
            .await
            .map(|_| info)
            .map_err(|e| SyncError::io("Failed to rename secret into place", &final_path, e)),
        Err(e) => Err(e),
    };

    if result.is_err() {
        if let Err(e) = fs::remove_file(&temp_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove temporary file {}: {}", temp_path.display(), e);
            }
        }
    }
    result
}

async fn write_temp(
    path: &Path,
    secret: &Secret,
    mode: u32,
    ownership: Option<Ownership>,
) -> Result<FileInfo> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .await
        .map_err(|e| SyncError::io("Failed to create temporary file", path, e))?;

    file.write_all(&secret.content)
        .await
        .map_err(|e| SyncError::io("Failed to write temporary file", path, e))?;
    file.flush()
        .await
        .map_err(|e| SyncError::io("Failed to write temporary file", path, e))?;

    if let Some(owner) = ownership {
        std::os::unix::fs::fchown(&file, Some(owner.uid), Some(owner.gid))
            .map_err(|e| SyncError::io("Failed to chown temporary file", path, e))?;
    }
    file.set_permissions(Permissions::from_mode(mode))
        .await
        .map_err(|e| SyncError::io("Failed to chmod temporary file", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| SyncError::io("Failed to sync temporary file", path, e))?;

    let info = file_info(&file)
        .await
        .map_err(|e| SyncError::io("Failed to stat temporary file", path, e))?;
    debug!("Wrote {} bytes for {} with mode {:o}", secret.content.len(), secret.name, info.mode);
    Ok(info)
}

/// Mode requested by the server as an octal string, or the default
fn file_mode(secret: &Secret) -> Result<u32> {
    match secret.mode.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        None => Ok(modes::DEFAULT_FILE),
        Some(raw) => u32::from_str_radix(raw, 8)
            .ok()
            .filter(|mode| *mode <= modes::PERMISSION_MASK)
            .ok_or_else(|| {
                SyncError::Config(format!("Invalid mode '{}' for secret {}", raw, secret.name))
            }),
    }
}

#[cfg(target_os = "linux")]
fn ensure_filesystem(directory: &Path, expected: FilesystemType) -> Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(directory.as_os_str().as_bytes())
        .map_err(|e| SyncError::Filesystem(format!("Invalid path {}: {}", directory.display(), e)))?;

    // SAFETY: statfs only writes into the zeroed struct we hand it, and c_path is NUL terminated.
    let mut stat: libc::statfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(SyncError::io(
            "Failed to statfs",
            directory,
            std::io::Error::last_os_error(),
        ));
    }

    #[allow(clippy::unnecessary_cast)]
    let actual = (stat.f_type as i64) & 0xffff_ffff;
    if actual != expected.magic() {
        return Err(SyncError::Filesystem(format!(
            "{} is not on {:?} (filesystem type {:#x})",
            directory.display(),
            expected,
            actual
        )));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn ensure_filesystem(directory: &Path, expected: FilesystemType) -> Result<()> {
    Err(SyncError::Filesystem(format!(
        "Cannot enforce {:?} for {}: only supported on Linux",
        expected,
        directory.display()
    )))
}
