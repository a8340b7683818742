// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Detects when a written secret no longer matches what we recorded or what the server expects.

use crate::files::file_info;
use crate::remote::SecretMetadata;
use crate::sync::state::SecretState;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Outcome of checking one secret's on-disk copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    Valid,
    /// No verified record for this name
    Unverified,
    /// The server has a different version
    ChecksumChanged,
    Missing,
    /// Permission bits or owner differ from what we wrote
    AttributesChanged,
    /// Content differs from what we wrote, or could not be read
    ContentChanged,
}

impl Drift {
    pub fn is_valid(self) -> bool {
        self == Drift::Valid
    }
}

/// Check, in order: checksum, presence, attributes, content digest. Stops at the first mismatch.
pub async fn check(
    directory: &Path,
    metadata: &SecretMetadata,
    state: Option<&SecretState>,
) -> Drift {
    let name = &metadata.name;
    let Some(recorded) = state.and_then(SecretState::as_verified) else {
        return Drift::Unverified;
    };

    if recorded.checksum != metadata.checksum {
        debug!("Secret {} has a new version on the server", name);
        return Drift::ChecksumChanged;
    }

    let path = directory.join(name);
    let mut file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            debug!("Secret {} not readable at {}: {}", name, path.display(), e);
            return Drift::Missing;
        }
    };

    match file_info(&file).await {
        Ok(info) if info == recorded.file_info => {}
        Ok(info) => {
            warn!(
                "Secret {} attributes changed on disk (mode {:o} -> {:o}, owner {}:{} -> {}:{})",
                name,
                recorded.file_info.mode,
                info.mode,
                recorded.file_info.uid,
                recorded.file_info.gid,
                info.uid,
                info.gid
            );
            return Drift::AttributesChanged;
        }
        Err(e) => {
            debug!("Failed to stat secret {}: {}", name, e);
            return Drift::AttributesChanged;
        }
    }

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];
    loop {
        match file.read(&mut buffer).await {
            Ok(0) => break,
            Ok(read) => hasher.update(&buffer[..read]),
            Err(e) => {
                debug!("Failed to read secret {}: {}", name, e);
                return Drift::ContentChanged;
            }
        }
    }
    let digest: [u8; 32] = hasher.finalize().into();

    if digest != recorded.content_hash {
        warn!("Secret {} modified on disk?", name);
        return Drift::ContentChanged;
    }

    Drift::Valid
}
