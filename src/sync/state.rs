// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-secret sync records.

use crate::files::FileInfo;
use sha2::{Digest, Sha256};

/// SHA-256 of the bytes we wrote
pub type ContentHash = [u8; 32];

pub fn content_hash(content: &[u8]) -> ContentHash {
    Sha256::digest(content).into()
}

/// What we know about a secret we have written
#[derive(Clone, PartialEq, Eq)]
pub struct VerifiedState {
    pub content_hash: ContentHash,
    /// Server-assigned identifier of the content version
    pub checksum: String,
    pub file_info: FileInfo,
}

// Hashes leak information about secret material, keep them out of logs.
impl std::fmt::Debug for VerifiedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedState")
            .field("checksum", &self.checksum)
            .field("file_info", &self.file_info)
            .finish_non_exhaustive()
    }
}

/// Sync state of a single secret name within one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretState {
    /// Written successfully; the file on disk should match this record
    Verified(VerifiedState),
    /// Still wanted but the last fetch failed. Keeps the existing file out of the orphan sweep.
    PendingRetry,
    /// Queued for removal at the end of the current pass
    Tombstoned,
}

impl SecretState {
    pub fn verified(content: &[u8], checksum: impl Into<String>, file_info: FileInfo) -> Self {
        SecretState::Verified(VerifiedState {
            content_hash: content_hash(content),
            checksum: checksum.into(),
            file_info,
        })
    }

    pub fn as_verified(&self) -> Option<&VerifiedState> {
        match self {
            SecretState::Verified(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_tombstoned(&self) -> bool {
        matches!(self, SecretState::Tombstoned)
    }
}
