// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the secret service.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The server confirmed the secret no longer exists.
    #[error("Secret deleted on server: {0}")]
    Deleted(String),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode server response: {0}")]
    Decode(String),

    #[error("Failed to load client identity: {0}")]
    Identity(String),
}

impl RemoteError {
    pub fn is_deleted(&self) -> bool {
        matches!(self, RemoteError::Deleted(_))
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{context} '{}': {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Ownership lookup failed: {0}")]
    Ownership(String),

    #[error("Filesystem check failed: {0}")]
    Filesystem(String),

    #[error("Invalid secret name: {0:?}")]
    InvalidSecretName(String),
}

impl SyncError {
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
