// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Secret service client capability and the types it exchanges.

pub mod http;

use crate::config::ClientConfig;
use crate::error::{RemoteError, Result, SyncError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

pub use http::{HttpConnector, HttpSecretClient};

/// Listing entry for a secret: enough to decide whether a fetch is needed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMetadata {
    pub name: String,
    pub checksum: String,
}

/// A fetched secret. Only lives for the duration of one write.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    pub name: String,
    pub content: Bytes,
    pub checksum: String,
    /// Octal mode requested by the server, e.g. "0400"
    pub mode: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("content", &format_args!("<{} bytes redacted>", self.content.len()))
            .field("checksum", &self.checksum)
            .field("mode", &self.mode)
            .field("owner", &self.owner)
            .field("group", &self.group)
            .finish()
    }
}

/// One identity bound to the secret service
#[async_trait]
pub trait SecretClient: Send + Sync {
    /// All secrets currently assigned to this identity, keyed by name
    async fn list_secrets(&self) -> std::result::Result<HashMap<String, SecretMetadata>, RemoteError>;

    /// Fetch one secret. Must return `RemoteError::Deleted` when the server says it is gone.
    async fn secret(&self, name: &str) -> std::result::Result<Secret, RemoteError>;

    /// Refresh credentials and connection state in place
    fn rebuild(&mut self) -> std::result::Result<(), RemoteError>;
}

/// Builds clients for configured identities
pub trait ClientConnector: Send + Sync {
    fn connect(&self, name: &str, config: &ClientConfig) -> Result<Box<dyn SecretClient>>;
}

/// Secret names become file names, so anything that could escape the client directory is refused.
pub fn validate_secret_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(SyncError::InvalidSecretName(name.to_string()));
    }
    Ok(())
}
