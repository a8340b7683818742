// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! One client's secrets: fetching, writing, verifying and removing them.

use crate::config::ClientConfig;
use crate::constants::modes;
use crate::error::{Result, SyncError};
use crate::files::{atomic_write, WriteConfig};
use crate::remote::{validate_secret_name, SecretClient};
use crate::sync::drift;
use crate::sync::state::SecretState;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

/// Counts from one synchronization pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub unchanged: usize,
    pub written: usize,
    pub failed: usize,
    pub deleted: usize,
    pub orphans_removed: usize,
}

/// A configured identity together with where its secrets go and what we last wrote
pub struct ClientEntry {
    name: String,
    client: Box<dyn SecretClient>,
    config: ClientConfig,
    write_config: WriteConfig,
    state: BTreeMap<String, SecretState>,
}

impl ClientEntry {
    pub fn new(
        name: impl Into<String>,
        client: Box<dyn SecretClient>,
        config: ClientConfig,
        write_config: WriteConfig,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            config,
            write_config,
            state: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn directory(&self) -> &Path {
        &self.write_config.directory
    }

    pub fn state(&self) -> &BTreeMap<String, SecretState> {
        &self.state
    }

    /// Refresh the client's credentials, keeping sync state
    pub fn rebuild_client(&mut self) -> Result<()> {
        self.client.rebuild()?;
        Ok(())
    }

    /// Bring the client directory in line with the server.
    ///
    /// Every wanted secret is written before anything is deleted, and a secret whose
    /// fetch failed keeps its current file until a later pass succeeds.
    #[instrument(skip(self), fields(client = %self.name))]
    pub async fn sync(&mut self) -> Result<SyncSummary> {
        let directory = self.write_config.directory.clone();
        fs::DirBuilder::new()
            .recursive(true)
            .mode(modes::CLIENT_DIR)
            .create(&directory)
            .await
            .map_err(|e| SyncError::io("Making client directory", &directory, e))?;

        let secrets = self.client.list_secrets().await?;
        let mut summary = SyncSummary::default();

        for (name, metadata) in &secrets {
            if let Err(e) = validate_secret_name(name) {
                error!("Skipping secret from server: {}", e);
                summary.failed += 1;
                continue;
            }

            if drift::check(&directory, metadata, self.state.get(name))
                .await
                .is_valid()
            {
                debug!("Not requesting still-valid secret {}", name);
                summary.unchanged += 1;
                continue;
            }

            let secret = match self.client.secret(name).await {
                Ok(secret) if secret.name == *name => secret,
                Ok(secret) => {
                    error!("Asked for secret {} but server returned {}", name, secret.name);
                    self.state.insert(name.clone(), SecretState::PendingRetry);
                    summary.failed += 1;
                    continue;
                }
                Err(e) if e.is_deleted() => {
                    // Listed a moment ago but gone now. Removal waits until everything else is written.
                    info!("Secret {} deleted on server since listing", name);
                    self.state.insert(name.clone(), SecretState::Tombstoned);
                    continue;
                }
                Err(e) => {
                    error!("Failed fetching secret {}: {}", name, e);
                    self.state.insert(name.clone(), SecretState::PendingRetry);
                    summary.failed += 1;
                    continue;
                }
            };

            match atomic_write(&secret, &self.write_config).await {
                Ok(file_info) => {
                    info!("Wrote file {} in {}", name, directory.display());
                    self.state.insert(
                        name.clone(),
                        SecretState::verified(&secret.content, secret.checksum.clone(), file_info),
                    );
                    summary.written += 1;
                }
                Err(e) => {
                    // Nothing changed on disk, so nothing changes in our state either
                    error!("Failed while writing secret {}: {}", name, e);
                    summary.failed += 1;
                }
            }
        }

        for (name, state) in self.state.iter_mut() {
            if !secrets.contains_key(name) {
                *state = SecretState::Tombstoned;
            }
        }

        let tombstoned: Vec<String> = self
            .state
            .iter()
            .filter(|(_, state)| state.is_tombstoned())
            .map(|(name, _)| name.clone())
            .collect();
        for name in tombstoned {
            info!("Removing old secret {}", name);
            self.state.remove(&name);
            remove_file(&directory.join(&name)).await;
            summary.deleted += 1;
        }

        summary.orphans_removed = self.remove_unknown_files().await?;

        debug!("Sync finished: {:?}", summary);
        Ok(summary)
    }

    /// Delete every file in the client directory that we have no state for
    async fn remove_unknown_files(&self) -> Result<usize> {
        let directory = &self.write_config.directory;
        let mut entries = fs::read_dir(directory)
            .await
            .map_err(|e| SyncError::io("Couldn't read directory", directory, e))?;

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(SyncError::io("Couldn't read directory", directory, e)),
            };

            let known = entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.state.contains_key(name));
            if known {
                continue;
            }

            let path = entry.path();
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => {
                    warn!("Leaving unknown directory {} in place", path.display());
                }
                _ => {
                    info!("Removing unknown file {}", path.display());
                    remove_file(&path).await;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Hand this retired entry's files over to the entry that replaced it.
    ///
    /// A file is removed once the successor no longer lists the name or has written its
    /// own verified copy. Names the successor is still retrying stay in place. Returns
    /// true when nothing of ours is left and the directory has been cleaned up.
    #[instrument(skip(self, successor), fields(client = %self.name))]
    pub async fn release_superseded(&mut self, successor: &BTreeMap<String, SecretState>) -> bool {
        let directory = self.write_config.directory.clone();
        let released: Vec<String> = self
            .state
            .keys()
            .filter(|name| successor.get(*name).map_or(true, |s| s.as_verified().is_some()))
            .cloned()
            .collect();
        for name in released {
            info!("Removing secret {} from previous directory", name);
            self.state.remove(&name);
            remove_file(&directory.join(&name)).await;
        }

        if !self.state.is_empty() {
            debug!(
                "Keeping {} secrets in {} until the new directory has them",
                self.state.len(),
                directory.display()
            );
            return false;
        }
        if let Err(e) = fs::remove_dir(&directory).await {
            debug!("Leaving directory {}: {}", directory.display(), e);
        }
        true
    }

    /// Remove every file we manage, then the directory itself if nothing else is left in it
    #[instrument(skip(self), fields(client = %self.name))]
    pub async fn remove_managed_files(&mut self) {
        let directory = self.write_config.directory.clone();
        for name in std::mem::take(&mut self.state).into_keys() {
            info!("Removing secret {} of retired client", name);
            remove_file(&directory.join(&name)).await;
        }
        if let Err(e) = fs::remove_dir(&directory).await {
            debug!("Leaving directory {}: {}", directory.display(), e);
        }
    }
}

async fn remove_file(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => error!("Failed to remove {}: {}", path.display(), e),
    }
}
