// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Central coordinator owning every client and driving the poll loop.

use crate::config::{ClientConfig, ClientConfigSource, Config};
use crate::constants::poll::JITTER_DIVISOR;
use crate::error::Result;
use crate::files::{FilesystemType, WriteConfig};
use crate::ownership::Ownership;
use crate::remote::{ClientConnector, HttpConnector};
use crate::sync::entry::ClientEntry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Configured clients, plus replaced or removed ones whose files are still on disk
#[derive(Default)]
struct Clients {
    active: BTreeMap<String, ClientEntry>,
    retired: Vec<ClientEntry>,
}

/// Owns all client entries. Every pass runs with the client map locked, so passes never overlap.
pub struct Syncer {
    config: Config,
    source: Box<dyn ClientConfigSource>,
    connector: Box<dyn ClientConnector>,
    clients: Mutex<Clients>,
    rng: std::sync::Mutex<StdRng>,
}

impl Syncer {
    /// Syncer talking to the configured server, reading clients from the configured directory
    pub fn new(config: Config) -> Result<Self> {
        let connector = HttpConnector::new(config.server_url()?, config.ca_file.clone());
        let source = config.clone();
        Ok(Self::with_parts(config, Box::new(source), Box::new(connector)))
    }

    pub fn with_parts(
        config: Config,
        source: Box<dyn ClientConfigSource>,
        connector: Box<dyn ClientConnector>,
    ) -> Self {
        Self {
            config,
            source,
            connector,
            clients: Mutex::new(Clients::default()),
            rng: std::sync::Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the jitter source, e.g. with a seeded generator
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = std::sync::Mutex::new(rng);
        self
    }

    /// Run passes forever with a jittered sleep in between, or a single pass if no interval is set
    pub async fn run(&self) -> Result<()> {
        let Some(interval) = self.config.poll_interval()? else {
            return self.run_once().await;
        };

        loop {
            if let Err(e) = self.run_once().await {
                error!("Failed running sync: {}", e);
            }

            let sleep = self.jitter(interval);
            info!("Sleeping for {:?}", sleep);
            tokio::time::sleep(sleep).await;
        }
    }

    /// One pass over every client. Only a failure to load configuration fails the pass.
    ///
    /// Files of retired clients are only cleaned up after the live clients have synced.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<()> {
        let mut clients = self.clients.lock().await;
        self.load_clients(&mut clients)?;

        let mut synced = HashSet::new();
        for (name, entry) in clients.active.iter_mut() {
            match entry.sync().await {
                Ok(summary) => {
                    synced.insert(name.clone());
                    info!(
                        "Synced client {}: {} written, {} unchanged, {} deleted, {} orphans removed, {} failed",
                        name,
                        summary.written,
                        summary.unchanged,
                        summary.deleted,
                        summary.orphans_removed,
                        summary.failed
                    );
                }
                Err(e) => error!("Failed while syncing client {}: {}", name, e),
            }
        }

        Self::clean_retired(&mut clients, &synced).await;
        Ok(())
    }

    /// Reload client configuration without syncing
    pub async fn reload(&self) -> Result<()> {
        let mut clients = self.clients.lock().await;
        self.load_clients(&mut clients)
    }

    /// Names of the clients currently loaded
    pub async fn client_names(&self) -> Vec<String> {
        self.clients.lock().await.active.keys().cloned().collect()
    }

    /// Run `f` against a loaded client entry
    pub async fn with_client<T>(&self, name: &str, f: impl FnOnce(&ClientEntry) -> T) -> Option<T> {
        self.clients.lock().await.active.get(name).map(f)
    }

    /// Number of replaced or removed clients whose files are still being kept
    pub async fn retired_count(&self) -> usize {
        self.clients.lock().await.retired.len()
    }

    /// Remove files of retired clients that nothing needs any more.
    ///
    /// A directory that a live client now writes to is left to that client's own sweep.
    /// A client that moved keeps its old files until the new directory has verified copies.
    /// A client that is gone altogether has its files removed.
    async fn clean_retired(clients: &mut Clients, synced: &HashSet<String>) {
        let mut kept = Vec::new();
        for mut retired in std::mem::take(&mut clients.retired) {
            let shared = clients
                .active
                .values()
                .any(|live| live.directory() == retired.directory());
            if shared {
                debug!(
                    "Directory {} of retired client {} is in use, leaving it",
                    retired.directory().display(),
                    retired.name()
                );
                continue;
            }

            match clients.active.get(retired.name()) {
                Some(successor) if synced.contains(retired.name()) => {
                    if !retired.release_superseded(successor.state()).await {
                        kept.push(retired);
                    }
                }
                Some(_) => {
                    info!(
                        "Keeping {} until client {} has synced its new directory",
                        retired.directory().display(),
                        retired.name()
                    );
                    kept.push(retired);
                }
                None => {
                    warn!("Client gone: {}, removing its secrets", retired.name());
                    retired.remove_managed_files().await;
                }
            }
        }
        clients.retired = kept;
    }

    /// Bring the client map in line with configuration.
    ///
    /// Unchanged clients keep their state and only get their connection rebuilt. Changed
    /// clients start over with empty state, so every file gets re-validated. Clients that
    /// moved to another directory or are no longer configured are retired; their files
    /// are dealt with at the end of the next pass.
    fn load_clients(&self, clients: &mut Clients) -> Result<()> {
        let configs = self.source.load_clients()?;
        info!("Loaded {} client configs", configs.len());

        for (name, client_config) in &configs {
            if let Some(existing) = clients.active.get_mut(name) {
                if existing.config() == client_config {
                    if let Err(e) = existing.rebuild_client() {
                        error!("Failed rebuilding client {}: {}", name, e);
                    }
                    continue;
                }
            }

            let entry = match self.build_entry(name, client_config) {
                Ok(entry) => entry,
                Err(e) => {
                    error!("Failed building client {}: {}", name, e);
                    continue;
                }
            };

            let directory = entry.directory().to_path_buf();
            if let Some(previous) = clients.active.insert(name.clone(), entry) {
                info!("Configuration changed for client {}, starting with fresh state", name);
                if previous.directory() != directory {
                    clients.retired.push(previous);
                }
            }
        }

        let gone: Vec<String> = clients
            .active
            .keys()
            .filter(|name| !configs.contains_key(*name))
            .cloned()
            .collect();
        for name in gone {
            if let Some(entry) = clients.active.remove(&name) {
                info!("Client {} no longer configured", name);
                clients.retired.push(entry);
            }
        }
        Ok(())
    }

    fn build_entry(&self, name: &str, client_config: &ClientConfig) -> Result<ClientEntry> {
        let client = self.connector.connect(name, client_config)?;

        let user = non_empty_or(&client_config.user, &self.config.default_user);
        let group = non_empty_or(&client_config.group, &self.config.default_group);
        let default_ownership = Ownership::resolve(user, group).unwrap_or_else(|e| {
            // Root is a safe fallback: files stay unreadable to everyone else
            error!("Failed getting default ownership for client {}: {}", name, e);
            Ownership::default()
        });

        let write_config = WriteConfig {
            directory: self.config.secrets_directory.join(&client_config.directory),
            enforce_filesystem: self
                .config
                .fs_type
                .as_deref()
                .and_then(FilesystemType::from_name),
            chown_files: self.config.chown_files,
            default_ownership,
        };

        Ok(ClientEntry::new(name, client, client_config.clone(), write_config))
    }

    fn jitter(&self, interval: Duration) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        randomize(interval, &mut *rng)
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// Add up to a quarter of `interval` on top of it: the result is in `[interval, 1.25 * interval)`
pub fn randomize<R: Rng>(interval: Duration, rng: &mut R) -> Duration {
    let max_added = interval.as_nanos() / u128::from(JITTER_DIVISOR);
    if max_added == 0 {
        return interval;
    }
    let max_added = u64::try_from(max_added).unwrap_or(u64::MAX);
    interval + Duration::from_nanos(rng.gen_range(0..max_added))
}
