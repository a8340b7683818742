// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for mocking the secret service and the configuration source.

use crate::config::{ClientConfig, ClientConfigSource};
use crate::error::{RemoteError, Result, SyncError};
use crate::remote::{ClientConnector, Secret, SecretClient, SecretMetadata};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RemoteState {
    secrets: BTreeMap<String, Secret>,
    fail_listing: bool,
    fail_fetch: HashSet<String>,
    delete_on_fetch: HashSet<String>,
    fetches: Vec<String>,
    rebuilds: usize,
    observed_paths: Vec<PathBuf>,
    observations: Vec<Vec<bool>>,
}

/// An in-memory secret service. Clones share state, so a test can keep one
/// handle while the code under test owns the client.
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret (builder style)
    pub fn with_secret(self, name: &str, content: &'static [u8], checksum: &str) -> Self {
        self.set_secret(name, content, checksum);
        self
    }

    pub fn set_secret(&self, name: &str, content: &'static [u8], checksum: &str) {
        self.put(Secret {
            name: name.to_string(),
            content: Bytes::from_static(content),
            checksum: checksum.to_string(),
            mode: None,
            owner: None,
            group: None,
        });
    }

    pub fn put(&self, secret: Secret) {
        self.state
            .lock()
            .unwrap()
            .secrets
            .insert(secret.name.clone(), secret);
    }

    pub fn secret_value(&self, name: &str) -> Secret {
        self.state.lock().unwrap().secrets[name].clone()
    }

    pub fn remove_secret(&self, name: &str) {
        self.state.lock().unwrap().secrets.remove(name);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().unwrap().fail_listing = fail;
    }

    pub fn fail_fetch(&self, name: &str, fail: bool) {
        let mut state = self.state.lock().unwrap();
        if fail {
            state.fail_fetch.insert(name.to_string());
        } else {
            state.fail_fetch.remove(name);
        }
    }

    /// The secret stays listed but fetching it reports it deleted
    pub fn delete_on_fetch(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .delete_on_fetch
            .insert(name.to_string());
    }

    /// On every fetch, record whether each of these paths exists
    pub fn observe(&self, paths: Vec<PathBuf>) {
        self.state.lock().unwrap().observed_paths = paths;
    }

    pub fn observations(&self) -> Vec<Vec<bool>> {
        self.state.lock().unwrap().observations.clone()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.state.lock().unwrap().fetches.clone()
    }

    pub fn clear_fetches(&self) {
        self.state.lock().unwrap().fetches.clear();
    }

    pub fn rebuilds(&self) -> usize {
        self.state.lock().unwrap().rebuilds
    }

    pub fn client(&self) -> Box<dyn SecretClient> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl SecretClient for MockRemote {
    async fn list_secrets(&self) -> std::result::Result<HashMap<String, SecretMetadata>, RemoteError> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(RemoteError::Status {
                status: 503,
                url: "mock://secrets".to_string(),
            });
        }
        Ok(state
            .secrets
            .values()
            .map(|s| {
                (
                    s.name.clone(),
                    SecretMetadata {
                        name: s.name.clone(),
                        checksum: s.checksum.clone(),
                    },
                )
            })
            .collect())
    }

    async fn secret(&self, name: &str) -> std::result::Result<Secret, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.fetches.push(name.to_string());
        let seen = state.observed_paths.iter().map(|p| p.exists()).collect();
        if !state.observed_paths.is_empty() {
            state.observations.push(seen);
        }

        if state.delete_on_fetch.contains(name) {
            return Err(RemoteError::Deleted(name.to_string()));
        }
        if state.fail_fetch.contains(name) {
            return Err(RemoteError::Status {
                status: 500,
                url: format!("mock://secret/{}", name),
            });
        }
        state
            .secrets
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::Deleted(name.to_string()))
    }

    fn rebuild(&mut self) -> std::result::Result<(), RemoteError> {
        self.state.lock().unwrap().rebuilds += 1;
        Ok(())
    }
}

/// Hands out a `MockRemote` per client name, creating empty ones on demand
#[derive(Clone, Default)]
pub struct MockConnector {
    remotes: Arc<Mutex<HashMap<String, MockRemote>>>,
    connects: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote(self, name: &str, remote: MockRemote) -> Self {
        self.remotes.lock().unwrap().insert(name.to_string(), remote);
        self
    }

    pub fn remote(&self, name: &str) -> MockRemote {
        self.remotes
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn fail_connect(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    /// Names passed to `connect`, in order
    pub fn connects(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }
}

impl ClientConnector for MockConnector {
    fn connect(&self, name: &str, _config: &ClientConfig) -> Result<Box<dyn SecretClient>> {
        self.connects.lock().unwrap().push(name.to_string());
        if self.failing.lock().unwrap().contains(name) {
            return Err(SyncError::Remote(RemoteError::Identity(format!(
                "no identity for {}",
                name
            ))));
        }
        Ok(self.remote(name).client())
    }
}

/// Client configuration that tests can change between passes
#[derive(Clone, Default)]
pub struct StaticSource {
    clients: Arc<Mutex<BTreeMap<String, ClientConfig>>>,
    fail: Arc<Mutex<bool>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(self, name: &str, config: ClientConfig) -> Self {
        self.set_client(name, config);
        self
    }

    pub fn set_client(&self, name: &str, config: ClientConfig) {
        self.clients.lock().unwrap().insert(name.to_string(), config);
    }

    pub fn remove_client(&self, name: &str) {
        self.clients.lock().unwrap().remove(name);
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

impl ClientConfigSource for StaticSource {
    fn load_clients(&self) -> Result<BTreeMap<String, ClientConfig>> {
        if *self.fail.lock().unwrap() {
            return Err(SyncError::Config("client directory unreadable".to_string()));
        }
        Ok(self.clients.lock().unwrap().clone())
    }
}

/// A client config writing into a directory named after the client
pub fn client_config(name: &str) -> ClientConfig {
    ClientConfig {
        key: PathBuf::from(format!("/keys/{}.key", name)),
        cert: PathBuf::from(format!("/keys/{}.crt", name)),
        user: String::new(),
        group: String::new(),
        directory: name.to_string(),
    }
}
