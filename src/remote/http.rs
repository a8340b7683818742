// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! mTLS HTTP client for the secret service.

use crate::config::ClientConfig;
use crate::constants::remote::{LIST_PATH, REQUEST_TIMEOUT_SECS, SECRET_PATH};
use crate::error::{RemoteError, Result};
use crate::remote::{ClientConnector, Secret, SecretClient, SecretMetadata};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;

type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, Deserialize)]
struct SecretListItem {
    name: String,
    checksum: String,
}

#[derive(Deserialize)]
struct SecretResponse {
    name: String,
    /// base64 encoded content
    secret: String,
    checksum: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    group: Option<String>,
}

/// Client for one identity, authenticated with its certificate and key
pub struct HttpSecretClient {
    name: String,
    server: Url,
    ca_file: PathBuf,
    config: ClientConfig,
    http: reqwest::Client,
}

impl HttpSecretClient {
    pub fn new(name: &str, config: &ClientConfig, server: Url, ca_file: &Path) -> RemoteResult<Self> {
        let http = build_http_client(config, ca_file)?;
        Ok(Self {
            name: name.to_string(),
            server,
            ca_file: ca_file.to_path_buf(),
            config: config.clone(),
            http,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.server.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Decode(format!("Server URL {} cannot be a base", self.server)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl SecretClient for HttpSecretClient {
    #[instrument(skip(self), fields(client = %self.name))]
    async fn list_secrets(&self) -> RemoteResult<HashMap<String, SecretMetadata>> {
        let url = self.endpoint(&[LIST_PATH])?;
        let response = self.http.get(url.clone()).send().await.map_err(|e| {
            error!("Failed listing secrets: {}", e);
            RemoteError::Http(e)
        })?;

        if !response.status().is_success() {
            error!("Listing secrets returned {}", response.status());
            return Err(RemoteError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let items: Vec<SecretListItem> = response.json().await?;
        debug!("Server listed {} secrets", items.len());
        Ok(collect_listing(items))
    }

    #[instrument(skip(self), fields(client = %self.name))]
    async fn secret(&self, name: &str) -> RemoteResult<Secret> {
        let url = self.endpoint(&[SECRET_PATH, name])?;
        let response = self.http.get(url.clone()).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(RemoteError::Deleted(name.to_string())),
            status if status.is_success() => {
                let body: SecretResponse = response.json().await?;
                decode_secret(body)
            }
            status => Err(RemoteError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
        }
    }

    fn rebuild(&mut self) -> RemoteResult<()> {
        self.http = build_http_client(&self.config, &self.ca_file)?;
        debug!("Rebuilt HTTP client for {}", self.name);
        Ok(())
    }
}

/// Connector producing `HttpSecretClient`s for the configured server
pub struct HttpConnector {
    server: Url,
    ca_file: PathBuf,
}

impl HttpConnector {
    pub fn new(server: Url, ca_file: impl Into<PathBuf>) -> Self {
        Self {
            server,
            ca_file: ca_file.into(),
        }
    }
}

impl ClientConnector for HttpConnector {
    fn connect(&self, name: &str, config: &ClientConfig) -> Result<Box<dyn SecretClient>> {
        let client = HttpSecretClient::new(name, config, self.server.clone(), &self.ca_file)?;
        Ok(Box::new(client))
    }
}

fn build_http_client(config: &ClientConfig, ca_file: &Path) -> RemoteResult<reqwest::Client> {
    let read = |path: &Path| {
        fs::read(path)
            .map_err(|e| RemoteError::Identity(format!("Failed to read {}: {}", path.display(), e)))
    };

    let mut identity_pem = read(&config.cert)?;
    identity_pem.push(b'\n');
    identity_pem.extend(read(&config.key)?);
    let identity = reqwest::Identity::from_pem(&identity_pem)
        .map_err(|e| RemoteError::Identity(format!("Invalid certificate or key: {}", e)))?;

    let ca = reqwest::Certificate::from_pem(&read(ca_file)?)
        .map_err(|e| RemoteError::Identity(format!("Invalid CA file {}: {}", ca_file.display(), e)))?;

    reqwest::Client::builder()
        .use_rustls_tls()
        .tls_built_in_root_certs(false)
        .add_root_certificate(ca)
        .identity(identity)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(RemoteError::Http)
}

fn collect_listing(items: Vec<SecretListItem>) -> HashMap<String, SecretMetadata> {
    items
        .into_iter()
        .map(|item| {
            (
                item.name.clone(),
                SecretMetadata {
                    name: item.name,
                    checksum: item.checksum,
                },
            )
        })
        .collect()
}

fn decode_secret(body: SecretResponse) -> RemoteResult<Secret> {
    let content = base64::engine::general_purpose::STANDARD
        .decode(body.secret.as_bytes())
        .map_err(|e| RemoteError::Decode(format!("Secret {} is not valid base64: {}", body.name, e)))?;

    Ok(Secret {
        name: body.name,
        content: Bytes::from(content),
        checksum: body.checksum,
        mode: body.mode,
        owner: body.owner,
        group: body.group,
    })
}
