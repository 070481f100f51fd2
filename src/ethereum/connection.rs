//! HTTP(S) session to the node.
//!
//! A [`Connection`] is immutable: enabling TLS or authenticating produces a new
//! connection, so one value can be shared freely between contracts and tasks.

use alloy::{
    providers::{ProviderBuilder, RootProvider},
    rpc::client::RpcClient,
    transports::http::{Client, Http},
};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Certificate, Url,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::error::{ConnectionError, Error, Result};

/// JSON-RPC provider sharing the connection's HTTP client.
pub type NodeProvider = RootProvider<Http<Client>>;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(1);

/// How server certificates are verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    /// No verification at all. The default, kept for compatibility with
    /// existing deployments using self-signed node certificates.
    Disabled,
    /// Verify against the system trust store.
    SystemTrust,
    /// Verify only against the CA bundle at this path.
    PinnedCa(PathBuf),
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

#[derive(Clone)]
pub struct Connection {
    node_url: String,
    rpc_url: Url,
    request_timeout: Duration,
    tls: TlsMode,
    auth_token: Option<String>,
    client: Client,
}

impl Connection {
    pub fn new(node_url: &str) -> Result<Self> {
        Self::with_timeout(node_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(node_url: &str, request_timeout: Duration) -> Result<Self> {
        let rpc_url = Url::parse(node_url)
            .map_err(|e| Error::Configuration(format!("Invalid node URL '{}': {}", node_url, e)))?;

        if rpc_url.scheme() == "https" {
            warn!(
                "Certificate verification is disabled for {}; call with_tls() to enable it",
                node_url
            );
        }

        let client = build_client(node_url, request_timeout, &TlsMode::Disabled, None)?;

        Ok(Self {
            node_url: node_url.trim_end_matches('/').to_string(),
            rpc_url,
            request_timeout,
            tls: TlsMode::Disabled,
            auth_token: None,
            client,
        })
    }

    /// Returns a connection that verifies the node's certificate.
    ///
    /// Without a path the system trust store is used; with one, only the CA
    /// bundle in that file is trusted. Fails on anything but an https URL.
    pub fn with_tls(&self, ca_cert_path: Option<&Path>) -> Result<Self> {
        if self.rpc_url.scheme() != "https" {
            return Err(Error::Configuration(format!(
                "Cannot enable TLS on non-https url '{}'",
                self.node_url
            )));
        }

        let tls = match ca_cert_path {
            Some(path) => TlsMode::PinnedCa(path.to_path_buf()),
            None => TlsMode::SystemTrust,
        };
        let client = build_client(
            &self.node_url,
            self.request_timeout,
            &tls,
            self.auth_token.as_deref(),
        )?;

        debug!("TLS enabled for {} ({:?})", self.node_url, tls);
        Ok(Self {
            tls,
            client,
            ..self.clone()
        })
    }

    /// Logs in and returns a connection that sends the bearer token on every request.
    ///
    /// On failure the error names the user and the node; `self` is left as is.
    pub async fn with_authentication(&self, username: &str, password: &str) -> Result<Self> {
        let login_url = self.endpoint("login");
        let auth_error = |reason: String| ConnectionError::Authentication {
            username: username.to_string(),
            url: self.node_url.clone(),
            reason,
        };

        let response = self
            .client
            .post(&login_url)
            .json(&serde_json::json!({
                "username": username,
                "password": password,
            }))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| auth_error(describe(&e)))?;

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| auth_error(format!("Invalid login response: {}", e)))?;

        let token = login
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| auth_error("No token received from login response".to_string()))?;

        let client = build_client(&self.node_url, self.request_timeout, &self.tls, Some(&token))?;

        info!("Authenticated as '{}' at {}", username, self.node_url);
        Ok(Self {
            auth_token: Some(token),
            client,
            ..self.clone()
        })
    }

    /// Polls `GET {url}/liveness` until it answers 2xx or `timeout` elapses.
    pub async fn wait_for_liveness(&self, timeout: Duration, poll_interval: Duration) -> Result<()> {
        let liveness_url = self.endpoint("liveness");
        let deadline = Instant::now() + timeout;
        let mut last_error = "no response received".to_string();

        while Instant::now() < deadline {
            match self.client.get(&liveness_url).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Node at {} is live", self.node_url);
                    return Ok(());
                }
                Ok(response) => last_error = format!("HTTP status {}", response.status()),
                Err(e) => last_error = describe(&e),
            }
            debug!("Node at {} not live yet: {}", self.node_url, last_error);
            sleep(poll_interval).await;
        }

        Err(ConnectionError::NotLive {
            url: self.node_url.clone(),
            liveness_url,
            timeout,
            last_error,
        }
        .into())
    }

    /// JSON-RPC provider that shares this connection's TLS and auth settings.
    pub fn get_provider(&self) -> NodeProvider {
        let transport = Http::with_client(self.client.clone(), self.rpc_url.clone());
        ProviderBuilder::new().on_client(RpcClient::new(transport, false))
    }

    pub fn url(&self) -> &str {
        &self.node_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn tls(&self) -> &TlsMode {
        &self.tls
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_token.is_some()
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.node_url, name)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("node_url", &self.node_url)
            .field("request_timeout", &self.request_timeout)
            .field("tls", &self.tls)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

fn build_client(
    node_url: &str,
    request_timeout: Duration,
    tls: &TlsMode,
    token: Option<&str>,
) -> Result<Client> {
    let mut builder = Client::builder().timeout(request_timeout);

    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| Error::Configuration(format!("Invalid bearer token: {}", e)))?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        builder = builder.default_headers(headers);
    }

    builder = match tls {
        TlsMode::Disabled => builder.danger_accept_invalid_certs(true),
        TlsMode::SystemTrust => builder,
        TlsMode::PinnedCa(path) => {
            let pem = std::fs::read(path).map_err(|e| {
                Error::Configuration(format!(
                    "Failed to read CA certificate {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let certificates = Certificate::from_pem_bundle(&pem).map_err(|e| {
                Error::Configuration(format!(
                    "Invalid CA certificate {}: {}",
                    path.display(),
                    e
                ))
            })?;
            if certificates.is_empty() {
                return Err(Error::Configuration(format!(
                    "No certificates found in {}",
                    path.display()
                )));
            }
            certificates
                .into_iter()
                .fold(builder.tls_built_in_root_certs(false), |builder, cert| {
                    builder.add_root_certificate(cert)
                })
        }
    };

    builder.build().map_err(|e| {
        Error::Configuration(format!("Failed to build HTTP client for {}: {}", node_url, e))
    })
}

/// Flattens an error and its sources into one line.
fn describe(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
