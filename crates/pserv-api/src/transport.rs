// HTTP transport for XML-RPC calls
//
// `Transport` is the seam between the session and the wire: the session
// owns auth and timeouts, a transport only moves one call and its reply.
// `HttpTransport` is the production implementation; tests substitute
// in-memory ones.

use std::path::PathBuf;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::xmlrpc;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// TLS verification mode (api-level mirror of core's `TlsVerification`).
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-signed deployments).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Per-call timeout, enforced by the session rather than by reqwest.
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder =
            reqwest::Client::builder().user_agent(concat!("pserv/", env!("CARGO_PKG_VERSION")));

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

/// Moves one XML-RPC call to the backend and returns its result.
///
/// Implementations must be usable from many tasks at once. Faults come
/// back as `Err(Error::Fault(..))`; the `"~"` none-marker is already
/// repaired in the returned value.
pub trait Transport: Send + Sync {
    fn call<'a>(&'a self, method: &'a str, params: Vec<Value>) -> BoxFuture<'a, Result<Value, Error>>;
}

/// XML-RPC over HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: Url,
}

impl HttpTransport {
    /// Create a transport for `endpoint` from a `TransportConfig`.
    pub fn new(endpoint: Url, config: &TransportConfig) -> Result<Self, Error> {
        let http = config.build_client()?;
        Ok(Self { http, endpoint })
    }

    /// Create a transport with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, endpoint: Url) -> Self {
        Self { http, endpoint }
    }

    /// The XML-RPC endpoint URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, method: &str, params: Vec<Value>) -> Result<Value, Error> {
        let body = xmlrpc::encode_call(method, &params)?;
        debug!(method, endpoint = %self.endpoint, "XML-RPC call");
        trace!(method, bytes = body.len(), "request encoded");

        let resp = self
            .http
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await.map_err(Error::Transport)?;
        trace!(method, bytes = text.len(), "response received");
        xmlrpc::decode_response(&text).map(xmlrpc::repair_none_markers)
    }
}

impl Transport for HttpTransport {
    fn call<'a>(&'a self, method: &'a str, params: Vec<Value>) -> BoxFuture<'a, Result<Value, Error>> {
        Box::pin(self.post(method, params))
    }
}
