// ── Runtime connection configuration ──
//
// Describes *how* to reach one provisioning backend. Carries credentials
// and connection tuning but never touches disk; the owning process
// builds a `SessionConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use pserv_api::{DEFAULT_TIMEOUT, Session, TlsMode, TransportConfig};

use crate::error::CoreError;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs).
    DangerAcceptInvalid,
}

/// Everything needed to open a session against one backend.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// XML-RPC endpoint (e.g. `http://provisioning.example.com/cobbler_api`).
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    pub tls: TlsVerification,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl SessionConfig {
    pub fn new(url: Url, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            url,
            username: username.into(),
            password,
            tls: TlsVerification::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
        }
    }

    /// Build the session. No network traffic happens until the first call.
    pub fn connect(&self) -> Result<Session, CoreError> {
        Ok(Session::new(
            self.url.clone(),
            self.username.clone(),
            self.password.clone(),
            &self.transport_config(),
        )?)
    }
}
