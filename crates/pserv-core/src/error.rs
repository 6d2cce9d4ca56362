// ── Core error types ──
//
// User-facing errors from pserv-core. Consumers never see raw XML-RPC
// faults or HTTP details; the `From<pserv_api::Error>` impl maps the
// fault taxonomy and transport failures onto domain variants.

use thiserror::Error;

use pserv_api::FaultKind;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to provisioning backend at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("{method} timed out after {timeout_secs}s")]
    Timeout { method: String, timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },

    #[error("Operation rejected by provisioning backend: {message}")]
    Rejected { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// XML-RPC fault code, when the failure was a fault.
        code: Option<i64>,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<pserv_api::Error> for CoreError {
    fn from(err: pserv_api::Error) -> Self {
        use pserv_api::Error as E;

        match err {
            E::Fault(fault) => {
                let message = fault.text().to_owned();
                match fault.kind() {
                    FaultKind::TokenExpired | FaultKind::LoginFailed => {
                        CoreError::AuthenticationFailed { message }
                    }
                    FaultKind::NoSuchProfile => CoreError::NotFound {
                        entity_type: "Profile".into(),
                        identifier: message,
                    },
                    FaultKind::NoSuchObject => CoreError::NotFound {
                        entity_type: "Object".into(),
                        identifier: message,
                    },
                    FaultKind::Generic => CoreError::Rejected { message },
                    FaultKind::NoBackend => CoreError::Api {
                        message,
                        code: Some(fault.code),
                        status: None,
                    },
                }
            }
            E::Login(inner) => {
                if inner.is_timeout() {
                    CoreError::Timeout {
                        method: "login".into(),
                        timeout_secs: match inner.as_ref() {
                            E::Timeout { timeout, .. } => timeout.as_secs(),
                            _ => 0,
                        },
                    }
                } else if let E::Transport(e) = inner.as_ref() {
                    CoreError::ConnectionFailed {
                        url: e.url().map(ToString::to_string).unwrap_or_default(),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::AuthenticationFailed {
                        message: match inner.as_ref() {
                            E::Fault(fault) => fault.text().to_owned(),
                            other => other.to_string(),
                        },
                    }
                }
            }
            E::Refused {
                operation,
                kind,
                name,
            } => CoreError::Rejected {
                message: format!("refused to {operation} {kind} '{name}'"),
            },
            E::Timeout { method, timeout } => CoreError::Timeout {
                method,
                timeout_secs: timeout.as_secs(),
            },
            E::Transport(e) => CoreError::ConnectionFailed {
                url: e
                    .url()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "<unknown>".into()),
                reason: e.to_string(),
            },
            E::HttpStatus { status, body } => CoreError::Api {
                message: body,
                code: None,
                status: Some(status),
            },
            E::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            E::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            E::Decoding { message } => CoreError::Internal(format!("Malformed response: {message}")),
            E::UnsupportedOperation { kind, operation } => CoreError::Unsupported {
                operation: format!("{operation} on {kind}"),
            },
            other @ (E::Encoding { .. }
            | E::UnknownAttribute { .. }
            | E::MissingAttributes { .. }
            | E::NameMismatch { .. }
            | E::NamelessObject { .. }) => CoreError::ValidationFailed {
                message: other.to_string(),
            },
        }
    }
}
