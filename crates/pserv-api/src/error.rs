use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::object::ObjectKind;

/// The backend wraps its own exceptions as `<class '...CX'>:'<text>'`.
const CX_PREFIX: &str = "<class 'cobbler.cexceptions.CX'>:'";

/// Fault code the backend uses for every error raised by its object layer.
const BACKEND_FAULT_CODE: i64 = 1;

/// A structured error returned by an XML-RPC call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i64,
    pub message: String,
}

impl Fault {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The fault message with the backend's exception wrapper removed.
    ///
    /// Messages that don't carry the wrapper are returned unchanged.
    pub fn text(&self) -> &str {
        self.message
            .strip_prefix(CX_PREFIX)
            .and_then(|rest| rest.rfind('\'').map(|end| &rest[..end]))
            .unwrap_or(&self.message)
    }

    /// Classify this fault.
    ///
    /// This is the only place in the workspace that inspects fault text.
    /// The backend has no error codes beyond "it failed", so the message
    /// prefix is the contract.
    pub fn kind(&self) -> FaultKind {
        if self.code != BACKEND_FAULT_CODE {
            return FaultKind::NoBackend;
        }
        let text = self.text();
        let lowered = text.to_ascii_lowercase();
        if text.starts_with("login failed") {
            FaultKind::LoginFailed
        } else if text.starts_with("invalid token:") {
            FaultKind::TokenExpired
        } else if text.starts_with("invalid profile name") {
            FaultKind::NoSuchProfile
        } else if lowered.starts_with("unknown ") || lowered.starts_with("internal error, unknown ")
        {
            FaultKind::NoSuchObject
        } else {
            FaultKind::Generic
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault {}: {}", self.code, self.text())
    }
}

/// What a [`Fault`] means to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FaultKind {
    /// The auth token is stale or was never valid. Retried once by the session.
    TokenExpired,
    /// The backend rejected the configured user name or password.
    LoginFailed,
    /// A system referenced a profile that does not exist.
    NoSuchProfile,
    /// The named object does not exist (or no longer exists).
    NoSuchObject,
    /// Any other backend error.
    Generic,
    /// The fault came from something in front of the backend, not the backend itself.
    NoBackend,
}

/// Top-level error type for the `pserv-api` crate.
///
/// Local validation failures (`UnknownAttribute`, `MissingAttributes`,
/// `NameMismatch`, `NamelessObject`, `Encoding`) are raised before any
/// request leaves the process. `pserv-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Backend ─────────────────────────────────────────────────────
    /// The backend answered with an XML-RPC fault.
    #[error("backend {0}")]
    Fault(Fault),

    /// Logging in failed. Shared by every caller that waited on the same login.
    #[error("login failed: {0}")]
    Login(Arc<Error>),

    /// The backend reported failure through a falsy result instead of a fault.
    #[error("backend refused to {operation} {kind} '{name}'")]
    Refused {
        operation: &'static str,
        kind: ObjectKind,
        name: String,
    },

    // ── Transport ───────────────────────────────────────────────────
    /// No response arrived within the per-call timeout.
    #[error("call to {method} timed out after {}s", .timeout.as_secs())]
    Timeout { method: String, timeout: Duration },

    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success HTTP status.
    #[error("backend returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Wire format ─────────────────────────────────────────────────
    /// The call could not be expressed as XML-RPC.
    #[error("cannot encode call to {method}: {reason}")]
    Encoding { method: String, reason: String },

    /// The response was not a well-formed XML-RPC response.
    #[error("malformed XML-RPC response: {message}")]
    Decoding { message: String },

    // ── Local validation ────────────────────────────────────────────
    #[error("unknown attribute for {kind}: {attribute}")]
    UnknownAttribute { kind: ObjectKind, attribute: String },

    #[error("required attributes for {kind} missing: {}", .missing.join(", "))]
    MissingAttributes {
        kind: ObjectKind,
        missing: Vec<String>,
    },

    #[error("creating {kind} called '{name}', but its 'name' attribute is {attribute}")]
    NameMismatch {
        kind: ObjectKind,
        name: String,
        attribute: String,
    },

    #[error("can't {operation} {kind}: its name is not known")]
    NamelessObject {
        kind: ObjectKind,
        operation: &'static str,
    },

    #[error("{operation} is not supported for {kind} objects")]
    UnsupportedOperation {
        kind: ObjectKind,
        operation: &'static str,
    },
}

impl Error {
    /// The fault classification, if this error carries a backend fault.
    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            Self::Fault(fault) => Some(fault.kind()),
            Self::Login(inner) => inner.fault_kind(),
            _ => None,
        }
    }

    /// Returns `true` if the auth token expired and a fresh login may help.
    pub fn is_auth_expired(&self) -> bool {
        self.fault_kind() == Some(FaultKind::TokenExpired)
    }

    /// Returns `true` if the backend did not answer in time.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Login(inner) => inner.is_timeout(),
            _ => false,
        }
    }

    /// Returns `true` if the named object does not exist on the backend.
    pub fn is_not_found(&self) -> bool {
        self.fault_kind() == Some(FaultKind::NoSuchObject)
    }

    /// Returns `true` for failures detected locally, before any RPC was issued.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownAttribute { .. }
                | Self::MissingAttributes { .. }
                | Self::NameMismatch { .. }
                | Self::NamelessObject { .. }
                | Self::UnsupportedOperation { .. }
                | Self::Encoding { .. }
        )
    }
}

impl From<Fault> for Error {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}
