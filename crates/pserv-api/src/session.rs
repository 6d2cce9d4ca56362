// Authenticated RPC session
//
// One `Session` per (endpoint, credentials). It owns the auth token and
// the connection counter, binds the live token into calls at send time,
// coalesces concurrent logins into one round trip, and retries a call
// exactly once when the backend says the token went stale.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::{HttpTransport, Transport, TransportConfig};

/// One positional argument of an RPC call.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A literal value, sent as-is.
    Value(Value),
    /// The session's live auth token, resolved immediately before sending.
    Token,
}

impl Arg {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Snapshot of a session's authentication state.
///
/// Two cookies compare equal only if no login completed between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateCookie(u64);

impl StateCookie {
    /// Number of successful logins this session had performed when captured.
    pub fn connection_count(self) -> u64 {
        self.0
    }
}

type LoginOutcome = Result<(), Arc<Error>>;
type InFlightLogin = Shared<BoxFuture<'static, LoginOutcome>>;

#[derive(Default)]
struct AuthState {
    token: Option<SecretString>,
    connection_count: u64,
    in_flight: Option<InFlightLogin>,
}

struct SessionInner {
    url: Url,
    user: String,
    password: SecretString,
    timeout: Duration,
    transport: Arc<dyn Transport>,
    state: Mutex<AuthState>,
}

impl SessionInner {
    /// The critical section never awaits, so a poisoned lock still holds
    /// consistent state.
    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One bounded round trip. Timeouts never touch auth state.
    async fn issue(&self, method: &str, params: Vec<Value>) -> Result<Value, Error> {
        trace!(method, "issuing RPC");
        match tokio::time::timeout(self.timeout, self.transport.call(method, params)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(method, timeout = ?self.timeout, "RPC timed out");
                Err(Error::Timeout {
                    method: method.to_owned(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

/// Authenticated RPC channel to one provisioning backend.
///
/// Cheaply cloneable; clones share the token and the login guard.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.inner.url.as_str())
            .field("user", &self.inner.user)
            .field("timeout", &self.inner.timeout)
            .field("state", &self.state_cookie())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session talking XML-RPC over HTTP to `url`.
    ///
    /// No network traffic happens until the first call.
    pub fn new(
        url: Url,
        user: impl Into<String>,
        password: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = HttpTransport::new(url.clone(), transport)?;
        Ok(Self::with_transport(
            url,
            user,
            password,
            transport.timeout,
            Arc::new(http),
        ))
    }

    /// Create a session over an arbitrary transport.
    pub fn with_transport(
        url: Url,
        user: impl Into<String>,
        password: SecretString,
        timeout: Duration,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                url,
                user: user.into(),
                password,
                timeout,
                transport,
                state: Mutex::new(AuthState::default()),
            }),
        }
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn user(&self) -> &str {
        &self.inner.user
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Whether a token is currently held. A held token may still be stale.
    pub fn is_authenticated(&self) -> bool {
        self.inner.lock().token.is_some()
    }

    pub fn state_cookie(&self) -> StateCookie {
        StateCookie(self.inner.lock().connection_count)
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Log in, unless a login is already underway, in which case wait for it.
    pub async fn authenticate(&self) -> Result<(), Error> {
        let observed = self.state_cookie();
        self.reauthenticate(observed).await
    }

    /// Refresh the token on behalf of a caller that saw it fail at `observed`.
    ///
    /// A login in flight is always joined, so the caller resumes with a
    /// token at least that fresh. Otherwise, if a login completed since
    /// `observed` and left a token, returns immediately. Otherwise starts
    /// one, clearing the token until it completes.
    async fn reauthenticate(&self, observed: StateCookie) -> Result<(), Error> {
        let login = {
            let mut state = self.inner.lock();
            if let Some(in_flight) = &state.in_flight {
                debug!("joining in-flight login");
                in_flight.clone()
            } else if StateCookie(state.connection_count) != observed && state.token.is_some() {
                debug!("token already refreshed by another caller");
                return Ok(());
            } else {
                debug!(user = %self.inner.user, "starting login");
                state.token = None;
                let login = Self::login(Arc::clone(&self.inner)).boxed().shared();
                state.in_flight = Some(login.clone());
                login
            }
        };
        login.await.map_err(Error::Login)
    }

    /// The one login round trip. Publishes its own outcome into the state.
    async fn login(inner: Arc<SessionInner>) -> LoginOutcome {
        let params = vec![
            Value::String(inner.user.clone()),
            Value::String(inner.password.expose_secret().to_owned()),
        ];
        let result = inner.issue("login", params).await;

        let mut state = inner.lock();
        state.in_flight = None;
        match result {
            Ok(Value::String(token)) => {
                state.token = Some(token.into());
                state.connection_count += 1;
                debug!(connection = state.connection_count, "login succeeded");
                Ok(())
            }
            Ok(other) => Err(Arc::new(Error::Decoding {
                message: format!("login returned {other} instead of a token"),
            })),
            Err(e) => {
                debug!(error = %e, "login failed");
                Err(Arc::new(e))
            }
        }
    }

    // ── Calls ────────────────────────────────────────────────────────

    /// Issue an RPC, substituting the live token for every [`Arg::Token`].
    ///
    /// A call carrying the token logs in first if the session holds none,
    /// and re-authenticates then retries exactly once if the backend
    /// reports the token as expired.
    pub async fn call(&self, method: &str, args: Vec<Arg>) -> Result<Value, Error> {
        let observed = self.state_cookie();
        let uses_token = args.iter().any(|a| matches!(a, Arg::Token));

        if uses_token && !self.is_authenticated() {
            self.reauthenticate(observed).await?;
            return self.inner.issue(method, self.bind(&args)).await;
        }

        match self.inner.issue(method, self.bind(&args)).await {
            Err(e) if uses_token && e.is_auth_expired() => {
                debug!(method, "token expired; re-authenticating and retrying once");
                self.reauthenticate(observed).await?;
                self.inner.issue(method, self.bind(&args)).await
            }
            result => result,
        }
    }

    /// Resolve [`Arg::Token`] against the current token.
    fn bind(&self, args: &[Arg]) -> Vec<Value> {
        let token = self
            .inner
            .lock()
            .token
            .as_ref()
            .map(|t| t.expose_secret().to_owned())
            .unwrap_or_default();
        args.iter()
            .map(|arg| match arg {
                Arg::Value(value) => value.clone(),
                Arg::Token => Value::String(token.clone()),
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn arg_value_converts() {
        assert_eq!(Arg::value("system"), Arg::Value(Value::String("system".into())));
        assert_eq!(Arg::from(Value::Bool(true)), Arg::Value(Value::Bool(true)));
    }

    #[test]
    fn new_sessions_are_unauthenticated() {
        let session = Session::new(
            Url::parse("http://localhost/cobbler_api").unwrap(),
            "user",
            SecretString::from("password"),
            &TransportConfig::default(),
        )
        .unwrap();
        assert!(!session.is_authenticated());
        assert_eq!(session.state_cookie().connection_count(), 0);
        assert_eq!(session.timeout(), crate::transport::DEFAULT_TIMEOUT);
    }

    #[test]
    fn debug_output_hides_password() {
        let session = Session::new(
            Url::parse("http://localhost/cobbler_api").unwrap(),
            "user",
            SecretString::from("hunter2"),
            &TransportConfig::default(),
        )
        .unwrap();
        let rendered = format!("{session:?}");
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("hunter2"));
    }
}
