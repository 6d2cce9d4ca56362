// In-memory fake provisioning backend
//
// Implements `Transport` by interpreting calls against a local object
// store instead of sending them anywhere. It is internally consistent
// and close enough to the real backend for protocol and translator
// tests: tokens can be retired to simulate expiry, every call is
// recorded, and parameters are checked for wire-encodability.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use secrecy::SecretString;
use serde_json::{Value, json};
use strum::IntoEnumIterator;
use url::Url;

use crate::error::{Error, Fault};
use crate::object::{Attributes, ObjectKind, PowerAction};
use crate::session::Session;
use crate::transport::{DEFAULT_TIMEOUT, Transport};
use crate::xmlrpc;

/// Default credentials accepted by [`FakeBackend::new`].
pub const FAKE_USER: &str = "maas";
pub const FAKE_PASSWORD: &str = "fake-password";

/// One call as the fake received it, after token binding.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Vec<Value>,
}

#[derive(Default)]
struct FakeState {
    passwords: HashMap<String, String>,
    tokens: HashMap<String, String>,
    next_id: u64,
    /// kind → name → attributes
    objects: BTreeMap<ObjectKind, BTreeMap<String, Attributes>>,
    handles: HashMap<String, (ObjectKind, String)>,
    power: HashMap<String, PowerAction>,
    templates: BTreeMap<String, String>,
    snippets: BTreeMap<String, String>,
    calls: Vec<RecordedCall>,
    logins: usize,
    syncs: usize,
}

/// Fake backend; clones share state.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl std::fmt::Debug for FakeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeBackend").finish_non_exhaustive()
    }
}

fn fault(message: impl Into<String>) -> Error {
    Error::Fault(Fault::new(1, message))
}

fn bad_args(method: &str) -> Error {
    fault(format!("<class 'TypeError'>:'bad arguments to {method}'"))
}

fn str_param<'a>(method: &str, params: &'a [Value], index: usize) -> Result<&'a str, Error> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| bad_args(method))
}

fn obj_param<'a>(method: &str, params: &'a [Value], index: usize) -> Result<&'a Attributes, Error> {
    params
        .get(index)
        .and_then(Value::as_object)
        .ok_or_else(|| bad_args(method))
}

/// Shell-style glob supporting `*` and `?`.
fn glob_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || text.get(t) == Some(&c) => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern.get(p..).is_some_and(|rest| rest.iter().all(|c| *c == '*'))
}

impl FakeBackend {
    /// A fake accepting [`FAKE_USER`] / [`FAKE_PASSWORD`].
    pub fn new() -> Self {
        let fake = Self::default();
        fake.add_user(FAKE_USER, FAKE_PASSWORD);
        fake
    }

    pub fn add_user(&self, user: &str, password: &str) {
        self.lock().passwords.insert(user.into(), password.into());
    }

    /// A session against this fake, logged in as [`FAKE_USER`].
    pub fn session(&self) -> Session {
        self.session_as(FAKE_USER, FAKE_PASSWORD)
    }

    pub fn session_as(&self, user: &str, password: &str) -> Session {
        let url = Url::parse("http://fake-backend.invalid/cobbler_api")
            .unwrap_or_else(|_| unreachable!("static URL parses"));
        Session::with_transport(
            url,
            user,
            SecretString::from(password),
            DEFAULT_TIMEOUT,
            Arc::new(self.clone()),
        )
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Inspection and fault injection ──────────────────────────────

    /// Invalidate every issued token, as if they all expired.
    pub fn retire_tokens(&self) {
        self.lock().tokens.clear();
    }

    pub fn login_count(&self) -> usize {
        self.lock().logins
    }

    pub fn sync_count(&self) -> usize {
        self.lock().syncs
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Last power operation applied to the named system.
    pub fn power_state(&self, system: &str) -> Option<PowerAction> {
        self.lock().power.get(system).copied()
    }

    /// Stored attributes of an object, untrimmed.
    pub fn stored(&self, kind: ObjectKind, name: &str) -> Option<Attributes> {
        self.lock().objects.get(&kind).and_then(|m| m.get(name)).cloned()
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    fn dispatch(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
        xmlrpc::encode_call(method, params)?;

        let mut state = self.lock();
        state.calls.push(RecordedCall {
            method: method.to_owned(),
            params: params.to_vec(),
        });

        match method {
            "login" => state.login(str_param(method, params, 0)?, str_param(method, params, 1)?),
            "xapi_object_edit" => {
                let kind = parse_kind(str_param(method, params, 0)?)?;
                let name = str_param(method, params, 1)?;
                let operation = str_param(method, params, 2)?;
                let attrs = obj_param(method, params, 3)?;
                state.check_token(str_param(method, params, 4)?)?;
                state.object_edit(kind, name, operation, attrs.clone())
            }
            "power_system" => {
                state.check_token(str_param(method, params, 2)?)?;
                let handle = str_param(method, params, 0)?;
                let action = parse_power(str_param(method, params, 1)?)?;
                let (_, name) = state
                    .handles
                    .get(handle)
                    .cloned()
                    .ok_or_else(|| fault(format!("Invalid system handle: {handle}")))?;
                state.power.insert(name, action);
                Ok(Value::Bool(true))
            }
            "background_power_system" => {
                state.check_token(str_param(method, params, 1)?)?;
                let args = obj_param(method, params, 0)?;
                let action = parse_power(args.get("power").and_then(Value::as_str).unwrap_or(""))?;
                let names = args
                    .get("systems")
                    .and_then(Value::as_array)
                    .ok_or_else(|| bad_args(method))?;
                for name in names.iter().filter_map(Value::as_str) {
                    state.lookup(ObjectKind::System, name)?;
                    state.power.insert(name.to_owned(), action);
                }
                Ok(Value::Bool(true))
            }
            "read_or_write_kickstart_template" | "read_or_write_snippet" => {
                state.check_token(str_param(method, params, 3)?)?;
                let path = str_param(method, params, 0)?.to_owned();
                let read = params.get(1).and_then(Value::as_bool).ok_or_else(|| bad_args(method))?;
                let contents = str_param(method, params, 2)?.to_owned();
                let store = if method == "read_or_write_snippet" {
                    &mut state.snippets
                } else {
                    &mut state.templates
                };
                if read {
                    store
                        .get(&path)
                        .cloned()
                        .map(Value::String)
                        .ok_or_else(|| fault(format!("<class 'exceptions.KeyError'>:'{path}'")))
                } else {
                    store.insert(path, contents.clone());
                    Ok(Value::String(contents))
                }
            }
            "get_kickstart_templates" => {
                state.check_token(str_param(method, params, 0)?)?;
                Ok(json!(state.templates.keys().collect::<Vec<_>>()))
            }
            "get_snippets" => {
                state.check_token(str_param(method, params, 0)?)?;
                Ok(json!(state.snippets.keys().collect::<Vec<_>>()))
            }
            "sync" => {
                state.check_token(str_param(method, params, 0)?)?;
                state.syncs += 1;
                Ok(Value::Bool(true))
            }
            _ => state.kind_method(method, params),
        }
    }
}

fn parse_kind(name: &str) -> Result<ObjectKind, Error> {
    name.parse()
        .map_err(|_| fault(format!("internal error, unknown object type {name}")))
}

fn parse_power(operation: &str) -> Result<PowerAction, Error> {
    operation
        .parse()
        .map_err(|_| fault(format!("Invalid power operation: {operation}.")))
}

impl FakeState {
    fn login(&mut self, user: &str, password: &str) -> Result<Value, Error> {
        if self.passwords.get(user).map(String::as_str) != Some(password) {
            return Err(fault(format!("login failed ({user})")));
        }
        self.next_id += 1;
        self.logins += 1;
        let token = format!("token-{}-{user}", self.next_id);
        self.tokens.insert(token.clone(), user.to_owned());
        Ok(Value::String(token))
    }

    fn check_token(&self, token: &str) -> Result<(), Error> {
        if self.tokens.contains_key(token) {
            Ok(())
        } else {
            Err(fault(format!("invalid token: {token}")))
        }
    }

    fn lookup(&self, kind: ObjectKind, name: &str) -> Result<&Attributes, Error> {
        self.objects
            .get(&kind)
            .and_then(|m| m.get(name))
            .ok_or_else(|| fault(format!("Unknown {kind}: {name}.")))
    }

    fn handle_for(kind: ObjectKind, name: &str) -> String {
        format!("handle-{kind}-{name}")
    }

    fn object_edit(
        &mut self,
        kind: ObjectKind,
        name: &str,
        operation: &str,
        mut attrs: Attributes,
    ) -> Result<Value, Error> {
        match operation {
            "add" => {
                attrs.insert("name".into(), Value::String(name.to_owned()));
                self.next_id += 1;
                attrs.insert("mtime".into(), json!(self.next_id));
                self.objects.entry(kind).or_default().insert(name.to_owned(), attrs);
                self.handles
                    .insert(Self::handle_for(kind, name), (kind, name.to_owned()));
                Ok(Value::Bool(true))
            }
            "edit" => {
                self.lookup(kind, name)?;
                if kind == ObjectKind::System {
                    if let Some(Value::String(interface)) = attrs.remove("interface") {
                        self.edit_interface(name, &interface, &mut attrs)?;
                    }
                }
                let object = self
                    .objects
                    .get_mut(&kind)
                    .and_then(|m| m.get_mut(name))
                    .ok_or_else(|| fault(format!("Unknown {kind}: {name}.")))?;
                object.extend(attrs);
                Ok(Value::Bool(true))
            }
            "remove" => {
                self.remove(kind, name, true)?;
                Ok(Value::Bool(true))
            }
            other => Err(fault(format!("unsupported xapi operation {other}"))),
        }
    }

    fn edit_interface(
        &mut self,
        system: &str,
        interface: &str,
        attrs: &mut Attributes,
    ) -> Result<(), Error> {
        let object = self
            .objects
            .get_mut(&ObjectKind::System)
            .and_then(|m| m.get_mut(system))
            .ok_or_else(|| fault(format!("Unknown system: {system}.")))?;
        let interfaces = object
            .entry("interfaces")
            .or_insert_with(|| Value::Object(Attributes::new()));
        let Value::Object(interfaces) = interfaces else {
            return Err(fault("corrupt interfaces"));
        };

        if let Some(mac) = attrs.remove("mac_address") {
            interfaces.insert(interface.to_owned(), json!({"mac_address": mac}));
            Ok(())
        } else if attrs.remove("delete_interface").is_some() {
            interfaces.remove(interface);
            Ok(())
        } else {
            Err(fault(
                "Edit operation defined interface but not mac_address or delete_interface",
            ))
        }
    }

    fn remove(&mut self, kind: ObjectKind, name: &str, recurse: bool) -> Result<(), Error> {
        self.lookup(kind, name)?;
        if recurse {
            let dependents = match kind {
                ObjectKind::Distro => Some((ObjectKind::Profile, "distro")),
                ObjectKind::Profile => Some((ObjectKind::System, "profile")),
                _ => None,
            };
            if let Some((dependent_kind, key)) = dependents {
                let names: Vec<String> = self
                    .objects
                    .get(&dependent_kind)
                    .into_iter()
                    .flatten()
                    .filter(|(_, attrs)| attrs.get(key).and_then(Value::as_str) == Some(name))
                    .map(|(n, _)| n.clone())
                    .collect();
                for dependent in names {
                    self.remove(dependent_kind, &dependent, true)?;
                }
            }
        }
        if let Some(objects) = self.objects.get_mut(&kind) {
            objects.remove(name);
        }
        self.handles.remove(&Self::handle_for(kind, name));
        Ok(())
    }

    /// `find_<kind>`, `get_<kind>`, `get_<plural>`, `get_<kind>_handle`, `remove_<kind>`.
    fn kind_method(&mut self, method: &str, params: &[Value]) -> Result<Value, Error> {
        for kind in ObjectKind::iter() {
            let descriptor = kind.descriptor();
            let singular = descriptor.name;

            if method == format!("find_{singular}") {
                let criteria = obj_param(method, params, 0)?;
                let names: Vec<&String> = self
                    .objects
                    .get(&kind)
                    .into_iter()
                    .flatten()
                    .filter(|(_, attrs)| {
                        criteria.iter().all(|(key, pattern)| {
                            match (attrs.get(key).and_then(Value::as_str), pattern.as_str()) {
                                (Some(value), Some(pattern)) => glob_matches(pattern, value),
                                _ => false,
                            }
                        })
                    })
                    .map(|(name, _)| name)
                    .collect();
                return Ok(json!(names));
            }
            if method == format!("get_{singular}") {
                let name = str_param(method, params, 0)?;
                return Ok(self
                    .objects
                    .get(&kind)
                    .and_then(|m| m.get(name))
                    .cloned()
                    .map_or(Value::Null, Value::Object));
            }
            if method == format!("get_{}", descriptor.plural) {
                let all: Vec<Value> = self
                    .objects
                    .get(&kind)
                    .into_iter()
                    .flat_map(|m| m.values().cloned().map(Value::Object))
                    .collect();
                return Ok(Value::Array(all));
            }
            if method == format!("get_{singular}_handle") {
                let name = str_param(method, params, 0)?;
                self.check_token(str_param(method, params, 1)?)?;
                self.lookup(kind, name)?;
                return Ok(Value::String(Self::handle_for(kind, name)));
            }
            if method == format!("remove_{singular}") {
                let name = str_param(method, params, 0)?;
                self.check_token(str_param(method, params, 1)?)?;
                let recurse = params.get(2).and_then(Value::as_bool).unwrap_or(true);
                self.remove(kind, name, recurse)?;
                return Ok(Value::Bool(true));
            }
        }
        Err(fault(format!("<class 'Exception'>:'method \"{method}\" is not supported'")))
    }
}

impl Transport for FakeBackend {
    fn call<'a>(&'a self, method: &'a str, params: Vec<Value>) -> BoxFuture<'a, Result<Value, Error>> {
        Box::pin(async move { self.dispatch(method, &params) })
    }
}
