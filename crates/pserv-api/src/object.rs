// Typed object protocol
//
// Distros, images, profiles, repos and systems share one CRUD protocol.
// Each kind is a row in a static descriptor table declaring its legal
// and mandatory attribute names; the protocol itself lives once, on
// `ObjectRef`.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::Error;
use crate::session::{Arg, Session};

/// Attribute map of one backend object.
pub type Attributes = Map<String, Value>;

// ── Kinds ────────────────────────────────────────────────────────────

/// The kinds of object the backend manages.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ObjectKind {
    Distro,
    Image,
    Profile,
    Repo,
    System,
}

/// Static schema of one object kind.
#[derive(Debug)]
pub struct KindDescriptor {
    /// Singular name, as used in method names (`get_system`).
    pub name: &'static str,
    /// Plural name, as used by the bulk fetch (`get_systems`).
    pub plural: &'static str,
    /// Every attribute name the backend accepts for this kind, spelled
    /// exactly as the backend spells it.
    pub known_attributes: &'static [&'static str],
    /// Attributes that must be present on creation.
    pub required_attributes: &'static [&'static str],
}

static DISTRO: KindDescriptor = KindDescriptor {
    name: "distro",
    plural: "distros",
    known_attributes: &[
        "breed",
        "comment",
        "initrd",
        "kernel",
        "kopts",
        "ksmeta",
        "mgmt-classes",
        "name",
        "os-version",
        "owners",
        "template-files",
    ],
    required_attributes: &["initrd", "kernel", "name"],
};

static IMAGE: KindDescriptor = KindDescriptor {
    name: "image",
    plural: "images",
    known_attributes: &[
        "arch",
        "breed",
        "comment",
        "file",
        "image_type",
        "name",
        "os_version",
        "owners",
        "virt_auto_boot",
        "virt_bridge",
        "virt_cpus",
        "virt_disk_driver",
        "virt_file_size",
        "virt_path",
        "virt_ram",
        "virt_type",
    ],
    required_attributes: &[],
};

static PROFILE: KindDescriptor = KindDescriptor {
    name: "profile",
    plural: "profiles",
    known_attributes: &[
        "distro",
        "comment",
        "enable-menu",
        "kickstart",
        "kopts",
        "kopts_post",
        "mgmt_classes",
        "name",
        "name_servers",
        "name_servers_search",
        "owners",
        "repos",
        "template-files",
        "virt_auto_boot",
        "virt_bridge",
        "virt_cpus",
        "virt_file_size",
        "virt_disk_driver",
        "virt_path",
        "virt_ram",
    ],
    required_attributes: &["name", "distro"],
};

static REPO: KindDescriptor = KindDescriptor {
    name: "repo",
    plural: "repos",
    known_attributes: &[
        "arch",
        "comment",
        "createrepo_flags",
        "environment",
        "keep_updated",
        "mirror",
        "mirror_locally",
        "name",
        "owners",
        "priority",
    ],
    required_attributes: &["name", "mirror"],
};

static SYSTEM: KindDescriptor = KindDescriptor {
    name: "system",
    plural: "systems",
    known_attributes: &[
        "boot_files",
        "comment",
        "fetchable_files",
        "gateway",
        "hostname",
        "interfaces",
        "kernel_options",
        "kickstart",
        "kopts",
        "kopts_post",
        "ks_meta",
        "mgmt_classes",
        "modify_interface",
        "name",
        "name_servers",
        "name_servers_search",
        "netboot_enabled",
        "power_address",
        "power_id",
        "power_pass",
        "power_type",
        "power_user",
        "profile",
        "template_files",
        "uid",
        "virt_path",
        "virt_type",
    ],
    required_attributes: &["name", "profile"],
};

impl ObjectKind {
    pub fn descriptor(self) -> &'static KindDescriptor {
        match self {
            Self::Distro => &DISTRO,
            Self::Image => &IMAGE,
            Self::Profile => &PROFILE,
            Self::Repo => &REPO,
            Self::System => &SYSTEM,
        }
    }

    /// Map a caller-supplied attribute name onto the backend's spelling.
    ///
    /// Tries the name as given, then with `_` replaced by `-`, then with
    /// `-` replaced by `_`. The order matters: the backend is inconsistent
    /// about separators even within a single kind.
    pub fn normalize_attribute(self, attribute: &str) -> Result<&'static str, Error> {
        let known = self.descriptor().known_attributes;
        let lookup = |candidate: &str| known.iter().copied().find(|k| *k == candidate);

        lookup(attribute)
            .or_else(|| lookup(&attribute.replace('_', "-")))
            .or_else(|| lookup(&attribute.replace('-', "_")))
            .ok_or_else(|| Error::UnknownAttribute {
                kind: self,
                attribute: attribute.to_owned(),
            })
    }

    /// Normalize every key of `attributes`.
    pub fn normalize_attributes(self, attributes: &Attributes) -> Result<Attributes, Error> {
        attributes
            .iter()
            .map(|(key, value)| Ok((self.normalize_attribute(key)?.to_owned(), value.clone())))
            .collect()
    }

    /// Keep only attributes this kind declares.
    fn trim(self, attributes: Attributes) -> Attributes {
        let known = self.descriptor().known_attributes;
        attributes
            .into_iter()
            .filter(|(key, _)| known.contains(&key.as_str()))
            .collect()
    }

    fn method(self, prefix: &str, suffix: &str) -> String {
        format!("{prefix}{}{suffix}", self.descriptor().name)
    }
}

// ── Helper types ─────────────────────────────────────────────────────

/// One edit against a system's network interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceEdit {
    /// Set `interface`'s MAC address, creating the interface if needed.
    Assign {
        interface: String,
        mac_address: String,
    },
    /// Remove `interface` entirely.
    Delete { interface: String },
}

impl InterfaceEdit {
    pub fn interface(&self) -> &str {
        match self {
            Self::Assign { interface, .. } | Self::Delete { interface } => interface,
        }
    }

    /// The backend's wire form of this edit.
    pub fn to_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("interface".into(), Value::String(self.interface().to_owned()));
        match self {
            Self::Assign { mac_address, .. } => {
                attributes.insert("mac_address".into(), Value::String(mac_address.clone()));
            }
            Self::Delete { .. } => {
                attributes.insert("delete_interface".into(), Value::Bool(true));
            }
        }
        attributes
    }
}

/// Power operations on systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PowerAction {
    On,
    Off,
    Reboot,
}

/// Truthiness the way the backend's boolean-ish results mean it.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(members) => !members.is_empty(),
    }
}

// ── Object references ────────────────────────────────────────────────

/// Handle on one named backend object.
///
/// Holds no attribute state; every read goes to the backend.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    session: Session,
    kind: ObjectKind,
    name: String,
}

impl ObjectRef {
    /// Reference an object by name, without touching the backend.
    pub fn named(session: &Session, kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            session: session.clone(),
            kind,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn require_name(&self, operation: &'static str) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::NamelessObject {
                kind: self.kind,
                operation,
            });
        }
        Ok(())
    }

    // ── Class-level operations ───────────────────────────────────────

    /// Find objects whose attributes match every glob in `criteria`.
    ///
    /// No criteria matches everything; no match is an empty list.
    pub async fn find(
        session: &Session,
        kind: ObjectKind,
        criteria: &Attributes,
    ) -> Result<Vec<Self>, Error> {
        let criteria = kind.normalize_attributes(criteria)?;
        debug!(%kind, ?criteria, "finding objects");
        let result = session
            .call(&kind.method("find_", ""), vec![Arg::Value(Value::Object(criteria))])
            .await?;

        match result {
            Value::Null => Ok(Vec::new()),
            Value::Array(names) => names
                .into_iter()
                .map(|name| match name {
                    Value::String(name) => Ok(Self::named(session, kind, name)),
                    other => Err(Error::Decoding {
                        message: format!("find_{kind} returned a non-string name: {other}"),
                    }),
                })
                .collect(),
            other => Err(Error::Decoding {
                message: format!("find_{kind} returned {other} instead of a list"),
            }),
        }
    }

    /// Fetch every object of `kind`, keyed by name.
    pub async fn get_all_values(
        session: &Session,
        kind: ObjectKind,
    ) -> Result<BTreeMap<String, Attributes>, Error> {
        let method = format!("get_{}", kind.descriptor().plural);
        let result = session.call(&method, Vec::new()).await?;

        let items = match result {
            Value::Null => return Ok(BTreeMap::new()),
            Value::Array(items) => items,
            other => {
                return Err(Error::Decoding {
                    message: format!("{method} returned {other} instead of a list"),
                });
            }
        };

        let mut all = BTreeMap::new();
        for item in items {
            let Value::Object(attributes) = item else {
                return Err(Error::Decoding {
                    message: format!("{method} returned a non-struct entry"),
                });
            };
            let attributes = kind.trim(attributes);
            let Some(Value::String(name)) = attributes.get("name") else {
                return Err(Error::Decoding {
                    message: format!("{method} returned an entry without a name"),
                });
            };
            all.insert(name.clone(), attributes);
        }
        Ok(all)
    }

    /// Create (or overwrite) an object.
    ///
    /// Attribute names are validated and normalized locally before any
    /// RPC is issued. An existing object of the same name is replaced.
    pub async fn new(
        session: &Session,
        kind: ObjectKind,
        name: &str,
        attributes: &Attributes,
    ) -> Result<Self, Error> {
        let mut args = kind.normalize_attributes(attributes)?;

        match args.get("name") {
            Some(Value::String(given)) if given == name => {}
            Some(other) => {
                return Err(Error::NameMismatch {
                    kind,
                    name: name.to_owned(),
                    attribute: other.to_string(),
                });
            }
            None => {
                args.insert("name".into(), Value::String(name.to_owned()));
            }
        }

        let missing: Vec<String> = kind
            .descriptor()
            .required_attributes
            .iter()
            .filter(|required| !args.contains_key(**required))
            .map(|required| (*required).to_owned())
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingAttributes { kind, missing });
        }

        args.entry("clobber").or_insert(Value::Bool(true));

        debug!(%kind, name, "creating object");
        let success = session
            .call(
                "xapi_object_edit",
                vec![
                    Arg::value(kind.descriptor().name),
                    Arg::value(name),
                    Arg::value("add"),
                    Arg::Value(Value::Object(args)),
                    Arg::Token,
                ],
            )
            .await?;
        if !is_truthy(&success) {
            return Err(Error::Refused {
                operation: "create",
                kind,
                name: name.to_owned(),
            });
        }
        Ok(Self::named(session, kind, name))
    }

    /// Initiate a power operation on several systems at once.
    ///
    /// The backend gives no notification of success or failure.
    pub async fn power_many(
        session: &Session,
        action: PowerAction,
        names: &[String],
    ) -> Result<(), Error> {
        debug!(%action, count = names.len(), "background power operation");
        session
            .call(
                "background_power_system",
                vec![
                    Arg::Value(json!({"power": action.to_string(), "systems": names})),
                    Arg::Token,
                ],
            )
            .await?;
        Ok(())
    }

    // ── Instance-level operations ────────────────────────────────────

    /// This object's current attributes, or `None` if it does not exist.
    pub async fn get_values(&self) -> Result<Option<Attributes>, Error> {
        let result = self
            .session
            .call(&self.kind.method("get_", ""), vec![Arg::value(self.name.as_str())])
            .await?;
        match result {
            Value::Null => Ok(None),
            Value::Object(attributes) => Ok(Some(self.kind.trim(attributes))),
            other => Err(Error::Decoding {
                message: format!("get_{} returned {other} instead of a struct", self.kind),
            }),
        }
    }

    /// Apply attribute changes to this object.
    pub async fn modify(&self, delta: &Attributes) -> Result<(), Error> {
        self.require_name("modify")?;
        let args = self.kind.normalize_attributes(delta)?;
        self.edit("modify", args).await
    }

    /// Apply one network-interface edit. Systems only.
    pub async fn edit_interface(&self, edit: &InterfaceEdit) -> Result<(), Error> {
        if self.kind != ObjectKind::System {
            return Err(Error::UnsupportedOperation {
                kind: self.kind,
                operation: "interface editing",
            });
        }
        self.require_name("modify")?;
        self.edit("modify", edit.to_attributes()).await
    }

    async fn edit(&self, operation: &'static str, args: Attributes) -> Result<(), Error> {
        debug!(kind = %self.kind, name = %self.name, ?args, "editing object");
        let success = self
            .session
            .call(
                "xapi_object_edit",
                vec![
                    Arg::value(self.kind.descriptor().name),
                    Arg::value(self.name.as_str()),
                    Arg::value("edit"),
                    Arg::Value(Value::Object(args)),
                    Arg::Token,
                ],
            )
            .await?;
        if is_truthy(&success) {
            Ok(())
        } else {
            Err(Error::Refused {
                operation,
                kind: self.kind,
                name: self.name.clone(),
            })
        }
    }

    /// Remove this object; with `recurse`, also remove objects depending on it.
    pub async fn delete(&self, recurse: bool) -> Result<(), Error> {
        self.require_name("delete")?;
        debug!(kind = %self.kind, name = %self.name, recurse, "deleting object");
        self.session
            .call(
                &self.kind.method("remove_", ""),
                vec![Arg::value(self.name.as_str()), Arg::Token, Arg::value(recurse)],
            )
            .await?;
        Ok(())
    }

    /// The backend's opaque handle for this object.
    pub async fn handle(&self) -> Result<Value, Error> {
        self.require_name("look up")?;
        self.session
            .call(
                &self.kind.method("get_", "_handle"),
                vec![Arg::value(self.name.as_str()), Arg::Token],
            )
            .await
    }

    /// Initiate a power operation on this system.
    pub async fn power(&self, action: PowerAction) -> Result<(), Error> {
        if self.kind != ObjectKind::System {
            return Err(Error::UnsupportedOperation {
                kind: self.kind,
                operation: "power control",
            });
        }
        let handle = self.handle().await?;
        debug!(name = %self.name, %action, "power operation");
        self.session
            .call(
                "power_system",
                vec![Arg::Value(handle), Arg::value(action.to_string()), Arg::Token],
            )
            .await?;
        Ok(())
    }
}
