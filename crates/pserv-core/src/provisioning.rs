// ── Provisioning API ──
//
// Translates node-registry intents (distros, profiles, nodes) into the
// backend's typed objects. This is the only layer that decides which
// failures are benign: deletes of absent objects and empty lookups.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tracing::debug;

use pserv_api::{Attributes, ObjectKind, ObjectRef, PowerAction, Session, TemplateKind, Templates};

use crate::config::SessionConfig;
use crate::convert::{DistroRecord, NodeRecord, ProfileRecord, postprocess_mapping};
use crate::error::CoreError;
use crate::mac_delta::mac_address_deltas;
use crate::metadata::{BootstrapMetadata, PRESEED_KEY};

/// Per-object attribute changes, keyed by object name.
pub type Deltas = BTreeMap<String, Attributes>;

/// Domain-level facade over one backend session.
#[derive(Debug, Clone)]
pub struct ProvisioningApi {
    session: Session,
}

impl ProvisioningApi {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn connect(config: &SessionConfig) -> Result<Self, CoreError> {
        Ok(Self::new(config.connect()?))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    // ── Creation ─────────────────────────────────────────────────────

    /// Create (or replace) a distribution. Returns its name.
    ///
    /// `extra` carries any further attributes; the named arguments win
    /// over a clashing key.
    pub async fn add_distro(
        &self,
        name: &str,
        initrd: &str,
        kernel: &str,
        extra: &Attributes,
    ) -> Result<String, CoreError> {
        let attributes = with_extra(extra, json!({"initrd": initrd, "kernel": kernel}));
        let distro = ObjectRef::new(&self.session, ObjectKind::Distro, name, &attributes).await?;
        Ok(distro.name().to_owned())
    }

    /// Create (or replace) an install profile on top of `distro`.
    pub async fn add_profile(
        &self,
        name: &str,
        distro: &str,
        extra: &Attributes,
    ) -> Result<String, CoreError> {
        let attributes = with_extra(extra, json!({"distro": distro}));
        let profile =
            ObjectRef::new(&self.session, ObjectKind::Profile, name, &attributes).await?;
        Ok(profile.name().to_owned())
    }

    /// Create (or replace) a node, embedding its bootstrap metadata, then
    /// give it `mac_addresses` one interface at a time.
    pub async fn add_node(
        &self,
        name: &str,
        profile: &str,
        metadata: &BootstrapMetadata,
        mac_addresses: &[String],
        extra: &Attributes,
    ) -> Result<String, CoreError> {
        let preseed = metadata.compose_preseed()?;
        let attributes = with_extra(
            extra,
            json!({
                "profile": profile,
                "hostname": name,
                "ks_meta": {PRESEED_KEY: preseed},
            }),
        );
        let system = ObjectRef::new(&self.session, ObjectKind::System, name, &attributes).await?;
        if !mac_addresses.is_empty() {
            self.reconcile_macs(&system, mac_addresses).await?;
        }
        Ok(system.name().to_owned())
    }

    // ── Modification ─────────────────────────────────────────────────

    pub async fn modify_distros(&self, deltas: &Deltas) -> Result<(), CoreError> {
        self.modify_objects(ObjectKind::Distro, deltas).await
    }

    pub async fn modify_profiles(&self, deltas: &Deltas) -> Result<(), CoreError> {
        self.modify_objects(ObjectKind::Profile, deltas).await
    }

    /// Like the other `modify_*` calls, except that a `mac_addresses`
    /// list is reconciled interface by interface before anything else.
    pub async fn modify_nodes(&self, deltas: &Deltas) -> Result<(), CoreError> {
        for (name, delta) in deltas {
            let mut delta = delta.clone();
            let system = ObjectRef::named(&self.session, ObjectKind::System, name.as_str());

            if let Some(desired) = delta.remove("mac_addresses") {
                let desired = mac_list(name, &desired)?;
                self.reconcile_macs(&system, &desired).await?;
            }
            if !delta.is_empty() {
                system.modify(&delta).await?;
            }
        }
        Ok(())
    }

    /// Replace a node's MAC addresses with `desired`.
    pub async fn set_node_mac_addresses(
        &self,
        name: &str,
        desired: &[String],
    ) -> Result<(), CoreError> {
        let system = ObjectRef::named(&self.session, ObjectKind::System, name);
        self.reconcile_macs(&system, desired).await
    }

    async fn reconcile_macs(&self, system: &ObjectRef, desired: &[String]) -> Result<(), CoreError> {
        let current = system.get_values().await?.ok_or_else(|| CoreError::NotFound {
            entity_type: "Node".into(),
            identifier: system.name().to_owned(),
        })?;
        let interfaces = match current.get("interfaces") {
            Some(Value::Object(interfaces)) => interfaces.clone(),
            _ => Attributes::new(),
        };

        let edits = mac_address_deltas(&interfaces, desired);
        debug!(node = system.name(), edits = edits.len(), "reconciling MAC addresses");
        for edit in &edits {
            system.edit_interface(edit).await?;
        }
        Ok(())
    }

    async fn modify_objects(&self, kind: ObjectKind, deltas: &Deltas) -> Result<(), CoreError> {
        for (name, delta) in deltas {
            ObjectRef::named(&self.session, kind, name.as_str())
                .modify(delta)
                .await?;
        }
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub async fn get_distros(&self) -> Result<BTreeMap<String, DistroRecord>, CoreError> {
        let all = ObjectRef::get_all_values(&self.session, ObjectKind::Distro).await?;
        Ok(postprocess_mapping(all, |attrs| DistroRecord::from(&attrs)))
    }

    pub async fn get_profiles(&self) -> Result<BTreeMap<String, ProfileRecord>, CoreError> {
        let all = ObjectRef::get_all_values(&self.session, ObjectKind::Profile).await?;
        Ok(postprocess_mapping(all, |attrs| ProfileRecord::from(&attrs)))
    }

    pub async fn get_nodes(&self) -> Result<BTreeMap<String, NodeRecord>, CoreError> {
        let all = ObjectRef::get_all_values(&self.session, ObjectKind::System).await?;
        Ok(postprocess_mapping(all, |attrs| NodeRecord::from(&attrs)))
    }

    pub async fn get_distros_by_name(
        &self,
        names: &[String],
    ) -> Result<BTreeMap<String, DistroRecord>, CoreError> {
        let found = self.get_objects_by_name(ObjectKind::Distro, names).await?;
        Ok(postprocess_mapping(found, |attrs| DistroRecord::from(&attrs)))
    }

    pub async fn get_profiles_by_name(
        &self,
        names: &[String],
    ) -> Result<BTreeMap<String, ProfileRecord>, CoreError> {
        let found = self.get_objects_by_name(ObjectKind::Profile, names).await?;
        Ok(postprocess_mapping(found, |attrs| ProfileRecord::from(&attrs)))
    }

    pub async fn get_nodes_by_name(
        &self,
        names: &[String],
    ) -> Result<BTreeMap<String, NodeRecord>, CoreError> {
        let found = self.get_objects_by_name(ObjectKind::System, names).await?;
        Ok(postprocess_mapping(found, |attrs| NodeRecord::from(&attrs)))
    }

    /// Per-name lookups. Names with no matching object are left out.
    async fn get_objects_by_name(
        &self,
        kind: ObjectKind,
        names: &[String],
    ) -> Result<BTreeMap<String, Attributes>, CoreError> {
        let mut found = BTreeMap::new();
        for name in names {
            let criteria = object(json!({"name": name}));
            for object in ObjectRef::find(&self.session, kind, &criteria).await? {
                if let Some(values) = object.get_values().await? {
                    found.insert(object.name().to_owned(), values);
                }
            }
        }
        Ok(found)
    }

    // ── Deletion ─────────────────────────────────────────────────────

    pub async fn delete_distros_by_name(&self, names: &[String]) -> Result<(), CoreError> {
        self.delete_objects_by_name(ObjectKind::Distro, names).await
    }

    pub async fn delete_profiles_by_name(&self, names: &[String]) -> Result<(), CoreError> {
        self.delete_objects_by_name(ObjectKind::Profile, names).await
    }

    pub async fn delete_nodes_by_name(&self, names: &[String]) -> Result<(), CoreError> {
        self.delete_objects_by_name(ObjectKind::System, names).await
    }

    /// Recursive, idempotent delete: objects already gone are skipped.
    async fn delete_objects_by_name(
        &self,
        kind: ObjectKind,
        names: &[String],
    ) -> Result<(), CoreError> {
        for name in names {
            let criteria = object(json!({"name": name}));
            for object in ObjectRef::find(&self.session, kind, &criteria).await? {
                match object.delete(true).await {
                    Err(e) if e.is_not_found() => {
                        debug!(%kind, name = object.name(), "already deleted");
                    }
                    other => other?,
                }
            }
        }
        Ok(())
    }

    // ── Power ────────────────────────────────────────────────────────

    pub async fn start_nodes(&self, names: &[String]) -> Result<(), CoreError> {
        self.power_nodes(PowerAction::On, names).await
    }

    pub async fn stop_nodes(&self, names: &[String]) -> Result<(), CoreError> {
        self.power_nodes(PowerAction::Off, names).await
    }

    async fn power_nodes(&self, action: PowerAction, names: &[String]) -> Result<(), CoreError> {
        if names.is_empty() {
            return Ok(());
        }
        ObjectRef::power_many(&self.session, action, names).await?;
        Ok(())
    }

    // ── Templates and snippets ───────────────────────────────────────

    pub async fn list_templates(&self, kind: TemplateKind) -> Result<Vec<String>, CoreError> {
        Ok(Templates::new(&self.session).list(kind).await?)
    }

    pub async fn read_template(&self, kind: TemplateKind, path: &str) -> Result<String, CoreError> {
        Ok(Templates::new(&self.session).read(kind, path).await?)
    }

    pub async fn write_template(
        &self,
        kind: TemplateKind,
        path: &str,
        contents: &str,
    ) -> Result<(), CoreError> {
        Ok(Templates::new(&self.session).write(kind, path, contents).await?)
    }

    /// Regenerate the backend's netboot configuration.
    pub async fn sync(&self) -> Result<(), CoreError> {
        Ok(Templates::new(&self.session).sync().await?)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn object(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

fn with_extra(extra: &Attributes, fixed: Value) -> Attributes {
    let mut attributes = extra.clone();
    attributes.extend(object(fixed));
    attributes
}

fn mac_list(node: &str, value: &Value) -> Result<Vec<String>, CoreError> {
    let invalid = || CoreError::ValidationFailed {
        message: format!("mac_addresses for node '{node}' must be a list of strings"),
    };
    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|mac| mac.as_str().map(str::to_owned).ok_or_else(invalid))
        .collect()
}
