#![allow(clippy::unwrap_used)]
// ProvisioningApi against the in-memory fake backend.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;

use pserv_api::testing::{FAKE_PASSWORD, FAKE_USER, FakeBackend};
use pserv_api::{Attributes, Error, Fault, ObjectKind, PowerAction, Session, TemplateKind, Transport};
use pserv_core::{
    BootstrapMetadata, CoreError, Deltas, DistroRecord, NodeRecord, PRESEED_KEY, ProfileRecord,
    ProvisioningApi,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn attrs(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

fn no_extra() -> Attributes {
    Attributes::new()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|n| (*n).to_owned()).collect()
}

fn metadata() -> BootstrapMetadata {
    BootstrapMetadata::new(
        Url::parse("http://registry.example.com/metadata/").unwrap(),
        "oauth-credentials",
    )
}

async fn with_node(fake: &FakeBackend, node: &str) -> ProvisioningApi {
    let api = ProvisioningApi::new(fake.session());
    api.add_distro("precise", "/srv/initrd.gz", "/srv/linux", &no_extra()).await.unwrap();
    api.add_profile("precise-amd64", "precise", &no_extra()).await.unwrap();
    api.add_node(node, "precise-amd64", &metadata(), &[], &no_extra()).await.unwrap();
    api
}

fn stored_macs(fake: &FakeBackend, node: &str) -> Vec<String> {
    NodeRecord::from(&fake.stored(ObjectKind::System, node).unwrap()).mac_addresses
}

// ── Creation ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_add_distro() {
    let fake = FakeBackend::new();
    let api = ProvisioningApi::new(fake.session());

    let name = api.add_distro("precise", "/srv/initrd.gz", "/srv/linux", &no_extra()).await.unwrap();

    assert_eq!(name, "precise");
    let distros = api.get_distros_by_name(&names(&["precise"])).await.unwrap();
    assert_eq!(
        distros["precise"],
        DistroRecord {
            name: "precise".into(),
            initrd: Some("/srv/initrd.gz".into()),
            kernel: Some("/srv/linux".into()),
        }
    );
}

#[tokio::test]
async fn test_add_profile() {
    let fake = FakeBackend::new();
    let api = ProvisioningApi::new(fake.session());
    api.add_distro("precise", "/srv/initrd.gz", "/srv/linux", &no_extra()).await.unwrap();

    let name = api.add_profile("precise-amd64", "precise", &no_extra()).await.unwrap();

    let profiles = api.get_profiles_by_name(&[name]).await.unwrap();
    assert_eq!(
        profiles["precise-amd64"],
        ProfileRecord {
            name: "precise-amd64".into(),
            distro: Some("precise".into()),
        }
    );
}

#[tokio::test]
async fn test_add_node_embeds_preseed() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;

    let nodes = api.get_nodes_by_name(&names(&["node-1"])).await.unwrap();
    assert_eq!(nodes["node-1"].profile.as_deref(), Some("precise-amd64"));

    let stored = fake.stored(ObjectKind::System, "node-1").unwrap();
    let preseed = stored["ks_meta"][PRESEED_KEY].as_str().unwrap();
    assert_eq!(preseed, metadata().compose_preseed().unwrap());
    assert!(preseed.contains("maas-metadata-credentials  string oauth-credentials"));
}

#[tokio::test]
async fn test_add_node_twice_replaces_it() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;
    api.add_profile("other", "precise", &no_extra()).await.unwrap();

    api.add_node("node-1", "other", &metadata(), &[], &no_extra()).await.unwrap();

    let nodes = api.get_nodes().await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes["node-1"].profile.as_deref(), Some("other"));
}

#[tokio::test]
async fn test_add_node_with_mac_addresses_and_extra_attributes() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;
    let macs = names(&["11:11:11:11:11:11", "22:22:22:22:22:22"]);

    api.add_node(
        "node-2",
        "precise-amd64",
        &metadata(),
        &macs,
        &attrs(json!({"comment": "rack 4", "netboot-enabled": true})),
    )
    .await
    .unwrap();

    let nodes = api.get_nodes_by_name(&names(&["node-2"])).await.unwrap();
    assert_eq!(nodes["node-2"].mac_addresses, macs);
    let stored = fake.stored(ObjectKind::System, "node-2").unwrap();
    assert_eq!(stored["comment"], json!("rack 4"));
    assert_eq!(stored["netboot_enabled"], json!(true));
}

#[tokio::test]
async fn test_named_arguments_win_over_extra_attributes() {
    let fake = FakeBackend::new();
    let api = ProvisioningApi::new(fake.session());

    api.add_distro(
        "precise",
        "/srv/initrd.gz",
        "/srv/linux",
        &attrs(json!({"kernel": "/elsewhere", "comment": "LTS"})),
    )
    .await
    .unwrap();

    let stored = fake.stored(ObjectKind::Distro, "precise").unwrap();
    assert_eq!(stored["kernel"], json!("/srv/linux"));
    assert_eq!(stored["comment"], json!("LTS"));
}

#[tokio::test]
async fn test_unknown_extra_attribute_is_rejected() {
    let fake = FakeBackend::new();
    let api = ProvisioningApi::new(fake.session());

    let err = api
        .add_profile("p1", "precise", &attrs(json!({"flavour": "vanilla"})))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::ValidationFailed { .. }), "got: {err:?}");
    assert!(fake.stored(ObjectKind::Profile, "p1").is_none());
}

// ── Modification ────────────────────────────────────────────────────

#[tokio::test]
async fn test_modify_distros() {
    let fake = FakeBackend::new();
    let api = ProvisioningApi::new(fake.session());
    api.add_distro("precise", "/srv/initrd.gz", "/srv/linux", &no_extra()).await.unwrap();

    let deltas = Deltas::from([(
        "precise".to_owned(),
        attrs(json!({"initrd": "/new/initrd", "kernel": "/new/linux"})),
    )]);
    api.modify_distros(&deltas).await.unwrap();

    let distros = api.get_distros().await.unwrap();
    assert_eq!(distros["precise"].initrd.as_deref(), Some("/new/initrd"));
    assert_eq!(distros["precise"].kernel.as_deref(), Some("/new/linux"));
}

#[tokio::test]
async fn test_modify_profiles() {
    let fake = FakeBackend::new();
    let api = ProvisioningApi::new(fake.session());
    api.add_distro("precise", "/a", "/b", &no_extra()).await.unwrap();
    api.add_distro("quantal", "/c", "/d", &no_extra()).await.unwrap();
    api.add_profile("p1", "precise", &no_extra()).await.unwrap();

    let deltas = Deltas::from([("p1".to_owned(), attrs(json!({"distro": "quantal"})))]);
    api.modify_profiles(&deltas).await.unwrap();

    let profiles = api.get_profiles().await.unwrap();
    assert_eq!(profiles["p1"].distro.as_deref(), Some("quantal"));
}

#[tokio::test]
async fn test_modify_nodes_sets_mac_addresses() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;

    let deltas = Deltas::from([(
        "node-1".to_owned(),
        attrs(json!({"mac_addresses": ["12:34:56:78:9a:bc"]})),
    )]);
    api.modify_nodes(&deltas).await.unwrap();

    let nodes = api.get_nodes_by_name(&names(&["node-1"])).await.unwrap();
    assert_eq!(nodes["node-1"].mac_addresses, vec!["12:34:56:78:9a:bc"]);
}

#[tokio::test]
async fn test_modify_nodes_removes_mac_addresses() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;
    let both = Deltas::from([(
        "node-1".to_owned(),
        attrs(json!({"mac_addresses": ["11:11:11:11:11:11", "22:22:22:22:22:22"]})),
    )]);
    api.modify_nodes(&both).await.unwrap();

    let one = Deltas::from([(
        "node-1".to_owned(),
        attrs(json!({"mac_addresses": ["22:22:22:22:22:22"]})),
    )]);
    api.modify_nodes(&one).await.unwrap();

    assert_eq!(stored_macs(&fake, "node-1"), vec!["22:22:22:22:22:22"]);
}

#[tokio::test]
async fn test_modify_nodes_sends_one_edit_per_interface_then_the_rest() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;
    api.add_profile("other", "precise", &no_extra()).await.unwrap();
    let before = fake.calls().len();

    let deltas = Deltas::from([(
        "node-1".to_owned(),
        attrs(json!({
            "mac_addresses": ["11:11:11:11:11:11", "22:22:22:22:22:22"],
            "profile": "other",
        })),
    )]);
    api.modify_nodes(&deltas).await.unwrap();

    let edits: Vec<Value> = fake.calls()[before..]
        .iter()
        .filter(|c| c.method == "xapi_object_edit")
        .map(|c| c.params[3].clone())
        .collect();
    assert_eq!(
        edits,
        vec![
            json!({"interface": "eth0", "mac_address": "11:11:11:11:11:11"}),
            json!({"interface": "eth1", "mac_address": "22:22:22:22:22:22"}),
            json!({"profile": "other"}),
        ]
    );
}

#[tokio::test]
async fn test_set_node_mac_addresses_on_missing_node() {
    let fake = FakeBackend::new();
    let api = ProvisioningApi::new(fake.session());

    let err = api
        .set_node_mac_addresses("ghost", &names(&["11:11:11:11:11:11"]))
        .await
        .unwrap_err();

    assert!(err.is_not_found(), "got: {err:?}");
}

#[tokio::test]
async fn test_malformed_mac_list_is_rejected_locally() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;
    let before = fake.calls().len();

    let deltas = Deltas::from([("node-1".to_owned(), attrs(json!({"mac_addresses": "nope"})))]);
    let err = api.modify_nodes(&deltas).await.unwrap_err();

    assert!(matches!(err, CoreError::ValidationFailed { .. }), "got: {err:?}");
    assert_eq!(fake.calls().len(), before);
}

// ── Reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_nodes_returns_all_nodes() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;
    api.add_node("node-2", "precise-amd64", &metadata(), &[], &no_extra()).await.unwrap();

    let nodes = api.get_nodes().await.unwrap();

    assert_eq!(
        nodes.keys().cloned().collect::<Vec<_>>(),
        names(&["node-1", "node-2"])
    );
}

#[tokio::test]
async fn test_get_by_name_skips_unknown_names() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;

    let nodes = api
        .get_nodes_by_name(&names(&["node-1", "ghost"]))
        .await
        .unwrap();

    assert_eq!(nodes.len(), 1);
    assert!(nodes.contains_key("node-1"));
}

#[tokio::test]
async fn test_get_by_name_with_no_names_issues_no_calls() {
    let fake = FakeBackend::new();
    let api = ProvisioningApi::new(fake.session());

    let nodes = api.get_nodes_by_name(&[]).await.unwrap();

    assert_eq!(nodes, BTreeMap::new());
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn test_get_by_name_does_not_fetch_everything() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;

    api.get_nodes_by_name(&names(&["node-1"])).await.unwrap();

    assert!(fake.calls().iter().all(|c| c.method != "get_systems"));
}

// ── Deletion ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_delete_nodes_by_name() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;

    api.delete_nodes_by_name(&names(&["node-1"])).await.unwrap();

    assert!(api.get_nodes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_distro_takes_dependents_with_it() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;

    api.delete_distros_by_name(&names(&["precise"])).await.unwrap();

    assert!(api.get_distros().await.unwrap().is_empty());
    assert!(api.get_profiles().await.unwrap().is_empty());
    assert!(api.get_nodes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;

    api.delete_profiles_by_name(&names(&["precise-amd64"])).await.unwrap();
    api.delete_profiles_by_name(&names(&["precise-amd64", "never-existed"]))
        .await
        .unwrap();

    assert!(api.get_profiles().await.unwrap().is_empty());
}

/// Finds objects normally but reports every removal as already gone,
/// as happens when another client deletes between find and remove.
struct RacingDeletes(FakeBackend);

impl Transport for RacingDeletes {
    fn call<'a>(&'a self, method: &'a str, params: Vec<Value>) -> BoxFuture<'a, Result<Value, Error>> {
        if method.starts_with("remove_") {
            let name = params[0].as_str().unwrap_or_default().to_owned();
            return Box::pin(async move {
                Err(Fault::new(1, format!("<class 'cobbler.cexceptions.CX'>:'Unknown system: {name}.'")).into())
            });
        }
        self.0.call(method, params)
    }
}

#[tokio::test]
async fn test_delete_swallows_already_gone_faults() {
    let fake = FakeBackend::new();
    with_node(&fake, "node-1").await;
    let session = Session::with_transport(
        Url::parse("http://fake-backend.invalid/cobbler_api").unwrap(),
        FAKE_USER,
        SecretString::from(FAKE_PASSWORD),
        Duration::from_secs(5),
        Arc::new(RacingDeletes(fake.clone())),
    );
    let api = ProvisioningApi::new(session);

    api.delete_nodes_by_name(&names(&["node-1"])).await.unwrap();
}

#[tokio::test]
async fn test_delete_surfaces_other_faults() {
    let fake = FakeBackend::new();
    with_node(&fake, "node-1").await;
    let session = fake.session_as(FAKE_USER, "wrong-password");
    let api = ProvisioningApi::new(session);

    let err = api
        .delete_nodes_by_name(&names(&["node-1"]))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::AuthenticationFailed { .. }), "got: {err:?}");
}

// ── Power ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_and_stop_nodes() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;
    api.add_node("node-2", "precise-amd64", &metadata(), &[], &no_extra()).await.unwrap();

    api.start_nodes(&names(&["node-1", "node-2"])).await.unwrap();
    assert_eq!(fake.power_state("node-1"), Some(PowerAction::On));
    assert_eq!(fake.power_state("node-2"), Some(PowerAction::On));

    api.stop_nodes(&names(&["node-2"])).await.unwrap();
    assert_eq!(fake.power_state("node-1"), Some(PowerAction::On));
    assert_eq!(fake.power_state("node-2"), Some(PowerAction::Off));
}

#[tokio::test]
async fn test_power_on_unknown_node_fails() {
    let fake = FakeBackend::new();
    let api = ProvisioningApi::new(fake.session());

    let err = api.start_nodes(&names(&["ghost"])).await.unwrap_err();

    assert!(err.is_not_found(), "got: {err:?}");
}

// ── Sessions ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_expired_token_is_transparent() {
    let fake = FakeBackend::new();
    let api = with_node(&fake, "node-1").await;
    fake.retire_tokens();

    api.delete_nodes_by_name(&names(&["node-1"])).await.unwrap();

    assert_eq!(fake.login_count(), 2);
    assert!(api.get_nodes().await.unwrap().is_empty());
}

// ── Templates ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_templates_and_snippets_are_separate() {
    let fake = FakeBackend::new();
    let api = ProvisioningApi::new(fake.session());

    api.write_template(TemplateKind::Template, "/var/lib/cobbler/kickstarts/node.preseed", "d-i ...")
        .await
        .unwrap();
    api.write_template(TemplateKind::Snippet, "/var/lib/cobbler/snippets/late", "echo done")
        .await
        .unwrap();

    assert_eq!(
        api.list_templates(TemplateKind::Template).await.unwrap(),
        vec!["/var/lib/cobbler/kickstarts/node.preseed"]
    );
    assert_eq!(
        api.read_template(TemplateKind::Snippet, "/var/lib/cobbler/snippets/late")
            .await
            .unwrap(),
        "echo done"
    );
}

#[tokio::test]
async fn test_sync() {
    let fake = FakeBackend::new();
    let api = ProvisioningApi::new(fake.session());

    api.sync().await.unwrap();

    assert_eq!(fake.sync_count(), 1);
}
