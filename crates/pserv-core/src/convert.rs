// ── Backend → domain projections ──
//
// Reduce raw backend attribute maps to the fields the node registry
// consumes. Everything else the backend returns is dropped here.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use pserv_api::Attributes;

/// A node as the registry sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRecord {
    pub name: String,
    pub profile: Option<String>,
    pub mac_addresses: Vec<String>,
}

/// An install profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileRecord {
    pub name: String,
    pub distro: Option<String>,
}

/// A bootable distribution: installer kernel plus initrd.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistroRecord {
    pub name: String,
    pub initrd: Option<String>,
    pub kernel: Option<String>,
}

// ── Helper functions ─────────────────────────────────────────────────

fn string_field(attributes: &Attributes, key: &str) -> Option<String> {
    attributes.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// Flatten `{interface: {mac_address}}` into a list, skipping blanks.
///
/// Interfaces are taken in natural order of their names (`eth2` before
/// `eth10`), so the list follows the `ethN` numbering the MAC delta assigns.
pub fn mac_addresses(attributes: &Attributes) -> Vec<String> {
    let Some(Value::Object(interfaces)) = attributes.get("interfaces") else {
        return Vec::new();
    };
    let mut ordered: Vec<(&String, &Value)> = interfaces.iter().collect();
    ordered.sort_by(|(a, _), (b, _)| interface_order(a).cmp(&interface_order(b)));
    ordered
        .into_iter()
        .filter_map(|(_, iface)| iface.get("mac_address").and_then(Value::as_str))
        .filter(|mac| !mac.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Sort key splitting `eth10` into (`eth`, 10); names without a numeric
/// suffix sort after numbered siblings of the same prefix.
fn interface_order(name: &str) -> (&str, (u8, u64), &str) {
    let prefix = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let number = name.get(prefix.len()..).and_then(|digits| digits.parse::<u64>().ok());
    (prefix, number.map_or((1, 0), |n| (0, n)), name)
}

/// Apply `f` to every value of a name-keyed mapping.
pub fn postprocess_mapping<V, W>(
    mapping: BTreeMap<String, V>,
    mut f: impl FnMut(V) -> W,
) -> BTreeMap<String, W> {
    mapping.into_iter().map(|(name, value)| (name, f(value))).collect()
}

// ── Projections ──────────────────────────────────────────────────────

impl From<&Attributes> for NodeRecord {
    fn from(attributes: &Attributes) -> Self {
        Self {
            name: string_field(attributes, "name").unwrap_or_default(),
            profile: string_field(attributes, "profile"),
            mac_addresses: mac_addresses(attributes),
        }
    }
}

impl From<&Attributes> for ProfileRecord {
    fn from(attributes: &Attributes) -> Self {
        Self {
            name: string_field(attributes, "name").unwrap_or_default(),
            distro: string_field(attributes, "distro"),
        }
    }
}

impl From<&Attributes> for DistroRecord {
    fn from(attributes: &Attributes) -> Self {
        Self {
            name: string_field(attributes, "name").unwrap_or_default(),
            initrd: string_field(attributes, "initrd"),
            kernel: string_field(attributes, "kernel"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn attributes(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => Attributes::new(),
        }
    }

    #[test]
    fn postprocess_mapping_maps_values() {
        let data = BTreeMap::from([
            ("sad".to_owned(), "wings"),
            ("of".to_owned(), "destiny"),
        ]);
        let observed = postprocess_mapping(data, str::to_uppercase);
        assert_eq!(
            observed,
            BTreeMap::from([
                ("sad".to_owned(), "WINGS".to_owned()),
                ("of".to_owned(), "DESTINY".to_owned()),
            ])
        );
    }

    #[test]
    fn mac_addresses_follow_interface_numbering() {
        let raw = attributes(json!({
            "interfaces": {
                "eth10": {"mac_address": "00:00:00:00:00:10"},
                "eth2": {"mac_address": "00:00:00:00:00:02"},
                "bond0": {"mac_address": "00:00:00:00:00:b0"},
                "eth0": {"mac_address": "00:00:00:00:00:00"},
            },
        }));

        assert_eq!(
            mac_addresses(&raw),
            vec![
                "00:00:00:00:00:b0",
                "00:00:00:00:00:00",
                "00:00:00:00:00:02",
                "00:00:00:00:00:10",
            ]
        );
    }

    #[test]
    fn node_projection_flattens_interfaces() {
        let raw = attributes(json!({
            "name": "iced",
            "profile": "earth",
            "interfaces": {
                "eth0": {"mac_address": "12:34:56:78:9a:bc"},
                "eth1": {"mac_address": ""},
            },
            "ju": "nk",
        }));
        assert_eq!(
            NodeRecord::from(&raw),
            NodeRecord {
                name: "iced".into(),
                profile: Some("earth".into()),
                mac_addresses: vec!["12:34:56:78:9a:bc".into()],
            }
        );
    }

    #[test]
    fn node_projection_without_interfaces() {
        let raw = attributes(json!({"name": "iced", "profile": "earth", "ju": "nk"}));
        assert_eq!(NodeRecord::from(&raw).mac_addresses, Vec::<String>::new());
    }

    #[test]
    fn profile_projection_keeps_distro() {
        let raw = attributes(json!({"name": "paradise", "distro": "lost", "draconian": "times"}));
        assert_eq!(
            ProfileRecord::from(&raw),
            ProfileRecord {
                name: "paradise".into(),
                distro: Some("lost".into()),
            }
        );
    }

    #[test]
    fn distro_projection_keeps_boot_files() {
        let raw = attributes(json!({
            "name": "strapping",
            "initrd": "young",
            "kernel": "lad",
            "alien": "city",
        }));
        assert_eq!(
            DistroRecord::from(&raw),
            DistroRecord {
                name: "strapping".into(),
                initrd: Some("young".into()),
                kernel: Some("lad".into()),
            }
        );
    }

    #[test]
    fn records_serialize_with_plain_field_names() {
        let record = NodeRecord {
            name: "n1".into(),
            profile: None,
            mac_addresses: vec![],
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"name": "n1", "profile": null, "mac_addresses": []})
        );
    }
}
