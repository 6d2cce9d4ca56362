// ── MAC address reconciliation ──
//
// The backend models a system's MAC addresses as one sub-record per
// network interface. Callers think in flat lists. This module computes
// the interface edits that turn the former into the latter.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde_json::Value;

use pserv_api::{Attributes, InterfaceEdit};

/// Current `{interface: mac}` pairs, skipping interfaces with no address.
fn current_addresses(interfaces: &Attributes) -> BTreeMap<&str, &str> {
    interfaces
        .iter()
        .filter_map(|(name, iface)| {
            let mac = iface.get("mac_address").and_then(Value::as_str)?;
            (!mac.is_empty()).then_some((name.as_str(), mac))
        })
        .collect()
}

/// Compute the edits reconciling `interfaces` with the `desired` MACs.
///
/// Deletions come first, in interface-name order. Additions follow in
/// the order of `desired`, each taking the lowest free `ethN` name not
/// held by a retained interface. A deleted interface's name is free for
/// reuse, so the same name may appear as a delete and then an assign.
/// Interfaces whose address is still wanted produce no edit.
pub fn mac_address_deltas(interfaces: &Attributes, desired: &[String]) -> Vec<InterfaceEdit> {
    let current = current_addresses(interfaces);
    let wanted: HashSet<&str> = desired.iter().map(String::as_str).collect();

    let mut edits = Vec::new();
    let mut retained_names = BTreeSet::new();
    let mut retained_macs = HashSet::new();

    for (name, mac) in &current {
        if wanted.contains(mac) {
            retained_names.insert(*name);
            retained_macs.insert(*mac);
        } else {
            edits.push(InterfaceEdit::Delete {
                interface: (*name).to_owned(),
            });
        }
    }

    let mut next_index = 0_usize;
    let mut seen = HashSet::new();
    for mac in desired {
        if retained_macs.contains(mac.as_str()) || !seen.insert(mac.as_str()) {
            continue;
        }
        let interface = loop {
            let candidate = format!("eth{next_index}");
            next_index += 1;
            if !retained_names.contains(candidate.as_str()) {
                break candidate;
            }
        };
        edits.push(InterfaceEdit::Assign {
            interface,
            mac_address: mac.clone(),
        });
    }

    edits
}
