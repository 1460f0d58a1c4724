//! Inventory/usage merge
//!
//! One view per inventory record, in inventory order. Usage is matched by
//! `Name` and overlaid on the inventory fields. Usage records without an
//! inventory counterpart are dropped.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::aligner::{self, AlignOptions};
use crate::models::{DeviceView, InventoryRecord, UsageRecord};

/// Which usage record wins when several share a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOptions {
    pub duplicates: DuplicatePolicy,
    pub alignment: AlignOptions,
}

/// Merge both fetched sets into display-ready views.
pub fn merge(
    inventory: &[InventoryRecord],
    usage: &[UsageRecord],
    options: MergeOptions,
) -> Vec<DeviceView> {
    let index = index_usage(usage, options.duplicates);

    inventory
        .iter()
        .map(|record| {
            let mut view = DeviceView::from_inventory(record);
            if let Some(matched) = index.get(record.name.as_str()) {
                apply_usage(&mut view, matched);
                view.aligned_history = aligner::align(&view, options.alignment);
            }
            view
        })
        .collect()
}

/// Names present in usage but not in inventory
pub fn orphaned_usage<'a>(inventory: &[InventoryRecord], usage: &'a [UsageRecord]) -> Vec<&'a str> {
    let known: HashSet<&str> = inventory.iter().map(|r| r.name.as_str()).collect();
    let mut seen = HashSet::new();
    usage
        .iter()
        .map(|u| u.name.as_str())
        .filter(|name| !known.contains(name) && seen.insert(*name))
        .collect()
}

fn index_usage(usage: &[UsageRecord], policy: DuplicatePolicy) -> HashMap<&str, &UsageRecord> {
    let mut index: HashMap<&str, &UsageRecord> = HashMap::with_capacity(usage.len());
    for record in usage {
        let name = record.name.as_str();
        if index.contains_key(name) {
            warn!("Duplicate usage record for {} ({:?} wins)", name, policy);
            if policy == DuplicatePolicy::First {
                continue;
            }
        }
        index.insert(name, record);
    }
    index
}

fn apply_usage(view: &mut DeviceView, usage: &UsageRecord) {
    view.attributes.overlay(&usage.attributes);
    view.has_usage = true;
    view.cpu_history = usage.cpu_history.clone().unwrap_or_default();
    view.mem_history = usage.mem_history.clone().unwrap_or_default();
    view.disk_history = usage.disk_history.clone().unwrap_or_default();
    debug!(
        "Merged usage for {} ({} cpu samples)",
        view.name,
        view.cpu_history.len()
    );
}
