//! # Delta Engine
//!
//! Forward deltas between two full bundles. A delta is itself a bundle: added or
//! changed entities as entities, removed entities as deletes. For any two
//! successive bundles `combine(&delta(&previous, &current), &previous) == current`.
//! Deletes carried by the inputs are ignored; snapshots hold desired entities only.

use crate::bundle::Bundle;

/// Change-set turning `previous` into `current`
pub fn delta(previous: &Bundle, current: &Bundle) -> Bundle {
    let mut change = Bundle::new();

    for (section, entities) in current.sections() {
        for (identity, entity) in entities {
            if previous.get(section, identity) != Some(entity) {
                change.insert(section, identity.clone(), entity.clone());
            }
        }
    }

    for (section, entities) in previous.sections() {
        for identity in entities.keys() {
            if current.get(section, identity).is_none() {
                change.tombstone(section, identity.clone());
            }
        }
    }
    change
}

/// Apply `delta` to `previous`
pub fn combine(delta: &Bundle, previous: &Bundle) -> Bundle {
    let mut combined = previous.without_deletes();
    for (section, names) in delta.deletes() {
        for name in names {
            combined.remove(section, name);
        }
    }
    combined.merge(delta.without_deletes());
    combined
}
