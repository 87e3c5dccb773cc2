//! Field-map helpers
//!
//! Component data is an ordered JSON object (`serde_json::Map`). The
//! engine only ever diffs at the top level: a field changed if it is
//! absent from the previous data or its value compares unequal. Nested
//! values are compared structurally as a whole.

use serde_json::Value;
use std::collections::BTreeSet;

/// Ordered field name → value mapping for one component.
pub type FieldMap = serde_json::Map<String, Value>;

/// Field names in `next` that are new or whose values differ from `prev`.
pub fn changed_fields(prev: &FieldMap, next: &FieldMap) -> Vec<String> {
    next.iter()
        .filter(|(name, value)| prev.get(name.as_str()) != Some(value))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Field names whose values differ between `a` and `b`, in either
/// direction (a field present on only one side counts). Used when a full
/// record replaces another, e.g. during undo/redo replay.
pub fn diff_fields(a: &FieldMap, b: &FieldMap) -> Vec<String> {
    let mut names: Vec<String> = a
        .iter()
        .filter(|(name, value)| b.get(name.as_str()) != Some(value))
        .map(|(name, _)| name.clone())
        .collect();
    for (name, _) in b.iter().filter(|(name, _)| !a.contains_key(name.as_str())) {
        names.push(name.clone());
    }
    names
}

/// Merge `patch` onto `base`; patch fields win.
pub fn merge(base: &FieldMap, patch: &FieldMap) -> FieldMap {
    let mut merged = base.clone();
    for (name, value) in patch {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

/// Project `map` down to the named fields (missing fields are skipped).
pub fn pick(map: &FieldMap, fields: &BTreeSet<String>) -> FieldMap {
    let mut out = FieldMap::new();
    for field in fields {
        if let Some(value) = map.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }
    out
}
