//! Concatenate-slice merge of YAML mappings

use serde_yaml::{Mapping, Value};

/// Merges `overlay` into `base`.
///
/// Nested mappings merge recursively, sequences present on both sides are
/// concatenated (base first), and every other value in `overlay` replaces
/// the one in `base`.
pub fn merge_concat_slice(mut base: Mapping, overlay: Mapping) -> Mapping {
    for (key, incoming) in overlay {
        if let Some(existing) = base.get_mut(&key) {
            merge_value(existing, incoming);
        } else {
            base.insert(key, incoming);
        }
    }
    base
}

fn merge_value(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Mapping(current), Value::Mapping(overlay)) => {
            let taken = std::mem::take(current);
            *current = merge_concat_slice(taken, overlay);
        }
        (Value::Sequence(current), Value::Sequence(overlay)) => current.extend(overlay),
        (slot, replacement) => *slot = replacement,
    }
}
