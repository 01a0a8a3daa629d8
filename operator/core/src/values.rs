//! Untyped configuration trees and the overlay merge primitive.
//!
//! Merged values are plain [`serde_json::Value`] trees: every node is a
//! scalar, a sequence, or a string-keyed mapping. All of the overlay layers
//! (profiles, vendor defaults, user values, operator overrides) are expressed
//! as merges over this one representation.

use serde_json::{Map, Value};

/// Merges `overlay` onto `base`, returning the combined tree.
///
/// For each key in `overlay`: if the key is absent from `base` it is copied
/// in; if both sides hold mappings the merge recurses; in every other case
/// the overlay value replaces the base value wholly. Sequences are never
/// merged element-wise and a mapping/scalar conflict is resolved in the
/// overlay's favor, so the merge cannot fail.
///
/// `base` is consumed and reused in place; `overlay` is left untouched.
pub fn merge(base: Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(key) {
                    Some(existing) => merge(existing, value),
                    None => value.clone(),
                };
                base.insert(key.clone(), merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay.clone(),
    }
}

/// Looks up a dotted path (`"global.proxy.image"`) in a tree.
///
/// Returns `None` as soon as a path segment is missing or a non-mapping node
/// is reached before the final segment. An explicit null counts as present.
pub fn get_path<'v>(tree: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .try_fold(tree, |node, segment| node.as_object()?.get(segment))
}

/// Sets the value at a dotted path, creating intermediate mappings as needed.
///
/// Non-mapping nodes along the path are replaced by mappings; the caller is
/// expected to have checked for explicit user values first when the write
/// must not clobber them (see [`set_path_if_unset`]).
pub fn set_path(tree: &mut Value, path: &str, value: Value) {
    if !tree.is_object() {
        *tree = Value::Object(Map::new());
    }
    match path.split_once('.') {
        None => {
            if let Value::Object(map) = tree {
                map.insert(path.to_string(), value);
            }
        }
        Some((head, rest)) => {
            if let Value::Object(map) = tree {
                let child = map.entry(head.to_string()).or_insert(Value::Null);
                set_path(child, rest, value);
            }
        }
    }
}

/// Sets the value at a dotted path only when nothing is there already.
///
/// Returns whether the write happened.
pub fn set_path_if_unset(tree: &mut Value, path: &str, value: Value) -> bool {
    if get_path(tree, path).is_some() {
        return false;
    }
    set_path(tree, path, value);
    true
}
