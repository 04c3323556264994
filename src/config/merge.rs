//! Configuration layer merging
//!
//! Later layers win. Tables merge key by key, so a config file that only
//! sets `direct_mode` keeps every other built-in default.

use serde_json::Value;

/// Merge `overlay` on top of `base`.
///
/// - Objects: merged recursively by key
/// - Anything else: `overlay` replaces `base`
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let value = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in order; the last layer has the highest precedence.
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}
