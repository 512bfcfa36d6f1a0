use serde_json::Value;

/// Deep-merges `patch` into `base`: every key in `patch` overwrites the
/// matching key in `base`, except when both sides hold a JSON object, in
/// which case the merge recurses. Arrays and scalars are replaced wholesale.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merges_new_keys_in() {
        let mut base = json!({"a": 1});
        deep_merge(&mut base, &json!({"b": 2}));
        assert_eq!(base, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn overwrites_scalar_leaves() {
        let mut base = json!({"a": 1});
        deep_merge(&mut base, &json!({"a": 2}));
        assert_eq!(base, json!({"a": 2}));
    }

    #[test]
    fn recurses_into_nested_objects() {
        let mut base = json!({"profile": {"level": 1, "coins": 10}});
        deep_merge(&mut base, &json!({"profile": {"level": 2}}));
        assert_eq!(base, json!({"profile": {"level": 2, "coins": 10}}));
    }

    #[test]
    fn replaces_arrays_wholesale() {
        let mut base = json!({"tags": [1, 2, 3]});
        deep_merge(&mut base, &json!({"tags": [4]}));
        assert_eq!(base, json!({"tags": [4]}));
    }
}
