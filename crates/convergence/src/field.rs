//! Attribute diff producing a minimal patch

use crate::types::Attributes;
use serde_json::Value;

/// Compute the patch that brings `observed` to `desired`.
///
/// Only keys declared in `desired` are considered, so a partial declaration
/// leaves every other attribute alone. A key lands in the patch when its
/// observed value is missing or not deeply equal. Arrays under a key listed in
/// `unordered_keys` are compared as sets; every other array is a sequence.
pub fn diff(desired: &Attributes, observed: &Attributes, unordered_keys: &[&str]) -> Attributes {
    desired
        .iter()
        .filter(|(key, wanted)| {
            let unordered = unordered_keys.contains(&key.as_str());
            observed
                .get(key.as_str())
                .is_none_or(|current| !values_match(wanted, current, unordered))
        })
        .map(|(key, wanted)| (key.clone(), wanted.clone()))
        .collect()
}

/// Apply a patch onto an attribute bag.
///
/// Counterpart of [`diff`]: `apply(observed, diff(desired, observed))` agrees
/// with `desired` on every desired key.
pub fn apply(observed: &mut Attributes, patch: &Attributes) {
    for (key, value) in patch {
        observed.insert(key.clone(), value.clone());
    }
}

fn values_match(wanted: &Value, current: &Value, unordered: bool) -> bool {
    match (wanted, current) {
        (Value::Array(a), Value::Array(b)) if unordered => {
            a.iter().all(|item| b.contains(item)) && b.iter().all(|item| a.contains(item))
        }
        _ => wanted == current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_changed_scalar_is_patched() {
        let patch = diff(
            &attrs(json!({"permission": "push"})),
            &attrs(json!({"permission": "pull", "name": "eng"})),
            &[],
        );
        assert_eq!(patch, attrs(json!({"permission": "push"})));
    }

    #[test]
    fn test_equal_values_produce_empty_patch() {
        let patch = diff(
            &attrs(json!({"active": true})),
            &attrs(json!({"active": true, "events": ["push"]})),
            &[],
        );
        assert!(patch.is_empty());
    }

    #[test]
    fn test_undeclared_keys_are_never_touched() {
        let patch = diff(&Attributes::new(), &attrs(json!({"permission": "admin"})), &[]);
        assert!(patch.is_empty());
    }

    #[test]
    fn test_missing_observed_key_is_patched() {
        let patch = diff(&attrs(json!({"active": false})), &Attributes::new(), &[]);
        assert_eq!(patch, attrs(json!({"active": false})));
    }

    #[test]
    fn test_unordered_events_ignore_order() {
        let patch = diff(
            &attrs(json!({"events": ["push", "pull_request"]})),
            &attrs(json!({"events": ["pull_request", "push"]})),
            &["events"],
        );
        assert!(patch.is_empty());
    }

    #[test]
    fn test_unordered_events_detect_membership_change() {
        let patch = diff(
            &attrs(json!({"events": ["push"]})),
            &attrs(json!({"events": ["push", "fork"]})),
            &["events"],
        );
        assert_eq!(patch, attrs(json!({"events": ["push"]})));
    }

    #[test]
    fn test_ordered_arrays_compare_as_sequences() {
        let patch = diff(
            &attrs(json!({"steps": ["a", "b"]})),
            &attrs(json!({"steps": ["b", "a"]})),
            &[],
        );
        assert_eq!(patch.len(), 1);
    }

    #[test]
    fn test_nested_config_compared_deeply() {
        let desired = attrs(json!({"config": {"url": "https://ci", "content_type": "json"}}));
        let same = attrs(json!({"config": {"content_type": "json", "url": "https://ci"}}));
        let changed = attrs(json!({"config": {"url": "https://ci", "content_type": "form"}}));
        let extra = attrs(json!({"config": {"url": "https://ci", "content_type": "json", "room": "x"}}));

        assert!(diff(&desired, &same, &[]).is_empty());
        assert_eq!(diff(&desired, &changed, &[]), desired);
        assert_eq!(diff(&desired, &extra, &[]), desired);
    }

    #[test]
    fn test_apply_overwrites_patched_keys() {
        let mut observed = attrs(json!({"permission": "pull", "name": "eng"}));
        apply(&mut observed, &attrs(json!({"permission": "push"})));
        assert_eq!(observed, attrs(json!({"permission": "push", "name": "eng"})));
    }

    fn bag() -> impl Strategy<Value = Attributes> {
        prop::collection::btree_map("[a-d]", (0..3i64).prop_map(Value::from), 0..4)
    }

    proptest! {
        #[test]
        fn prop_patch_is_minimal(desired in bag(), observed in bag()) {
            let patch = diff(&desired, &observed, &[]);
            for (key, value) in &patch {
                prop_assert_eq!(desired.get(key), Some(value));
                prop_assert_ne!(observed.get(key), Some(value));
            }
        }

        #[test]
        fn prop_applying_patch_converges(desired in bag(), observed in bag()) {
            let patch = diff(&desired, &observed, &[]);
            let mut converged = observed.clone();
            apply(&mut converged, &patch);

            for (key, value) in &desired {
                prop_assert_eq!(converged.get(key), Some(value));
            }
            prop_assert!(diff(&desired, &converged, &[]).is_empty());
        }
    }
}
