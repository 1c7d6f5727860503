//! Property-based tests for the configurator registries.
//!
//! These tests use proptest to generate registration sequences and verify
//! that the rule and plugin policies hold for all of them.

#[cfg(test)]
mod proptest_tests {
    use crate::configurator::Configurator;
    use crate::descriptor::{deep_merge, ArrayMerge};
    use crate::error::Error;
    use crate::plugins::passthrough;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn rule_name() -> impl Strategy<Value = String> {
        "[a-d]"
    }

    proptest! {
        /// Property: the last registration of a rule name wins, and each
        /// name appears exactly once after resolve
        #[test]
        fn last_rule_registration_wins(
            registrations in prop::collection::vec((rule_name(), 0u32..1000), 1..20)
        ) {
            let mut conf = Configurator::new("/work");
            for (name, marker) in &registrations {
                conf.loader(name, json!({"test": name, "marker": marker}));
            }

            let descriptor = conf.resolve().unwrap();
            let rules = descriptor.rules();

            let mut distinct = Vec::new();
            for name in registrations.iter().map(|(n, _)| n.as_str()) {
                if !distinct.contains(&name) {
                    distinct.push(name);
                }
            }
            prop_assert_eq!(rules.len(), distinct.len());

            for name in distinct {
                let last = registrations
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, m)| *m)
                    .unwrap();
                let matching: Vec<&Value> = rules.iter().filter(|r| r["test"] == name).collect();
                prop_assert_eq!(matching.len(), 1);
                prop_assert_eq!(&matching[0]["marker"], &json!(last));
            }
        }

        /// Property: a duplicate plugin name is rejected and the first
        /// registration stays in place
        #[test]
        fn duplicate_plugin_collides(name in "[a-zA-Z]{1,12}", first in "[a-z]{1,8}", second in "[a-z]{1,8}") {
            let mut conf = Configurator::new("/work");
            conf.plugin(&name, passthrough(&first), vec![]).unwrap();

            let result = conf.plugin(&name, passthrough(&second), vec![]);
            let is_collision = matches!(result, Err(Error::Collision { .. }));
            prop_assert!(is_collision);

            let descriptor = conf.resolve().unwrap();
            prop_assert_eq!(descriptor.plugins().len(), 1);
            prop_assert_eq!(descriptor.plugins()[0].kind(), first.as_str());
        }

        /// Property: resolve is idempotent
        #[test]
        fn resolve_is_idempotent(
            names in prop::collection::vec(rule_name(), 0..10)
        ) {
            let mut conf = Configurator::new("/work");
            for name in &names {
                conf.loader(name, json!({"test": name}));
            }
            let first = conf.resolve().unwrap().to_value();
            let second = conf.resolve().unwrap().to_value();
            prop_assert_eq!(first, second);
        }

        /// Property: merging a patch makes every scalar leaf of the patch
        /// visible in the result
        #[test]
        fn merge_overwrites_scalars(
            base in prop::collection::btree_map("[a-c]", 0i64..100, 0..4),
            patch in prop::collection::btree_map("[a-c]", 0i64..100, 0..4)
        ) {
            let mut target = json!({ "output": base });
            deep_merge(&mut target, &json!({ "output": patch.clone() }), ArrayMerge::Append);
            for (key, value) in &patch {
                prop_assert_eq!(&target["output"][key], &json!(value));
            }
            for (key, value) in &base {
                if !patch.contains_key(key) {
                    prop_assert_eq!(&target["output"][key], &json!(value));
                }
            }
        }
    }
}
