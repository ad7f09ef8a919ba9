//! Layout resolution — turns a record's section list plus its layout
//! override into the final, visible section order.
//!
//! # Rules
//! - Ids named in `order` come first, in `order`'s sequence.
//! - Every remaining section follows in the record's own sequence.
//! - Disabled ids never appear; duplicates keep their first position.
//! - Ids in `order` that the record does not have are skipped with a warning.

use std::collections::{BTreeSet, HashSet};

use tracing::warn;

use crate::models::record::Record;

/// Resolves the final ordered, visible section ids.
///
/// Deterministic and idempotent: resolving an already-resolved sequence with
/// an empty override returns it unchanged.
pub fn resolve(
    all_section_ids: &[String],
    order: &[String],
    disabled: &BTreeSet<String>,
) -> Vec<String> {
    let known: HashSet<&str> = all_section_ids.iter().map(String::as_str).collect();
    let mut placed: HashSet<&str> = HashSet::with_capacity(all_section_ids.len());
    let mut resolved = Vec::with_capacity(all_section_ids.len());

    for id in order {
        if !known.contains(id.as_str()) {
            warn!("Layout references unknown section '{id}', skipping");
            continue;
        }
        if disabled.contains(id) || !placed.insert(id.as_str()) {
            continue;
        }
        resolved.push(id.clone());
    }

    for id in all_section_ids {
        if disabled.contains(id) || !placed.insert(id.as_str()) {
            continue;
        }
        resolved.push(id.clone());
    }

    resolved
}

/// Resolves a record against its own layout (or the identity layout).
pub fn resolve_record(record: &Record) -> Vec<String> {
    let ids = record.section_ids();
    match &record.layout {
        Some(layout) => resolve(&ids, &layout.order, &layout.disabled),
        None => resolve(&ids, &[], &BTreeSet::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_override_with_disabled_section() {
        let resolved = resolve(
            &ids(&["header", "summary", "skills"]),
            &ids(&["skills", "header"]),
            &set(&["summary"]),
        );
        assert_eq!(resolved, ids(&["skills", "header"]));
    }

    #[test]
    fn test_empty_override_keeps_record_order() {
        let resolved = resolve(&ids(&["a", "b", "c"]), &[], &BTreeSet::new());
        assert_eq!(resolved, ids(&["a", "b", "c"]));
    }

    #[test]
    fn test_partial_order_appends_remaining_in_record_order() {
        let resolved = resolve(&ids(&["a", "b", "c", "d"]), &ids(&["c"]), &BTreeSet::new());
        assert_eq!(resolved, ids(&["c", "a", "b", "d"]));
    }

    #[test]
    fn test_unknown_ids_in_order_are_skipped() {
        let resolved = resolve(
            &ids(&["a", "b"]),
            &ids(&["ghost", "b"]),
            &BTreeSet::new(),
        );
        assert_eq!(resolved, ids(&["b", "a"]));
    }

    #[test]
    fn test_duplicates_keep_first_occurrence() {
        let resolved = resolve(
            &ids(&["a", "b", "a"]),
            &ids(&["b", "b"]),
            &BTreeSet::new(),
        );
        assert_eq!(resolved, ids(&["b", "a"]));
    }

    #[test]
    fn test_everything_disabled() {
        let resolved = resolve(&ids(&["a", "b"]), &ids(&["a"]), &set(&["a", "b"]));
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_resolve_record_without_layout() {
        let record: Record = serde_json::from_value(serde_json::json!({
            "name": "base",
            "sections": [
                { "id": "header", "kind": "header", "content": { "first_name": "Ada" } },
                { "id": "notes", "kind": "raw", "content": { "content": "x" } }
            ]
        }))
        .unwrap();
        assert_eq!(resolve_record(&record), ids(&["header", "notes"]));
    }

    fn section_ids() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec("[a-f]", 0..8)
    }

    proptest! {
        #[test]
        fn prop_resolved_is_exactly_visible_sections(
            all in section_ids(),
            order in section_ids(),
            disabled in proptest::collection::btree_set("[a-f]", 0..4),
        ) {
            let resolved = resolve(&all, &order, &disabled);

            let expected: BTreeSet<String> = all
                .iter()
                .filter(|id| !disabled.contains(*id))
                .cloned()
                .collect();
            let got: BTreeSet<String> = resolved.iter().cloned().collect();
            prop_assert_eq!(&got, &expected);
            prop_assert_eq!(got.len(), resolved.len());
        }

        #[test]
        fn prop_order_prefix_then_record_order(
            all in section_ids(),
            order in section_ids(),
            disabled in proptest::collection::btree_set("[a-f]", 0..4),
        ) {
            let resolved = resolve(&all, &order, &disabled);

            let mut prefix: Vec<String> = Vec::new();
            for id in &order {
                if all.contains(id) && !disabled.contains(id) && !prefix.contains(id) {
                    prefix.push(id.clone());
                }
            }
            prop_assert_eq!(&resolved[..prefix.len()], &prefix[..]);

            let mut rest: Vec<String> = Vec::new();
            for id in &all {
                if !disabled.contains(id) && !prefix.contains(id) && !rest.contains(id) {
                    rest.push(id.clone());
                }
            }
            prop_assert_eq!(&resolved[prefix.len()..], &rest[..]);
        }

        #[test]
        fn prop_resolve_is_idempotent(
            all in section_ids(),
            order in section_ids(),
            disabled in proptest::collection::btree_set("[a-f]", 0..4),
        ) {
            let once = resolve(&all, &order, &disabled);
            let twice = resolve(&once, &[], &BTreeSet::new());
            prop_assert_eq!(once, twice);
        }
    }
}
