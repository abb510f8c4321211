//! Property tests checking the tree against a reference multimap.
//!
//! The model is `BTreeMap<u64, Vec<u64>>`; for every key the tree must
//! expose exactly the model's values, one occurrence index each.
//! Occurrence order within a key is unspecified, so comparisons are over
//! sorted value sets.

use std::collections::BTreeMap;

use pagetree::PageTree;
use proptest::prelude::*;

fn assert_tree_matches_reference(tree: &PageTree, reference: &BTreeMap<u64, Vec<u64>>) {
    for (&key, vals) in reference {
        let mut seen: Vec<u64> = (0..vals.len() as u64)
            .map(|occ| {
                let slot = tree
                    .find(key, occ)
                    .unwrap_or_else(|| panic!("key {key} occurrence {occ} missing"));
                u64::from_le_bytes(slot.try_into().unwrap())
            })
            .collect();
        assert!(
            tree.find(key, vals.len() as u64).is_none(),
            "key {key} has phantom occurrence {}",
            vals.len()
        );

        seen.sort_unstable();
        let mut expected = vals.clone();
        expected.sort_unstable();
        assert_eq!(seen, expected, "values of key {key} diverge");
    }
}

fn build(keys: &[u64]) -> (PageTree, BTreeMap<u64, Vec<u64>>) {
    let mut tree = PageTree::new(8).unwrap();
    let mut reference: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for (n, &key) in keys.iter().enumerate() {
        let val = n as u64;
        tree.insert(key).unwrap().copy_from_slice(&val.to_le_bytes());
        reference.entry(key).or_default().push(val);
    }
    (tree, reference)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Wide key space: mostly distinct keys, enough entries to split.
    #[test]
    fn matches_reference_for_sparse_keys(keys in prop::collection::vec(any::<u64>(), 1..1500)) {
        let (tree, reference) = build(&keys);
        prop_assert_eq!(tree.len(), keys.len() as u64);
        assert_tree_matches_reference(&tree, &reference);
    }

    /// Narrow key space: heavy duplication, runs crossing leaf borders.
    #[test]
    fn matches_reference_for_dense_keys(keys in prop::collection::vec(0u64..6, 600..1400)) {
        let (tree, reference) = build(&keys);
        assert_tree_matches_reference(&tree, &reference);

        // a key outside the narrow space is absent
        prop_assert!(tree.find(6, 0).is_none());
    }

    /// Mixed: some keys duplicated a few times, some unique.
    #[test]
    fn matches_reference_for_clustered_keys(keys in prop::collection::vec(0u64..200, 1..1200)) {
        let (tree, reference) = build(&keys);
        assert_tree_matches_reference(&tree, &reference);
    }

    /// Sorted input is the worst case for rightmost-leaf churn.
    #[test]
    fn matches_reference_for_presorted_keys(keys in prop::collection::vec(0u64..10_000, 1..1500)) {
        let mut keys = keys;
        keys.sort_unstable();
        let (tree, reference) = build(&keys);
        assert_tree_matches_reference(&tree, &reference);
    }
}
