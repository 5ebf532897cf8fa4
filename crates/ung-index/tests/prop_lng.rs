use std::collections::BTreeSet;

use proptest::prelude::*;
use ung_core::label::{includes, intersects, LabelSet};
use ung_core::{IdxType, LabelType};
use ung_index::lng::{min_super_sets, LabelNavGraph};
use ung_index::LabelTrie;

fn arb_label_set() -> impl Strategy<Value = Vec<LabelType>> {
    proptest::collection::btree_set(1u32..=6, 0..4).prop_map(|s| s.into_iter().collect())
}

/// Trie and group label sets (slot 0 unused) of the distinct sets in `sets`.
fn groups(sets: &[Vec<LabelType>]) -> (LabelTrie, Vec<LabelSet>) {
    let mut trie = LabelTrie::new();
    let mut label_sets = vec![LabelSet::new()];
    for set in sets {
        let g = trie.insert(set) as usize;
        if g == label_sets.len() {
            label_sets.push(set.iter().copied().collect());
        }
    }
    (trie, label_sets)
}

fn strict_superset(sup: &[LabelType], sub: &[LabelType]) -> bool {
    sup.len() > sub.len() && includes(sup, sub)
}

/// Members of `candidates` with no other candidate strictly inside them.
fn minimal(label_sets: &[LabelSet], candidates: &[IdxType]) -> Vec<IdxType> {
    let mut out: Vec<IdxType> = candidates
        .iter()
        .copied()
        .filter(|&g| {
            !candidates
                .iter()
                .any(|&h| strict_superset(&label_sets[g as usize], &label_sets[h as usize]))
        })
        .collect();
    out.sort_unstable();
    out
}

fn sorted(mut v: Vec<IdxType>) -> Vec<IdxType> {
    v.sort_unstable();
    v
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn test_containment_entrances_are_minimal_supersets(
        sets in proptest::collection::vec(arb_label_set(), 1..20),
        query in arb_label_set(),
    ) {
        let (trie, label_sets) = groups(&sets);
        let ids: Vec<IdxType> = (1..label_sets.len() as IdxType).collect();

        let supersets: Vec<IdxType> = ids
            .iter()
            .copied()
            .filter(|&g| includes(&label_sets[g as usize], &query))
            .collect();
        prop_assert_eq!(
            sorted(min_super_sets(&trie, &label_sets, &query, false, true)),
            minimal(&label_sets, &supersets)
        );

        let overlapping: Vec<IdxType> = ids
            .iter()
            .copied()
            .filter(|&g| intersects(&label_sets[g as usize], &query))
            .collect();
        prop_assert_eq!(
            sorted(min_super_sets(&trie, &label_sets, &query, false, false)),
            minimal(&label_sets, &overlapping)
        );
    }

    #[test]
    fn test_lng_edges_are_minimal_strict_supersets(
        sets in proptest::collection::vec(arb_label_set(), 1..20),
    ) {
        let (trie, label_sets) = groups(&sets);
        let lng = LabelNavGraph::build(&trie, &label_sets);
        let num_groups = label_sets.len() - 1;
        prop_assert_eq!(lng.num_groups(), num_groups);

        for a in 1..=num_groups as IdxType {
            let strict: Vec<IdxType> = (1..=num_groups as IdxType)
                .filter(|&b| strict_superset(&label_sets[b as usize], &label_sets[a as usize]))
                .collect();
            prop_assert_eq!(sorted(lng.out_neighbors(a).to_vec()), minimal(&label_sets, &strict));
            for &b in lng.in_neighbors(a) {
                prop_assert!(lng.out_neighbors(b).contains(&a));
            }
        }
    }

    #[test]
    fn test_coverage_and_descendants_follow_out_edges(
        sets in proptest::collection::vec(arb_label_set(), 1..20),
        sizes in proptest::collection::vec(1u32..4, 20),
    ) {
        let (trie, label_sets) = groups(&sets);
        let num_groups = label_sets.len() - 1;
        let mut ranges = vec![(0, 0)];
        let mut next = 0;
        for g in 1..=num_groups {
            ranges.push((next, next + sizes[g - 1]));
            next += sizes[g - 1];
        }

        let mut lng = LabelNavGraph::build(&trie, &label_sets);
        lng.cal_descendants();
        prop_assert_eq!(lng.cal_coverage_ratio(&ranges, next as usize), 0);

        for a in 1..=num_groups as IdxType {
            let expected: BTreeSet<u32> = (1..=num_groups as IdxType)
                .filter(|&b| strict_superset(&label_sets[b as usize], &label_sets[a as usize]))
                .collect();
            let descendants: BTreeSet<u32> = lng.descendants(a).iter().collect();
            prop_assert_eq!(&descendants, &expected);
            prop_assert_eq!(lng.descendants_num(a), expected.len() as u64);

            let covered = lng.covered_set(a);
            let (start, end) = ranges[a as usize];
            prop_assert!((start..end).all(|id| covered.contains(id)));
            for &b in &expected {
                prop_assert!(covered.is_superset(lng.covered_set(b)));
            }
            let ratio = covered.len() as f64 / f64::from(next);
            prop_assert!((lng.coverage_ratio(a) - ratio).abs() < 1e-12);
        }
    }
}
