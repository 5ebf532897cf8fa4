//! Exact filtered nearest neighbors and recall against them.

use ordered_float::OrderedFloat;
use rayon::prelude::*;
use ung_core::label;
use ung_core::{IdxType, Metric, Scenario};
use ung_store::VectorStorage;

use crate::uni_nav_graph::SearchResults;

/// Exact top-`k` ids of `base` admitted by each query under `scenario`,
/// nearest first. Ties are broken by id.
pub fn filtered_brute_force<M, B, Q>(
    base: &B,
    queries: &Q,
    scenario: Scenario,
    k: usize,
) -> Vec<Vec<IdxType>>
where
    M: Metric,
    B: VectorStorage + ?Sized,
    Q: VectorStorage + ?Sized,
{
    (0..queries.num_points() as IdxType)
        .into_par_iter()
        .map(|q| {
            let query = queries.vector(q);
            let labels = queries.label_set(q);
            let mut hits: Vec<(OrderedFloat<f32>, IdxType)> = (0..base.num_points() as IdxType)
                .filter(|&id| label::satisfies(scenario, labels, base.label_set(id)))
                .map(|id| (OrderedFloat(M::distance(query, base.vector(id))), id))
                .collect();
            hits.sort_unstable();
            hits.truncate(k);
            hits.into_iter().map(|(_, id)| id).collect()
        })
        .collect()
}

/// Fraction of each query's true neighbors found in `results`.
///
/// A query with no admissible vector scores 1.
pub fn recall(results: &SearchResults, ground_truth: &[Vec<IdxType>]) -> Vec<f32> {
    ground_truth
        .iter()
        .enumerate()
        .map(|(q, truth)| {
            let truth = &truth[..truth.len().min(results.k())];
            if truth.is_empty() {
                return 1.0;
            }
            let found = results
                .ids(q)
                .iter()
                .filter(|&&id| id >= 0 && truth.contains(&(id as IdxType)))
                .count();
            found as f32 / truth.len() as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ung_core::L2Metric;
    use ung_store::LabeledStore;

    fn base() -> LabeledStore {
        let mut store = LabeledStore::new(1);
        for (x, labels) in [(0.0, vec![1]), (1.0, vec![1, 2]), (2.0, vec![2]), (3.0, vec![1, 2])] {
            store.push(&[x], labels).unwrap();
        }
        store
    }

    #[test]
    fn test_brute_force_respects_filter() {
        let base = base();
        let mut queries = LabeledStore::new(1);
        queries.push(&[2.9], [1, 2]).unwrap();
        queries.push(&[0.0], [2]).unwrap();
        queries.push(&[0.0], [7]).unwrap();

        let truth = filtered_brute_force::<L2Metric, _, _>(&base, &queries, Scenario::Containment, 3);
        assert_eq!(truth[0], vec![3, 1]);
        assert_eq!(truth[1], vec![1, 2, 3]);
        assert!(truth[2].is_empty());

        let truth = filtered_brute_force::<L2Metric, _, _>(&base, &queries, Scenario::Equality, 3);
        assert_eq!(truth[1], vec![2]);
    }

    #[test]
    fn test_recall() {
        let base = base();
        let mut queries = LabeledStore::new(1);
        queries.push(&[0.0], [1]).unwrap();
        queries.push(&[0.0], [9]).unwrap();
        let truth = filtered_brute_force::<L2Metric, _, _>(&base, &queries, Scenario::Containment, 2);
        assert_eq!(truth[0], vec![0, 1]);

        let mut results = SearchResults::new(2, 2);
        results.set_row(0, [(1, 1.0), (3, 9.0)].into_iter());
        let recalls = recall(&results, &truth);
        assert!((recalls[0] - 0.5).abs() < 1e-6);
        assert!((recalls[1] - 1.0).abs() < 1e-6);
    }
}
