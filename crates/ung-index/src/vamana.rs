//! Vamana proximity graph over one contiguous id range.
//!
//! Construction runs two insertion passes over a shuffled order, first with
//! `alpha = 1` and then with the configured alpha. Each insertion searches
//! from the medoid, robust-prunes the visited candidates into the node's
//! list and adds the reverse edges, re-pruning any list that overflows.

use std::marker::PhantomData;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use ung_core::{IdxType, Metric};
use ung_store::VectorStorage;

use crate::cache::SearchCache;
use crate::graph::GraphView;
use crate::search_queue::Candidate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VamanaParams {
    pub max_degree: usize,
    pub l_build: usize,
    pub alpha: f32,
}

pub struct Vamana<'a, S: VectorStorage, M: Metric> {
    storage: S,
    graph: GraphView<'a>,
    params: VamanaParams,
    entry_point: IdxType,
    _marker: PhantomData<M>,
}

impl<'a, S: VectorStorage, M: Metric> Vamana<'a, S, M> {
    pub fn new(storage: S, graph: GraphView<'a>, params: VamanaParams) -> Self {
        debug_assert_eq!(storage.num_points(), graph.len());
        Self {
            storage,
            graph,
            params,
            entry_point: 0,
            _marker: PhantomData,
        }
    }

    /// Wraps an already built graph.
    pub fn with_entry_point(
        storage: S,
        graph: GraphView<'a>,
        params: VamanaParams,
        entry_point: IdxType,
    ) -> Self {
        Self {
            entry_point,
            ..Self::new(storage, graph, params)
        }
    }

    pub fn entry_point(&self) -> IdxType {
        self.entry_point
    }

    /// Builds the graph. With `parallel` the insertions of each pass are
    /// spread over the current rayon pool.
    pub fn build(&mut self, parallel: bool, seed: u64) {
        let n = self.storage.num_points();
        if n <= 1 {
            self.entry_point = 0;
            return;
        }
        self.entry_point = select_medoid::<S, M>(&self.storage);

        let mut order: Vec<IdxType> = (0..n as IdxType).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));

        for alpha in [1.0, self.params.alpha] {
            if parallel {
                order.par_iter().for_each_init(
                    || SearchCache::new(n, self.params.l_build),
                    |cache, &node| self.insert_node(node, alpha, cache),
                );
            } else {
                let mut cache = SearchCache::new(n, self.params.l_build);
                for &node in &order {
                    self.insert_node(node, alpha, &mut cache);
                }
            }
        }
    }

    /// Greedy best-first search from `entry_points`. Returns the number of
    /// distance computations.
    pub fn iterate_to_fixed_point(
        &self,
        query: &[f32],
        cache: &mut SearchCache,
        entry_points: &[IdxType],
    ) -> u64 {
        iterate_to_fixed_point::<S, M>(&self.storage, self.graph, query, cache, entry_points)
    }

    fn insert_node(&self, node: IdxType, alpha: f32, cache: &mut SearchCache) {
        let n = self.storage.num_points();
        cache.visited.ensure_len(n);
        cache.visited.clear();
        cache.search_queue.reserve(self.params.l_build);

        let query = self.storage.vector(node);
        self.iterate_to_fixed_point(query, cache, &[self.entry_point]);

        let mut candidates: Vec<Candidate> = cache
            .search_queue
            .iter()
            .filter(|c| c.id != node)
            .map(|c| Candidate::new(c.id, c.distance))
            .collect();
        for nb in self.graph.neighbors(node) {
            candidates.push(Candidate::new(nb, M::distance(query, self.storage.vector(nb))));
        }

        let pruned = self.robust_prune(node, candidates, alpha);
        self.graph.set_neighbors(node, pruned.clone());

        for nb in pruned {
            if self.graph.add_neighbor(nb, node) > self.params.max_degree {
                self.prune_neighbors(nb, alpha);
            }
        }
    }

    /// Keeps a candidate only if no kept neighbor `k` satisfies
    /// `alpha * d(k, c) <= d(node, c)`.
    fn robust_prune(&self, node: IdxType, mut candidates: Vec<Candidate>, alpha: f32) -> Vec<IdxType> {
        candidates.sort_unstable();
        candidates.dedup_by_key(|c| c.id);

        let mut kept: Vec<IdxType> = Vec::with_capacity(self.params.max_degree);
        for cand in candidates {
            if kept.len() >= self.params.max_degree {
                break;
            }
            if cand.id == node {
                continue;
            }
            let cand_vec = self.storage.vector(cand.id);
            let occluded = kept
                .iter()
                .any(|&k| alpha * M::distance(self.storage.vector(k), cand_vec) <= cand.distance);
            if !occluded {
                kept.push(cand.id);
            }
        }
        kept
    }

    fn prune_neighbors(&self, node: IdxType, alpha: f32) {
        // 1. Snapshot current links.
        let initial = self.graph.neighbors(node);

        // 2. Distances and pruning without holding the lock.
        let node_vec = self.storage.vector(node);
        let candidates = initial
            .iter()
            .map(|&nb| Candidate::new(nb, M::distance(node_vec, self.storage.vector(nb))))
            .collect();
        let mut keepers = self.robust_prune(node, candidates, alpha);

        // 3. Write back, keeping links that arrived after the snapshot.
        let max_degree = self.params.max_degree;
        self.graph.update_neighbors(node, |links| {
            for &id in links.iter() {
                if keepers.len() >= max_degree {
                    break;
                }
                if !initial.contains(&id) && !keepers.contains(&id) {
                    keepers.push(id);
                }
            }
            *links = keepers;
        });
    }
}

/// Greedy best-first traversal shared by construction and query routing.
///
/// Entry points are marked visited and seeded into the queue; the caller
/// controls whether queue and visited set start empty.
pub fn iterate_to_fixed_point<S, M>(
    storage: &S,
    graph: GraphView<'_>,
    query: &[f32],
    cache: &mut SearchCache,
    entry_points: &[IdxType],
) -> u64
where
    S: VectorStorage + ?Sized,
    M: Metric,
{
    let SearchCache {
        search_queue,
        visited,
        ..
    } = cache;

    for &ep in entry_points {
        visited.set(ep);
        search_queue.insert(ep, M::distance(query, storage.vector(ep)));
    }
    let mut num_cmps = entry_points.len() as u64;

    while let Some(cur) = search_queue.get_closest_unexpanded() {
        graph.with_neighbors(cur.id, |neighbors| {
            for (i, &nb) in neighbors.iter().enumerate() {
                if let Some(&next) = neighbors.get(i + 1) {
                    if !visited.check(next) {
                        storage.prefetch(next);
                    }
                }
                if !visited.insert(nb) {
                    continue;
                }
                search_queue.insert(nb, M::distance(query, storage.vector(nb)));
                num_cmps += 1;
            }
        });
    }
    num_cmps
}

/// Point closest to the centroid.
pub fn select_medoid<S: VectorStorage + ?Sized, M: Metric>(storage: &S) -> IdxType {
    let n = storage.num_points();
    if n <= 1 {
        return 0;
    }
    let mut centroid = vec![0.0f32; storage.dim()];
    for id in 0..n as IdxType {
        for (c, &v) in centroid.iter_mut().zip(storage.vector(id)) {
            *c += v;
        }
    }
    for c in &mut centroid {
        *c /= n as f32;
    }

    let mut best = (0, f32::MAX);
    for id in 0..n as IdxType {
        let d = M::distance(&centroid, storage.vector(id));
        if d < best.1 {
            best = (id, d);
        }
    }
    best.0
}

/// Connects every point to every other point.
pub fn build_complete_graph(graph: GraphView<'_>, num_points: usize) {
    let n = num_points as IdxType;
    for i in 0..n {
        graph.set_neighbors(i, (0..n).filter(|&j| j != i).collect());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use ung_core::L2Metric;
    use ung_store::LabeledStore;

    fn grid(n: usize) -> LabeledStore {
        let mut store = LabeledStore::new(2);
        for i in 0..n {
            let x = (i % 10) as f32;
            let y = (i / 10) as f32;
            store.push(&[x, y], [1]).unwrap();
        }
        store
    }

    fn params() -> VamanaParams {
        VamanaParams {
            max_degree: 8,
            l_build: 32,
            alpha: 1.2,
        }
    }

    #[test]
    fn test_medoid_is_central() {
        let store = grid(9);
        // Points (0..9, 0): centroid x = 4.
        assert_eq!(select_medoid::<_, L2Metric>(&store), 4);
    }

    #[test]
    fn test_build_respects_degree_and_finds_neighbors() {
        let store = grid(100);
        let graph = Graph::new(100);
        let mut vamana = Vamana::<_, L2Metric>::new(&store, graph.view(0, 100), params());
        vamana.build(false, 7);

        for id in 0..100 {
            let list = graph.neighbors(id);
            assert!(list.len() <= 8, "node {id} has degree {}", list.len());
            assert!(!list.contains(&id));
        }

        let mut cache = SearchCache::new(100, 32);
        let query = [3.1, 4.2];
        vamana.iterate_to_fixed_point(&query, &mut cache, &[vamana.entry_point()]);
        assert_eq!(cache.search_queue.get(0).unwrap().id, 43);
    }

    #[test]
    fn test_parallel_build_reaches_every_node() {
        let store = grid(60);
        let graph = Graph::new(60);
        let mut vamana = Vamana::<_, L2Metric>::new(&store, graph.view(0, 60), params());
        vamana.build(true, 1);

        for target in 0..60u32 {
            let mut cache = SearchCache::new(60, 32);
            vamana.iterate_to_fixed_point(store.vector(target), &mut cache, &[vamana.entry_point()]);
            assert_eq!(cache.search_queue.get(0).unwrap().id, target);
        }
    }

    #[test]
    fn test_complete_graph() {
        let graph = Graph::new(4);
        build_complete_graph(graph.view(1, 3), 3);
        assert!(graph.neighbors(0).is_empty());
        assert_eq!(graph.neighbors(1), vec![1, 2]);
        assert_eq!(graph.neighbors(3), vec![0, 1]);
    }
}
