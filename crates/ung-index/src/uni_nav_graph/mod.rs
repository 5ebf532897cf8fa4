//! Unified navigating graph.
//!
//! Vectors are partitioned into groups of identical label sets and stored
//! group by group, so each group owns a contiguous id range. Each group gets
//! its own proximity graph; for general builds, cross-group edges along the
//! label navigation graph join them into one graph over the whole id space.

mod build;
mod cross_edges;
mod persist;
mod search;

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use ung_core::label::LabelSet;
use ung_core::{BuildParams, BuildStats, IdxType, L2Metric, Metric};
use ung_store::{LabeledStore, VectorAttrGraph, VectorStorage};

use crate::cache::SearchCachePool;
use crate::graph::Graph;
use crate::lng::LabelNavGraph;
use crate::trie::LabelTrie;

pub use search::SearchResults;

/// Edge counts and size estimate of a built index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub graph_num_edges: u64,
    pub lng_num_edges: u64,
    pub index_size_mb: f64,
}

pub struct UniNavGraph<M: Metric = L2Metric> {
    params: BuildParams,
    /// Base vectors in group order.
    storage: LabeledStore,
    trie: LabelTrie,
    // Indexed by group id, slot 0 unused.
    group_label_sets: Vec<LabelSet>,
    group_ranges: Vec<(IdxType, IdxType)>,
    /// Global id of each group's designated entry point.
    group_entry_points: Vec<IdxType>,
    new_to_old: Vec<IdxType>,
    new_vec_to_group: Vec<IdxType>,
    graph: Graph,
    global_graph: Graph,
    global_entry_point: Option<IdxType>,
    /// Absent for equality builds.
    lng: Option<LabelNavGraph>,
    vector_attr_graph: VectorAttrGraph,
    build_stats: BuildStats,
    /// Scratch reused by every search call.
    search_caches: SearchCachePool,
    search_pool: Mutex<Option<(usize, Arc<ThreadPool>)>>,
    _metric: PhantomData<M>,
}

impl<M: Metric> std::fmt::Debug for UniNavGraph<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniNavGraph")
            .field("metric", &M::NAME)
            .field("num_points", &self.num_points())
            .field("num_groups", &self.num_groups())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl<M: Metric> UniNavGraph<M> {
    pub fn num_points(&self) -> usize {
        self.storage.len()
    }

    pub fn dim(&self) -> usize {
        self.storage.dim()
    }

    pub fn num_groups(&self) -> usize {
        self.group_ranges.len().saturating_sub(1)
    }

    pub fn params(&self) -> &BuildParams {
        &self.params
    }

    pub fn build_stats(&self) -> &BuildStats {
        &self.build_stats
    }

    /// Reordered base vectors.
    pub fn storage(&self) -> &LabeledStore {
        &self.storage
    }

    pub fn trie(&self) -> &LabelTrie {
        &self.trie
    }

    pub fn group_label_set(&self, group: IdxType) -> &[ung_core::LabelType] {
        &self.group_label_sets[group as usize]
    }

    pub fn group_range(&self, group: IdxType) -> (IdxType, IdxType) {
        self.group_ranges[group as usize]
    }

    pub fn group_of(&self, new_id: IdxType) -> IdxType {
        self.new_vec_to_group[new_id as usize]
    }

    pub fn group_entry_point(&self, group: IdxType) -> IdxType {
        self.group_entry_points[group as usize]
    }

    /// Original id of a reordered vector.
    pub fn old_id(&self, new_id: IdxType) -> IdxType {
        self.new_to_old[new_id as usize]
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn global_graph(&self) -> &Graph {
        &self.global_graph
    }

    pub fn global_entry_point(&self) -> Option<IdxType> {
        self.global_entry_point
    }

    pub fn label_nav_graph(&self) -> Option<&LabelNavGraph> {
        self.lng.as_ref()
    }

    pub fn vector_attr_graph(&self) -> &VectorAttrGraph {
        &self.vector_attr_graph
    }

    pub fn avg_descendants(&self) -> f64 {
        self.lng.as_ref().map_or(0.0, LabelNavGraph::avg_descendants)
    }

    pub fn statistics(&self) -> IndexStatistics {
        let label_bytes: usize = self
            .group_label_sets
            .iter()
            .map(|s| s.len() * std::mem::size_of::<ung_core::LabelType>())
            .sum();
        let id_bytes = std::mem::size_of::<IdxType>()
            * (self.group_ranges.len() * 2 + self.group_entry_points.len() + self.new_to_old.len());
        let bytes =
            label_bytes + id_bytes + self.trie.index_size_bytes() + self.graph.index_size_bytes();

        IndexStatistics {
            graph_num_edges: self.graph.num_edges(),
            lng_num_edges: self.lng.as_ref().map_or(0, LabelNavGraph::num_edges),
            index_size_mb: bytes as f64 / (1024.0 * 1024.0),
        }
    }
}
