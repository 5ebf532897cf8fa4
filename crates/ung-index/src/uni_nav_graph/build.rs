use std::marker::PhantomData;
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use ung_core::label::LabelSet;
use ung_core::{BuildParams, BuildScenario, BuildStats, IdxType, Metric, Result, UngError};
use ung_store::{LabeledStore, VectorAttrGraph, VectorStorage};

use super::UniNavGraph;
use crate::cache::SearchCachePool;
use crate::graph::Graph;
use crate::lng::LabelNavGraph;
use crate::trie::LabelTrie;
use crate::vamana::{build_complete_graph, Vamana, VamanaParams};

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

pub(super) fn thread_pool(num_threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| UngError::ThreadPool(e.to_string()))
}

impl<M: Metric> UniNavGraph<M> {
    /// Builds the index over `base`. Vector ids of `base` are the ids
    /// reported by search.
    pub fn build(base: LabeledStore, params: &BuildParams) -> Result<Self> {
        params.validate()?;
        if base.is_empty() {
            return Err(UngError::InvalidConfig("cannot build over an empty storage".into()));
        }
        if base.dim() == 0 {
            return Err(UngError::InvalidConfig("dimension must be at least 1".into()));
        }
        if let Some(id) = (0..base.len() as IdxType)
            .find(|&id| base.vector(id).iter().any(|x| !x.is_finite()))
        {
            return Err(UngError::InvalidConfig(format!(
                "vector {id} has a non-finite component"
            )));
        }
        let pool = thread_pool(params.num_threads)?;
        pool.install(|| Self::build_in_pool(base, params.clone()))
    }

    fn build_in_pool(mut storage: LabeledStore, params: BuildParams) -> Result<Self> {
        let index_start = Instant::now();
        let num_points = storage.len();
        let mut stats = BuildStats {
            num_points,
            ..BuildStats::default()
        };
        info!(num_points, dim = storage.dim(), scenario = %params.scenario, metric = M::NAME, "building index");

        // Partition into groups and reorder group by group.
        let start = Instant::now();
        let mut trie = LabelTrie::new();
        let mut group_label_sets: Vec<LabelSet> = vec![LabelSet::new()];
        let mut group_members: Vec<Vec<IdxType>> = vec![Vec::new()];
        for id in 0..num_points as IdxType {
            let labels = storage.label_set(id);
            let group = trie.insert(labels) as usize;
            if group == group_members.len() {
                group_members.push(Vec::new());
                group_label_sets.push(labels.iter().copied().collect());
            }
            group_members[group].push(id);
        }
        let num_groups = group_members.len() - 1;

        let mut new_to_old = Vec::with_capacity(num_points);
        let mut new_vec_to_group = Vec::with_capacity(num_points);
        let mut group_ranges = vec![(0, 0)];
        for (group, members) in group_members.iter().enumerate().skip(1) {
            let start = new_to_old.len() as IdxType;
            new_to_old.extend_from_slice(members);
            new_vec_to_group.resize(new_to_old.len(), group as IdxType);
            group_ranges.push((start, new_to_old.len() as IdxType));
        }
        drop(group_members);
        storage.reorder(&new_to_old)?;
        stats.num_groups = num_groups;
        stats.label_processing_ms = elapsed_ms(start);
        info!(phase = "label_processing", num_groups, elapsed_ms = stats.label_processing_ms);

        let vamana_params = VamanaParams {
            max_degree: params.max_degree,
            l_build: params.l_build,
            alpha: params.alpha,
        };

        // One proximity graph per group, local ids stored in global slots.
        let start = Instant::now();
        let graph = Graph::new(num_points);
        let group_entry_points: Vec<IdxType> = (0..=num_groups)
            .into_par_iter()
            .map(|group| {
                if group == 0 {
                    return 0;
                }
                let (start, end) = group_ranges[group];
                let size = (end - start) as usize;
                let view = graph.view(start, size);
                if size <= params.max_degree {
                    build_complete_graph(view, size);
                    return start;
                }
                let range = storage.range(start, end);
                let mut vamana = Vamana::<_, M>::new(&range, view, vamana_params);
                vamana.build(false, params.seed ^ group as u64);
                debug!(group, size, entry_point = vamana.entry_point(), "group graph built");
                start + vamana.entry_point()
            })
            .collect();
        stats.build_graph_ms = elapsed_ms(start);
        info!(phase = "build_graph", elapsed_ms = stats.build_graph_ms);

        let start = Instant::now();
        let global_graph = Graph::new(num_points);
        let mut global = Vamana::<_, M>::new(&storage, global_graph.view(0, num_points), vamana_params);
        global.build(true, params.seed);
        let global_entry_point = Some(global.entry_point());
        stats.build_global_graph_ms = elapsed_ms(start);
        info!(phase = "build_global_graph", elapsed_ms = stats.build_global_graph_ms);

        let start = Instant::now();
        let vector_attr_graph = VectorAttrGraph::build(&storage)?;
        stats.build_vector_attr_graph_ms = elapsed_ms(start);
        info!(
            phase = "build_vector_attr_graph",
            num_attributes = vector_attr_graph.num_attributes(),
            elapsed_ms = stats.build_vector_attr_graph_ms
        );

        let mut index = Self {
            params,
            storage,
            trie,
            group_label_sets,
            group_ranges,
            group_entry_points,
            new_to_old,
            new_vec_to_group,
            graph,
            global_graph,
            global_entry_point,
            lng: None,
            vector_attr_graph,
            build_stats: BuildStats::default(),
            search_caches: SearchCachePool::new(0, num_points, 0),
            search_pool: Mutex::new(None),
            _metric: PhantomData,
        };

        match index.params.scenario {
            BuildScenario::Equality => index.add_offset(),
            BuildScenario::General => {
                let start = Instant::now();
                let mut lng = LabelNavGraph::build(&index.trie, &index.group_label_sets);
                stats.build_lng_ms = elapsed_ms(start);
                info!(phase = "build_lng", num_edges = lng.num_edges(), elapsed_ms = stats.build_lng_ms);

                let start = Instant::now();
                lng.cal_descendants();
                stats.cal_descendants_ms = elapsed_ms(start);
                info!(
                    phase = "cal_descendants",
                    avg_descendants = lng.avg_descendants(),
                    elapsed_ms = stats.cal_descendants_ms
                );

                let start = Instant::now();
                let unresolved = lng.cal_coverage_ratio(&index.group_ranges, num_points);
                if unresolved > 0 {
                    warn!(unresolved, "coverage propagation left groups unresolved");
                }
                stats.cal_coverage_ratio_ms = elapsed_ms(start);
                info!(phase = "cal_coverage_ratio", elapsed_ms = stats.cal_coverage_ratio_ms);

                index.lng = Some(lng);
                let start = Instant::now();
                let (added, additional) = index.build_cross_group_edges();
                stats.num_cross_edges_added = added;
                stats.num_additional_edges = additional;
                stats.build_cross_edges_ms = elapsed_ms(start);
                info!(
                    phase = "build_cross_edges",
                    added,
                    additional,
                    elapsed_ms = stats.build_cross_edges_ms
                );
            }
        }

        let summary = index.statistics();
        stats.graph_num_edges = summary.graph_num_edges;
        stats.lng_num_edges = summary.lng_num_edges;
        stats.index_size_mb = summary.index_size_mb;
        stats.index_time_ms = elapsed_ms(index_start);
        info!(
            graph_num_edges = stats.graph_num_edges,
            index_size_mb = stats.index_size_mb,
            elapsed_ms = stats.index_time_ms,
            "index built"
        );
        index.build_stats = stats;
        Ok(index)
    }

    /// Turns the local neighbor ids of every group graph into global ids.
    pub(super) fn add_offset(&mut self) {
        let ranges = &self.group_ranges;
        let groups = &self.new_vec_to_group;
        self.graph.for_each_mut(|id, list| {
            let offset = ranges[groups[id as usize] as usize].0;
            for n in list.iter_mut() {
                *n += offset;
            }
        });
    }
}
