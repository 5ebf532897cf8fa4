use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::{debug, warn};
use ung_core::{IdxType, Metric};
use ung_store::{LabeledStore, StoreRange, VectorStorage};

use super::UniNavGraph;
use crate::cache::SearchCache;
use crate::search_queue::SearchQueue;
use crate::vamana::{Vamana, VamanaParams};

impl<M: Metric> UniNavGraph<M> {
    /// Proximity graph of `group` over local ids.
    fn group_vamana(&self, group: IdxType) -> Vamana<'_, StoreRange<'_, LabeledStore>, M> {
        let (start, end) = self.group_ranges[group as usize];
        let params = VamanaParams {
            max_degree: self.params.max_degree,
            l_build: self.params.l_build,
            alpha: self.params.alpha,
        };
        Vamana::with_entry_point(
            self.storage.range(start, end),
            self.graph.view(start, (end - start) as usize),
            params,
            self.group_entry_points[group as usize] - start,
        )
    }

    /// Connects every group to its label navigation graph out-neighbors.
    ///
    /// Must run while the group graphs still hold local ids; offsets them
    /// before merging. Returns the number of cross edges and of force-added
    /// edges.
    pub(super) fn build_cross_group_edges(&mut self) -> (u64, u64) {
        let Some(lng) = self.lng.take() else {
            self.add_offset();
            return (0, 0);
        };
        let num_points = self.num_points();
        let num_cross_edges = self.params.num_cross_edges;
        let l_build = self.params.l_build;
        let max_group_size = self
            .group_ranges
            .iter()
            .map(|&(s, e)| (e - s) as usize)
            .max()
            .unwrap_or(0);

        // Nearest neighbors of every in-neighbor vector inside the target group.
        let mut cross: Vec<SearchQueue> = vec![SearchQueue::new(num_cross_edges); num_points];
        for group in 1..=self.num_groups() as IdxType {
            if lng.in_neighbors(group).is_empty() {
                continue;
            }
            let offset = self.group_ranges[group as usize].0;
            let index = self.group_vamana(group);
            let entry = [index.entry_point()];
            for &in_group in lng.in_neighbors(group) {
                let (start, end) = self.group_ranges[in_group as usize];
                cross[start as usize..end as usize]
                    .par_iter_mut()
                    .enumerate()
                    .for_each_init(
                        || SearchCache::new(max_group_size, l_build),
                        |cache, (i, queue)| {
                            cache.reset();
                            let query = self.storage.vector(start + i as IdxType);
                            index.iterate_to_fixed_point(query, cache, &entry);
                            for c in cache.search_queue.iter() {
                                queue.insert(c.id + offset, c.distance);
                            }
                        },
                    );
            }
        }

        // Force edges along LNG edges that no cross edge materialised.
        let per_traversal = (num_cross_edges / 2).max(1);
        let additional: Vec<Vec<(IdxType, IdxType)>> = (0..=self.num_groups() as IdxType)
            .into_par_iter()
            .map_init(
                || SearchCache::new(max_group_size, l_build),
                |cache, group| {
                    let mut edges = Vec::new();
                    if group == 0 {
                        return edges;
                    }
                    let (start, end) = self.group_ranges[group as usize];
                    let connected: BTreeSet<IdxType> = cross[start as usize..end as usize]
                        .iter()
                        .flat_map(SearchQueue::iter)
                        .map(|c| self.new_vec_to_group[c.id as usize])
                        .collect();

                    for &out_group in lng.out_neighbors(group) {
                        if connected.contains(&out_group) {
                            continue;
                        }
                        let out_offset = self.group_ranges[out_group as usize].0;
                        let index = self.group_vamana(out_group);
                        let entry = [index.entry_point()];
                        let mut cnt = 0;
                        for vec_id in start..end {
                            if cnt >= num_cross_edges {
                                break;
                            }
                            cache.reset();
                            let query = self.storage.vector(vec_id);
                            index.iterate_to_fixed_point(query, cache, &entry);
                            for c in cache.search_queue.iter().take(per_traversal) {
                                edges.push((vec_id, c.id + out_offset));
                                cnt += 1;
                            }
                        }
                        if cnt == 0 {
                            warn!(group, out_group, "label navigation edge has no graph edge");
                        } else {
                            debug!(group, out_group, cnt, "forced cross edges");
                        }
                    }
                    edges
                },
            )
            .collect();

        self.add_offset();

        let mut num_cross = 0u64;
        self.graph.for_each_mut(|id, list| {
            for c in cross[id as usize].iter() {
                list.push(c.id);
                num_cross += 1;
            }
        });
        drop(cross);

        let mut num_additional = 0u64;
        for (from, to) in additional.into_iter().flatten() {
            self.graph.push_neighbor(from, to);
            num_additional += 1;
        }
        self.lng = Some(lng);
        (num_cross, num_additional)
    }
}
