use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::ThreadPool;
use roaring::RoaringBitmap;
use tracing::debug;
use ung_core::label;
use ung_core::{
    HybridParams, IdxType, LabelType, Metric, QueryStats, Result, Scenario, SearchParams,
    SearchStats, UngError, NO_RESULT,
};
use ung_store::VectorStorage;

use super::build::thread_pool;
use super::UniNavGraph;
use crate::cache::SearchCache;
use crate::lng::min_super_sets;
use crate::vamana::iterate_to_fixed_point;
use crate::visited::VisitedSet;

/// Top-K ids (original numbering) and distances, one row per query.
///
/// Unfilled slots hold [`NO_RESULT`] and `f32::INFINITY`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    k: usize,
    ids: Vec<i64>,
    distances: Vec<f32>,
}

impl SearchResults {
    pub fn new(num_queries: usize, k: usize) -> Self {
        Self {
            k,
            ids: vec![NO_RESULT; num_queries * k],
            distances: vec![f32::INFINITY; num_queries * k],
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn num_queries(&self) -> usize {
        if self.k == 0 {
            0
        } else {
            self.ids.len() / self.k
        }
    }

    pub fn ids(&self, query: usize) -> &[i64] {
        &self.ids[query * self.k..(query + 1) * self.k]
    }

    pub fn distances(&self, query: usize) -> &[f32] {
        &self.distances[query * self.k..(query + 1) * self.k]
    }

    /// Row-major ids of all queries.
    pub fn all_ids(&self) -> &[i64] {
        &self.ids
    }

    pub(crate) fn set_row(&mut self, query: usize, hits: impl Iterator<Item = (i64, f32)>) {
        let base = query * self.k;
        for (slot, (id, distance)) in hits.take(self.k).enumerate() {
            self.ids[base + slot] = id;
            self.distances[base + slot] = distance;
        }
    }
}

struct HybridRouting<'a> {
    params: &'a HybridParams,
    bitmaps: Option<&'a [RoaringBitmap]>,
}

/// Per-query inputs and the sampler seeded for this query.
struct QueryCtx<'q> {
    id: IdxType,
    vector: &'q [f32],
    labels: &'q [LabelType],
    rng: StdRng,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl<M: Metric> UniNavGraph<M> {
    /// Filtered top-K search routed through the groups' entry points.
    pub fn search<Q: VectorStorage + ?Sized>(
        &self,
        queries: &Q,
        params: &SearchParams,
    ) -> Result<(SearchResults, SearchStats)> {
        self.run_queries(queries, params, None)
    }

    /// Like [`UniNavGraph::search`], but switches a query to the global graph
    /// when its entry groups already cover most of the dataset.
    ///
    /// `bitmaps`, one per query, further restrict results of the global path.
    pub fn search_hybrid<Q: VectorStorage + ?Sized>(
        &self,
        queries: &Q,
        params: &SearchParams,
        hybrid: &HybridParams,
        bitmaps: Option<&[RoaringBitmap]>,
    ) -> Result<(SearchResults, SearchStats)> {
        hybrid.validate()?;
        if let Some(b) = bitmaps {
            if b.len() != queries.num_points() {
                return Err(UngError::InvalidConfig(format!(
                    "{} bitmaps for {} queries",
                    b.len(),
                    queries.num_points()
                )));
            }
        }
        if hybrid.disabled {
            return self.run_queries(queries, params, None);
        }
        let routing = HybridRouting {
            params: hybrid,
            bitmaps,
        };
        self.run_queries(queries, params, Some(&routing))
    }

    /// Ids (reordered numbering) of the vectors each query admits under `scenario`.
    pub fn query_bitmaps<Q: VectorStorage + ?Sized>(
        &self,
        queries: &Q,
        scenario: Scenario,
    ) -> Vec<RoaringBitmap> {
        let attrs = &self.vector_attr_graph;
        (0..queries.num_points() as IdxType)
            .into_par_iter()
            .map(|q| {
                let labels = queries.label_set(q);
                match scenario {
                    Scenario::Containment => attrs.compute_attribute_bitmap(labels),
                    // Holding every query label and no other.
                    Scenario::Equality => attrs
                        .compute_attribute_bitmap(labels)
                        .into_iter()
                        .filter(|&id| self.storage.label_set(id).len() == labels.len())
                        .collect(),
                    Scenario::Overlap => labels
                        .iter()
                        .flat_map(|&l| attrs.vectors_with_label(l).iter().copied())
                        .collect(),
                    Scenario::NoFilter => {
                        let mut rb = RoaringBitmap::new();
                        rb.insert_range(0..self.num_points() as u32);
                        rb
                    }
                }
            })
            .collect()
    }

    fn run_queries<Q: VectorStorage + ?Sized>(
        &self,
        queries: &Q,
        params: &SearchParams,
        routing: Option<&HybridRouting<'_>>,
    ) -> Result<(SearchResults, SearchStats)> {
        params.validate()?;
        if queries.num_points() > 0 && queries.dim() != self.dim() {
            return Err(UngError::DimensionMismatch {
                expected: self.dim(),
                found: queries.dim(),
            });
        }
        if self.lng.is_none() && params.scenario != Scenario::Equality {
            return Err(UngError::InvalidConfig(format!(
                "index was built for the equality scenario and cannot serve {} queries",
                params.scenario
            )));
        }

        let num_queries = queries.num_points();
        let pool = self.search_pool(params.num_threads)?;
        let caches = &self.search_caches;
        let outcomes: Vec<(Vec<(IdxType, f32)>, QueryStats)> = pool.install(|| {
            (0..num_queries as IdxType)
                .into_par_iter()
                .map(|q| {
                    let mut cache = caches.acquire();
                    let ctx = QueryCtx {
                        id: q,
                        vector: queries.vector(q),
                        labels: queries.label_set(q),
                        rng: StdRng::seed_from_u64(params.seed ^ u64::from(q)),
                    };
                    self.search_one(ctx, params, routing, &mut cache)
                })
                .collect()
        });

        let mut results = SearchResults::new(num_queries, params.k);
        let mut stats = SearchStats::default();
        for (q, (hits, query_stats)) in outcomes.into_iter().enumerate() {
            results.set_row(
                q,
                hits.into_iter()
                    .map(|(id, d)| (i64::from(self.new_to_old[id as usize]), d)),
            );
            stats.record(query_stats);
        }
        Ok((results, stats))
    }

    /// Worker pool of `num_threads` threads, kept across calls with the same
    /// thread count.
    fn search_pool(&self, num_threads: usize) -> Result<Arc<ThreadPool>> {
        let mut slot = self.search_pool.lock();
        if let Some((n, pool)) = slot.as_ref() {
            if *n == num_threads {
                return Ok(Arc::clone(pool));
            }
        }
        let pool = Arc::new(thread_pool(num_threads)?);
        *slot = Some((num_threads, Arc::clone(&pool)));
        Ok(pool)
    }

    /// Number of idle search caches kept by the index.
    pub fn num_idle_search_caches(&self) -> usize {
        self.search_caches.num_free()
    }

    fn search_one(
        &self,
        mut ctx: QueryCtx<'_>,
        params: &SearchParams,
        routing: Option<&HybridRouting<'_>>,
        cache: &mut SearchCache,
    ) -> (Vec<(IdxType, f32)>, QueryStats) {
        let start = Instant::now();
        let mut stats = QueryStats::default();
        cache.search_queue.reserve(params.l_search);
        cache.visited.ensure_len(self.num_points());
        cache.visited.clear();

        let groups = self.entry_groups(params.scenario, ctx.labels);
        stats.num_entry_groups = groups.len();
        if groups.is_empty() {
            debug!(query = ctx.id, scenario = %params.scenario, "no entry group");
            stats.time_ms = elapsed_ms(start);
            return (Vec::new(), stats);
        }

        let global = routing.filter(|r| self.route_globally(&groups, r.params, &mut stats));
        stats.is_global_search = global.is_some();
        let hits = match global {
            Some(r) => {
                let bitmap = r.bitmaps.and_then(|b| b.get(ctx.id as usize));
                self.search_global(&mut ctx, params, bitmap, cache, &mut stats)
            }
            None => self.search_groups(&mut ctx, &groups, params, cache, &mut stats),
        };
        stats.num_results = hits.len();
        stats.time_ms = elapsed_ms(start);
        (hits, stats)
    }

    /// Groups whose members seed the traversal for `labels`.
    pub fn entry_groups(&self, scenario: Scenario, labels: &[LabelType]) -> Vec<IdxType> {
        let sets = &self.group_label_sets;
        match scenario {
            Scenario::Equality => self
                .trie
                .find_exact_match(labels)
                .map(|node| vec![node.group_id])
                .unwrap_or_default(),
            Scenario::Containment => min_super_sets(&self.trie, sets, labels, false, true),
            Scenario::Overlap => min_super_sets(&self.trie, sets, labels, false, false),
            Scenario::NoFilter => min_super_sets(&self.trie, sets, &[], false, true),
        }
    }

    fn route_globally(
        &self,
        groups: &[IdxType],
        hybrid: &HybridParams,
        stats: &mut QueryStats,
    ) -> bool {
        let flag_start = Instant::now();
        let num_points = self.num_points();

        let t = Instant::now();
        let mut descendants = RoaringBitmap::new();
        if let Some(lng) = &self.lng {
            for &g in groups {
                descendants |= lng.descendants(g);
            }
        }
        stats.num_lng_descendants = descendants.len();
        stats.descendants_merge_time_ms = elapsed_ms(t);

        let t = Instant::now();
        let mut covered = RoaringBitmap::new();
        for &g in groups {
            match &self.lng {
                Some(lng) => covered |= lng.covered_set(g),
                None => {
                    let (start, end) = self.group_ranges[g as usize];
                    covered.insert_range(start..end);
                }
            }
        }
        stats.entry_group_total_coverage = covered.len() as f64 / num_points as f64;
        stats.coverage_merge_time_ms = elapsed_ms(t);

        let global = stats.entry_group_total_coverage > f64::from(hybrid.coverage_threshold)
            || stats.num_lng_descendants as f64 > hybrid.descendants_threshold_for(num_points);
        stats.flag_time_ms = elapsed_ms(flag_start);
        global
    }

    /// Entry points of one group: all members of a small group, otherwise the
    /// group entry point plus distinct random members.
    fn push_group_entry_points(
        &self,
        group: IdxType,
        num_entry_points: usize,
        visited: &mut VisitedSet,
        rng: &mut StdRng,
        out: &mut Vec<IdxType>,
    ) {
        let (start, end) = self.group_ranges[group as usize];
        if (end - start) as usize <= num_entry_points {
            out.extend(start..end);
            return;
        }
        let entry = self.group_entry_points[group as usize];
        visited.set(entry);
        out.push(entry);
        for _ in 1..num_entry_points {
            let id = rng.gen_range(start..end);
            if visited.insert(id) {
                out.push(id);
            }
        }
    }

    fn search_groups(
        &self,
        ctx: &mut QueryCtx<'_>,
        groups: &[IdxType],
        params: &SearchParams,
        cache: &mut SearchCache,
        stats: &mut QueryStats,
    ) -> Vec<(IdxType, f32)> {
        let view = self.graph.view(0, self.num_points());
        let mut entry_points = std::mem::take(&mut cache.entry_points);
        entry_points.clear();

        let hits = match params.scenario {
            // One traversal per group; the visited set carries over.
            Scenario::Overlap | Scenario::NoFilter => {
                let mut merged = std::mem::take(&mut cache.merged);
                merged.reserve(params.k);
                for &g in groups {
                    cache.search_queue.clear();
                    entry_points.clear();
                    self.push_group_entry_points(
                        g,
                        params.num_entry_points,
                        &mut cache.visited,
                        &mut ctx.rng,
                        &mut entry_points,
                    );
                    stats.num_distance_calcs += iterate_to_fixed_point::<_, M>(
                        &self.storage,
                        view,
                        ctx.vector,
                        cache,
                        &entry_points,
                    );
                    for c in cache.search_queue.iter().take(params.k) {
                        merged.insert(c.id, c.distance);
                    }
                }
                let hits: Vec<_> = merged.iter().map(|c| (c.id, c.distance)).collect();
                cache.merged = merged;
                hits
            }
            Scenario::Equality | Scenario::Containment => {
                for &g in groups {
                    self.push_group_entry_points(
                        g,
                        params.num_entry_points,
                        &mut cache.visited,
                        &mut ctx.rng,
                        &mut entry_points,
                    );
                }
                stats.num_distance_calcs = iterate_to_fixed_point::<_, M>(
                    &self.storage,
                    view,
                    ctx.vector,
                    cache,
                    &entry_points,
                );
                // Cross edges of a general build lead out of the exact group.
                let exact = params.scenario == Scenario::Equality && self.lng.is_some();
                cache
                    .search_queue
                    .iter()
                    .filter(|c| !exact || self.storage.label_set(c.id) == ctx.labels)
                    .take(params.k)
                    .map(|c| (c.id, c.distance))
                    .collect()
            }
        };
        cache.entry_points = entry_points;
        hits
    }

    fn search_global(
        &self,
        ctx: &mut QueryCtx<'_>,
        params: &SearchParams,
        bitmap: Option<&RoaringBitmap>,
        cache: &mut SearchCache,
        stats: &mut QueryStats,
    ) -> Vec<(IdxType, f32)> {
        let num_points = self.num_points();
        let mut entry_points = std::mem::take(&mut cache.entry_points);
        entry_points.clear();
        match self.global_entry_point {
            Some(ep) => entry_points.push(ep),
            None => entry_points.extend(
                (0..params.num_entry_points).map(|_| ctx.rng.gen_range(0..num_points as IdxType)),
            ),
        }
        stats.num_distance_calcs = iterate_to_fixed_point::<_, M>(
            &self.storage,
            self.global_graph.view(0, num_points),
            ctx.vector,
            cache,
            &entry_points,
        );
        cache.entry_points = entry_points;
        cache
            .search_queue
            .iter()
            .filter(|c| label::satisfies(params.scenario, ctx.labels, self.storage.label_set(c.id)))
            .filter(|c| bitmap.map_or(true, |b| b.contains(c.id)))
            .take(params.k)
            .map(|c| (c.id, c.distance))
            .collect()
    }
}
