use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use parking_lot::Mutex;
use roaring::RoaringBitmap;
use tracing::info;
use ung_core::error::IoResultExt;
use ung_core::label::{self, LabelSet};
use ung_core::{
    BuildParams, BuildScenario, BuildStats, IdxType, IndexType, Metric, Result, UngError,
};
use ung_store::{io, LabeledStore, VectorAttrGraph, VectorStorage};

use super::UniNavGraph;
use crate::cache::SearchCachePool;
use crate::graph::Graph;
use crate::lng::LabelNavGraph;
use crate::trie::LabelTrie;

const META: &str = "meta";
const VECS: &str = "vecs.bin";
const LABELS: &str = "labels.txt";
const GROUP_LABEL_SETS: &str = "group_id_to_label_set";
const GROUP_RANGES: &str = "group_id_to_range";
const GROUP_ENTRY_POINTS: &str = "group_entry_points";
const NEW_TO_OLD: &str = "new_to_old_vec_ids";
const TRIE: &str = "trie";
const GRAPH: &str = "graph";
const GLOBAL_GRAPH: &str = "global_graph";
const GLOBAL_ENTRY_POINT: &str = "global_vamana_entry_point";
const COVERAGE_RATIO: &str = "lng_coverage_ratio";
const COVERED_SETS: &str = "covered_sets";
const DESCENDANTS_NUM: &str = "lng_descendants_num";
const DESCENDANTS: &str = "lng_descendants";
const OUT_NEIGHBORS: &str = "lng_out_neighbors";
const VECTOR_ATTR_GRAPH: &str = "vector_attr_graph";
const DESCENDANTS_RB: &str = "lng_descendants_rb.bin";
const COVERED_SETS_RB: &str = "covered_sets_rb.bin";

fn meta_value<T: FromStr>(meta: &BTreeMap<String, String>, key: &str, path: &Path) -> Result<T> {
    let raw = meta
        .get(key)
        .ok_or_else(|| UngError::corrupt(path, format!("missing key {key}")))?;
    raw.parse()
        .map_err(|_| UngError::corrupt(path, format!("bad value {key}={raw}")))
}

fn ensure(cond: bool, path: &Path, reason: impl FnOnce() -> String) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(UngError::corrupt(path, reason()))
    }
}

fn to_rows(bitmaps: &[RoaringBitmap]) -> Vec<Vec<u32>> {
    bitmaps.iter().map(|rb| rb.iter().collect()).collect()
}

fn to_bitmaps(rows: Vec<Vec<u32>>) -> Vec<RoaringBitmap> {
    rows.into_iter().map(|r| r.into_iter().collect()).collect()
}

impl<M: Metric> UniNavGraph<M> {
    fn meta(&self) -> BTreeMap<String, String> {
        let p = &self.params;
        let mut meta: BTreeMap<String, String> = [
            ("num_points", self.num_points().to_string()),
            ("dim", self.dim().to_string()),
            ("num_groups", self.num_groups().to_string()),
            ("metric", M::NAME.to_string()),
            ("scenario", p.scenario.to_string()),
            ("index_name", p.index_type.to_string()),
            ("max_degree", p.max_degree.to_string()),
            ("Lbuild", p.l_build.to_string()),
            ("alpha", p.alpha.to_string()),
            ("num_cross_edges", p.num_cross_edges.to_string()),
            ("build_num_threads", p.num_threads.to_string()),
            ("seed", p.seed.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        meta.extend(self.build_stats.meta_entries());
        meta
    }

    /// Writes every structure of the index into `dir`, one file each.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let start = Instant::now();
        std::fs::create_dir_all(dir).with_path(dir)?;

        io::write_kv_file(&dir.join(META), &self.meta())?;
        self.storage.write_to_files(&dir.join(VECS), &dir.join(LABELS))?;
        io::write_u32_table(&dir.join(GROUP_LABEL_SETS), &self.group_label_sets)?;
        io::write_pairs(&dir.join(GROUP_RANGES), &self.group_ranges)?;
        io::write_u32_vec(&dir.join(GROUP_ENTRY_POINTS), &self.group_entry_points)?;
        io::write_u32_vec(&dir.join(NEW_TO_OLD), &self.new_to_old)?;
        self.trie.save(&dir.join(TRIE))?;
        self.graph.save(&dir.join(GRAPH))?;
        self.global_graph.save(&dir.join(GLOBAL_GRAPH))?;
        io::write_one_i64(
            &dir.join(GLOBAL_ENTRY_POINT),
            self.global_entry_point.map_or(-1, i64::from),
        )?;

        if let Some(lng) = &self.lng {
            io::write_u32_table(&dir.join(OUT_NEIGHBORS), lng.all_out_neighbors())?;
            io::write_f64_vec(&dir.join(COVERAGE_RATIO), lng.coverage_ratios())?;
            io::write_u32_table(&dir.join(COVERED_SETS), &to_rows(lng.covered_sets()))?;
            let descendants_num: Vec<(u32, u32)> = (1..=lng.num_groups() as IdxType)
                .map(|g| (g, lng.descendants_num(g) as u32))
                .collect();
            io::write_pairs(&dir.join(DESCENDANTS_NUM), &descendants_num)?;
            io::write_u32_table(&dir.join(DESCENDANTS), &to_rows(lng.all_descendants()))?;
            io::write_roaring_vec(&dir.join(DESCENDANTS_RB), lng.all_descendants())?;
            io::write_roaring_vec(&dir.join(COVERED_SETS_RB), lng.covered_sets())?;
        }

        self.vector_attr_graph.save(&dir.join(VECTOR_ATTR_GRAPH))?;
        info!(
            path = %dir.display(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "index saved"
        );
        Ok(())
    }

    /// Reads an index written by [`UniNavGraph::save`].
    ///
    /// Every file is checked for consistency with the others; any mismatch
    /// fails the whole load.
    pub fn load(dir: &Path) -> Result<Self> {
        let start = Instant::now();
        let meta_path = dir.join(META);
        let meta = io::read_kv_file(&meta_path)?;
        let metric: String = meta_value(&meta, "metric", &meta_path)?;
        if metric != M::NAME {
            return Err(UngError::MetricMismatch {
                expected: metric,
                found: M::NAME.to_string(),
            });
        }
        let params = BuildParams {
            scenario: BuildScenario::from_str(&meta_value::<String>(&meta, "scenario", &meta_path)?)?,
            index_type: IndexType::from_str(&meta_value::<String>(&meta, "index_name", &meta_path)?)?,
            max_degree: meta_value(&meta, "max_degree", &meta_path)?,
            l_build: meta_value(&meta, "Lbuild", &meta_path)?,
            alpha: meta_value(&meta, "alpha", &meta_path)?,
            num_cross_edges: meta_value(&meta, "num_cross_edges", &meta_path)?,
            num_threads: meta_value(&meta, "build_num_threads", &meta_path)?,
            seed: meta_value(&meta, "seed", &meta_path)?,
        };
        let num_points: usize = meta_value(&meta, "num_points", &meta_path)?;
        let num_groups: usize = meta_value(&meta, "num_groups", &meta_path)?;
        let mut build_stats = BuildStats::from_meta(&meta)?;
        build_stats.num_points = num_points;
        build_stats.num_groups = num_groups;

        let storage = LabeledStore::load_from_files(&dir.join(VECS), &dir.join(LABELS))?;
        ensure(storage.len() == num_points, &dir.join(VECS), || {
            format!("{} vectors, meta says {num_points}", storage.len())
        })?;

        let path = dir.join(GROUP_LABEL_SETS);
        let group_label_sets: Vec<LabelSet> = io::read_u32_table(&path)?
            .into_iter()
            .map(LabelSet::from_vec)
            .collect();
        ensure(group_label_sets.len() == num_groups + 1, &path, || {
            format!("{} label sets for {num_groups} groups", group_label_sets.len())
        })?;

        let path = dir.join(GROUP_RANGES);
        let group_ranges = io::read_pairs(&path)?;
        ensure(group_ranges.len() == num_groups + 1, &path, || "group count".into())?;
        let mut next = 0;
        let mut new_vec_to_group = Vec::with_capacity(num_points);
        for (g, &(s, e)) in group_ranges.iter().enumerate().skip(1) {
            ensure(s == next && e > s, &path, || format!("group {g} range {s}..{e}"))?;
            new_vec_to_group.resize(e as usize, g as IdxType);
            next = e;
        }
        ensure(next as usize == num_points, &path, || "ranges do not cover all vectors".into())?;

        let path = dir.join(GROUP_ENTRY_POINTS);
        let group_entry_points = io::read_u32_vec(&path)?;
        ensure(group_entry_points.len() == num_groups + 1, &path, || "group count".into())?;
        for g in 1..=num_groups {
            let (s, e) = group_ranges[g];
            let ep = group_entry_points[g];
            ensure((s..e).contains(&ep), &path, || format!("entry point {ep} outside group {g}"))?;
        }

        let path = dir.join(NEW_TO_OLD);
        let new_to_old = io::read_u32_vec(&path)?;
        let mut seen = vec![false; num_points];
        for &old in &new_to_old {
            let fresh = seen
                .get_mut(old as usize)
                .is_some_and(|slot| !std::mem::replace(slot, true));
            ensure(fresh, &path, || format!("bad id {old}"))?;
        }
        ensure(new_to_old.len() == num_points, &path, || "not a permutation".into())?;

        let path = dir.join(TRIE);
        let trie = LabelTrie::load(&path)?;
        ensure(trie.num_groups() == num_groups, &path, || "group count".into())?;
        let sets_path = dir.join(GROUP_LABEL_SETS);
        for (g, set) in group_label_sets.iter().enumerate().skip(1) {
            ensure(label::is_canonical(set), &sets_path, || {
                format!("label set of group {g} is not sorted and distinct")
            })?;
            let found = trie.find_exact_match(set).map(|node| node.group_id);
            ensure(found == Some(g as IdxType), &sets_path, || {
                format!("label set of group {g} maps to {found:?} in the trie")
            })?;
            let (s, e) = group_ranges[g];
            ensure(
                (s..e).all(|id| storage.label_set(id) == set.as_slice()),
                &dir.join(LABELS),
                || format!("members of group {g} carry other labels"),
            )?;
        }

        let path = dir.join(GRAPH);
        let graph = Graph::load(&path)?;
        ensure(graph.len() == num_points, &path, || "node count".into())?;
        let path = dir.join(GLOBAL_GRAPH);
        let global_graph = Graph::load(&path)?;
        ensure(global_graph.len() == num_points, &path, || "node count".into())?;

        let path = dir.join(GLOBAL_ENTRY_POINT);
        let global_entry_point = match io::read_one_i64(&path)? {
            -1 => None,
            ep => {
                let ep = IdxType::try_from(ep).ok().filter(|&ep| (ep as usize) < num_points);
                ensure(ep.is_some(), &path, || "entry point out of range".into())?;
                ep
            }
        };

        let lng = match params.scenario {
            BuildScenario::Equality => None,
            BuildScenario::General => Some(Self::load_lng(dir, num_groups, num_points)?),
        };

        let path = dir.join(VECTOR_ATTR_GRAPH);
        let vector_attr_graph = VectorAttrGraph::load(&path)?;
        ensure(vector_attr_graph.num_points() == num_points, &path, || "vector count".into())?;

        info!(
            path = %dir.display(),
            num_points,
            num_groups,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "index loaded"
        );
        Ok(Self {
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
            lng,
            vector_attr_graph,
            build_stats,
            search_caches: SearchCachePool::new(0, num_points, 0),
            search_pool: Mutex::new(None),
            _metric: PhantomData,
        })
    }

    fn load_lng(dir: &Path, num_groups: usize, num_points: usize) -> Result<LabelNavGraph> {
        let slots = num_groups + 1;

        let path = dir.join(OUT_NEIGHBORS);
        let out_neighbors = io::read_u32_table(&path)?;
        ensure(out_neighbors.len() == slots, &path, || "group count".into())?;
        let in_range = out_neighbors
            .iter()
            .flatten()
            .all(|&g| g >= 1 && (g as usize) <= num_groups);
        ensure(in_range, &path, || "group id out of range".into())?;

        let path = dir.join(COVERAGE_RATIO);
        let coverage_ratio = io::read_f64_vec(&path)?;
        ensure(coverage_ratio.len() == slots, &path, || "group count".into())?;

        let path = dir.join(COVERED_SETS);
        let covered_sets = to_bitmaps(io::read_u32_table(&path)?);
        ensure(covered_sets.len() == slots, &path, || "group count".into())?;
        ensure(
            covered_sets.iter().all(|rb| rb.max().map_or(true, |m| (m as usize) < num_points)),
            &path,
            || "vector id out of range".into(),
        )?;

        let path = dir.join(DESCENDANTS);
        let descendants = to_bitmaps(io::read_u32_table(&path)?);
        ensure(descendants.len() == slots, &path, || "group count".into())?;

        let path = dir.join(DESCENDANTS_NUM);
        let counts = io::read_pairs(&path)?;
        ensure(counts.len() == num_groups, &path, || "group count".into())?;
        for &(g, n) in &counts {
            let ok = descendants
                .get(g as usize)
                .is_some_and(|rb| g >= 1 && rb.len() == u64::from(n));
            ensure(ok, &path, || format!("descendant count of group {g}"))?;
        }

        let path = dir.join(DESCENDANTS_RB);
        ensure(io::read_roaring_vec(&path)? == descendants, &path, || {
            "disagrees with lng_descendants".into()
        })?;
        let path = dir.join(COVERED_SETS_RB);
        ensure(io::read_roaring_vec(&path)? == covered_sets, &path, || {
            "disagrees with covered_sets".into()
        })?;

        Ok(LabelNavGraph::from_out_neighbors(out_neighbors).with_closures(
            coverage_ratio,
            covered_sets,
            descendants,
        ))
    }
}
