//! Build and query instrumentation.
//!
//! Statistics are plain values returned from `build` and `search`; callers
//! merge them with [`SearchStats::combine`].

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IoResultExt;
use crate::{Result, UngError};

/// Per-phase build timings (milliseconds) and index size figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    pub num_points: usize,
    pub num_groups: usize,
    pub label_processing_ms: f64,
    pub build_graph_ms: f64,
    pub build_global_graph_ms: f64,
    pub build_vector_attr_graph_ms: f64,
    pub build_lng_ms: f64,
    pub cal_descendants_ms: f64,
    pub cal_coverage_ratio_ms: f64,
    pub build_cross_edges_ms: f64,
    pub index_time_ms: f64,
    pub graph_num_edges: u64,
    pub lng_num_edges: u64,
    pub num_cross_edges_added: u64,
    pub num_additional_edges: u64,
    pub index_size_mb: f64,
}

const META_FIELDS: &[&str] = &[
    "label_processing_time(ms)",
    "build_graph_time(ms)",
    "build_global_graph_time(ms)",
    "build_vector_attr_graph_time(ms)",
    "build_LNG_time(ms)",
    "cal_descendants_time(ms)",
    "cal_coverage_ratio_time(ms)",
    "build_cross_edges_time(ms)",
    "index_time(ms)",
];

impl BuildStats {
    fn timings(&self) -> [f64; 9] {
        [
            self.label_processing_ms,
            self.build_graph_ms,
            self.build_global_graph_ms,
            self.build_vector_attr_graph_ms,
            self.build_lng_ms,
            self.cal_descendants_ms,
            self.cal_coverage_ratio_ms,
            self.build_cross_edges_ms,
            self.index_time_ms,
        ]
    }

    fn timings_mut(&mut self) -> [&mut f64; 9] {
        [
            &mut self.label_processing_ms,
            &mut self.build_graph_ms,
            &mut self.build_global_graph_ms,
            &mut self.build_vector_attr_graph_ms,
            &mut self.build_lng_ms,
            &mut self.cal_descendants_ms,
            &mut self.cal_coverage_ratio_ms,
            &mut self.build_cross_edges_ms,
            &mut self.index_time_ms,
        ]
    }

    /// Entries written to the index meta file.
    pub fn meta_entries(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = META_FIELDS
            .iter()
            .zip(self.timings())
            .map(|(k, v)| ((*k).to_string(), v.to_string()))
            .collect();
        out.push(("graph_num_edges".into(), self.graph_num_edges.to_string()));
        out.push(("LNG_num_edges".into(), self.lng_num_edges.to_string()));
        out.push((
            "num_cross_edges_added".into(),
            self.num_cross_edges_added.to_string(),
        ));
        out.push((
            "num_additional_edges".into(),
            self.num_additional_edges.to_string(),
        ));
        out.push(("index_size(MB)".into(), self.index_size_mb.to_string()));
        out
    }

    /// Restores what [`BuildStats::meta_entries`] wrote. Missing keys stay zero.
    pub fn from_meta(meta: &BTreeMap<String, String>) -> Result<Self> {
        fn parse<T: std::str::FromStr + Default>(
            meta: &BTreeMap<String, String>,
            key: &str,
        ) -> Result<T> {
            match meta.get(key) {
                None => Ok(T::default()),
                Some(v) => v
                    .parse()
                    .map_err(|_| UngError::InvalidConfig(format!("bad meta value {key}={v}"))),
            }
        }

        let mut stats = Self {
            num_points: parse(meta, "num_points")?,
            num_groups: parse(meta, "num_groups")?,
            graph_num_edges: parse(meta, "graph_num_edges")?,
            lng_num_edges: parse(meta, "LNG_num_edges")?,
            num_cross_edges_added: parse(meta, "num_cross_edges_added")?,
            num_additional_edges: parse(meta, "num_additional_edges")?,
            index_size_mb: parse(meta, "index_size(MB)")?,
            ..Self::default()
        };
        for (slot, key) in stats.timings_mut().into_iter().zip(META_FIELDS) {
            *slot = parse(meta, key)?;
        }
        Ok(stats)
    }

    /// Writes the `build_time.csv` report.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path).with_path(path)?;
        let rows = [
            ("index_time", self.index_time_ms),
            ("label_processing_time", self.label_processing_ms),
            ("build_graph_time", self.build_graph_ms),
            ("build_global_graph_time", self.build_global_graph_ms),
            ("build_vector_attr_graph_time", self.build_vector_attr_graph_ms),
            ("cal_descendants_time", self.cal_descendants_ms),
            ("cal_coverage_ratio_time", self.cal_coverage_ratio_ms),
            ("build_LNG_time", self.build_lng_ms),
            ("build_cross_edges_time", self.build_cross_edges_ms),
        ];
        writeln!(file, "Index Name,Build Time (ms)").with_path(path)?;
        for (name, ms) in rows {
            writeln!(file, "{name},{ms}").with_path(path)?;
        }
        Ok(())
    }
}

/// Instrumentation of a single query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    pub time_ms: f64,
    /// Time spent deciding between group-routed and global traversal.
    pub flag_time_ms: f64,
    pub descendants_merge_time_ms: f64,
    pub coverage_merge_time_ms: f64,
    pub entry_group_total_coverage: f64,
    pub num_distance_calcs: u64,
    pub num_entry_groups: usize,
    pub num_lng_descendants: u64,
    pub is_global_search: bool,
    pub num_results: usize,
    pub recall: Option<f32>,
}

/// Aggregate over a batch of queries.
///
/// Sums and maxima only; [`SearchStats::combine`] never overwrites a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    pub num_queries: usize,
    pub num_empty_queries: usize,
    pub num_global_searches: usize,
    pub total_time_ms: f64,
    pub max_time_ms: f64,
    pub total_flag_time_ms: f64,
    pub total_distance_calcs: u64,
    pub max_distance_calcs: u64,
    pub total_entry_groups: u64,
    pub recall_sum: f64,
    pub num_recall_samples: usize,
    pub queries: Vec<QueryStats>,
}

impl SearchStats {
    pub fn record(&mut self, q: QueryStats) {
        self.num_queries += 1;
        if q.num_results == 0 {
            self.num_empty_queries += 1;
        }
        if q.is_global_search {
            self.num_global_searches += 1;
        }
        self.total_time_ms += q.time_ms;
        self.max_time_ms = self.max_time_ms.max(q.time_ms);
        self.total_flag_time_ms += q.flag_time_ms;
        self.total_distance_calcs += q.num_distance_calcs;
        self.max_distance_calcs = self.max_distance_calcs.max(q.num_distance_calcs);
        self.total_entry_groups += q.num_entry_groups as u64;
        if let Some(r) = q.recall {
            self.recall_sum += f64::from(r);
            self.num_recall_samples += 1;
        }
        self.queries.push(q);
    }

    pub fn combine(&mut self, other: &SearchStats) {
        self.num_queries += other.num_queries;
        self.num_empty_queries += other.num_empty_queries;
        self.num_global_searches += other.num_global_searches;
        self.total_time_ms += other.total_time_ms;
        self.max_time_ms = self.max_time_ms.max(other.max_time_ms);
        self.total_flag_time_ms += other.total_flag_time_ms;
        self.total_distance_calcs += other.total_distance_calcs;
        self.max_distance_calcs = self.max_distance_calcs.max(other.max_distance_calcs);
        self.total_entry_groups += other.total_entry_groups;
        self.recall_sum += other.recall_sum;
        self.num_recall_samples += other.num_recall_samples;
        self.queries.extend(other.queries.iter().cloned());
    }

    /// Stores per-query recall values and folds them into the aggregate.
    pub fn set_recalls(&mut self, recalls: &[f32]) {
        self.recall_sum = 0.0;
        self.num_recall_samples = 0;
        for (q, &r) in self.queries.iter_mut().zip(recalls) {
            q.recall = Some(r);
            self.recall_sum += f64::from(r);
            self.num_recall_samples += 1;
        }
    }

    pub fn mean_time_ms(&self) -> f64 {
        if self.num_queries == 0 {
            0.0
        } else {
            self.total_time_ms / self.num_queries as f64
        }
    }

    pub fn mean_distance_calcs(&self) -> f64 {
        if self.num_queries == 0 {
            0.0
        } else {
            self.total_distance_calcs as f64 / self.num_queries as f64
        }
    }

    pub fn mean_recall(&self) -> Option<f64> {
        (self.num_recall_samples > 0).then(|| self.recall_sum / self.num_recall_samples as f64)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| UngError::InvalidConfig(e.to_string()))
    }
}
