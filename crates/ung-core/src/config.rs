use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Result, UngError};

pub const DEFAULT_MAX_DEGREE: usize = 32;
pub const DEFAULT_L_BUILD: usize = 100;
pub const DEFAULT_ALPHA: f32 = 1.2;
pub const DEFAULT_NUM_CROSS_EDGES: usize = 6;
pub const DEFAULT_L_SEARCH: usize = 100;
pub const DEFAULT_NUM_ENTRY_POINTS: usize = 16;
pub const DEFAULT_K: usize = 10;
pub const DEFAULT_COVERAGE_THRESHOLD: f32 = 0.8;
/// Default descendant threshold is `num_points / DESCENDANTS_DIVISOR`.
pub const DESCENDANTS_DIVISOR: f64 = 2.5;

/// Which query family the index is built for.
///
/// `General` builds the label navigation graph and cross-group edges and
/// serves every query scenario. `Equality` skips both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildScenario {
    Equality,
    #[default]
    #[serde(alias = "containment", alias = "overlap", alias = "nofilter")]
    General,
}

impl FromStr for BuildScenario {
    type Err = UngError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equality" => Ok(Self::Equality),
            "general" | "containment" | "overlap" | "nofilter" => Ok(Self::General),
            other => Err(UngError::UnknownScenario(other.to_string())),
        }
    }
}

impl fmt::Display for BuildScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equality => "equality",
            Self::General => "general",
        })
    }
}

/// Query filter relation between a query label set and a candidate's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Equality,
    #[default]
    Containment,
    Overlap,
    NoFilter,
}

impl FromStr for Scenario {
    type Err = UngError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equality" => Ok(Self::Equality),
            "containment" => Ok(Self::Containment),
            "overlap" => Ok(Self::Overlap),
            "nofilter" => Ok(Self::NoFilter),
            other => Err(UngError::UnknownScenario(other.to_string())),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equality => "equality",
            Self::Containment => "containment",
            Self::Overlap => "overlap",
            Self::NoFilter => "nofilter",
        })
    }
}

/// Graph algorithm used for the per-group and global proximity graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IndexType {
    #[default]
    Vamana,
}

impl FromStr for IndexType {
    type Err = UngError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Vamana" | "vamana" => Ok(Self::Vamana),
            other => Err(UngError::UnknownIndexType(other.to_string())),
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Vamana")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildParams {
    pub scenario: BuildScenario,
    pub index_type: IndexType,
    /// Out-degree bound of the proximity graphs.
    pub max_degree: usize,
    /// Candidate list size during construction.
    pub l_build: usize,
    /// Diversity factor of robust pruning.
    pub alpha: f32,
    /// Cross-group edges kept per vector.
    pub num_cross_edges: usize,
    pub num_threads: usize,
    pub seed: u64,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            scenario: BuildScenario::General,
            index_type: IndexType::Vamana,
            max_degree: DEFAULT_MAX_DEGREE,
            l_build: DEFAULT_L_BUILD,
            alpha: DEFAULT_ALPHA,
            num_cross_edges: DEFAULT_NUM_CROSS_EDGES,
            num_threads: 1,
            seed: 0,
        }
    }
}

impl BuildParams {
    pub fn from_json(s: &str) -> Result<Self> {
        let params: Self =
            serde_json::from_str(s).map_err(|e| UngError::InvalidConfig(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_degree == 0 {
            return Err(UngError::InvalidConfig("max_degree must be at least 1".into()));
        }
        if self.l_build == 0 {
            return Err(UngError::InvalidConfig("Lbuild must be at least 1".into()));
        }
        if self.alpha.is_nan() || self.alpha < 1.0 {
            return Err(UngError::InvalidConfig(format!(
                "alpha must be >= 1.0, got {}",
                self.alpha
            )));
        }
        if self.num_threads == 0 {
            return Err(UngError::InvalidConfig("num_threads must be at least 1".into()));
        }
        if self.scenario == BuildScenario::General {
            if self.num_cross_edges == 0 {
                return Err(UngError::InvalidConfig(
                    "num_cross_edges must be at least 1 for the general scenario".into(),
                ));
            }
            if self.num_cross_edges > self.l_build {
                return Err(UngError::CrossEdgesExceedBuildList {
                    num_cross_edges: self.num_cross_edges,
                    l_build: self.l_build,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub scenario: Scenario,
    /// Candidate list size during traversal.
    pub l_search: usize,
    /// Entry points requested per entry group.
    pub num_entry_points: usize,
    pub k: usize,
    pub num_threads: usize,
    /// Base seed of the per-query entry point sampler.
    pub seed: u64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            scenario: Scenario::Containment,
            l_search: DEFAULT_L_SEARCH,
            num_entry_points: DEFAULT_NUM_ENTRY_POINTS,
            k: DEFAULT_K,
            num_threads: 1,
            seed: 0,
        }
    }
}

impl SearchParams {
    pub fn from_json(s: &str) -> Result<Self> {
        let params: Self =
            serde_json::from_str(s).map_err(|e| UngError::InvalidConfig(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(UngError::InvalidConfig("K must be at least 1".into()));
        }
        if self.k > self.l_search {
            return Err(UngError::KExceedsSearchList {
                k: self.k,
                l_search: self.l_search,
            });
        }
        if self.num_entry_points == 0 {
            return Err(UngError::InvalidConfig(
                "num_entry_points must be at least 1".into(),
            ));
        }
        if self.num_threads == 0 {
            return Err(UngError::InvalidConfig("num_threads must be at least 1".into()));
        }
        Ok(())
    }
}

/// Routing thresholds of `search_hybrid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridParams {
    /// Entry-group coverage above which the global graph is used.
    pub coverage_threshold: f32,
    /// Descendant-group count above which the global graph is used.
    /// `None` means `num_points / 2.5`.
    pub descendants_threshold: Option<usize>,
    /// Forces the group-routed path for every query.
    pub disabled: bool,
}

impl Default for HybridParams {
    fn default() -> Self {
        Self {
            coverage_threshold: DEFAULT_COVERAGE_THRESHOLD,
            descendants_threshold: None,
            disabled: false,
        }
    }
}

impl HybridParams {
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    pub fn descendants_threshold_for(&self, num_points: usize) -> f64 {
        match self.descendants_threshold {
            Some(t) => t as f64,
            None => num_points as f64 / DESCENDANTS_DIVISOR,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.coverage_threshold) {
            return Err(UngError::InvalidConfig(format!(
                "coverage_threshold must lie in [0, 1], got {}",
                self.coverage_threshold
            )));
        }
        Ok(())
    }
}
