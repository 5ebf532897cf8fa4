#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod error;
pub mod label;
pub mod metric;
pub mod stats;

pub use config::{BuildParams, BuildScenario, HybridParams, IndexType, Scenario, SearchParams};
pub use error::{Result, UngError};
pub use label::LabelSet;
pub use metric::{CosineMetric, InnerProductMetric, L2Metric, Metric};
pub use stats::{BuildStats, QueryStats, SearchStats};

/// Vector, node and group identifier.
pub type IdxType = u32;

/// Attribute label identifier.
pub type LabelType = u32;

/// Id written into result slots that could not be filled.
pub const NO_RESULT: i64 = -1;

#[cfg(test)]
mod tests;
