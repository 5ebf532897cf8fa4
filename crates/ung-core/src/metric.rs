use std::str::FromStr;

use crate::UngError;

/// Metric abstraction for distance calculation.
///
/// Smaller is closer for every implementation, so graph construction and
/// traversal can treat all metrics alike.
pub trait Metric: Send + Sync + 'static {
    /// Name persisted in the index meta file.
    const NAME: &'static str;

    fn distance(a: &[f32], b: &[f32]) -> f32;
}

/// Squared Euclidean distance.
pub struct L2Metric;

impl Metric for L2Metric {
    const NAME: &'static str = "L2";

    #[inline]
    fn distance(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let d = x - y;
                d * d
            })
            .sum()
    }
}

/// Negated inner product.
pub struct InnerProductMetric;

impl Metric for InnerProductMetric {
    const NAME: &'static str = "IP";

    #[inline]
    fn distance(a: &[f32], b: &[f32]) -> f32 {
        -a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>()
    }
}

/// `1 - cos(a, b)`. Zero vectors are treated as orthogonal to everything.
pub struct CosineMetric;

impl Metric for CosineMetric {
    const NAME: &'static str = "cosine";

    #[inline]
    fn distance(a: &[f32], b: &[f32]) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;
        for (x, y) in a.iter().zip(b.iter()) {
            dot += x * y;
            norm_a += x * x;
            norm_b += y * y;
        }
        let denom = (norm_a * norm_b).sqrt();
        if denom <= f32::EPSILON {
            return 1.0;
        }
        1.0 - dot / denom
    }
}

/// Metric selector for callers that pick the metric from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    L2,
    InnerProduct,
    Cosine,
}

impl MetricKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::L2 => L2Metric::NAME,
            Self::InnerProduct => InnerProductMetric::NAME,
            Self::Cosine => CosineMetric::NAME,
        }
    }
}

impl FromStr for MetricKind {
    type Err = UngError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L2" | "l2" => Ok(Self::L2),
            "IP" | "ip" => Ok(Self::InnerProduct),
            "cosine" | "Cosine" => Ok(Self::Cosine),
            other => Err(UngError::UnknownMetric(other.to_string())),
        }
    }
}
