use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, UngError>;

#[derive(Debug, Error)]
pub enum UngError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),

    #[error("unknown index type '{0}'")]
    UnknownIndexType(String),

    #[error("unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("K ({k}) must be less than or equal to Lsearch ({l_search})")]
    KExceedsSearchList { k: usize, l_search: usize },

    #[error("num_cross_edges ({num_cross_edges}) must be less than or equal to Lbuild ({l_build})")]
    CrossEdgesExceedBuildList { num_cross_edges: usize, l_build: usize },

    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("index was built with metric '{expected}', opened with '{found}'")]
    MetricMismatch { expected: String, found: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("checksum mismatch in {}: stored {stored:#010x}, computed {computed:#010x}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        stored: u32,
        computed: u32,
    },

    #[error("thread pool: {0}")]
    ThreadPool(String),
}

impl UngError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Attaches a path to `std::io::Result` values.
pub trait IoResultExt<T> {
    fn with_path(self, path: &std::path::Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                UngError::corrupt(path, "truncated file")
            } else {
                UngError::io(path, e)
            }
        })
    }
}
