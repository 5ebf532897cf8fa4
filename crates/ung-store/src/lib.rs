#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod bipartite;
mod file_impl;
pub mod io;
mod ram_impl;

pub use bipartite::VectorAttrGraph;
pub use ram_impl::{LabeledStore, StoreRange};

use ung_core::{IdxType, LabelType};

/// Read access to labelled vectors.
///
/// Ids are dense in `0..num_points()`. Implementations must be shareable
/// across search threads.
pub trait VectorStorage: Send + Sync {
    fn num_points(&self) -> usize;

    fn dim(&self) -> usize;

    fn vector(&self, id: IdxType) -> &[f32];

    /// Canonical label set of `id`.
    fn label_set(&self, id: IdxType) -> &[LabelType];

    /// Hint that `id` will be read soon.
    fn prefetch(&self, id: IdxType) {
        let _ = id;
    }
}

impl<S: VectorStorage + ?Sized> VectorStorage for &S {
    fn num_points(&self) -> usize {
        (**self).num_points()
    }

    fn dim(&self) -> usize {
        (**self).dim()
    }

    fn vector(&self, id: IdxType) -> &[f32] {
        (**self).vector(id)
    }

    fn label_set(&self, id: IdxType) -> &[LabelType] {
        (**self).label_set(id)
    }

    fn prefetch(&self, id: IdxType) {
        (**self).prefetch(id);
    }
}
