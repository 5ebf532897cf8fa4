use std::path::Path;

use ung_core::label::{canonicalize, LabelSet};
use ung_core::{IdxType, LabelType, Result, UngError};

use crate::{file_impl, VectorStorage};

/// In-memory vectors with their label sets.
///
/// Vectors are stored row-major in one contiguous buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledStore {
    dim: usize,
    data: Vec<f32>,
    labels: Vec<LabelSet>,
}

impl LabeledStore {
    pub fn new(dim: usize) -> Self {
        Self::with_capacity(dim, 0)
    }

    pub fn with_capacity(dim: usize, capacity: usize) -> Self {
        Self {
            dim,
            data: Vec::with_capacity(dim * capacity),
            labels: Vec::with_capacity(capacity),
        }
    }

    /// Builds a store from a row-major buffer. Label sets are canonicalized.
    pub fn from_parts(dim: usize, data: Vec<f32>, labels: Vec<Vec<LabelType>>) -> Result<Self> {
        if dim == 0 {
            return Err(UngError::InvalidConfig("dimension must be at least 1".into()));
        }
        if data.len() != dim * labels.len() {
            return Err(UngError::DimensionMismatch {
                expected: dim * labels.len(),
                found: data.len(),
            });
        }
        Ok(Self {
            dim,
            data,
            labels: labels.into_iter().map(canonicalize).collect(),
        })
    }

    /// Appends a vector and returns its id.
    pub fn push<I>(&mut self, vector: &[f32], labels: I) -> Result<IdxType>
    where
        I: IntoIterator<Item = LabelType>,
    {
        if vector.len() != self.dim {
            return Err(UngError::DimensionMismatch {
                expected: self.dim,
                found: vector.len(),
            });
        }
        let id = IdxType::try_from(self.labels.len())
            .map_err(|_| UngError::InvalidConfig("vector id space exhausted".into()))?;
        self.data.extend_from_slice(vector);
        self.labels.push(canonicalize(labels));
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Physically permutes the rows so that new row `i` is old row `new_to_old[i]`.
    pub fn reorder(&mut self, new_to_old: &[IdxType]) -> Result<()> {
        let n = self.len();
        if new_to_old.len() != n {
            return Err(UngError::InvalidConfig(format!(
                "permutation has {} entries for {n} vectors",
                new_to_old.len()
            )));
        }
        let mut seen = vec![false; n];
        for &old in new_to_old {
            let slot = seen.get_mut(old as usize).ok_or_else(|| {
                UngError::InvalidConfig(format!("permutation entry {old} out of range"))
            })?;
            if *slot {
                return Err(UngError::InvalidConfig(format!(
                    "permutation repeats entry {old}"
                )));
            }
            *slot = true;
        }

        let mut data = Vec::with_capacity(self.data.len());
        let mut labels = Vec::with_capacity(n);
        for &old in new_to_old {
            let start = old as usize * self.dim;
            data.extend_from_slice(&self.data[start..start + self.dim]);
            labels.push(std::mem::take(&mut self.labels[old as usize]));
        }
        self.data = data;
        self.labels = labels;
        Ok(())
    }

    /// View of rows `start..end` addressed by local ids.
    pub fn range(&self, start: IdxType, end: IdxType) -> StoreRange<'_, Self> {
        StoreRange::new(self, start, end)
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
            + self
                .labels
                .iter()
                .map(|l| l.len() * std::mem::size_of::<LabelType>())
                .sum::<usize>()
    }

    /// Writes `vecs.bin` and `labels.txt`.
    pub fn write_to_files(&self, vecs_path: &Path, labels_path: &Path) -> Result<()> {
        file_impl::write_vecs(vecs_path, self.len(), self.dim, &self.data)?;
        file_impl::write_labels(labels_path, &self.labels)
    }

    pub fn load_from_files(vecs_path: &Path, labels_path: &Path) -> Result<Self> {
        let (num_points, dim, data) = file_impl::read_vecs(vecs_path)?;
        let labels = file_impl::read_labels(labels_path)?;
        if labels.len() != num_points {
            return Err(UngError::corrupt(
                labels_path,
                format!("{} label lines for {num_points} vectors", labels.len()),
            ));
        }
        Ok(Self { dim, data, labels })
    }
}

impl VectorStorage for LabeledStore {
    fn num_points(&self) -> usize {
        self.labels.len()
    }

    fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    fn vector(&self, id: IdxType) -> &[f32] {
        let start = id as usize * self.dim;
        &self.data[start..start + self.dim]
    }

    #[inline]
    fn label_set(&self, id: IdxType) -> &[LabelType] {
        &self.labels[id as usize]
    }

    #[inline]
    fn prefetch(&self, id: IdxType) {
        #[cfg(target_arch = "x86_64")]
        {
            let start = id as usize * self.dim;
            if start < self.data.len() {
                // SAFETY: `start` is in bounds and prefetch never dereferences.
                unsafe {
                    use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
                    _mm_prefetch(self.data.as_ptr().add(start).cast::<i8>(), _MM_HINT_T0);
                }
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        let _ = id;
    }
}

/// Contiguous slice `[start, end)` of another storage, re-addressed from zero.
#[derive(Debug)]
pub struct StoreRange<'a, S: VectorStorage + ?Sized> {
    inner: &'a S,
    start: IdxType,
    end: IdxType,
}

impl<'a, S: VectorStorage + ?Sized> StoreRange<'a, S> {
    pub fn new(inner: &'a S, start: IdxType, end: IdxType) -> Self {
        debug_assert!(start <= end && end as usize <= inner.num_points());
        Self { inner, start, end }
    }

    pub fn offset(&self) -> IdxType {
        self.start
    }

    pub fn end(&self) -> IdxType {
        self.end
    }
}

impl<S: VectorStorage + ?Sized> VectorStorage for StoreRange<'_, S> {
    fn num_points(&self) -> usize {
        (self.end - self.start) as usize
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    #[inline]
    fn vector(&self, id: IdxType) -> &[f32] {
        self.inner.vector(self.start + id)
    }

    #[inline]
    fn label_set(&self, id: IdxType) -> &[LabelType] {
        self.inner.label_set(self.start + id)
    }

    #[inline]
    fn prefetch(&self, id: IdxType) {
        self.inner.prefetch(self.start + id);
    }
}
