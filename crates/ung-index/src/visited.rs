use ung_core::IdxType;

/// Visited markers with O(1) clear.
///
/// A slot counts as visited when it holds the current generation; clearing
/// bumps the generation instead of touching the marks.
#[derive(Debug, Clone)]
pub struct VisitedSet {
    marks: Vec<u32>,
    generation: u32,
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new(0)
    }
}

impl VisitedSet {
    pub fn new(len: usize) -> Self {
        Self {
            marks: vec![0; len],
            generation: 1,
        }
    }

    /// Grows to at least `len` slots. Existing marks are kept.
    pub fn ensure_len(&mut self, len: usize) {
        if self.marks.len() < len {
            self.marks.resize(len, 0);
        }
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn clear(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            self.marks.fill(0);
            self.generation = 1;
        }
    }

    #[inline]
    pub fn check(&self, id: IdxType) -> bool {
        self.marks[id as usize] == self.generation
    }

    #[inline]
    pub fn set(&mut self, id: IdxType) {
        self.marks[id as usize] = self.generation;
    }

    /// Marks `id` and returns true if it was not visited before.
    #[inline]
    pub fn insert(&mut self, id: IdxType) -> bool {
        let slot = &mut self.marks[id as usize];
        if *slot == self.generation {
            false
        } else {
            *slot = self.generation;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_resets_marks() {
        let mut v = VisitedSet::new(4);
        assert!(v.insert(2));
        assert!(!v.insert(2));
        assert!(v.check(2));
        v.clear();
        assert!(!v.check(2));
        v.set(3);
        assert!(v.check(3));
    }

    #[test]
    fn test_generation_wraparound() {
        let mut v = VisitedSet::new(2);
        v.generation = u32::MAX;
        v.set(0);
        v.clear();
        assert!(!v.check(0));
        assert!(!v.check(1));
    }
}
