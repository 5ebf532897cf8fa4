use std::cmp::Ordering as CmpOrdering;

use ung_core::IdxType;

/// Nearest neighbor candidate.
#[derive(Debug, Copy, Clone)]
pub struct Candidate {
    pub id: IdxType,
    pub distance: f32,
    expanded: bool,
}

impl Candidate {
    pub fn new(id: IdxType, distance: f32) -> Self {
        Self {
            id,
            distance,
            expanded: false,
        }
    }
}

// Ascending by distance, ties broken by id. `total_cmp` keeps the order
// total when a distance is NaN.
impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}
impl Eq for Candidate {}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Bounded, sorted candidate list driving best-first expansion.
///
/// Holds at most `capacity` candidates in ascending distance order and
/// evicts the farthest on overflow. `cur` is the position of the closest
/// candidate that has not been expanded yet.
#[derive(Debug, Clone, Default)]
pub struct SearchQueue {
    data: Vec<Candidate>,
    capacity: usize,
    cur: usize,
}

impl SearchQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity + 1),
            capacity,
            cur: 0,
        }
    }

    /// Clears and changes the capacity.
    pub fn reserve(&mut self, capacity: usize) {
        self.clear();
        self.capacity = capacity;
        if self.data.capacity() < capacity + 1 {
            self.data.reserve(capacity + 1 - self.data.len());
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.cur = 0;
    }

    /// Inserts `id` unless it is already present or farther than every kept
    /// candidate of a full queue.
    pub fn insert(&mut self, id: IdxType, distance: f32) {
        if self.capacity == 0 {
            return;
        }
        if self.data.len() == self.capacity {
            if let Some(worst) = self.data.last() {
                if distance.total_cmp(&worst.distance).is_ge() {
                    return;
                }
            }
        }

        let cand = Candidate::new(id, distance);
        // A given id always has the same distance to one query, so an exact
        // (distance, id) hit is the only possible duplicate.
        let Err(pos) = self.data.binary_search(&cand) else {
            return;
        };

        self.data.insert(pos, cand);
        self.data.truncate(self.capacity);
        if pos < self.cur {
            self.cur = pos;
        }
    }

    pub fn has_unexpanded_node(&self) -> bool {
        self.cur < self.data.len()
    }

    /// Marks the closest unexpanded candidate as expanded and returns it.
    pub fn get_closest_unexpanded(&mut self) -> Option<Candidate> {
        let idx = self.cur;
        let slot = self.data.get_mut(idx)?;
        slot.expanded = true;
        let cand = *slot;
        self.cur = self.data[idx + 1..]
            .iter()
            .position(|c| !c.expanded)
            .map_or(self.data.len(), |p| idx + 1 + p);
        Some(cand)
    }

    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.data.get(index)
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.data
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.data.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_bounded_insert() {
        let mut q = SearchQueue::new(3);
        for (id, d) in [(1, 5.0), (2, 1.0), (3, 3.0), (4, 4.0), (5, 0.5)] {
            q.insert(id, d);
        }
        let ids: Vec<u32> = q.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![5, 2, 3]);

        // Duplicates and too-far candidates are ignored.
        q.insert(2, 1.0);
        q.insert(9, 10.0);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn test_expansion_order() {
        let mut q = SearchQueue::new(4);
        q.insert(1, 2.0);
        q.insert(2, 1.0);
        assert_eq!(q.get_closest_unexpanded().unwrap().id, 2);
        // A closer insert rewinds the cursor.
        q.insert(3, 0.5);
        assert_eq!(q.get_closest_unexpanded().unwrap().id, 3);
        assert_eq!(q.get_closest_unexpanded().unwrap().id, 1);
        assert!(!q.has_unexpanded_node());
        assert!(q.get_closest_unexpanded().is_none());
    }

    #[test]
    fn test_nan_distances_sort_totally() {
        let mut cands: Vec<Candidate> = (0..64)
            .map(|id| {
                let d = if id % 7 == 0 { f32::NAN } else { (id % 5) as f32 };
                Candidate::new(id, d)
            })
            .collect();
        cands.sort_unstable();
        assert!(cands.windows(2).all(|w| w[0] < w[1]));
        assert!(cands[..cands.len() - 10].iter().all(|c| !c.distance.is_nan()));

        let mut q = SearchQueue::new(3);
        q.insert(1, f32::NAN);
        q.insert(2, 1.0);
        q.insert(3, f32::NAN);
        q.insert(4, 0.5);
        let ids: Vec<u32> = q.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![4, 2, 1]);
    }
}
