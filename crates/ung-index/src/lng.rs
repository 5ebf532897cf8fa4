//! Label navigation graph: a DAG over groups whose edges point to the
//! minimal strict label supersets.
//!
//! Vectors are indexed by group id; slot 0 is unused.

use rayon::prelude::*;
use roaring::RoaringBitmap;
use ung_core::label::{self, LabelSet};
use ung_core::{IdxType, LabelType};

use crate::trie::LabelTrie;

/// Groups among the trie candidates for `query` whose label sets do not
/// contain another candidate's.
pub fn min_super_sets(
    trie: &LabelTrie,
    group_label_sets: &[LabelSet],
    query: &[LabelType],
    avoid_self: bool,
    need_containment: bool,
) -> Vec<IdxType> {
    let mut candidates = trie.get_super_set_entrances(query, avoid_self, need_containment);
    match candidates.len() {
        0 => return Vec::new(),
        1 => return vec![candidates[0].group_id],
        _ => {}
    }
    candidates.sort_by_key(|n| n.label_set_size);
    let min_size = candidates[0].label_set_size;

    let mut out: Vec<IdxType> = Vec::new();
    for cand in candidates {
        let cand_set = &group_label_sets[cand.group_id as usize];
        let is_min = cand.label_set_size == min_size
            || !out
                .iter()
                .any(|&g| label::includes(cand_set, &group_label_sets[g as usize]));
        if is_min {
            out.push(cand.group_id);
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelNavGraph {
    out_neighbors: Vec<Vec<IdxType>>,
    in_neighbors: Vec<Vec<IdxType>>,
    coverage_ratio: Vec<f64>,
    covered_sets: Vec<RoaringBitmap>,
    descendants: Vec<RoaringBitmap>,
}

impl LabelNavGraph {
    /// Computes the out-edges of every group in parallel.
    pub fn build(trie: &LabelTrie, group_label_sets: &[LabelSet]) -> Self {
        let num_groups = group_label_sets.len().saturating_sub(1);
        let out_neighbors: Vec<Vec<IdxType>> = (0..=num_groups)
            .into_par_iter()
            .map(|g| {
                if g == 0 {
                    return Vec::new();
                }
                min_super_sets(trie, group_label_sets, &group_label_sets[g], true, true)
            })
            .collect();
        Self::from_out_neighbors(out_neighbors)
    }

    /// Rebuilds the reverse adjacency from out-edges.
    pub fn from_out_neighbors(out_neighbors: Vec<Vec<IdxType>>) -> Self {
        let mut in_neighbors = vec![Vec::new(); out_neighbors.len()];
        for (g, outs) in out_neighbors.iter().enumerate() {
            for &o in outs {
                in_neighbors[o as usize].push(g as IdxType);
            }
        }
        Self {
            out_neighbors,
            in_neighbors,
            ..Self::default()
        }
    }

    /// Attaches coverage and descendant data restored from disk.
    pub fn with_closures(
        mut self,
        coverage_ratio: Vec<f64>,
        covered_sets: Vec<RoaringBitmap>,
        descendants: Vec<RoaringBitmap>,
    ) -> Self {
        self.coverage_ratio = coverage_ratio;
        self.covered_sets = covered_sets;
        self.descendants = descendants;
        self
    }

    pub fn num_groups(&self) -> usize {
        self.out_neighbors.len().saturating_sub(1)
    }

    pub fn out_neighbors(&self, group: IdxType) -> &[IdxType] {
        &self.out_neighbors[group as usize]
    }

    pub fn in_neighbors(&self, group: IdxType) -> &[IdxType] {
        &self.in_neighbors[group as usize]
    }

    pub fn all_out_neighbors(&self) -> &[Vec<IdxType>] {
        &self.out_neighbors
    }

    pub fn coverage_ratios(&self) -> &[f64] {
        &self.coverage_ratio
    }

    pub fn coverage_ratio(&self, group: IdxType) -> f64 {
        self.coverage_ratio[group as usize]
    }

    pub fn covered_sets(&self) -> &[RoaringBitmap] {
        &self.covered_sets
    }

    pub fn covered_set(&self, group: IdxType) -> &RoaringBitmap {
        &self.covered_sets[group as usize]
    }

    pub fn all_descendants(&self) -> &[RoaringBitmap] {
        &self.descendants
    }

    pub fn descendants(&self, group: IdxType) -> &RoaringBitmap {
        &self.descendants[group as usize]
    }

    pub fn descendants_num(&self, group: IdxType) -> u64 {
        self.descendants[group as usize].len()
    }

    pub fn num_edges(&self) -> u64 {
        self.out_neighbors.iter().map(|o| o.len() as u64).sum()
    }

    pub fn avg_descendants(&self) -> f64 {
        let num_groups = self.num_groups();
        if num_groups == 0 || self.descendants.is_empty() {
            return 0.0;
        }
        let total: u64 = self.descendants.iter().skip(1).map(RoaringBitmap::len).sum();
        total as f64 / num_groups as f64
    }

    /// Propagates member sets from the leaves upward.
    ///
    /// `group_ranges[g]` is the id range of group `g`. A group is processed
    /// once all of its out-neighbors are, so every covered set is final when
    /// it reaches its parents. Returns the number of groups left unresolved,
    /// which is zero for a DAG.
    pub fn cal_coverage_ratio(&mut self, group_ranges: &[(IdxType, IdxType)], num_points: usize) -> usize {
        let num_groups = self.num_groups();
        self.covered_sets = group_ranges
            .iter()
            .enumerate()
            .map(|(g, &(start, end))| {
                let mut rb = RoaringBitmap::new();
                if g > 0 {
                    rb.insert_range(start..end);
                }
                rb
            })
            .collect();

        let mut out_degree: Vec<usize> = self.out_neighbors.iter().map(Vec::len).collect();
        let mut queue: std::collections::VecDeque<usize> =
            (1..=num_groups).filter(|&g| out_degree[g] == 0).collect();
        let mut resolved = 0;
        while let Some(cur) = queue.pop_front() {
            resolved += 1;
            let child = self.covered_sets[cur].clone();
            for &parent in &self.in_neighbors[cur] {
                let parent = parent as usize;
                self.covered_sets[parent] |= &child;
                out_degree[parent] -= 1;
                if out_degree[parent] == 0 {
                    queue.push_back(parent);
                }
            }
        }

        self.coverage_ratio = self
            .covered_sets
            .iter()
            .enumerate()
            .map(|(g, rb)| {
                if g == 0 || num_points == 0 {
                    0.0
                } else {
                    rb.len() as f64 / num_points as f64
                }
            })
            .collect();
        num_groups - resolved
    }

    /// Descendant groups of every group via per-group depth-first search.
    pub fn cal_descendants(&mut self) {
        let num_groups = self.num_groups();
        let out_neighbors = &self.out_neighbors;
        self.descendants = (0..=num_groups)
            .into_par_iter()
            .map(|g| {
                let mut rb = RoaringBitmap::new();
                if g == 0 {
                    return rb;
                }
                let mut visited = vec![false; num_groups + 1];
                let mut stack = vec![g];
                while let Some(cur) = stack.pop() {
                    if std::mem::replace(&mut visited[cur], true) {
                        continue;
                    }
                    for &child in &out_neighbors[cur] {
                        let child = child as usize;
                        if child != cur && !visited[child] {
                            rb.insert(child as u32);
                            stack.push(child);
                        }
                    }
                }
                rb
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Groups: 1={1} 2={1,2} 3={2} 4={1,2,3} 5={3} 6={2,3}
    fn sample() -> (LabelTrie, Vec<LabelSet>) {
        let mut trie = LabelTrie::new();
        let mut sets = vec![LabelSet::new()];
        for set in [&[1][..], &[1, 2], &[2], &[1, 2, 3], &[3], &[2, 3]] {
            trie.insert(set);
            sets.push(set.iter().copied().collect());
        }
        (trie, sets)
    }

    #[test]
    fn test_min_super_sets() {
        let (trie, sets) = sample();
        let mut got = min_super_sets(&trie, &sets, &[2], true, true);
        got.sort_unstable();
        assert_eq!(got, vec![2, 6]);
        assert_eq!(min_super_sets(&trie, &sets, &[2], false, true), vec![3]);
        assert_eq!(min_super_sets(&trie, &sets, &[1, 2, 3], true, true), Vec::<IdxType>::new());
        let mut roots = min_super_sets(&trie, &sets, &[], true, true);
        roots.sort_unstable();
        assert_eq!(roots, vec![1, 3, 5]);
    }

    #[test]
    fn test_lng_edges_and_closures() {
        let (trie, sets) = sample();
        let mut lng = LabelNavGraph::build(&trie, &sets);
        let sorted = |g: IdxType| {
            let mut v = lng.out_neighbors(g).to_vec();
            v.sort_unstable();
            v
        };
        assert_eq!(sorted(1), vec![2]);
        assert_eq!(sorted(3), vec![2, 6]);
        assert_eq!(sorted(2), vec![4]);
        assert!(lng.out_neighbors(4).is_empty());
        assert_eq!(lng.num_edges(), 6);
        let mut ins = lng.in_neighbors(4).to_vec();
        ins.sort_unstable();
        assert_eq!(ins, vec![2, 6]);

        // One vector per group, ids g-1.
        let ranges: Vec<(IdxType, IdxType)> =
            std::iter::once((0, 0)).chain((0..6).map(|i| (i, i + 1))).collect();
        assert_eq!(lng.cal_coverage_ratio(&ranges, 6), 0);
        assert_eq!(lng.covered_set(3).iter().collect::<Vec<_>>(), vec![1, 2, 3, 5]);
        assert!((lng.coverage_ratio(4) - 1.0 / 6.0).abs() < 1e-9);

        lng.cal_descendants();
        assert_eq!(lng.descendants(3).iter().collect::<Vec<_>>(), vec![2, 4, 6]);
        assert_eq!(lng.descendants_num(5), 2);
        // 1:{2,4} 2:{4} 3:{2,4,6} 5:{4,6} 6:{4}
        assert!((lng.avg_descendants() - 9.0 / 6.0).abs() < 1e-9);
    }
}
