//! Label trie mapping canonical label sets to group ids.
//!
//! Nodes live in an arena and refer to each other by index. A root-to-node
//! path spells an ascending label sequence; a node carrying a non-zero
//! `group_id` terminates the label set of that group.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ung_core::error::IoResultExt;
use ung_core::label::{self, LabelSet};
use ung_core::{IdxType, LabelType, Result, UngError};

const ROOT: usize = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieNode {
    pub label: LabelType,
    pub parent: Option<usize>,
    pub children: BTreeMap<LabelType, usize>,
    /// Zero when no group ends here.
    pub group_id: IdxType,
    /// Depth of the node, i.e. size of the label set it spells.
    pub label_set_size: usize,
}

impl TrieNode {
    fn new(label: LabelType, parent: Option<usize>, label_set_size: usize) -> Self {
        Self {
            label,
            parent,
            children: BTreeMap::new(),
            group_id: 0,
            label_set_size,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.group_id != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTrie {
    nodes: Vec<TrieNode>,
    label_to_nodes: BTreeMap<LabelType, Vec<usize>>,
    num_groups: IdxType,
}

impl Default for LabelTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::new(0, None, 0)],
            label_to_nodes: BTreeMap::new(),
            num_groups: 0,
        }
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups as usize
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, idx: usize) -> &TrieNode {
        &self.nodes[idx]
    }

    /// Returns the group id of `labels`, assigning the next id on first sight.
    /// `labels` must be canonical.
    pub fn insert(&mut self, labels: &[LabelType]) -> IdxType {
        debug_assert!(label::is_canonical(labels));
        let mut cur = ROOT;
        for (depth, &l) in labels.iter().enumerate() {
            cur = match self.nodes[cur].children.get(&l) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(TrieNode::new(l, Some(cur), depth + 1));
                    self.nodes[cur].children.insert(l, child);
                    self.label_to_nodes.entry(l).or_default().push(child);
                    child
                }
            };
        }
        if !self.nodes[cur].is_terminal() {
            self.num_groups += 1;
            self.nodes[cur].group_id = self.num_groups;
        }
        self.nodes[cur].group_id
    }

    /// Terminal node whose path equals `labels`.
    pub fn find_exact_match(&self, labels: &[LabelType]) -> Option<&TrieNode> {
        let mut cur = ROOT;
        for l in labels {
            cur = *self.nodes[cur].children.get(l)?;
        }
        let node = &self.nodes[cur];
        node.is_terminal().then_some(node)
    }

    /// Label set spelled by the path to `idx`.
    pub fn label_set(&self, idx: usize) -> LabelSet {
        let mut labels = LabelSet::new();
        let mut cur = idx;
        while let Some(parent) = self.nodes[cur].parent {
            labels.push(self.nodes[cur].label);
            cur = parent;
        }
        labels.reverse();
        labels
    }

    /// Terminal nodes whose label sets are candidate minimal supersets of `query`.
    ///
    /// With `need_containment` a candidate contains all of `query`; without
    /// it a candidate shares at least one label with `query`. The search stops
    /// descending at the first terminal on each branch, so the result is a
    /// superset of the minimal answers. `avoid_self` drops the group whose
    /// label set equals `query`.
    pub fn get_super_set_entrances(
        &self,
        query: &[LabelType],
        avoid_self: bool,
        need_containment: bool,
    ) -> Vec<&TrieNode> {
        debug_assert!(label::is_canonical(query));
        let starts: Vec<usize> = if query.is_empty() {
            if need_containment {
                vec![ROOT]
            } else {
                Vec::new()
            }
        } else if need_containment {
            // Every superset path passes through a node labelled max(query)
            // whose prefix holds the rest of the query.
            let last = query[query.len() - 1];
            self.label_to_nodes
                .get(&last)
                .map(|nodes| {
                    nodes
                        .iter()
                        .copied()
                        .filter(|&n| label::includes(&self.label_set(n), query))
                        .collect()
                })
                .unwrap_or_default()
        } else {
            query
                .iter()
                .filter_map(|l| self.label_to_nodes.get(l))
                .flatten()
                .copied()
                .collect()
        };

        let mut found = BTreeSet::new();
        let mut queue: VecDeque<usize> = starts.into_iter().collect();
        while let Some(idx) = queue.pop_front() {
            let node = &self.nodes[idx];
            if node.is_terminal() && !(avoid_self && self.spells(idx, query)) {
                found.insert(idx);
                continue;
            }
            queue.extend(node.children.values().copied());
        }
        found.into_iter().map(|idx| &self.nodes[idx]).collect()
    }

    fn spells(&self, idx: usize, query: &[LabelType]) -> bool {
        self.nodes[idx].label_set_size == query.len() && self.label_set(idx).as_slice() == query
    }

    /// Approximate heap footprint in bytes.
    pub fn index_size_bytes(&self) -> usize {
        let per_child = std::mem::size_of::<LabelType>() + std::mem::size_of::<usize>();
        self.nodes
            .iter()
            .map(|n| std::mem::size_of::<TrieNode>() + n.children.len() * per_child)
            .sum::<usize>()
            + self.nodes.len() * std::mem::size_of::<usize>()
    }

    /// `u64` node count, then per node: label `u32`, parent `i64` (-1 for the
    /// root), group id `u32`, label set size `u32`. Children follow from the parents.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_path(path)?;
        let mut w = BufWriter::new(file);
        w.write_u64::<LittleEndian>(self.nodes.len() as u64).with_path(path)?;
        for node in &self.nodes {
            w.write_u32::<LittleEndian>(node.label).with_path(path)?;
            let parent = node.parent.map_or(-1, |p| p as i64);
            w.write_i64::<LittleEndian>(parent).with_path(path)?;
            w.write_u32::<LittleEndian>(node.group_id).with_path(path)?;
            w.write_u32::<LittleEndian>(node.label_set_size as u32).with_path(path)?;
        }
        w.flush().with_path(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_path(path)?;
        let mut r = BufReader::new(file);
        let num_nodes = r.read_u64::<LittleEndian>().with_path(path)? as usize;
        if num_nodes == 0 {
            return Err(UngError::corrupt(path, "trie without root"));
        }

        let mut nodes: Vec<TrieNode> = Vec::with_capacity(num_nodes.min(1 << 20));
        let mut label_to_nodes: BTreeMap<LabelType, Vec<usize>> = BTreeMap::new();
        let mut group_ids = BTreeSet::new();
        for idx in 0..num_nodes {
            let label = r.read_u32::<LittleEndian>().with_path(path)?;
            let parent = r.read_i64::<LittleEndian>().with_path(path)?;
            let group_id = r.read_u32::<LittleEndian>().with_path(path)?;
            let label_set_size = r.read_u32::<LittleEndian>().with_path(path)? as usize;

            let parent = match (idx, parent) {
                (0, -1) => None,
                (0, _) => return Err(UngError::corrupt(path, "root has a parent")),
                // Parents precede children.
                (_, p) if p >= 0 && (p as usize) < idx => Some(p as usize),
                (_, p) => {
                    return Err(UngError::corrupt(path, format!("node {idx} has parent {p}")))
                }
            };
            if let Some(p) = parent {
                if nodes[p].label_set_size + 1 != label_set_size
                    || nodes[p].children.insert(label, idx).is_some()
                {
                    return Err(UngError::corrupt(path, format!("inconsistent node {idx}")));
                }
                label_to_nodes.entry(label).or_default().push(idx);
            }
            if group_id != 0 && !group_ids.insert(group_id) {
                return Err(UngError::corrupt(path, format!("duplicate group id {group_id}")));
            }
            let mut node = TrieNode::new(label, parent, label_set_size);
            node.group_id = group_id;
            nodes.push(node);
        }

        let mut trailing = [0u8; 1];
        if r.read(&mut trailing).with_path(path)? != 0 {
            return Err(UngError::corrupt(path, "trailing bytes"));
        }
        let num_groups = group_ids.len() as IdxType;
        if group_ids.iter().next_back().is_some_and(|&max| max != num_groups) {
            return Err(UngError::corrupt(path, "group ids are not dense"));
        }

        Ok(Self {
            nodes,
            label_to_nodes,
            num_groups,
        })
    }
}
