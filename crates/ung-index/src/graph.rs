//! Adjacency lists with one lock per node.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::RwLock;
use ung_core::error::IoResultExt;
use ung_core::{IdxType, Result, UngError};

#[derive(Debug, Default)]
pub struct Graph {
    // Index in vector = IdxType.
    neighbors: Vec<RwLock<Vec<IdxType>>>,
}

impl Graph {
    pub fn new(num_nodes: usize) -> Self {
        let mut neighbors = Vec::with_capacity(num_nodes);
        neighbors.resize_with(num_nodes, || RwLock::new(Vec::new()));
        Self { neighbors }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Copy of the neighbor list, taken under the node lock.
    pub fn neighbors(&self, id: IdxType) -> Vec<IdxType> {
        self.neighbors[id as usize].read().clone()
    }

    pub fn with_neighbors<R>(&self, id: IdxType, f: impl FnOnce(&[IdxType]) -> R) -> R {
        f(&self.neighbors[id as usize].read())
    }

    pub fn set_neighbors(&self, id: IdxType, list: Vec<IdxType>) {
        *self.neighbors[id as usize].write() = list;
    }

    /// Appends without deduplication.
    pub fn push_neighbor(&self, id: IdxType, neighbor: IdxType) {
        self.neighbors[id as usize].write().push(neighbor);
    }

    /// Mutates every list in place. Requires exclusive access.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(IdxType, &mut Vec<IdxType>)) {
        for (id, lock) in self.neighbors.iter_mut().enumerate() {
            f(id as IdxType, lock.get_mut());
        }
    }

    pub fn num_edges(&self) -> u64 {
        self.neighbors.iter().map(|l| l.read().len() as u64).sum()
    }

    pub fn index_size_bytes(&self) -> usize {
        self.num_edges() as usize * std::mem::size_of::<IdxType>()
            + self.len() * std::mem::size_of::<u32>()
    }

    /// Owned copy of all lists.
    pub fn snapshot(&self) -> Vec<Vec<IdxType>> {
        self.neighbors.iter().map(|l| l.read().clone()).collect()
    }

    /// Nodes `offset..offset + len` addressed by local ids.
    pub fn view(&self, offset: IdxType, len: usize) -> GraphView<'_> {
        debug_assert!(offset as usize + len <= self.len());
        GraphView {
            graph: self,
            offset,
            len,
        }
    }

    /// `u64` node count, then per node a `u32` degree and the neighbor ids.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_path(path)?;
        let mut w = BufWriter::new(file);
        w.write_u64::<LittleEndian>(self.len() as u64).with_path(path)?;
        for lock in &self.neighbors {
            let list = lock.read();
            w.write_u32::<LittleEndian>(list.len() as u32).with_path(path)?;
            for &n in list.iter() {
                w.write_u32::<LittleEndian>(n).with_path(path)?;
            }
        }
        w.flush().with_path(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_path(path)?;
        let mut r = BufReader::new(file);
        let num_nodes = r.read_u64::<LittleEndian>().with_path(path)?;
        let num_nodes = usize::try_from(num_nodes)
            .map_err(|_| UngError::corrupt(path, "node count overflows"))?;
        let mut neighbors = Vec::with_capacity(num_nodes.min(1 << 24));
        for _ in 0..num_nodes {
            let degree = r.read_u32::<LittleEndian>().with_path(path)? as usize;
            let mut list = Vec::with_capacity(degree.min(1 << 16));
            for _ in 0..degree {
                let n = r.read_u32::<LittleEndian>().with_path(path)?;
                if n as usize >= num_nodes {
                    return Err(UngError::corrupt(path, format!("neighbor {n} out of range")));
                }
                list.push(n);
            }
            neighbors.push(RwLock::new(list));
        }
        let mut trailing = [0u8; 1];
        if r.read(&mut trailing).with_path(path)? != 0 {
            return Err(UngError::corrupt(path, "trailing bytes"));
        }
        Ok(Self { neighbors })
    }
}

/// Window `[offset, offset + len)` of a [`Graph`] addressed from zero.
///
/// Only the slot is translated; stored neighbor ids are whatever the
/// builder writes, which are local ids until the unified graph is offset.
#[derive(Debug, Clone, Copy)]
pub struct GraphView<'a> {
    graph: &'a Graph,
    offset: IdxType,
    len: usize,
}

impl GraphView<'_> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn offset(&self) -> IdxType {
        self.offset
    }

    pub fn neighbors(&self, local: IdxType) -> Vec<IdxType> {
        self.graph.neighbors(self.offset + local)
    }

    pub fn with_neighbors<R>(&self, local: IdxType, f: impl FnOnce(&[IdxType]) -> R) -> R {
        self.graph.with_neighbors(self.offset + local, f)
    }

    pub fn set_neighbors(&self, local: IdxType, list: Vec<IdxType>) {
        self.graph.set_neighbors(self.offset + local, list);
    }

    pub fn update_neighbors<R>(&self, local: IdxType, f: impl FnOnce(&mut Vec<IdxType>) -> R) -> R {
        f(&mut self.graph.neighbors[(self.offset + local) as usize].write())
    }

    /// Adds `neighbor` under the node lock unless present; returns the new degree.
    pub fn add_neighbor(&self, local: IdxType, neighbor: IdxType) -> usize {
        let mut list = self.graph.neighbors[(self.offset + local) as usize].write();
        if !list.contains(&neighbor) {
            list.push(neighbor);
        }
        list.len()
    }
}
