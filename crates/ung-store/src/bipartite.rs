//! Vector-attribute bipartite graph.
//!
//! Nodes `0..num_points` are vectors, nodes `num_points..num_points + A` are
//! attributes. Every (vector, label) pair is stored in both directions.
//!
//! Binary layout, little-endian:
//!
//! ```text
//! 8 bytes   magic "BIPGRPH1"
//! u64       num_points
//! u32       num_attributes
//! u64       attribute map entry count
//!   repeated: u32 label, u32 attr_id          (ascending label)
//! u64       total node count
//!   repeated: u32 neighbor count, u32 ids
//! u32       checksum
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use roaring::RoaringBitmap;
use ung_core::error::IoResultExt;
use ung_core::{IdxType, LabelType, Result, UngError};

use crate::VectorStorage;

pub const MAGIC: &[u8; 8] = b"BIPGRPH1";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorAttrGraph {
    num_points: IdxType,
    attr_to_id: BTreeMap<LabelType, u32>,
    id_to_attr: Vec<LabelType>,
    adjacency: Vec<Vec<IdxType>>,
}

impl VectorAttrGraph {
    /// Numbers attributes in first-seen order over the vector ids.
    pub fn build<S: VectorStorage + ?Sized>(storage: &S) -> Result<Self> {
        let num_points = IdxType::try_from(storage.num_points())
            .map_err(|_| UngError::InvalidConfig("too many vectors".into()))?;

        let mut attr_to_id = BTreeMap::new();
        let mut id_to_attr = Vec::new();
        for vec_id in 0..num_points {
            for &label in storage.label_set(vec_id) {
                attr_to_id.entry(label).or_insert_with(|| {
                    id_to_attr.push(label);
                    (id_to_attr.len() - 1) as u32
                });
            }
        }

        let mut adjacency = vec![Vec::new(); num_points as usize + id_to_attr.len()];
        for vec_id in 0..num_points {
            for label in storage.label_set(vec_id) {
                let attr_node = num_points + attr_to_id[label];
                adjacency[vec_id as usize].push(attr_node);
                adjacency[attr_node as usize].push(vec_id);
            }
        }

        Ok(Self {
            num_points,
            attr_to_id,
            id_to_attr,
            adjacency,
        })
    }

    pub fn num_points(&self) -> usize {
        self.num_points as usize
    }

    pub fn num_attributes(&self) -> usize {
        self.id_to_attr.len()
    }

    pub fn attr_id(&self, label: LabelType) -> Option<u32> {
        self.attr_to_id.get(&label).copied()
    }

    pub fn label_of(&self, attr_id: u32) -> Option<LabelType> {
        self.id_to_attr.get(attr_id as usize).copied()
    }

    pub fn neighbors(&self, node: IdxType) -> &[IdxType] {
        &self.adjacency[node as usize]
    }

    /// Vectors carrying `label`, ascending.
    pub fn vectors_with_label(&self, label: LabelType) -> &[IdxType] {
        match self.attr_id(label) {
            Some(a) => self.neighbors(self.num_points + a),
            None => &[],
        }
    }

    /// Number of undirected edges.
    pub fn count_edges(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }

    pub fn compute_checksum(&self) -> u32 {
        checksum(&self.adjacency)
    }

    /// Vectors that carry every label in `labels`.
    ///
    /// An empty query matches every vector; an unknown label matches none.
    pub fn compute_attribute_bitmap(&self, labels: &[LabelType]) -> RoaringBitmap {
        let mut result: Option<RoaringBitmap> = None;
        for &label in labels {
            let Some(attr) = self.attr_id(label) else {
                return RoaringBitmap::new();
            };
            let members: RoaringBitmap = self
                .neighbors(self.num_points + attr)
                .iter()
                .copied()
                .collect();
            result = Some(match result {
                Some(mut acc) => {
                    acc &= members;
                    acc
                }
                None => members,
            });
        }
        result.unwrap_or_else(|| {
            let mut all = RoaringBitmap::new();
            all.insert_range(0..self.num_points);
            all
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_path(path)?;
        let mut w = BufWriter::new(file);
        self.write_to(&mut w).with_path(path)?;
        w.flush().with_path(path)?;
        tracing::debug!(
            path = %path.display(),
            nodes = self.adjacency.len(),
            edges = self.count_edges(),
            "saved vector-attribute graph"
        );
        Ok(())
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(MAGIC)?;
        w.write_u64::<LittleEndian>(u64::from(self.num_points))?;
        w.write_u32::<LittleEndian>(self.id_to_attr.len() as u32)?;
        w.write_u64::<LittleEndian>(self.attr_to_id.len() as u64)?;
        for (&label, &id) in &self.attr_to_id {
            w.write_u32::<LittleEndian>(label)?;
            w.write_u32::<LittleEndian>(id)?;
        }
        w.write_u64::<LittleEndian>(self.adjacency.len() as u64)?;
        for neighbors in &self.adjacency {
            w.write_u32::<LittleEndian>(neighbors.len() as u32)?;
            for &n in neighbors {
                w.write_u32::<LittleEndian>(n)?;
            }
        }
        w.write_u32::<LittleEndian>(self.compute_checksum())
    }

    /// Reads and validates a graph written by [`VectorAttrGraph::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_path(path)?;
        let mut r = BufReader::new(file);

        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).with_path(path)?;
        if &magic != MAGIC {
            return Err(UngError::corrupt(path, "invalid magic, not a bipartite graph"));
        }

        let num_points = r.read_u64::<LittleEndian>().with_path(path)?;
        let num_points = IdxType::try_from(num_points)
            .map_err(|_| UngError::corrupt(path, format!("num_points {num_points} overflows")))?;
        let num_attributes = r.read_u32::<LittleEndian>().with_path(path)?;
        let map_len = r.read_u64::<LittleEndian>().with_path(path)?;
        if map_len != u64::from(num_attributes) {
            return Err(UngError::corrupt(
                path,
                format!("{map_len} map entries for {num_attributes} attributes"),
            ));
        }

        let mut attr_to_id = BTreeMap::new();
        let mut id_to_attr = vec![None; num_attributes as usize];
        for _ in 0..map_len {
            let label = r.read_u32::<LittleEndian>().with_path(path)?;
            let id = r.read_u32::<LittleEndian>().with_path(path)?;
            let slot = id_to_attr
                .get_mut(id as usize)
                .ok_or_else(|| UngError::corrupt(path, format!("attribute id {id} out of range")))?;
            if slot.is_some() || attr_to_id.insert(label, id).is_some() {
                return Err(UngError::corrupt(path, "duplicate attribute mapping"));
            }
            *slot = Some(label);
        }
        let id_to_attr: Vec<LabelType> = id_to_attr.into_iter().flatten().collect();

        let total_nodes = r.read_u64::<LittleEndian>().with_path(path)?;
        let expected_nodes = u64::from(num_points) + u64::from(num_attributes);
        if total_nodes != expected_nodes {
            return Err(UngError::corrupt(
                path,
                format!("{total_nodes} nodes, expected {expected_nodes}"),
            ));
        }

        let mut adjacency = Vec::with_capacity(total_nodes as usize);
        for _ in 0..total_nodes {
            let count = r.read_u32::<LittleEndian>().with_path(path)?;
            let mut neighbors = Vec::with_capacity((count as usize).min(1 << 16));
            for _ in 0..count {
                let n = r.read_u32::<LittleEndian>().with_path(path)?;
                if u64::from(n) >= total_nodes {
                    return Err(UngError::corrupt(path, format!("node id {n} out of range")));
                }
                neighbors.push(n);
            }
            adjacency.push(neighbors);
        }

        let stored = r.read_u32::<LittleEndian>().with_path(path)?;
        let computed = checksum(&adjacency);
        if stored != computed {
            return Err(UngError::ChecksumMismatch {
                path: path.to_path_buf(),
                stored,
                computed,
            });
        }

        Ok(Self {
            num_points,
            attr_to_id,
            id_to_attr,
            adjacency,
        })
    }
}

fn checksum(adjacency: &[Vec<IdxType>]) -> u32 {
    let mut sum = 0u32;
    for neighbors in adjacency {
        for &node in neighbors {
            sum ^= node << (sum % 32);
        }
    }
    sum
}
