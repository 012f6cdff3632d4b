//! Column storage for mesh nodes.
//!
//! Every attribute lives in its own `Vec`, indexed by the node's local index.
//! Local indices are positions; they are only stable while the collection is
//! appended to, never when it is resized downward.

use std::ops::Range;

use crate::topology::Gidx;
use crate::topology::flags::NodeFlags;

/// One node's worth of attributes, used to append rows.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeRecord {
    pub global_index: Gidx,
    pub partition: i32,
    pub remote_index: i32,
    pub xy: [f64; 2],
    pub lonlat: [f64; 2],
    pub flags: NodeFlags,
}

/// Node collection of a single rank.
#[derive(Clone, Debug, Default)]
pub struct Nodes {
    global_index: Vec<Gidx>,
    partition: Vec<i32>,
    remote_index: Vec<i32>,
    xy: Vec<[f64; 2]>,
    lonlat: Vec<[f64; 2]>,
    ghost: Vec<bool>,
    flags: Vec<NodeFlags>,
}

impl Nodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            global_index: Vec::with_capacity(n),
            partition: Vec::with_capacity(n),
            remote_index: Vec::with_capacity(n),
            xy: Vec::with_capacity(n),
            lonlat: Vec::with_capacity(n),
            ghost: Vec::with_capacity(n),
            flags: Vec::with_capacity(n),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.global_index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.global_index.is_empty()
    }

    /// Resize every column to `n` rows; new rows are zeroed.
    pub fn resize(&mut self, n: usize) {
        self.global_index.resize(n, 0);
        self.partition.resize(n, 0);
        self.remote_index.resize(n, -1);
        self.xy.resize(n, [0.0; 2]);
        self.lonlat.resize(n, [0.0; 2]);
        self.ghost.resize(n, false);
        self.flags.resize(n, NodeFlags::NONE);
    }

    /// Append `n` zeroed rows and return their local index range.
    pub fn add(&mut self, n: usize) -> Range<usize> {
        let start = self.len();
        self.resize(start + n);
        start..start + n
    }

    /// Append one node; the ghost column is derived from the GHOST flag.
    pub fn push(&mut self, node: NodeRecord) -> usize {
        let idx = self.len();
        self.global_index.push(node.global_index);
        self.partition.push(node.partition);
        self.remote_index.push(node.remote_index);
        self.xy.push(node.xy);
        self.lonlat.push(node.lonlat);
        self.ghost.push(node.flags.contains(NodeFlags::GHOST));
        self.flags.push(node.flags);
        idx
    }

    /// Overwrite row `i` from a record.
    pub fn set(&mut self, i: usize, node: NodeRecord) {
        self.global_index[i] = node.global_index;
        self.partition[i] = node.partition;
        self.remote_index[i] = node.remote_index;
        self.xy[i] = node.xy;
        self.lonlat[i] = node.lonlat;
        self.ghost[i] = node.flags.contains(NodeFlags::GHOST);
        self.flags[i] = node.flags;
    }

    pub fn record(&self, i: usize) -> NodeRecord {
        NodeRecord {
            global_index: self.global_index[i],
            partition: self.partition[i],
            remote_index: self.remote_index[i],
            xy: self.xy[i],
            lonlat: self.lonlat[i],
            flags: self.flags[i],
        }
    }

    pub fn global_index(&self) -> &[Gidx] {
        &self.global_index
    }
    pub fn global_index_mut(&mut self) -> &mut [Gidx] {
        &mut self.global_index
    }
    pub fn partition(&self) -> &[i32] {
        &self.partition
    }
    pub fn partition_mut(&mut self) -> &mut [i32] {
        &mut self.partition
    }
    pub fn remote_index(&self) -> &[i32] {
        &self.remote_index
    }
    pub fn remote_index_mut(&mut self) -> &mut [i32] {
        &mut self.remote_index
    }
    pub fn xy(&self) -> &[[f64; 2]] {
        &self.xy
    }
    pub fn xy_mut(&mut self) -> &mut [[f64; 2]] {
        &mut self.xy
    }
    pub fn lonlat(&self) -> &[[f64; 2]] {
        &self.lonlat
    }
    pub fn lonlat_mut(&mut self) -> &mut [[f64; 2]] {
        &mut self.lonlat
    }
    pub fn ghost(&self) -> &[bool] {
        &self.ghost
    }
    pub fn flags(&self) -> &[NodeFlags] {
        &self.flags
    }

    /// Replace the flags of node `i`, keeping the ghost column in sync.
    pub fn set_flags(&mut self, i: usize, flags: NodeFlags) {
        self.flags[i] = flags;
        self.ghost[i] = flags.contains(NodeFlags::GHOST);
    }

    /// Number of nodes whose ghost flag is set.
    pub fn nb_ghost(&self) -> usize {
        self.ghost.iter().filter(|&&g| g).count()
    }
}
