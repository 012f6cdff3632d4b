//! Node → element and uid → node lookup tables.
//!
//! Both tables are snapshots: they are rebuilt from scratch whenever the node
//! or element count changes, never patched in place (except for the uid table
//! during a merge, which registers each node as it is appended).

use hashbrown::HashMap;

use crate::mesh_error::MeshError;
use crate::topology::Uid;
use crate::topology::mesh::Mesh;
use crate::topology::uid::UniqueLonLat;

/// Typical upper bound on cells around a node of a quad/triangle mesh.
const ELEMS_PER_NODE_HINT: usize = 12;

/// For every local node, the flat indices of the non-patch cells using it.
#[derive(Clone, Debug, Default)]
pub struct Node2ElemIndex {
    elems: Vec<Vec<usize>>,
}

impl Node2ElemIndex {
    pub fn build(mesh: &Mesh) -> Self {
        let mut elems: Vec<Vec<usize>> = (0..mesh.nodes().len())
            .map(|_| Vec::with_capacity(ELEMS_PER_NODE_HINT))
            .collect();
        let cells = mesh.cells();
        for (e, t, r) in cells.iter_indices() {
            let block = cells.block(t);
            if block.patch()[r] {
                continue;
            }
            for &n in block.node_connectivity().row(r) {
                if let Some(list) = elems.get_mut(n) {
                    list.push(e);
                }
            }
        }
        Self { elems }
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Cells around node `n`; empty for unknown nodes.
    pub fn elems(&self, n: usize) -> &[usize] {
        self.elems.get(n).map_or(&[], Vec::as_slice)
    }
}

/// Uid → local node index.
#[derive(Clone, Debug, Default)]
pub struct Uid2NodeIndex {
    map: HashMap<Uid, usize>,
}

impl Uid2NodeIndex {
    /// Index every node of `mesh`. All duplicates are collected and reported
    /// together.
    pub fn build(mesh: &Mesh) -> Result<Self, MeshError> {
        let nodes = mesh.nodes();
        let uid = UniqueLonLat::new(nodes);
        let mut map = HashMap::with_capacity(nodes.len());
        let mut dups = Vec::new();
        for j in 0..nodes.len() {
            let u = uid.node(j);
            if let Some(&other) = map.get(&u) {
                dups.push(MeshError::DuplicateNodeUid {
                    uid: u,
                    gidx: nodes.global_index()[j],
                    xy: nodes.xy()[j],
                    other_gidx: nodes.global_index()[other],
                    other_xy: nodes.xy()[other],
                });
            } else {
                map.insert(u, j);
            }
        }
        match dups.len() {
            0 => Ok(Self { map }),
            1 => Err(dups.remove(0)),
            _ => Err(MeshError::DuplicateNodeUids(dups)),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub fn get(&self, uid: Uid) -> Option<usize> {
        self.map.get(&uid).copied()
    }

    /// Register a freshly appended node; returns the existing node on
    /// collision and leaves the table unchanged.
    pub fn insert(&mut self, uid: Uid, node: usize) -> Result<(), usize> {
        match self.map.entry(uid) {
            hashbrown::hash_map::Entry::Occupied(o) => Err(*o.get()),
            hashbrown::hash_map::Entry::Vacant(v) => {
                v.insert(node);
                Ok(())
            }
        }
    }
}
