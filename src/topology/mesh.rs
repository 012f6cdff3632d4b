//! The per-rank mesh: nodes, cells, metadata and projection.
//!
//! A `Mesh` is exclusively owned by one rank. Structural mutation goes through
//! [`Mesh::nodes_mut`] / [`Mesh::cells_mut`], which bump the revision counter
//! and drop cached derived data, so a cached boundary polygon can never
//! outlive the connectivity it was computed from.

use once_cell::unsync::OnceCell;

use crate::algs::boundary::BoundaryPolygon;
use crate::geometry::Projection;
use crate::mesh_error::MeshError;
use crate::topology::elements::HybridElements;
use crate::topology::metadata::Metadata;
use crate::topology::nodes::Nodes;

/// Metadata key holding the number of completed halo levels.
pub const HALO_KEY: &str = "halo";
/// Metadata key flagging node global indices as renumbered.
pub const NODES_HUMAN_READABLE_KEY: &str = "nodes.global_index.human_readable";
/// Metadata key flagging cell global indices as renumbered.
pub const CELLS_HUMAN_READABLE_KEY: &str = "cells.global_index.human_readable";

/// Metadata key for the node count after halo level `k`.
pub fn nb_nodes_including_halo_key(k: usize) -> String {
    format!("nb_nodes_including_halo[{k}]")
}

/// Metadata key for the cell count after halo level `k`.
pub fn nb_cells_including_halo_key(k: usize) -> String {
    format!("nb_cells_including_halo[{k}]")
}

#[derive(Debug, Default)]
pub struct Mesh {
    nodes: Nodes,
    cells: HybridElements,
    metadata: Metadata,
    projection: Projection,
    part: usize,
    nb_parts: usize,
    revision: u64,
    polygon: OnceCell<BoundaryPolygon>,
}

impl Clone for Mesh {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            cells: self.cells.clone(),
            metadata: self.metadata.clone(),
            projection: self.projection,
            part: self.part,
            nb_parts: self.nb_parts,
            revision: self.revision,
            polygon: OnceCell::new(),
        }
    }
}

impl Mesh {
    /// Empty mesh for partition `part` of `nb_parts`.
    pub fn new(part: usize, nb_parts: usize) -> Self {
        Self {
            part,
            nb_parts: nb_parts.max(1),
            ..Self::default()
        }
    }

    pub fn from_parts(
        nodes: Nodes,
        cells: HybridElements,
        projection: Projection,
        part: usize,
        nb_parts: usize,
    ) -> Self {
        Self {
            nodes,
            cells,
            projection,
            part,
            nb_parts: nb_parts.max(1),
            ..Self::default()
        }
    }

    pub fn nodes(&self) -> &Nodes {
        &self.nodes
    }

    /// Mutable node access; invalidates cached derived data.
    pub fn nodes_mut(&mut self) -> &mut Nodes {
        self.invalidate_cache();
        &mut self.nodes
    }

    pub fn cells(&self) -> &HybridElements {
        &self.cells
    }

    /// Mutable cell access; invalidates cached derived data.
    pub fn cells_mut(&mut self) -> &mut HybridElements {
        self.invalidate_cache();
        &mut self.cells
    }

    /// Both collections at once, e.g. to remap connectivity while reading nodes.
    pub fn nodes_and_cells_mut(&mut self) -> (&mut Nodes, &mut HybridElements) {
        self.invalidate_cache();
        (&mut self.nodes, &mut self.cells)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
    }

    /// Partition (rank) this mesh belongs to.
    pub fn part(&self) -> usize {
        self.part
    }

    pub fn nb_parts(&self) -> usize {
        self.nb_parts
    }

    /// Incremented on every structural mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of completed halo levels.
    pub fn halo(&self) -> Result<usize, MeshError> {
        Ok(self.metadata.get_int_or(HALO_KEY, 0)?.max(0) as usize)
    }

    /// Boundary polygon of the current mesh, computed once per revision.
    pub fn polygon(&self) -> Result<&BoundaryPolygon, MeshError> {
        self.polygon
            .get_or_try_init(|| BoundaryPolygon::from_mesh(self))
    }

    pub fn has_cached_polygon(&self) -> bool {
        self.polygon.get().is_some()
    }

    fn invalidate_cache(&mut self) {
        self.revision += 1;
        self.polygon = OnceCell::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::element_type::ElementType;
    use crate::topology::elements::ElementRecord;
    use crate::topology::nodes::NodeRecord;

    fn unit_quad() -> Mesh {
        let mut mesh = Mesh::new(0, 1);
        for xy in [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]] {
            mesh.nodes_mut().push(NodeRecord {
                xy,
                lonlat: xy,
                ..Default::default()
            });
        }
        mesh.cells_mut()
            .push(ElementRecord {
                element_type: ElementType::Quadrilateral,
                nodes: vec![0, 1, 2, 3],
                global_index: 1,
                partition: 0,
                halo: 0,
                patch: false,
            })
            .unwrap();
        mesh
    }

    #[test]
    fn polygon_is_cached_until_mutation() {
        let mut mesh = unit_quad();
        let rev = mesh.revision();
        assert_eq!(mesh.polygon().unwrap().len(), 5);
        assert!(mesh.has_cached_polygon());
        mesh.nodes_mut();
        assert!(!mesh.has_cached_polygon());
        assert!(mesh.revision() > rev);
    }

    #[test]
    fn halo_defaults_to_zero() {
        let mut mesh = unit_quad();
        assert_eq!(mesh.halo().unwrap(), 0);
        mesh.metadata_mut().set(HALO_KEY, 2usize);
        assert_eq!(mesh.halo().unwrap(), 2);
        assert_eq!(nb_nodes_including_halo_key(2), "nb_nodes_including_halo[2]");
    }
}
