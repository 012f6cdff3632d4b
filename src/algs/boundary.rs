//! Partition boundary extraction.
//!
//! A facet (edge of a 2D cell) that only one local cell uses lies on the
//! boundary of this rank's piece of the mesh. Patch cells never contribute
//! facets, and neither do cells beyond the requested halo depth.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use itertools::Itertools;

use crate::config::BoundaryStrategy;
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;

/// Facet table built from cell connectivity.
#[derive(Clone, Debug, Default)]
pub struct Facets {
    /// Node pair of each facet, in the orientation of its first cell.
    pub nodes: Vec<[usize; 2]>,
    /// Cells on either side; `None` when only one cell uses the facet.
    pub elems: Vec<[Option<usize>; 2]>,
    pub nb_inner: usize,
}

impl Facets {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Facets with a single incident cell.
    pub fn boundary(&self) -> impl Iterator<Item = [usize; 2]> + '_ {
        self.nodes
            .iter()
            .zip(&self.elems)
            .filter(|(_, e)| e[1].is_none())
            .map(|(n, _)| *n)
    }
}

/// Build the facets of all non-patch 2D cells with `halo <= max_halo`.
pub fn accumulate_facets(mesh: &Mesh, max_halo: usize) -> Facets {
    let cells = mesh.cells();
    let mut facets = Facets::default();
    let mut index: HashMap<(usize, usize), usize> = HashMap::with_capacity(cells.len() * 2);
    for (e, t, r) in cells.iter_indices() {
        let block = cells.block(t);
        if block.patch()[r] || block.halo()[r] > max_halo as i32 {
            continue;
        }
        if block.element_type().dimension() != 2 {
            continue;
        }
        let row = block.node_connectivity().row(r);
        for k in 0..row.len() {
            let (a, b) = (row[k], row[(k + 1) % row.len()]);
            let key = if a < b { (a, b) } else { (b, a) };
            match index.get(&key) {
                Some(&f) => {
                    if facets.elems[f][1].is_none() {
                        facets.elems[f][1] = Some(e);
                        facets.nb_inner += 1;
                    }
                }
                None => {
                    index.insert(key, facets.nodes.len());
                    facets.nodes.push([a, b]);
                    facets.elems.push([Some(e), None]);
                }
            }
        }
    }
    facets
}

/// Closed loops of boundary nodes; each loop repeats its first node at the end.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoundaryPolygon {
    nodes: Vec<usize>,
    loops: Vec<std::ops::Range<usize>>,
    halo: usize,
}

impl BoundaryPolygon {
    /// Polygon of `mesh` at its current halo depth.
    pub fn from_mesh(mesh: &Mesh) -> Result<Self, MeshError> {
        Ok(Self::build(mesh, mesh.halo()?))
    }

    /// Polygon of the cells with `halo <= halo`.
    pub fn build(mesh: &Mesh, halo: usize) -> Self {
        let facets = accumulate_facets(mesh, halo);
        let mut adjacency: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut edges: Vec<([usize; 2], bool)> = Vec::new();
        for f in facets.boundary() {
            let id = edges.len();
            edges.push((f, false));
            adjacency.entry(f[0]).or_default().push(id);
            adjacency.entry(f[1]).or_default().push(id);
        }

        let mut nodes = Vec::with_capacity(edges.len() + 1);
        let mut loops = Vec::new();
        for start_edge in 0..edges.len() {
            if edges[start_edge].1 {
                continue;
            }
            let begin = nodes.len();
            let start = edges[start_edge].0[0];
            nodes.push(start);
            let mut current = start;
            let mut next_edge = Some(start_edge);
            while let Some(id) = next_edge {
                edges[id].1 = true;
                let [a, b] = edges[id].0;
                current = if a == current { b } else { a };
                nodes.push(current);
                if current == start {
                    break;
                }
                next_edge = adjacency
                    .get(&current)
                    .and_then(|ids| ids.iter().copied().find(|&i| !edges[i].1));
            }
            // open chains only occur on non-manifold input; close them anyway
            if current != start {
                nodes.push(start);
            }
            loops.push(begin..nodes.len());
        }
        Self { nodes, loops, halo }
    }

    /// Number of entries, closing repeats included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn nb_loops(&self) -> usize {
        self.loops.len()
    }

    pub fn loop_nodes(&self, k: usize) -> &[usize] {
        &self.nodes[self.loops[k].clone()]
    }

    pub fn halo(&self) -> usize {
        self.halo
    }

    /// Distinct nodes on the polygon, sorted.
    pub fn unique_nodes(&self) -> Vec<usize> {
        self.nodes.iter().copied().sorted_unstable().dedup().collect()
    }
}

/// Sorted local indices of the nodes on this rank's partition boundary.
///
/// An empty mesh has an empty boundary.
pub fn partition_boundary_nodes(
    mesh: &Mesh,
    halo: usize,
    strategy: BoundaryStrategy,
) -> Result<Vec<usize>, MeshError> {
    let nodes = match strategy {
        BoundaryStrategy::Facets => accumulate_facets(mesh, halo)
            .boundary()
            .flatten()
            .sorted_unstable()
            .dedup()
            .collect(),
        BoundaryStrategy::Polygon => {
            if mesh.halo()? == halo {
                mesh.polygon()?.unique_nodes()
            } else {
                BoundaryPolygon::build(mesh, halo).unique_nodes()
            }
        }
    };
    Ok(nodes)
}
