//! Structured lon-lat mesh generator with simple partitioners.
//!
//! Every rank builds its own piece deterministically from the shared
//! configuration, so no communication is needed. A rank holds the cells it
//! owns plus all of their nodes; nodes owned by another rank are ghosts.
//!
//! Periodic grids carry an explicit east column at `lon_min + 360°`. Those
//! nodes are ghost twins of the west column: they share its global index,
//! partition and remote index, and are flagged `PERIODIC | EAST | GHOST`.
//! West column nodes are flagged `PERIODIC | WEST`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::Projection;
use crate::mesh_error::MeshError;
use crate::topology::mesh::{HALO_KEY, Mesh, nb_cells_including_halo_key, nb_nodes_including_halo_key};
use crate::topology::{ElementRecord, ElementType, HybridElements, NodeFlags, NodeRecord, Nodes};

/// Cell shapes for structured meshes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredCellType {
    /// Each quad split along its south-west to north-east diagonal.
    Triangle,
    #[default]
    Quadrilateral,
    /// Quadrilaterals in the west half, triangles in the east half.
    Hybrid,
}

/// Assignment of cells to partitions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Partitioner {
    /// Contiguous latitude bands of cell rows.
    #[default]
    Bands,
    /// `nx` by `ny` blocks; partition `py * nx + px`.
    Checkerboard { nx: usize, ny: usize },
}

impl Partitioner {
    /// Partition of cell `(i, j)` in a `nlon` by `nlat` grid.
    pub fn cell_part(&self, i: usize, j: usize, nlon: usize, nlat: usize, nb_parts: usize) -> usize {
        match *self {
            Partitioner::Bands => j * nb_parts / nlat,
            Partitioner::Checkerboard { nx, ny } => (j * ny / nlat) * nx + i * nx / nlon,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredGridConfig {
    /// Cells along longitude.
    pub nlon: usize,
    /// Cells along latitude.
    pub nlat: usize,
    pub lon_min: f64,
    /// Ignored for periodic grids, which always span 360°.
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
    pub periodic: bool,
    pub cell_type: StructuredCellType,
    pub partitioner: Partitioner,
    pub projection: Projection,
}

impl Default for StructuredGridConfig {
    fn default() -> Self {
        Self {
            nlon: 16,
            nlat: 8,
            lon_min: 0.0,
            lon_max: 360.0,
            lat_min: -90.0,
            lat_max: 90.0,
            periodic: true,
            cell_type: StructuredCellType::Quadrilateral,
            partitioner: Partitioner::Bands,
            projection: Projection::LonLat,
        }
    }
}

fn invalid_config(message: impl Into<String>) -> MeshError {
    MeshError::InvalidConfig(message.into())
}

impl StructuredGridConfig {
    /// Regional (non-periodic) grid over the given box.
    pub fn regional(nlon: usize, nlat: usize, lon: [f64; 2], lat: [f64; 2]) -> Self {
        Self {
            nlon,
            nlat,
            lon_min: lon[0],
            lon_max: lon[1],
            lat_min: lat[0],
            lat_max: lat[1],
            periodic: false,
            ..Self::default()
        }
    }

    pub fn with_partitioner(mut self, partitioner: Partitioner) -> Self {
        self.partitioner = partitioner;
        self
    }

    pub fn validate(&self, nb_parts: usize) -> Result<(), MeshError> {
        if self.nlon == 0 || self.nlat == 0 {
            return Err(invalid_config("nlon and nlat must be positive"));
        }
        if self.periodic && self.nlon < 2 {
            return Err(invalid_config("periodic grids need at least 2 cells along longitude"));
        }
        if !(self.lat_min < self.lat_max) || self.lat_min < -90.0 || self.lat_max > 90.0 {
            return Err(invalid_config(format!(
                "latitude range [{}, {}] is not an increasing range within [-90, 90]",
                self.lat_min, self.lat_max
            )));
        }
        if !self.periodic
            && (!(self.lon_min < self.lon_max) || self.lon_max - self.lon_min > 360.0)
        {
            return Err(invalid_config(format!(
                "longitude range [{}, {}] must be increasing and span at most 360",
                self.lon_min, self.lon_max
            )));
        }
        if matches!(self.projection, Projection::Mercator { .. })
            && (self.lat_min <= -90.0 || self.lat_max >= 90.0)
        {
            return Err(invalid_config("mercator grids cannot reach the poles"));
        }
        if nb_parts == 0 {
            return Err(invalid_config("at least one partition is required"));
        }
        match self.partitioner {
            Partitioner::Bands if nb_parts > self.nlat => Err(invalid_config(format!(
                "{nb_parts} latitude bands requested for {} cell rows",
                self.nlat
            ))),
            Partitioner::Checkerboard { nx, ny }
                if nx * ny != nb_parts || nx > self.nlon || ny > self.nlat || nx == 0 || ny == 0 =>
            {
                Err(invalid_config(format!(
                    "checkerboard {nx}x{ny} does not fit {nb_parts} partitions on a {}x{} grid",
                    self.nlon, self.nlat
                )))
            }
            _ => Ok(()),
        }
    }

    fn lon_max_effective(&self) -> f64 {
        if self.periodic { self.lon_min + 360.0 } else { self.lon_max }
    }

    fn lonlat(&self, i: usize, j: usize) -> [f64; 2] {
        let dlon = (self.lon_max_effective() - self.lon_min) / self.nlon as f64;
        let dlat = (self.lat_max - self.lat_min) / self.nlat as f64;
        [self.lon_min + i as f64 * dlon, self.lat_min + j as f64 * dlat]
    }
}

/// Node `(i, j)` in a grid with `nlon` by `nlat` cells.
type NodeKey = (usize, usize);

struct Layout<'c> {
    cfg: &'c StructuredGridConfig,
    nb_parts: usize,
}

impl Layout<'_> {
    fn cell_part(&self, i: usize, j: usize) -> usize {
        self.cfg
            .partitioner
            .cell_part(i, j, self.cfg.nlon, self.cfg.nlat, self.nb_parts)
    }

    /// Owner of a node: the partition of the cell it is the south-west corner of.
    fn node_part(&self, i: usize, j: usize) -> usize {
        let (i, j) = self.twin(i, j);
        self.cell_part(i.min(self.cfg.nlon - 1), j.min(self.cfg.nlat - 1))
    }

    /// Periodic east column nodes are represented by their west twin.
    fn twin(&self, i: usize, j: usize) -> NodeKey {
        if self.cfg.periodic && i == self.cfg.nlon { (0, j) } else { (i, j) }
    }

    fn node_gidx(&self, i: usize, j: usize) -> i64 {
        let (i, j) = self.twin(i, j);
        let stride = if self.cfg.periodic { self.cfg.nlon } else { self.cfg.nlon + 1 };
        (j * stride + i + 1) as i64
    }

    fn cells_of(&self, part: usize) -> Vec<NodeKey> {
        let mut cells = Vec::new();
        for j in 0..self.cfg.nlat {
            for i in 0..self.cfg.nlon {
                if self.cell_part(i, j) == part {
                    cells.push((i, j));
                }
            }
        }
        cells
    }

    /// Nodes held by `part`, keyed in row-major global order.
    fn nodes_of(&self, part: usize) -> BTreeMap<(usize, usize), usize> {
        let mut keys = BTreeMap::new();
        for (i, j) in self.cells_of(part) {
            for (di, dj) in [(0, 0), (1, 0), (1, 1), (0, 1)] {
                keys.insert((j + dj, i + di), 0);
            }
        }
        for (k, v) in keys.values_mut().enumerate() {
            *v = k;
        }
        keys
    }
}

/// Generate the piece of the grid owned by `part` out of `nb_parts`.
pub fn generate(cfg: &StructuredGridConfig, part: usize, nb_parts: usize) -> Result<Mesh, MeshError> {
    cfg.validate(nb_parts)?;
    if part >= nb_parts {
        return Err(invalid_config(format!("partition {part} out of range 0..{nb_parts}")));
    }
    let layout = Layout { cfg, nb_parts };

    let mine = layout.nodes_of(part);
    let mut others: BTreeMap<usize, BTreeMap<(usize, usize), usize>> = BTreeMap::new();
    let mut nodes = Nodes::with_capacity(mine.len());
    for &(j, i) in mine.keys() {
        let owner = layout.node_part(i, j);
        let (ti, tj) = layout.twin(i, j);
        let remote_index = if owner == part {
            mine[&(tj, ti)]
        } else {
            let table = others
                .entry(owner)
                .or_insert_with(|| layout.nodes_of(owner));
            table.get(&(tj, ti)).copied().ok_or_else(|| {
                MeshError::InvalidMesh(format!("node ({i},{j}) missing on owner {owner}"))
            })?
        };

        let lonlat = cfg.lonlat(i, j);
        let mut flags = NodeFlags::NONE;
        if owner != part {
            flags |= NodeFlags::GHOST;
        }
        if cfg.periodic {
            if i == 0 {
                flags |= NodeFlags::PERIODIC | NodeFlags::WEST;
            } else if i == cfg.nlon {
                flags |= NodeFlags::PERIODIC | NodeFlags::EAST | NodeFlags::GHOST;
            }
        } else if i == 0 {
            flags |= NodeFlags::BC | NodeFlags::WEST;
        } else if i == cfg.nlon {
            flags |= NodeFlags::BC | NodeFlags::EAST;
        }
        if j == 0 {
            flags |= NodeFlags::BC | NodeFlags::SOUTH;
        } else if j == cfg.nlat {
            flags |= NodeFlags::BC | NodeFlags::NORTH;
        }
        if lonlat[1].abs() >= 90.0 {
            flags |= NodeFlags::POLE;
        }

        nodes.push(NodeRecord {
            global_index: layout.node_gidx(i, j),
            partition: owner as i32,
            remote_index: remote_index as i32,
            xy: cfg.projection.xy(lonlat),
            lonlat,
            flags,
        });
    }

    let mut cells = HybridElements::new();
    for (i, j) in layout.cells_of(part) {
        let sw = mine[&(j, i)];
        let se = mine[&(j, i + 1)];
        let ne = mine[&(j + 1, i + 1)];
        let nw = mine[&(j + 1, i)];
        let base = (j * cfg.nlon + i) as i64;
        let quad = || vec![(ElementType::Quadrilateral, vec![sw, se, ne, nw], base + 1)];
        let triangles = |first: i64| {
            vec![
                (ElementType::Triangle, vec![sw, se, ne], first + 2 * base + 1),
                (ElementType::Triangle, vec![sw, ne, nw], first + 2 * base + 2),
            ]
        };
        let rows: Vec<(ElementType, Vec<usize>, i64)> = match cfg.cell_type {
            StructuredCellType::Quadrilateral => quad(),
            StructuredCellType::Triangle => triangles(0),
            // triangles numbered after every possible quad
            StructuredCellType::Hybrid if 2 * i >= cfg.nlon => {
                triangles((cfg.nlon * cfg.nlat) as i64)
            }
            StructuredCellType::Hybrid => quad(),
        };
        for (element_type, row, global_index) in rows {
            cells.push(ElementRecord {
                element_type,
                nodes: row,
                global_index,
                partition: part as i32,
                halo: 0,
                patch: false,
            })?;
        }
    }

    let mut mesh = Mesh::from_parts(nodes, cells, cfg.projection, part, nb_parts);
    let (nb_nodes, nb_cells) = (mesh.nodes().len(), mesh.cells().len());
    let md = mesh.metadata_mut();
    md.set(HALO_KEY, 0usize);
    md.set(nb_nodes_including_halo_key(0), nb_nodes);
    md.set(nb_cells_including_halo_key(0), nb_cells);
    Ok(mesh)
}

/// All pieces of the grid, indexed by partition.
pub fn generate_all(cfg: &StructuredGridConfig, nb_parts: usize) -> Result<Vec<Mesh>, MeshError> {
    (0..nb_parts).map(|p| generate(cfg, p, nb_parts)).collect()
}
