//! Halo construction: grow each rank's mesh by layers of ghost cells.
//!
//! One level runs three passes over the same pipeline:
//!
//! 1. interior: request the uids of this rank's boundary nodes from adjacent
//!    ranks, receive the owned cells touching them, merge;
//! 2. west periodic: request the images (+360°) of the west seam nodes and
//!    receive cells shifted back by -360°;
//! 3. east periodic: the same for the east seam with the opposite shift.
//!
//! Each pass is a request exchange, a local resolve, a payload exchange and a
//! merge. Merges walk the sources in rank order and deduplicate against a
//! snapshot of the mesh plus the uids already accepted in the same pass, so
//! the outcome does not depend on message arrival order.
//!
//! Provisional global indices of periodic ghosts are negative (the negated
//! coordinate uid) and are replaced by [`crate::algs::renumber`] once all
//! levels are built.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use hashbrown::HashSet;
use log::{debug, info, log_enabled, trace, warn};

use crate::algs::boundary::partition_boundary_nodes;
use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::sparse_exchange;
use crate::algs::lookup::{Node2ElemIndex, Uid2NodeIndex};
use crate::algs::partition_graph::{PartitionGraph, PassNeighbours};
use crate::algs::periodic::{PeriodicPoints, PeriodicTransform};
use crate::algs::renumber::GlobalIndexRenumberer;
use crate::algs::wire::{HaloPayload, cast_slice, vec_from_bytes};
use crate::config::HaloConfig;
use crate::mesh_error::MeshError;
use crate::topology::mesh::{
    CELLS_HUMAN_READABLE_KEY, HALO_KEY, Mesh, NODES_HUMAN_READABLE_KEY,
    nb_cells_including_halo_key, nb_nodes_including_halo_key,
};
use crate::topology::uid::{UniqueLonLat, element_uid, unique_lonlat};
use crate::topology::{ElementRecord, ElementType, NodeFlags, NodeRecord, Uid};

const HALO_TAG: CommTag = CommTag::new(0x4A00);
const GRAPH_OFFSET: u16 = 0;

/// Builds halos and remembers which entities came from periodic passes.
#[derive(Clone, Debug, Default)]
pub struct BuildHalo {
    config: HaloConfig,
    periodic_points_local_index: Vec<usize>,
    /// `(block, row)` of cells created by periodic passes. Rows are stable
    /// while flat indices shift whenever an earlier block grows.
    periodic_cells: Vec<(usize, usize)>,
}

impl BuildHalo {
    pub fn new(config: HaloConfig) -> Result<Self, MeshError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    pub fn config(&self) -> &HaloConfig {
        &self.config
    }

    /// Local indices of nodes created by periodic passes.
    pub fn periodic_points_local_index(&self) -> &[usize] {
        &self.periodic_points_local_index
    }

    /// `(block, row)` of cells created by periodic passes.
    pub fn periodic_cells(&self) -> &[(usize, usize)] {
        &self.periodic_cells
    }

    /// Flat indices of cells created by periodic passes, resolved against
    /// the current block sizes of `mesh`.
    pub fn periodic_cells_local_index(&self, mesh: &Mesh) -> Vec<usize> {
        let cells = mesh.cells();
        self.periodic_cells
            .iter()
            .map(|&(t, r)| cells.offset(t) + r)
            .collect()
    }

    /// Grow `mesh` to `depth` halo levels. Collective over `comm`.
    ///
    /// A mesh that already has `depth` or more levels is left untouched.
    pub fn build<C: Communicator>(
        &mut self,
        mesh: &mut Mesh,
        depth: usize,
        comm: &C,
    ) -> Result<(), MeshError> {
        if mesh.part() != comm.rank() || mesh.nb_parts() != comm.size() {
            return Err(MeshError::InvalidMesh(format!(
                "mesh is partition {} of {}, communicator is rank {} of {}",
                mesh.part(),
                mesh.nb_parts(),
                comm.rank(),
                comm.size()
            )));
        }
        let halo = mesh.halo()?;
        if halo >= depth {
            debug!("halo {halo} already satisfies requested depth {depth}");
            return Ok(());
        }

        for jhalo in halo..depth {
            debug!("increase halo {}", jhalo + 1);
            let nb_nodes_before_halo_increase = mesh.nodes().len();
            let graph = PartitionGraph::build(
                mesh,
                comm,
                HALO_TAG.offset(GRAPH_OFFSET),
                self.config.exchange,
                self.config.bbox_tolerance,
            )?;

            let mut level = HaloLevel::new(mesh, comm, &self.config, &graph, jhalo);
            level.increase_halo_interior()?;
            if self.config.periodic {
                for transform in [PeriodicTransform::WestEast, PeriodicTransform::EastWest] {
                    level.increase_halo_periodic(transform, nb_nodes_before_halo_increase)?;
                }
            }
            let status = level.status;

            self.periodic_points_local_index
                .extend(status.new_periodic_ghost_points);
            self.periodic_cells.extend(status.new_periodic_ghost_cells);

            let nb_nodes = mesh.nodes().len();
            let nb_cells = mesh.cells().len();
            let md = mesh.metadata_mut();
            md.set(nb_nodes_including_halo_key(jhalo + 1), nb_nodes);
            md.set(nb_cells_including_halo_key(jhalo + 1), nb_cells);
            md.set(HALO_KEY, jhalo + 1);
            md.set(NODES_HUMAN_READABLE_KEY, false);
            md.set(CELLS_HUMAN_READABLE_KEY, false);
        }

        if self.config.renumber {
            GlobalIndexRenumberer::new(comm).renumber(mesh, true)?;
        }
        info!(
            "[rank {}] halo {depth}: {} nodes, {} cells",
            comm.rank(),
            mesh.nodes().len(),
            mesh.cells().len()
        );
        Ok(())
    }
}

/// Grow `mesh` to `depth` halo levels with the default configuration.
pub fn build_halo<C: Communicator>(
    mesh: &mut Mesh,
    depth: usize,
    comm: &C,
) -> Result<(), MeshError> {
    BuildHalo::new(HaloConfig::default())?.build(mesh, depth, comm)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pass {
    Interior,
    Periodic(PeriodicTransform),
}

impl Pass {
    /// Tags of the request and payload stages.
    fn tags(self) -> (CommTag, CommTag) {
        let k = match self {
            Pass::Interior => 1,
            Pass::Periodic(PeriodicTransform::WestEast) => 3,
            Pass::Periodic(PeriodicTransform::EastWest) => 5,
        };
        (HALO_TAG.offset(k), HALO_TAG.offset(k + 1))
    }

    fn transform(self) -> Option<PeriodicTransform> {
        match self {
            Pass::Interior => None,
            Pass::Periodic(t) => Some(t),
        }
    }
}

/// Payloads of one pass keyed by peer rank.
#[derive(Clone, Debug, Default)]
pub struct Buffers {
    parts: BTreeMap<usize, HaloPayload>,
}

impl Buffers {
    pub fn get(&self, rank: usize) -> Option<&HaloPayload> {
        self.parts.get(&rank)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &HaloPayload)> {
        self.parts.iter().map(|(&r, p)| (r, p))
    }

    pub fn nb_nodes(&self) -> usize {
        self.parts.values().map(HaloPayload::nb_nodes).sum()
    }

    pub fn nb_elems(&self) -> usize {
        self.parts.values().map(HaloPayload::nb_elems).sum()
    }
}

impl FromIterator<(usize, HaloPayload)> for Buffers {
    fn from_iter<I: IntoIterator<Item = (usize, HaloPayload)>>(iter: I) -> Self {
        Self {
            parts: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Buffers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Nodes\n-----")?;
        let mut n = 0;
        for p in self.parts.values() {
            for g in &p.node_glb_idx {
                writeln!(f, "{n:>4} : {g}")?;
                n += 1;
            }
        }
        writeln!(f, "Cells\n-----")?;
        let mut e = 0;
        for p in self.parts.values() {
            for k in 0..p.nb_elems() {
                let name = ElementType::from_tag(p.elem_type[k]).map_or("?", ElementType::name);
                writeln!(
                    f,
                    "{e:>4} :  [ {name} -- p{}]  {}",
                    p.elem_part[k], p.elem_glb_idx[k]
                )?;
                e += 1;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Status {
    new_periodic_ghost_points: Vec<usize>,
    /// `(block, row)` of each periodic ghost cell.
    new_periodic_ghost_cells: Vec<(usize, usize)>,
}

/// State of one halo level on one rank.
struct HaloLevel<'a, C> {
    mesh: &'a mut Mesh,
    comm: &'a C,
    config: &'a HaloConfig,
    graph: &'a PartitionGraph,
    /// Depth before this level.
    halo: usize,
    bdry_nodes: Vec<usize>,
    node2elem: Node2ElemIndex,
    uid2node: Uid2NodeIndex,
    status: Status,
}

impl<'a, C: Communicator> HaloLevel<'a, C> {
    fn new(
        mesh: &'a mut Mesh,
        comm: &'a C,
        config: &'a HaloConfig,
        graph: &'a PartitionGraph,
        halo: usize,
    ) -> Self {
        Self {
            mesh,
            comm,
            config,
            graph,
            halo,
            bdry_nodes: Vec::new(),
            node2elem: Node2ElemIndex::default(),
            uid2node: Uid2NodeIndex::default(),
            status: Status::default(),
        }
    }

    fn rank(&self) -> usize {
        self.comm.rank()
    }

    fn rebuild_lookups(&mut self) -> Result<(), MeshError> {
        self.node2elem = Node2ElemIndex::build(self.mesh);
        self.uid2node = Uid2NodeIndex::build(self.mesh)?;
        Ok(())
    }

    fn increase_halo_interior(&mut self) -> Result<(), MeshError> {
        self.rebuild_lookups()?;
        self.bdry_nodes = partition_boundary_nodes(self.mesh, self.halo, self.config.boundary)?;

        let uid = UniqueLonLat::new(self.mesh.nodes());
        let request: Vec<Uid> = self.bdry_nodes.iter().map(|&n| uid.node(n)).collect();
        trace!(
            "[rank {}] interior pass: {} boundary nodes",
            self.rank(),
            request.len()
        );

        let peers = self.graph.pass(None, self.mesh.projection());
        let recv = self.exchange(Pass::Interior, &request, &peers)?;
        self.add_buffers(&recv, None)
    }

    fn increase_halo_periodic(
        &mut self,
        transform: PeriodicTransform,
        nb_nodes_before_halo_increase: usize,
    ) -> Result<(), MeshError> {
        self.rebuild_lookups()?;
        if self.bdry_nodes.is_empty() {
            self.bdry_nodes =
                partition_boundary_nodes(self.mesh, self.halo, self.config.boundary)?;
        }

        let nodes = self.mesh.nodes();
        let points = PeriodicPoints::new(
            nodes.flags(),
            transform.seam_flags(),
            nb_nodes_before_halo_increase,
        );
        if log_enabled!(log::Level::Trace) {
            trace!("[rank {}] periodic {transform:?}: {points}", self.rank());
        }
        let bdry_nodes = points.filter(&self.bdry_nodes);
        let lonlat = nodes.lonlat();
        let request: Vec<Uid> = bdry_nodes
            .iter()
            .map(|&n| unique_lonlat(transform.apply(lonlat[n])))
            .collect();

        let peers = self.graph.pass(Some(transform), self.mesh.projection());
        let recv = self.exchange(Pass::Periodic(transform), &request, &peers)?;
        self.add_buffers(&recv, Some(transform))
    }

    /// Send `request` to `peers.send`, answer the requests of `peers.recv`,
    /// and return the answers to our own request.
    fn exchange(
        &self,
        pass: Pass,
        request: &[Uid],
        peers: &PassNeighbours,
    ) -> Result<Buffers, MeshError> {
        let (request_tag, payload_tag) = pass.tags();

        let bytes = cast_slice(request).to_vec();
        let sends: BTreeMap<usize, Vec<u8>> =
            peers.send.iter().map(|&j| (j, bytes.clone())).collect();
        let requests = sparse_exchange(self.comm, request_tag, &sends, &peers.recv)?;

        let mut replies = BTreeMap::new();
        for (&jpart, raw) in &requests {
            let uids: Vec<Uid> = vec_from_bytes(raw, jpart)?;
            let (found_elems, found_nodes_uid) = self.accumulate_elements(&uids);
            let payload = self.fill_sendbuffer(&found_nodes_uid, &found_elems, pass, jpart)?;
            trace!(
                "[rank {}] {pass:?}: {} requests from {jpart} -> {} nodes, {} cells",
                self.rank(),
                uids.len(),
                payload.nb_nodes(),
                payload.nb_elems()
            );
            replies.insert(jpart, payload.encode()?);
        }

        let received = sparse_exchange(self.comm, payload_tag, &replies, &peers.send)?;
        let recv = received
            .into_iter()
            .map(|(j, raw)| HaloPayload::decode(&raw, j).map(|p| (j, p)))
            .collect::<Result<Buffers, _>>()?;
        if log_enabled!(log::Level::Trace) {
            trace!("[rank {}] recv:\n{recv}", self.rank());
        }
        Ok(recv)
    }

    /// Owned, non-patch cells touching any requested node, and the uids of
    /// their nodes that were not requested.
    fn accumulate_elements(&self, request: &[Uid]) -> (Vec<usize>, BTreeSet<Uid>) {
        let me = self.rank() as i32;
        let cells = self.mesh.cells();
        let mut found = BTreeSet::new();
        for &uid in request {
            if let Some(node) = self.uid2node.get(uid) {
                for &e in self.node2elem.elems(node) {
                    if cells.partition(e) == me {
                        found.insert(e);
                    }
                }
            }
        }

        let uid = UniqueLonLat::new(self.mesh.nodes());
        let mut new_nodes_uid: BTreeSet<Uid> = found
            .iter()
            .flat_map(|&e| cells.node_row(e).iter().map(|&n| uid.node(n)))
            .collect();
        for u in request {
            new_nodes_uid.remove(u);
        }
        (found.into_iter().collect(), new_nodes_uid)
    }

    fn fill_sendbuffer(
        &self,
        nodes_uid: &BTreeSet<Uid>,
        elems: &[usize],
        pass: Pass,
        requester: usize,
    ) -> Result<HaloPayload, MeshError> {
        let nodes = self.mesh.nodes();
        let cells = self.mesh.cells();
        let projection = *self.mesh.projection();
        let transform = pass.transform();
        let mut buf = HaloPayload::default();

        for &uid in nodes_uid {
            let node = self.uid2node.get(uid).ok_or_else(|| {
                warn!(
                    "Node with uid {uid} needed by [{requester}] was not found in [{}]",
                    self.rank()
                );
                MeshError::RequestedNodeMissing {
                    uid,
                    requester,
                    rank: self.rank(),
                }
            })?;
            buf.node_part.push(nodes.partition()[node]);
            buf.node_ridx.push(nodes.remote_index()[node]);
            match transform {
                None => {
                    let xy = nodes.xy()[node];
                    buf.node_glb_idx.push(nodes.global_index()[node]);
                    buf.node_xy.extend_from_slice(&xy);
                    buf.node_flags
                        .push((nodes.flags()[node] | NodeFlags::GHOST).bits());
                }
                Some(t) => {
                    let xy = t.unapply_xy(&projection, nodes.xy()[node]);
                    // provisional: negated uid of the image seen by the requester
                    buf.node_glb_idx
                        .push(-unique_lonlat(projection.lonlat(xy)));
                    buf.node_xy.extend_from_slice(&xy);
                    buf.node_flags.push(t.ghost_flags().bits());
                }
            }
        }

        let lonlat = nodes.lonlat();
        let uid = UniqueLonLat::new(nodes);
        for &e in elems {
            buf.elem_nodes_displs.push(buf.elem_nodes_id.len() as u32);
            buf.elem_part.push(cells.partition(e));
            buf.elem_type.push(cells.element_type(e).tag());
            let row = cells.node_row(e);
            match transform {
                None => {
                    buf.elem_glb_idx.push(cells.global_index(e));
                    buf.elem_nodes_id.extend(row.iter().map(|&n| uid.node(n)));
                }
                Some(t) => {
                    let pts: Vec<[f64; 2]> = row.iter().map(|&n| t.unapply(lonlat[n])).collect();
                    buf.elem_nodes_id
                        .extend(pts.iter().map(|&p| unique_lonlat(p)));
                    buf.elem_glb_idx.push(element_uid(&pts));
                }
            }
        }
        Ok(buf)
    }

    fn add_buffers(
        &mut self,
        buf: &Buffers,
        periodic: Option<PeriodicTransform>,
    ) -> Result<(), MeshError> {
        self.add_nodes(buf, periodic.is_some())?;
        self.add_elements(buf, periodic.is_some())
    }

    fn add_nodes(&mut self, buf: &Buffers, periodic: bool) -> Result<(), MeshError> {
        let projection = *self.mesh.projection();
        let nb_nodes = self.mesh.nodes().len();

        let mut node_uid: Vec<Uid> = {
            let uid = UniqueLonLat::new(self.mesh.nodes());
            (0..nb_nodes).map(|j| uid.node(j)).collect()
        };
        sort_uids(&mut node_uid);
        let mut new_node_uid: HashSet<Uid> = HashSet::new();

        let mut accepted: Vec<(usize, usize, Uid)> = Vec::new();
        for (jpart, p) in buf.iter() {
            for n in 0..p.nb_nodes() {
                let u = unique_lonlat(projection.lonlat(p.node_xy(n)));
                if node_uid.binary_search(&u).is_err() && new_node_uid.insert(u) {
                    accepted.push((jpart, n, u));
                }
            }
        }
        trace!(
            "[rank {}] received {} nodes, {} new",
            self.rank(),
            buf.nb_nodes(),
            accepted.len()
        );

        let nodes = self.mesh.nodes_mut();
        for (jpart, n, u) in accepted {
            let Some(p) = buf.get(jpart) else { continue };
            let xy = p.node_xy(n);
            let record = NodeRecord {
                global_index: p.node_glb_idx[n],
                partition: p.node_part[n],
                remote_index: p.node_ridx[n],
                xy,
                lonlat: projection.lonlat(xy),
                flags: NodeFlags::from_bits(p.node_flags[n]),
            };
            let loc = nodes.push(record);
            if periodic {
                self.status.new_periodic_ghost_points.push(loc);
            }
            if let Err(other) = self.uid2node.insert(u, loc) {
                return Err(MeshError::NewNodeCollision {
                    uid: u,
                    gidx: record.global_index,
                    xy,
                    other_local: other,
                    other_gidx: nodes.global_index()[other],
                    other_xy: nodes.xy()[other],
                });
            }
        }
        Ok(())
    }

    fn add_elements(&mut self, buf: &Buffers, periodic: bool) -> Result<(), MeshError> {
        let me = self.rank();
        let mut elem_uid: Vec<Uid> = {
            let cells = self.mesh.cells();
            let uid = UniqueLonLat::new(self.mesh.nodes());
            let mut keys = Vec::with_capacity(2 * cells.len());
            for e in 0..cells.len() {
                keys.push(uid.element(cells.node_row(e)));
                keys.push(cells.global_index(e));
            }
            keys
        };
        sort_uids(&mut elem_uid);
        let mut new_elem_uid: HashSet<Uid> = HashSet::new();

        let mut records = Vec::new();
        for (jpart, p) in buf.iter() {
            for e in 0..p.nb_elems() {
                let key = p.elem_glb_idx[e];
                if elem_uid.binary_search(&key).is_ok() || !new_elem_uid.insert(key) {
                    continue;
                }
                let element_type = ElementType::from_tag(p.elem_type[e])?;
                let ids = p.elem_nodes(e);
                if ids.len() != element_type.nb_nodes() {
                    return Err(MeshError::PayloadMismatch {
                        neighbor: jpart,
                        reason: format!(
                            "{} element {key} has {} nodes",
                            element_type.name(),
                            ids.len()
                        ),
                    });
                }
                let nodes = ids
                    .iter()
                    .map(|&uid| {
                        self.uid2node.get(uid).ok_or(MeshError::UnresolvedNodeUid {
                            uid,
                            elem_gidx: key,
                            from: jpart,
                            rank: me,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                records.push(ElementRecord {
                    element_type,
                    nodes,
                    global_index: key,
                    partition: p.elem_part[e],
                    halo: self.halo as i32 + 1,
                    patch: false,
                });
            }
        }
        trace!(
            "[rank {me}] received {} cells, {} new",
            buf.nb_elems(),
            records.len()
        );

        let cells = self.mesh.cells_mut();
        for record in records {
            let (t, r) = cells.push(record)?;
            if periodic {
                self.status.new_periodic_ghost_cells.push((t, r));
            }
        }
        Ok(())
    }
}

fn sort_uids(uids: &mut [Uid]) {
    #[cfg(feature = "rayon")]
    {
        use rayon::slice::ParallelSliceMut;
        uids.par_sort_unstable();
    }
    #[cfg(not(feature = "rayon"))]
    uids.sort_unstable();
}
