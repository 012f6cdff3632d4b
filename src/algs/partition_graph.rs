//! Which ranks can possibly exchange halo data.
//!
//! Every rank contributes the inflated bounding box of its node coordinates.
//! For a pass whose requests are mapped by a transform `T`, rank `i` sends
//! requests to `j` when `bbox_j` meets `T(bbox_i)`; both sides evaluate the
//! same predicate on the same all-gathered boxes, so send and receive sets
//! mirror each other without further negotiation.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::all_gather_v;
use crate::algs::periodic::PeriodicTransform;
use crate::config::ExchangeStrategy;
use crate::geometry::{BoundingBox, Projection};
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;

/// Send/receive rank sets for one halo pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassNeighbours {
    /// Ranks this rank sends its requests to (and receives payloads from).
    pub send: Vec<usize>,
    /// Ranks this rank receives requests from (and sends payloads to).
    pub recv: Vec<usize>,
}

/// All-gathered partition bounding boxes.
#[derive(Clone, Debug)]
pub struct PartitionGraph {
    rank: usize,
    bboxes: Vec<BoundingBox>,
    strategy: ExchangeStrategy,
}

impl PartitionGraph {
    /// Collective: every rank must call this with the same `strategy`.
    pub fn build<C: Communicator>(
        mesh: &Mesh,
        comm: &C,
        tag: CommTag,
        strategy: ExchangeStrategy,
        tolerance: f64,
    ) -> Result<Self, MeshError> {
        let rank = comm.rank();
        let bboxes = match strategy {
            ExchangeStrategy::Global => vec![BoundingBox::empty(); comm.size()],
            ExchangeStrategy::Neighbours => {
                let local = BoundingBox::from_points(mesh.nodes().xy()).inflate(tolerance);
                let all = all_gather_v(comm, tag, std::slice::from_ref(&local))?;
                (0..comm.size())
                    .map(|r| match all.segment(r) {
                        [b] => Ok(*b),
                        other => Err(MeshError::PayloadMismatch {
                            neighbor: r,
                            reason: format!("expected one bounding box, got {}", other.len()),
                        }),
                    })
                    .collect::<Result<_, _>>()?
            }
        };
        Ok(Self {
            rank,
            bboxes,
            strategy,
        })
    }

    pub fn bbox(&self, rank: usize) -> &BoundingBox {
        &self.bboxes[rank]
    }

    pub fn nb_parts(&self) -> usize {
        self.bboxes.len()
    }

    /// Adjacent ranks other than this one, in rank order.
    pub fn nearest_neighbours(&self) -> Vec<usize> {
        self.pass(None, &Projection::LonLat).send
    }

    /// Peer sets for a pass; `transform` is `None` for the interior pass.
    ///
    /// Periodic passes always include this rank, which lets a partition find
    /// its own images across the seam. The global strategy includes every
    /// rank in every pass.
    pub fn pass(
        &self,
        transform: Option<PeriodicTransform>,
        projection: &Projection,
    ) -> PassNeighbours {
        if self.strategy == ExchangeStrategy::Global {
            let all: Vec<usize> = (0..self.bboxes.len()).collect();
            return PassNeighbours {
                send: all.clone(),
                recv: all,
            };
        }
        let image = |b: &BoundingBox| match transform {
            Some(t) => t.apply_bbox(projection, b),
            None => *b,
        };
        let me = &self.bboxes[self.rank];
        let mine_mapped = image(me);
        let mut send = Vec::new();
        let mut recv = Vec::new();
        for (j, bj) in self.bboxes.iter().enumerate() {
            let include_self = j == self.rank && transform.is_some();
            if j == self.rank && !include_self {
                continue;
            }
            if include_self || bj.intersects(&mine_mapped) {
                send.push(j);
            }
            if include_self || me.intersects(&image(bj)) {
                recv.push(j);
            }
        }
        PassNeighbours { send, recv }
    }
}
