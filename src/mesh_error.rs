//! MeshError: Unified error type for atlas-halo public APIs
//!
//! Halo construction is a batch operation: a partially grown mesh is not safe
//! to hand to stencil operators, so every error returned here is meant to be
//! propagated to the driver and end the run. Corruption kinds report the
//! offending identifiers so the diagnostic is useful without a debugger.

use thiserror::Error;

use crate::topology::{Gidx, Uid};

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for atlas-halo operations.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Two distinct local nodes produced the same unique id.
    #[error(
        "Node uid: {uid}   {gidx} ({x},{y})  has already been added as node {other_gidx} ({other_x},{other_y})",
        x = .xy[0], y = .xy[1], other_x = .other_xy[0], other_y = .other_xy[1]
    )]
    DuplicateNodeUid {
        uid: Uid,
        gidx: Gidx,
        xy: [f64; 2],
        other_gidx: Gidx,
        other_xy: [f64; 2],
    },
    /// Several duplicate ids were found while building a lookup table.
    #[error("{} duplicate node uids found:\n{}", .0.len(), join_lines(.0))]
    DuplicateNodeUids(Vec<MeshError>),
    /// A node appended during a merge collides with an existing node.
    #[error(
        "New node with uid {uid}: {gidx} ({x},{y}) exists already as local node {other_local}: {other_gidx} ({other_x},{other_y})",
        x = .xy[0], y = .xy[1], other_x = .other_xy[0], other_y = .other_xy[1]
    )]
    NewNodeCollision {
        uid: Uid,
        gidx: Gidx,
        xy: [f64; 2],
        other_local: usize,
        other_gidx: Gidx,
        other_xy: [f64; 2],
    },
    /// A shipped element references a node uid that is not known locally.
    #[error("element {elem_gidx} received from rank {from} references node uid {uid} unknown on rank {rank}")]
    UnresolvedNodeUid {
        uid: Uid,
        elem_gidx: Gidx,
        from: usize,
        rank: usize,
    },
    /// A node selected for shipping vanished from the uid lookup.
    #[error("Node with uid {uid} needed by [{requester}] was not found in [{rank}]")]
    RequestedNodeMissing {
        uid: Uid,
        requester: usize,
        rank: usize,
    },
    /// A point-to-point or collective step failed.
    #[error("Communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: BoxedSource,
    },
    /// A received payload disagrees with its own header or element size.
    #[error("Payload from rank {neighbor} is inconsistent: {reason}")]
    PayloadMismatch { neighbor: usize, reason: String },
    /// Invalid user configuration, detected before any communication.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Mesh content that the algorithms cannot work with.
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),
    /// Element type tag that does not name a known element type.
    #[error("Unknown element type tag {0}")]
    UnknownElementType(u32),
    /// Metadata entry exists but holds a different type.
    #[error("Metadata entry `{key}` is not of type {expected}")]
    MetadataType { key: String, expected: &'static str },
}

impl MeshError {
    /// Whether the error indicates corrupted ids or payloads, as opposed to a
    /// configuration or communication failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MeshError::DuplicateNodeUid { .. }
                | MeshError::DuplicateNodeUids(_)
                | MeshError::NewNodeCollision { .. }
                | MeshError::UnresolvedNodeUid { .. }
                | MeshError::RequestedNodeMissing { .. }
                | MeshError::PayloadMismatch { .. }
        )
    }

    pub(crate) fn comm(neighbor: usize, msg: impl Into<String>) -> Self {
        MeshError::CommError {
            neighbor,
            source: msg.into().into(),
        }
    }
}

fn join_lines(errors: &[MeshError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
