#![cfg_attr(docsrs, feature(doc_cfg))]
//! # atlas-halo
//!
//! atlas-halo grows the per-rank pieces of a distributed 2D mesh by layers of
//! ghost cells, the way global weather and climate codes need them for
//! stencil operations near partition boundaries and across the periodic
//! longitude seam.
//!
//! ## Features
//! - Column-stored nodes and hybrid elements with halo metadata
//! - Coordinate-derived unique ids used to match entities across ranks
//! - Interior and periodic (west/east) halo passes, any number of levels
//! - Collective renumbering of provisional global indices
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! atlas-halo = "0.1"
//! # features = ["mpi-support", "rayon"]
//! ```
//!
//! ```
//! use atlas_halo::prelude::*;
//!
//! let cfg = StructuredGridConfig { nlon: 8, nlat: 4, ..Default::default() };
//! let mut mesh = generate(&cfg, 0, 1).unwrap();
//! build_halo(&mut mesh, 1, &NoComm).unwrap();
//! assert_eq!(mesh.halo().unwrap(), 1);
//! ```
//!
//! ## Determinism
//!
//! Received data is merged in rank order and deduplicated against a snapshot
//! of the mesh, so a build produces the same local ordering regardless of
//! message arrival order.

pub mod algs;
pub mod config;
pub mod geometry;
pub mod mesh_error;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{CommTag, Communicator, LocalComm, NoComm};
    pub use crate::algs::halo::{BuildHalo, build_halo};
    pub use crate::algs::meshgen::{Partitioner, StructuredCellType, StructuredGridConfig, generate};
    pub use crate::algs::periodic::PeriodicTransform;
    pub use crate::algs::renumber::GlobalIndexRenumberer;
    pub use crate::config::{BoundaryStrategy, ExchangeStrategy, HaloConfig};
    pub use crate::geometry::{BoundingBox, Projection};
    pub use crate::mesh_error::MeshError;
    pub use crate::topology::{ElementType, Mesh, NodeFlags};
}
