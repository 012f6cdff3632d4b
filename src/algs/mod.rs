//! Halo construction algorithms and the communication plumbing they run on.

pub mod boundary;
pub mod communicator;
pub mod exchange;
pub mod halo;
pub mod lookup;
pub mod meshgen;
pub mod partition_graph;
pub mod periodic;
pub mod renumber;
pub mod wire;

pub use boundary::{BoundaryPolygon, partition_boundary_nodes};
pub use halo::{BuildHalo, build_halo};
pub use periodic::PeriodicTransform;
pub use renumber::GlobalIndexRenumberer;
