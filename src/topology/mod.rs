//! Mesh storage for halo construction.
//!
//! This module provides the per-rank mesh containers the halo algorithms work on:
//! - [`Nodes`] and [`HybridElements`] column stores with append-only growth
//! - [`NodeFlags`] topology bits and [`ElementType`] shapes
//! - [`Metadata`] key/value store recording halo provenance
//! - coordinate-derived unique ids ([`uid`]) used as the cross-rank join key

pub mod element_type;
pub mod elements;
pub mod flags;
pub mod mesh;
pub mod metadata;
pub mod nodes;
pub mod uid;

pub use element_type::ElementType;
pub use elements::{BlockConnectivity, ElementRecord, Elements, HybridElements};
pub use flags::NodeFlags;
pub use mesh::Mesh;
pub use metadata::{MetaValue, Metadata};
pub use nodes::{NodeRecord, Nodes};

/// Global index of a node or element; negative values are provisional.
pub type Gidx = i64;

/// Coordinate-derived unique id: positive for nodes, negative for elements.
pub type Uid = i64;
