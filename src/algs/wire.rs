//! Fixed, versioned, little-endian wire types for the halo exchange.
//!
//! A halo payload for one destination rank is a single message:
//!
//! ```text
//! WireHaloHdr | node_glb_idx[n] | node_part[n] | node_ridx[n] | node_flags[n]
//!             | node_xy[2n] | elem_glb_idx[m] | elem_part[m] | elem_type[m]
//!             | elem_nodes_displs[m] | elem_nodes_id[k]
//! ```
//!
//! Shipping every column in one message means all arrays of a rank arrive
//! together, and the header counts let the receiver check that they agree.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

use crate::mesh_error::MeshError;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Copy raw bytes into a freshly allocated (hence aligned) `Vec<T>`.
pub fn vec_from_bytes<T: Pod>(bytes: &[u8], neighbor: usize) -> Result<Vec<T>, MeshError> {
    let sz = size_of::<T>();
    if sz == 0 || bytes.len() % sz != 0 {
        return Err(MeshError::PayloadMismatch {
            neighbor,
            reason: format!(
                "{} bytes is not a multiple of the {sz}-byte element size",
                bytes.len()
            ),
        });
    }
    let mut out = vec![T::zeroed(); bytes.len() / sz];
    cast_slice_mut(&mut out).copy_from_slice(bytes);
    Ok(out)
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Payload kind carried in [`WireHaloHdr::kind_le`].
pub const KIND_HALO: u16 = 0x4A1;

/// All multi-byte integers in these structs are **little-endian** on the wire.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHaloHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub nb_nodes_le: u32,
    pub nb_elems_le: u32,
    pub nb_elem_nodes_le: u32,
}

impl WireHaloHdr {
    pub fn new(nb_nodes: usize, nb_elems: usize, nb_elem_nodes: usize) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: KIND_HALO.to_le(),
            nb_nodes_le: (nb_nodes as u32).to_le(),
            nb_elems_le: (nb_elems as u32).to_le(),
            nb_elem_nodes_le: (nb_elem_nodes as u32).to_le(),
        }
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn nb_nodes(&self) -> usize {
        u32::from_le(self.nb_nodes_le) as usize
    }
    pub fn nb_elems(&self) -> usize {
        u32::from_le(self.nb_elems_le) as usize
    }
    pub fn nb_elem_nodes(&self) -> usize {
        u32::from_le(self.nb_elem_nodes_le) as usize
    }
}

const_assert_eq!(size_of::<WireHaloHdr>(), 16);

/// Nodes and elements destined for (or received from) one rank.
///
/// Element connectivity is expressed as node uids, since local indices mean
/// nothing on another rank; `elem_nodes_displs[e]` is the offset of element
/// `e`'s first node in `elem_nodes_id`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HaloPayload {
    pub node_glb_idx: Vec<i64>,
    pub node_part: Vec<i32>,
    pub node_ridx: Vec<i32>,
    pub node_flags: Vec<u32>,
    pub node_xy: Vec<f64>,
    pub elem_glb_idx: Vec<i64>,
    pub elem_part: Vec<i32>,
    pub elem_type: Vec<u32>,
    pub elem_nodes_displs: Vec<u32>,
    pub elem_nodes_id: Vec<i64>,
}

impl HaloPayload {
    pub fn nb_nodes(&self) -> usize {
        self.node_glb_idx.len()
    }

    pub fn nb_elems(&self) -> usize {
        self.elem_glb_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nb_nodes() == 0 && self.nb_elems() == 0
    }

    pub fn node_xy(&self, n: usize) -> [f64; 2] {
        [self.node_xy[2 * n], self.node_xy[2 * n + 1]]
    }

    /// Node uids of element `e`.
    pub fn elem_nodes(&self, e: usize) -> &[i64] {
        let start = self.elem_nodes_displs[e] as usize;
        let end = self
            .elem_nodes_displs
            .get(e + 1)
            .map_or(self.elem_nodes_id.len(), |&d| d as usize);
        &self.elem_nodes_id[start..end]
    }

    fn check_consistent(&self, neighbor: usize) -> Result<(), MeshError> {
        let n = self.nb_nodes();
        let m = self.nb_elems();
        let mismatch = |what: &str, got: usize, want: usize| MeshError::PayloadMismatch {
            neighbor,
            reason: format!("{what} has {got} entries, expected {want}"),
        };
        for (what, got, want) in [
            ("node_part", self.node_part.len(), n),
            ("node_ridx", self.node_ridx.len(), n),
            ("node_flags", self.node_flags.len(), n),
            ("node_xy", self.node_xy.len(), 2 * n),
            ("elem_part", self.elem_part.len(), m),
            ("elem_type", self.elem_type.len(), m),
            ("elem_nodes_displs", self.elem_nodes_displs.len(), m),
        ] {
            if got != want {
                return Err(mismatch(what, got, want));
            }
        }
        let k = self.elem_nodes_id.len();
        let mut prev = 0usize;
        for (e, &d) in self.elem_nodes_displs.iter().enumerate() {
            let d = d as usize;
            if d < prev || d > k || (e == 0 && d != 0) {
                return Err(MeshError::PayloadMismatch {
                    neighbor,
                    reason: format!("element {e} displacement {d} out of order (len {k})"),
                });
            }
            prev = d;
        }
        Ok(())
    }

    /// Serialise into one message.
    pub fn encode(&self) -> Result<Vec<u8>, MeshError> {
        self.check_consistent(usize::MAX)?;
        let hdr = WireHaloHdr::new(
            self.nb_nodes(),
            self.nb_elems(),
            self.elem_nodes_id.len(),
        );
        let mut out = Vec::with_capacity(
            size_of::<WireHaloHdr>()
                + self.nb_nodes() * (8 + 4 + 4 + 4 + 16)
                + self.nb_elems() * (8 + 4 + 4 + 4)
                + self.elem_nodes_id.len() * 8,
        );
        out.extend_from_slice(cast_slice(std::slice::from_ref(&hdr)));
        push_le(&mut out, &self.node_glb_idx, i64::to_le);
        push_le(&mut out, &self.node_part, i32::to_le);
        push_le(&mut out, &self.node_ridx, i32::to_le);
        push_le(&mut out, &self.node_flags, u32::to_le);
        push_le(&mut out, &self.node_xy, |v: f64| f64::from_bits(v.to_bits().to_le()));
        push_le(&mut out, &self.elem_glb_idx, i64::to_le);
        push_le(&mut out, &self.elem_part, i32::to_le);
        push_le(&mut out, &self.elem_type, u32::to_le);
        push_le(&mut out, &self.elem_nodes_displs, u32::to_le);
        push_le(&mut out, &self.elem_nodes_id, i64::to_le);
        Ok(out)
    }

    /// Deserialise a message received from `neighbor`.
    pub fn decode(bytes: &[u8], neighbor: usize) -> Result<Self, MeshError> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        let mut cursor = Cursor {
            bytes,
            pos: 0,
            neighbor,
        };
        let hdr: WireHaloHdr = cursor
            .take::<WireHaloHdr>(1)?
            .pop()
            .ok_or_else(|| MeshError::comm(neighbor, "missing halo header"))?;
        if hdr.version() != WIRE_VERSION || hdr.kind() != KIND_HALO {
            return Err(MeshError::PayloadMismatch {
                neighbor,
                reason: format!(
                    "unexpected header version {} kind {:#x}",
                    hdr.version(),
                    hdr.kind()
                ),
            });
        }
        let (n, m, k) = (hdr.nb_nodes(), hdr.nb_elems(), hdr.nb_elem_nodes());
        let payload = HaloPayload {
            node_glb_idx: from_le(cursor.take(n)?, i64::from_le),
            node_part: from_le(cursor.take(n)?, i32::from_le),
            node_ridx: from_le(cursor.take(n)?, i32::from_le),
            node_flags: from_le(cursor.take(n)?, u32::from_le),
            node_xy: from_le(cursor.take(2 * n)?, |v: f64| {
                f64::from_bits(u64::from_le(v.to_bits()))
            }),
            elem_glb_idx: from_le(cursor.take(m)?, i64::from_le),
            elem_part: from_le(cursor.take(m)?, i32::from_le),
            elem_type: from_le(cursor.take(m)?, u32::from_le),
            elem_nodes_displs: from_le(cursor.take(m)?, u32::from_le),
            elem_nodes_id: from_le(cursor.take(k)?, i64::from_le),
        };
        if cursor.pos != bytes.len() {
            return Err(MeshError::PayloadMismatch {
                neighbor,
                reason: format!("{} trailing bytes", bytes.len() - cursor.pos),
            });
        }
        payload.check_consistent(neighbor)?;
        Ok(payload)
    }
}

fn push_le<T: Pod>(out: &mut Vec<u8>, values: &[T], to_le: impl Fn(T) -> T) {
    for &v in values {
        out.extend_from_slice(bytemuck::bytes_of(&to_le(v)));
    }
}

fn from_le<T: Pod>(mut values: Vec<T>, from_le: impl Fn(T) -> T) -> Vec<T> {
    for v in &mut values {
        *v = from_le(*v);
    }
    values
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    neighbor: usize,
}

impl Cursor<'_> {
    fn take<T: Pod>(&mut self, count: usize) -> Result<Vec<T>, MeshError> {
        let len = count * size_of::<T>();
        let end = self.pos + len;
        if end > self.bytes.len() {
            return Err(MeshError::PayloadMismatch {
                neighbor: self.neighbor,
                reason: format!(
                    "truncated payload: need {end} bytes, have {}",
                    self.bytes.len()
                ),
            });
        }
        let out = vec_from_bytes(&self.bytes[self.pos..end], self.neighbor)?;
        self.pos = end;
        Ok(out)
    }
}
