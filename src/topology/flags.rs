//! Per-node topology flags.
//!
//! `NodeFlags` is a plain `u32` bitset so it can be shipped on the wire as-is.
//! The bit layout is shared by every rank and must not change between runs
//! that exchange meshes.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use bytemuck::{Pod, Zeroable};

/// Topology bits attached to every node.
#[repr(transparent)]
#[derive(
    Copy, Clone, Default, PartialEq, Eq, Hash, Pod, Zeroable, serde::Serialize, serde::Deserialize,
)]
pub struct NodeFlags(u32);

impl NodeFlags {
    pub const NONE: NodeFlags = NodeFlags(0);
    /// Lies on a physical (non-partition) boundary.
    pub const BC: NodeFlags = NodeFlags(1 << 0);
    pub const SOUTH: NodeFlags = NodeFlags(1 << 1);
    pub const NORTH: NodeFlags = NodeFlags(1 << 2);
    pub const WEST: NodeFlags = NodeFlags(1 << 3);
    pub const EAST: NodeFlags = NodeFlags(1 << 4);
    /// Owned by another partition, or a periodic image.
    pub const GHOST: NodeFlags = NodeFlags(1 << 5);
    pub const PERIODIC: NodeFlags = NodeFlags(1 << 6);
    pub const POLE: NodeFlags = NodeFlags(1 << 7);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        NodeFlags(bits)
    }

    /// True when *all* bits of `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: NodeFlags) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: NodeFlags) {
        self.0 &= !other.0;
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for NodeFlags {
    type Output = NodeFlags;
    #[inline]
    fn bitor(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for NodeFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: NodeFlags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for NodeFlags {
    type Output = NodeFlags;
    #[inline]
    fn bitand(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 & rhs.0)
    }
}

impl fmt::Debug for NodeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(NodeFlags, &str); 8] = [
            (NodeFlags::BC, "BC"),
            (NodeFlags::SOUTH, "SOUTH"),
            (NodeFlags::NORTH, "NORTH"),
            (NodeFlags::WEST, "WEST"),
            (NodeFlags::EAST, "EAST"),
            (NodeFlags::GHOST, "GHOST"),
            (NodeFlags::PERIODIC, "PERIODIC"),
            (NodeFlags::POLE, "POLE"),
        ];
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_requires_all_bits() {
        let f = NodeFlags::PERIODIC | NodeFlags::WEST;
        assert!(f.contains(NodeFlags::PERIODIC));
        assert!(f.contains(NodeFlags::PERIODIC | NodeFlags::WEST));
        assert!(!f.contains(NodeFlags::PERIODIC | NodeFlags::EAST));
    }

    #[test]
    fn insert_and_remove() {
        let mut f = NodeFlags::NONE;
        f.insert(NodeFlags::GHOST);
        f |= NodeFlags::EAST;
        assert_eq!(format!("{f:?}"), "EAST|GHOST");
        f.remove(NodeFlags::GHOST);
        assert_eq!(f, NodeFlags::EAST);
    }
}
