//! Element shapes stored in hybrid element collections.

use crate::mesh_error::MeshError;

/// Element shapes with a fixed number of nodes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum ElementType {
    /// 1D segment/edge.
    Line,
    /// 2D simplex.
    Triangle,
    /// 2D tensor-product cell.
    Quadrilateral,
}

impl ElementType {
    /// Number of nodes in one connectivity row.
    pub const fn nb_nodes(self) -> usize {
        match self {
            ElementType::Line => 2,
            ElementType::Triangle => 3,
            ElementType::Quadrilateral => 4,
        }
    }

    /// Number of edges (facets of a 2D element).
    pub const fn nb_edges(self) -> usize {
        match self {
            ElementType::Line => 1,
            ElementType::Triangle => 3,
            ElementType::Quadrilateral => 4,
        }
    }

    pub const fn dimension(self) -> u8 {
        match self {
            ElementType::Line => 1,
            ElementType::Triangle | ElementType::Quadrilateral => 2,
        }
    }

    /// Stable tag used on the wire; never reorder.
    pub const fn tag(self) -> u32 {
        match self {
            ElementType::Line => 1,
            ElementType::Triangle => 2,
            ElementType::Quadrilateral => 3,
        }
    }

    pub fn from_tag(tag: u32) -> Result<Self, MeshError> {
        match tag {
            1 => Ok(ElementType::Line),
            2 => Ok(ElementType::Triangle),
            3 => Ok(ElementType::Quadrilateral),
            other => Err(MeshError::UnknownElementType(other)),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ElementType::Line => "Line",
            ElementType::Triangle => "Triangle",
            ElementType::Quadrilateral => "Quadrilateral",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_stable() {
        for t in [
            ElementType::Line,
            ElementType::Triangle,
            ElementType::Quadrilateral,
        ] {
            assert_eq!(ElementType::from_tag(t.tag()).unwrap(), t);
        }
        assert!(matches!(
            ElementType::from_tag(99),
            Err(MeshError::UnknownElementType(99))
        ));
    }
}
