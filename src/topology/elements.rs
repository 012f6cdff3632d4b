//! Hybrid element storage: one fixed-arity block per element type.
//!
//! A flat ("cell") index runs over all blocks in block order, so appending to
//! an earlier block shifts the flat indices of every later block. Lookups keyed
//! by flat index must therefore be rebuilt after any append.

use std::ops::Range;

use crate::mesh_error::MeshError;
use crate::topology::Gidx;
use crate::topology::element_type::ElementType;

/// Row-major connectivity table with a fixed number of columns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockConnectivity {
    cols: usize,
    values: Vec<usize>,
}

impl BlockConnectivity {
    pub fn new(cols: usize) -> Self {
        Self {
            cols,
            values: Vec::new(),
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        if self.cols == 0 { 0 } else { self.values.len() / self.cols }
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn row(&self, r: usize) -> &[usize] {
        &self.values[r * self.cols..(r + 1) * self.cols]
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> usize {
        self.values[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: usize) {
        self.values[r * self.cols + c] = value;
    }

    /// Append `n` rows filled with `fill`.
    pub fn add(&mut self, n: usize, fill: usize) -> Range<usize> {
        let start = self.rows();
        self.values.resize(self.values.len() + n * self.cols, fill);
        start..start + n
    }

    pub fn push_row(&mut self, row: &[usize]) -> Result<usize, MeshError> {
        if row.len() != self.cols {
            return Err(MeshError::InvalidMesh(format!(
                "connectivity row has {} entries, block expects {}",
                row.len(),
                self.cols
            )));
        }
        let r = self.rows();
        self.values.extend_from_slice(row);
        Ok(r)
    }
}

/// One element appended by value.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementRecord {
    pub element_type: ElementType,
    pub nodes: Vec<usize>,
    pub global_index: Gidx,
    pub partition: i32,
    pub halo: i32,
    pub patch: bool,
}

/// All elements of one type.
#[derive(Clone, Debug)]
pub struct Elements {
    element_type: ElementType,
    node_connectivity: BlockConnectivity,
    global_index: Vec<Gidx>,
    partition: Vec<i32>,
    halo: Vec<i32>,
    patch: Vec<bool>,
}

impl Elements {
    pub fn new(element_type: ElementType) -> Self {
        Self {
            element_type,
            node_connectivity: BlockConnectivity::new(element_type.nb_nodes()),
            global_index: Vec::new(),
            partition: Vec::new(),
            halo: Vec::new(),
            patch: Vec::new(),
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.global_index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.global_index.is_empty()
    }

    /// Append `n` rows; connectivity is filled with `usize::MAX` until set.
    pub fn add(&mut self, n: usize) -> Range<usize> {
        let range = self.node_connectivity.add(n, usize::MAX);
        self.global_index.resize(range.end, 0);
        self.partition.resize(range.end, 0);
        self.halo.resize(range.end, 0);
        self.patch.resize(range.end, false);
        range
    }

    pub fn node_connectivity(&self) -> &BlockConnectivity {
        &self.node_connectivity
    }
    pub fn node_connectivity_mut(&mut self) -> &mut BlockConnectivity {
        &mut self.node_connectivity
    }
    pub fn global_index(&self) -> &[Gidx] {
        &self.global_index
    }
    pub fn global_index_mut(&mut self) -> &mut [Gidx] {
        &mut self.global_index
    }
    pub fn partition(&self) -> &[i32] {
        &self.partition
    }
    pub fn partition_mut(&mut self) -> &mut [i32] {
        &mut self.partition
    }
    pub fn halo(&self) -> &[i32] {
        &self.halo
    }
    pub fn halo_mut(&mut self) -> &mut [i32] {
        &mut self.halo
    }
    pub fn patch(&self) -> &[bool] {
        &self.patch
    }
    pub fn patch_mut(&mut self) -> &mut [bool] {
        &mut self.patch
    }
}

/// Elements of mixed types, addressed by a flat index across blocks.
#[derive(Clone, Debug, Default)]
pub struct HybridElements {
    blocks: Vec<Elements>,
}

impl HybridElements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.iter().map(Elements::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(Elements::is_empty)
    }

    pub fn nb_types(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[Elements] {
        &self.blocks
    }

    pub fn block(&self, t: usize) -> &Elements {
        &self.blocks[t]
    }

    pub fn block_mut(&mut self, t: usize) -> &mut Elements {
        &mut self.blocks[t]
    }

    pub fn type_index(&self, element_type: ElementType) -> Option<usize> {
        self.blocks
            .iter()
            .position(|b| b.element_type == element_type)
    }

    /// Index of the block holding `element_type`, creating it when absent.
    pub fn ensure_type(&mut self, element_type: ElementType) -> usize {
        match self.type_index(element_type) {
            Some(t) => t,
            None => {
                self.blocks.push(Elements::new(element_type));
                self.blocks.len() - 1
            }
        }
    }

    /// Flat index of the first element of block `t`.
    pub fn offset(&self, t: usize) -> usize {
        self.blocks[..t].iter().map(Elements::len).sum()
    }

    /// Split a flat index into `(block, row)`.
    pub fn locate(&self, e: usize) -> (usize, usize) {
        let mut rest = e;
        for (t, b) in self.blocks.iter().enumerate() {
            if rest < b.len() {
                return (t, rest);
            }
            rest -= b.len();
        }
        panic!("element index {e} out of range ({} elements)", self.len());
    }

    pub fn element_type(&self, e: usize) -> ElementType {
        let (t, _) = self.locate(e);
        self.blocks[t].element_type
    }

    pub fn node_row(&self, e: usize) -> &[usize] {
        let (t, r) = self.locate(e);
        self.blocks[t].node_connectivity.row(r)
    }

    pub fn global_index(&self, e: usize) -> Gidx {
        let (t, r) = self.locate(e);
        self.blocks[t].global_index[r]
    }

    pub fn partition(&self, e: usize) -> i32 {
        let (t, r) = self.locate(e);
        self.blocks[t].partition[r]
    }

    pub fn halo(&self, e: usize) -> i32 {
        let (t, r) = self.locate(e);
        self.blocks[t].halo[r]
    }

    pub fn patch(&self, e: usize) -> bool {
        let (t, r) = self.locate(e);
        self.blocks[t].patch[r]
    }

    /// Iterate `(flat_index, block, row)` over all elements in flat order.
    pub fn iter_indices(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(t, b)| (0..b.len()).map(move |r| (t, r)))
            .enumerate()
            .map(|(e, (t, r))| (e, t, r))
    }

    /// Append one element, creating its block on demand; returns the row
    /// within its block.
    pub fn push(&mut self, elem: ElementRecord) -> Result<(usize, usize), MeshError> {
        let t = self.ensure_type(elem.element_type);
        let block = &mut self.blocks[t];
        let r = block.node_connectivity.push_row(&elem.nodes)?;
        block.global_index.push(elem.global_index);
        block.partition.push(elem.partition);
        block.halo.push(elem.halo);
        block.patch.push(elem.patch);
        Ok((t, r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(nodes: [usize; 4], gidx: Gidx) -> ElementRecord {
        ElementRecord {
            element_type: ElementType::Quadrilateral,
            nodes: nodes.to_vec(),
            global_index: gidx,
            partition: 0,
            halo: 0,
            patch: false,
        }
    }

    #[test]
    fn flat_index_spans_blocks() {
        let mut cells = HybridElements::new();
        cells.push(quad([0, 1, 2, 3], 1)).unwrap();
        cells
            .push(ElementRecord {
                element_type: ElementType::Triangle,
                nodes: vec![3, 2, 4],
                global_index: 2,
                partition: 1,
                halo: 0,
                patch: true,
            })
            .unwrap();
        cells.push(quad([4, 5, 6, 7], 3)).unwrap();

        assert_eq!(cells.len(), 3);
        assert_eq!(cells.nb_types(), 2);
        // quads first (block 0), then the triangle
        assert_eq!(cells.locate(1), (0, 1));
        assert_eq!(cells.locate(2), (1, 0));
        assert_eq!(cells.node_row(2), &[3, 2, 4]);
        assert!(cells.patch(2));
        assert_eq!(cells.global_index(1), 3);
        assert_eq!(cells.offset(1), 2);
        let flat: Vec<_> = cells.iter_indices().collect();
        assert_eq!(flat, vec![(0, 0, 0), (1, 0, 1), (2, 1, 0)]);
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let mut cells = HybridElements::new();
        let mut bad = quad([0, 1, 2, 3], 1);
        bad.nodes.pop();
        assert!(matches!(cells.push(bad), Err(MeshError::InvalidMesh(_))));
    }

    #[test]
    fn add_reserves_rows() {
        let mut block = Elements::new(ElementType::Triangle);
        let r = block.add(2);
        assert_eq!(r, 0..2);
        block.node_connectivity_mut().set(1, 2, 9);
        assert_eq!(block.node_connectivity().row(1), &[usize::MAX, usize::MAX, 9]);
        assert_eq!(block.halo().len(), 2);
    }
}
