//! Global index renumbering.
//!
//! Halo growth leaves provisional (negative) global indices on periodic
//! ghosts, and several ranks may hold the same entity under the same
//! provisional value. Renumbering gathers the values to edit on a root rank,
//! sorts them, gives every distinct value the next integer and scatters the
//! result back, so equal provisional values end up with equal final indices
//! on every rank.

use log::debug;

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::{RecvBuffer, gather_v, scatter_v};
use crate::mesh_error::MeshError;
use crate::topology::Gidx;
use crate::topology::mesh::{CELLS_HUMAN_READABLE_KEY, Mesh, NODES_HUMAN_READABLE_KEY};

const RENUMBER_TAG: CommTag = CommTag::new(0x4B00);
const ROOT: usize = 0;

/// Collective renumbering of node and cell global indices.
pub struct GlobalIndexRenumberer<'c, C> {
    comm: &'c C,
    tag: CommTag,
}

impl<'c, C: Communicator> GlobalIndexRenumberer<'c, C> {
    pub fn new(comm: &'c C) -> Self {
        Self {
            comm,
            tag: RENUMBER_TAG,
        }
    }

    pub fn with_tag(mut self, tag: CommTag) -> Self {
        self.tag = tag;
        self
    }

    /// Renumber nodes, then cells.
    ///
    /// With `edit_set_only` only negative (provisional) indices change and
    /// new numbers start after the largest positive index on any rank.
    /// Otherwise every index is renumbered densely from 1 in the order of
    /// its current value.
    pub fn renumber(&self, mesh: &mut Mesh, edit_set_only: bool) -> Result<(), MeshError> {
        let nodes = self.renumber_nodes(mesh, edit_set_only)?;
        let cells = self.renumber_cells(mesh, edit_set_only)?;
        debug!(
            "[rank {}] renumbered {nodes} node and {cells} cell global indices",
            self.comm.rank()
        );
        Ok(())
    }

    /// Returns the number of local indices that were edited.
    pub fn renumber_nodes(&self, mesh: &mut Mesh, edit_set_only: bool) -> Result<usize, MeshError> {
        let mut values = mesh.nodes().global_index().to_vec();
        let edited = self.renumber_values(&mut values, edit_set_only, self.tag)?;
        if edited > 0 {
            mesh.nodes_mut().global_index_mut().copy_from_slice(&values);
        }
        mesh.metadata_mut().set(NODES_HUMAN_READABLE_KEY, true);
        Ok(edited)
    }

    pub fn renumber_cells(&self, mesh: &mut Mesh, edit_set_only: bool) -> Result<usize, MeshError> {
        let mut values: Vec<Gidx> = mesh
            .cells()
            .blocks()
            .iter()
            .flat_map(|b| b.global_index().iter().copied())
            .collect();
        let edited = self.renumber_values(&mut values, edit_set_only, self.tag.offset(4))?;
        if edited > 0 {
            let cells = mesh.cells_mut();
            let mut rest = values.as_slice();
            for t in 0..cells.nb_types() {
                let block = cells.block_mut(t);
                let (head, tail) = rest.split_at(block.len());
                block.global_index_mut().copy_from_slice(head);
                rest = tail;
            }
        }
        mesh.metadata_mut().set(CELLS_HUMAN_READABLE_KEY, true);
        Ok(edited)
    }

    /// Renumber one distributed column in place. Collective.
    pub fn renumber_values(
        &self,
        values: &mut [Gidx],
        edit_set_only: bool,
        tag: CommTag,
    ) -> Result<usize, MeshError> {
        let edit: Vec<usize> = (0..values.len())
            .filter(|&i| !edit_set_only || values[i] < 0)
            .collect();
        let local_max = if edit_set_only {
            values.iter().copied().filter(|&v| v > 0).max().unwrap_or(0)
        } else {
            0
        };
        let provisional: Vec<Gidx> = edit.iter().map(|&i| values[i]).collect();

        let maxes = gather_v(self.comm, tag, ROOT, std::slice::from_ref(&local_max))?;
        let gathered = gather_v(self.comm, tag.offset(1), ROOT, &provisional)?;
        let renumbered = match (maxes, gathered) {
            (Some(maxes), Some(gathered)) => {
                let start = maxes.values.iter().copied().max().unwrap_or(0);
                Some(assign_dense(gathered, start))
            }
            _ => None,
        };
        let fresh: Vec<Gidx> = scatter_v(self.comm, tag.offset(2), ROOT, renumbered.as_ref())?;
        if fresh.len() != edit.len() {
            return Err(MeshError::PayloadMismatch {
                neighbor: ROOT,
                reason: format!(
                    "renumbering returned {} values for {} entries",
                    fresh.len(),
                    edit.len()
                ),
            });
        }
        for (&i, v) in edit.iter().zip(fresh) {
            values[i] = v;
        }
        Ok(edit.len())
    }
}

/// Replace every value by its rank among the distinct values, offset by
/// `start`. Equal inputs map to equal outputs.
fn assign_dense(mut buf: RecvBuffer<Gidx>, start: Gidx) -> RecvBuffer<Gidx> {
    let mut order: Vec<usize> = (0..buf.values.len()).collect();
    order.sort_by_key(|&k| buf.values[k]);
    let mut fresh = vec![0; buf.values.len()];
    let mut next = start;
    let mut prev = None;
    for k in order {
        let v = buf.values[k];
        if prev != Some(v) {
            next += 1;
            prev = Some(v);
        }
        fresh[k] = next;
    }
    buf.values = fresh;
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{LocalComm, NoComm};

    #[test]
    fn ties_share_a_number() {
        let buf = RecvBuffer::from_segments(vec![vec![-5, -9], vec![-9, -1, -5]]);
        let out = assign_dense(buf, 10);
        assert_eq!(out.segment(0), &[12, 11]);
        assert_eq!(out.segment(1), &[11, 13, 12]);
    }

    #[test]
    fn edit_set_only_keeps_positive_indices() {
        let comm = NoComm;
        let r = GlobalIndexRenumberer::new(&comm);
        let mut v = vec![3, -100, 1, -7, 2, -100];
        assert_eq!(r.renumber_values(&mut v, true, RENUMBER_TAG).unwrap(), 3);
        assert_eq!(v, vec![3, 4, 1, 5, 2, 4]);
        // already final
        assert_eq!(r.renumber_values(&mut v, true, RENUMBER_TAG).unwrap(), 0);
        assert_eq!(v, vec![3, 4, 1, 5, 2, 4]);
    }

    #[test]
    fn full_renumbering_is_idempotent_on_dense_values() {
        let comm = NoComm;
        let r = GlobalIndexRenumberer::new(&comm);
        let mut v = vec![40, -3, 40, 7];
        r.renumber_values(&mut v, false, RENUMBER_TAG).unwrap();
        assert_eq!(v, vec![3, 1, 3, 2]);
        let before = v.clone();
        r.renumber_values(&mut v, false, RENUMBER_TAG).unwrap();
        assert_eq!(v, before);
    }

    #[test]
    fn ranks_agree_on_shared_provisional_values() {
        let comms = LocalComm::world(3);
        let out: Vec<Vec<Gidx>> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        let base = 10 * c.rank() as Gidx + 1;
                        let mut v = vec![base, base + 1, -42, -(c.rank() as Gidx) - 1];
                        GlobalIndexRenumberer::new(c)
                            .renumber_values(&mut v, true, RENUMBER_TAG)
                            .unwrap();
                        v
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        // max positive is 22; distinct provisional values -42, -3, -2, -1
        for (rank, v) in out.iter().enumerate() {
            assert_eq!(v[2], 23);
            assert_eq!(v[3], 26 - rank as Gidx);
        }
    }
}
