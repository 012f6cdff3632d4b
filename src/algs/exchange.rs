//! Collectives built on the point-to-point [`Communicator`].
//!
//! Every routine posts its receives first, then its sends, then waits. All
//! handles are drained before returning, even when a receive fails, so an
//! error on one rank never leaves a peer blocked on a half-finished stage.
//! Traffic a rank addresses to itself is copied locally and never touches the
//! communicator.
//!
//! Typed payloads are shipped in host byte order; the halo payload itself
//! goes through [`crate::algs::wire`] which fixes little-endian.

use std::collections::BTreeMap;

use bytemuck::Pod;

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{cast_slice, vec_from_bytes};
use crate::mesh_error::MeshError;

/// Values received from every rank, stored contiguously.
///
/// `counts[r]` values from rank `r` start at `displs[r]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecvBuffer<T> {
    pub counts: Vec<usize>,
    pub displs: Vec<usize>,
    pub values: Vec<T>,
}

impl<T: Clone> RecvBuffer<T> {
    /// Concatenate per-rank segments.
    pub fn from_segments(segments: Vec<Vec<T>>) -> Self {
        let mut counts = Vec::with_capacity(segments.len());
        let mut displs = Vec::with_capacity(segments.len());
        let total = segments.iter().map(Vec::len).sum();
        let mut values = Vec::with_capacity(total);
        for seg in segments {
            displs.push(values.len());
            counts.push(seg.len());
            values.extend(seg);
        }
        Self {
            counts,
            displs,
            values,
        }
    }

    pub fn nb_ranks(&self) -> usize {
        self.counts.len()
    }

    pub fn segment(&self, rank: usize) -> &[T] {
        let start = self.displs[rank];
        &self.values[start..start + self.counts[rank]]
    }

    pub fn segment_mut(&mut self, rank: usize) -> &mut [T] {
        let start = self.displs[rank];
        &mut self.values[start..start + self.counts[rank]]
    }
}

fn recv_failed(neighbor: usize, tag: CommTag) -> MeshError {
    MeshError::comm(
        neighbor,
        format!("no message received for tag {}", tag.as_u16()),
    )
}

/// Point-to-point exchange of byte payloads with explicit peer sets.
///
/// Sends `sends[dst]` to every key of `sends` and receives one message from
/// every rank in `recv_from`. Both sets must be mirrored across ranks: `j`
/// lists `i` in `recv_from` exactly when `i` has `j` among its send keys.
pub fn sparse_exchange<C: Communicator>(
    comm: &C,
    tag: CommTag,
    sends: &BTreeMap<usize, Vec<u8>>,
    recv_from: &[usize],
) -> Result<BTreeMap<usize, Vec<u8>>, MeshError> {
    let me = comm.rank();

    // 1) post all receives
    let mut pending_recvs = Vec::with_capacity(recv_from.len());
    for &src in recv_from {
        if src != me {
            pending_recvs.push((src, comm.irecv(src, tag.as_u16())));
        }
    }

    // 2) post all sends; self traffic is copied
    let mut received = BTreeMap::new();
    let mut pending_sends = Vec::with_capacity(sends.len());
    for (&dst, bytes) in sends {
        if dst == me {
            if recv_from.contains(&me) {
                received.insert(me, bytes.clone());
            }
        } else {
            pending_sends.push(comm.isend(dst, tag.as_u16(), bytes));
        }
    }
    if recv_from.contains(&me) && !received.contains_key(&me) {
        received.insert(me, Vec::new());
    }

    // 3) wait for all receives without returning early
    let mut maybe_err = None;
    for (src, h) in pending_recvs {
        match h.wait() {
            Some(data) => {
                received.insert(src, data);
            }
            None if maybe_err.is_none() => maybe_err = Some(recv_failed(src, tag)),
            None => {}
        }
    }

    // 4) always drain sends
    for s in pending_sends {
        let _ = s.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(received),
    }
}

/// Every rank contributes `local`; every rank gets all contributions.
pub fn all_gather_v<C, T>(comm: &C, tag: CommTag, local: &[T]) -> Result<RecvBuffer<T>, MeshError>
where
    C: Communicator,
    T: Pod,
{
    let me = comm.rank();
    let size = comm.size();

    let mut pending_recvs = Vec::with_capacity(size.saturating_sub(1));
    for src in (0..size).filter(|&r| r != me) {
        pending_recvs.push((src, comm.irecv(src, tag.as_u16())));
    }
    let mut pending_sends = Vec::with_capacity(size.saturating_sub(1));
    for dst in (0..size).filter(|&r| r != me) {
        pending_sends.push(comm.isend(dst, tag.as_u16(), cast_slice(local)));
    }

    let mut segments: Vec<Vec<T>> = vec![Vec::new(); size];
    segments[me] = local.to_vec();
    let mut maybe_err = None;
    for (src, h) in pending_recvs {
        let res = match h.wait() {
            Some(data) => vec_from_bytes::<T>(&data, src),
            None => Err(recv_failed(src, tag)),
        };
        match res {
            Ok(v) => segments[src] = v,
            Err(e) if maybe_err.is_none() => maybe_err = Some(e),
            Err(_) => {}
        }
    }
    for s in pending_sends {
        let _ = s.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(RecvBuffer::from_segments(segments)),
    }
}

/// Collect `local` from every rank on `root`; other ranks get `None`.
pub fn gather_v<C, T>(
    comm: &C,
    tag: CommTag,
    root: usize,
    local: &[T],
) -> Result<Option<RecvBuffer<T>>, MeshError>
where
    C: Communicator,
    T: Pod,
{
    let me = comm.rank();
    let size = comm.size();

    if me != root {
        let h = comm.isend(root, tag.as_u16(), cast_slice(local));
        let _ = h.wait();
        return Ok(None);
    }

    let pending_recvs: Vec<_> = (0..size)
        .filter(|&r| r != me)
        .map(|src| (src, comm.irecv(src, tag.as_u16())))
        .collect();
    let mut segments: Vec<Vec<T>> = vec![Vec::new(); size];
    segments[me] = local.to_vec();
    let mut maybe_err = None;
    for (src, h) in pending_recvs {
        let res = match h.wait() {
            Some(data) => vec_from_bytes::<T>(&data, src),
            None => Err(recv_failed(src, tag)),
        };
        match res {
            Ok(v) => segments[src] = v,
            Err(e) if maybe_err.is_none() => maybe_err = Some(e),
            Err(_) => {}
        }
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(Some(RecvBuffer::from_segments(segments))),
    }
}

/// Inverse of [`gather_v`]: `root` sends segment `r` of `send` to rank `r`.
///
/// Non-root ranks pass `None`. Every rank receives its own segment.
pub fn scatter_v<C, T>(
    comm: &C,
    tag: CommTag,
    root: usize,
    send: Option<&RecvBuffer<T>>,
) -> Result<Vec<T>, MeshError>
where
    C: Communicator,
    T: Pod,
{
    let me = comm.rank();
    let size = comm.size();

    if me != root {
        return match comm.irecv(root, tag.as_u16()).wait() {
            Some(data) => vec_from_bytes::<T>(&data, root),
            None => Err(recv_failed(root, tag)),
        };
    }

    let send = send.ok_or_else(|| {
        MeshError::InvalidConfig(format!("scatter root {root} called without send buffer"))
    })?;
    if send.nb_ranks() != size {
        return Err(MeshError::PayloadMismatch {
            neighbor: me,
            reason: format!(
                "scatter buffer has {} segments for {size} ranks",
                send.nb_ranks()
            ),
        });
    }
    let pending_sends: Vec<_> = (0..size)
        .filter(|&r| r != me)
        .map(|dst| comm.isend(dst, tag.as_u16(), cast_slice(send.segment(dst))))
        .collect();
    let own = send.segment(me).to_vec();
    for s in pending_sends {
        let _ = s.wait();
    }
    Ok(own)
}
