//! Thin façade over in-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking -– the exchange layer calls
//! `.wait()` before it trusts that a buffer is ready. Messages travelling
//! between the same `(source, destination, tag)` triple are delivered in the
//! order they were sent.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

/// Typed message tag; stages of one algorithm use distinct offsets.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(base: u16) -> Self {
        CommTag(base)
    }
    #[inline]
    pub const fn base(self) -> u16 {
        self.0
    }
    #[inline]
    pub const fn offset(self, k: u16) -> CommTag {
        CommTag(self.0.wrapping_add(k))
    }
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// Non-blocking point-to-point messaging between ranks.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive for the next message from `peer` with `tag`; the
    /// message length is discovered on `wait`.
    fn irecv(&self, peer: usize, tag: u16) -> Self::RecvHandle;

    /// True for the single-rank stub, which never actually transmits.
    fn is_no_comm(&self) -> bool {
        false
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Single-rank communicator for serial runs and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16) {}
    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- LocalComm: ranks as threads of one process ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Mailbox {
    queues: DashMap<Key, VecDeque<Bytes>>,
    signal: Mutex<u64>,
    posted: Condvar,
}

impl Mailbox {
    fn post(&self, key: Key, data: Bytes) {
        self.queues.entry(key).or_default().push_back(data);
        let mut generation = self.signal.lock();
        *generation += 1;
        self.posted.notify_all();
    }

    fn take(&self, key: &Key) -> Option<Bytes> {
        self.queues.get_mut(key).and_then(|mut q| q.pop_front())
    }
}

/// In-process communicator: one instance per rank, all sharing a mailbox.
///
/// Create a group with [`LocalComm::world`] and move each member to its own
/// thread. A receive that sees no message within the group's timeout yields
/// `None`, which the exchange layer reports as a communication error instead
/// of hanging the process.
///
/// The timeout runs from the moment a receive is posted, so all receives of
/// one exchange expire together. Only rank-local errors fail fast: when one
/// rank bails out before an exchange, its peers report
/// [`MeshError::CommError`](crate::mesh_error::MeshError::CommError) once the
/// timeout has elapsed.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    timeout: Duration,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl LocalComm {
    /// Default receive timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// `size` communicators sharing one mailbox, indexed by rank.
    pub fn world(size: usize) -> Vec<LocalComm> {
        Self::world_with_timeout(size, Self::DEFAULT_TIMEOUT)
    }

    pub fn world_with_timeout(size: usize, timeout: Duration) -> Vec<LocalComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| LocalComm {
                rank,
                size,
                timeout,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

pub struct LocalRecv {
    key: Key,
    deadline: Instant,
    mailbox: Arc<Mailbox>,
}

impl Wait for LocalRecv {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            if let Some(bytes) = self.mailbox.take(&self.key) {
                return Some(bytes.to_vec());
            }
            let mut generation = self.mailbox.signal.lock();
            // re-check under the lock so a post between `take` and `wait` is not lost
            if let Some(bytes) = self.mailbox.take(&self.key) {
                return Some(bytes.to_vec());
            }
            if Instant::now() >= self.deadline {
                return None;
            }
            let _ = self
                .mailbox
                .posted
                .wait_for(&mut generation, Duration::from_millis(10));
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalRecv;

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        self.mailbox
            .post((self.rank, peer, tag), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16) -> Self::RecvHandle {
        LocalRecv {
            key: (peer, self.rank, tag),
            deadline: Instant::now() + self.timeout,
            mailbox: Arc::clone(&self.mailbox),
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use std::rc::Rc;

    /// MPI world communicator.
    pub struct MpiComm {
        world: Rc<SimpleCommunicator>,
        rank: usize,
        size: usize,
        // dropped last: finalizes MPI
        _universe: Option<Universe>,
    }

    impl MpiComm {
        /// Initialise MPI and wrap `MPI_COMM_WORLD`; `None` if MPI was
        /// already initialised elsewhere.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                world: Rc::new(world),
                rank,
                size,
                _universe: Some(universe),
            })
        }
    }

    /// Pending send; owns the leaked send buffer until completion.
    pub struct MpiSend {
        req: Option<Request<'static, [u8], StaticScope>>,
        buf: *mut [u8],
    }

    impl Wait for MpiSend {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(req) = self.req.take() {
                req.wait();
            }
            // SAFETY: `buf` was produced by `Box::leak` in `isend` and the
            // request referencing it has completed.
            unsafe { drop(Box::from_raw(self.buf)) };
            None
        }
    }

    /// Receive resolved lazily by a matched probe, so lengths need not be
    /// known in advance.
    pub struct MpiRecv {
        world: Rc<SimpleCommunicator>,
        peer: i32,
        tag: i32,
    }

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            let (msg, _status) = self
                .world
                .process_at_rank(self.peer)
                .matched_probe_with_tag(self.tag);
            let (data, _status) = msg.matched_receive_vec::<u8>();
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSend;
        type RecvHandle = MpiRecv;

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSend {
            let leaked: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr: *mut [u8] = leaked;
            // SAFETY: the buffer stays alive until `MpiSend::wait` frees it.
            let data: &'static [u8] = unsafe { &*ptr };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, data, tag as i32);
            MpiSend {
                req: Some(req),
                buf: ptr,
            }
        }

        fn irecv(&self, peer: usize, tag: u16) -> MpiRecv {
            MpiRecv {
                world: Rc::clone(&self.world),
                peer: peer as i32,
                tag: tag as i32,
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
