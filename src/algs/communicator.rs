//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Messages from one rank to another on the same tag are delivered in the
//! order they were sent. Send handles must be waited on before the payload
//! is considered delivered; receive handles block in `wait()` until the
//! matching message is available.

use crate::dof_error::DofMapError;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    pub const fn base(self) -> u16 {
        self.0
    }

    /// Tag shifted by `delta`, wrapping around `u16::MAX`.
    pub const fn offset(self, delta: u16) -> Self {
        Self(self.0.wrapping_add(delta))
    }

    /// The next tag if this one is [`COLLECTIVE_TAG`], else itself.
    pub const fn skip_reserved(self) -> Self {
        if self.0 == COLLECTIVE_TAG {
            self.offset(1)
        } else {
            self
        }
    }
}

/// Tags used by one dof-table build.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DofCommTags {
    /// Per-peer message counts exchanged at the start of each round.
    pub counts: CommTag,
    /// Resolution requests (one message per target face or element).
    pub requests: CommTag,
    /// Replies to resolution requests.
    pub responses: CommTag,
}

impl DofCommTags {
    /// Derive the three tags from consecutive values starting at `base`,
    /// skipping [`COLLECTIVE_TAG`].
    pub const fn from_base(base: CommTag) -> Self {
        let counts = base.skip_reserved();
        let requests = counts.offset(1).skip_reserved();
        let responses = requests.offset(1).skip_reserved();
        Self {
            counts,
            requests,
            responses,
        }
    }

    pub fn contains(&self, tag: u16) -> bool {
        [self.counts, self.requests, self.responses]
            .iter()
            .any(|t| t.as_u16() == tag)
    }
}

impl Default for DofCommTags {
    fn default() -> Self {
        Self::from_base(CommTag::new(0xD0F0))
    }
}

/// Tag reserved for the collectives of the in-process backend.
pub const COLLECTIVE_TAG: u16 = u16::MAX;

/// Non-blocking point-to-point messaging plus the few collectives the dof
/// protocol relies on. Every rank of a communicator must call the collectives
/// in the same order.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive for the next message from `peer` on `tag`; the handle
    /// yields the whole message.
    fn irecv(&self, peer: usize, tag: u16) -> Self::RecvHandle;

    /// Every rank contributes one value; every rank receives all of them in rank order.
    fn allgather_u64(&self, local: u64) -> Result<Vec<u64>, DofMapError>;
    fn allreduce_sum_u64(&self, local: u64) -> Result<u64, DofMapError>;
    fn barrier(&self) -> Result<(), DofMapError>;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Compile-time no-op comm for pure serial runs: one rank, nothing to exchange.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

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

    fn allgather_u64(&self, local: u64) -> Result<Vec<u64>, DofMapError> {
        Ok(vec![local])
    }
    fn allreduce_sum_u64(&self, local: u64) -> Result<u64, DofMapError> {
        Ok(local)
    }
    fn barrier(&self) -> Result<(), DofMapError> {
        Ok(())
    }
}

// --- ThreadComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Mailbox {
    queues: Mutex<HashMap<Key, VecDeque<Bytes>>>,
    arrived: Condvar,
}

impl Mailbox {
    fn post(&self, key: Key, payload: Bytes) {
        let mut queues = self.queues.lock();
        queues.entry(key).or_default().push_back(payload);
        self.arrived.notify_all();
    }

    fn take(&self, key: Key) -> Bytes {
        let mut queues = self.queues.lock();
        loop {
            if let Some(msg) = queues.get_mut(&key).and_then(VecDeque::pop_front) {
                return msg;
            }
            self.arrived.wait(&mut queues);
        }
    }
}

/// Receive handle of [`ThreadComm`]; blocks in `wait()`.
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        Some(self.mailbox.take(self.key).to_vec())
    }
}

/// One rank of an in-process world. Each rank is meant to run on its own
/// thread; sends are buffered in a mailbox shared by the whole world.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl ThreadComm {
    /// Create the communicators of a fresh world with `size` ranks.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

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
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
        }
    }

    fn allgather_u64(&self, local: u64) -> Result<Vec<u64>, DofMapError> {
        let payload = Bytes::copy_from_slice(&local.to_le_bytes());
        for peer in (0..self.size).filter(|&p| p != self.rank) {
            self.mailbox
                .post((self.rank, peer, COLLECTIVE_TAG), payload.clone());
        }
        let mut out = Vec::with_capacity(self.size);
        for peer in 0..self.size {
            if peer == self.rank {
                out.push(local);
                continue;
            }
            let msg = self.mailbox.take((peer, self.rank, COLLECTIVE_TAG));
            let raw: [u8; 8] =
                msg[..]
                    .try_into()
                    .map_err(|_| DofMapError::BufferSizeMismatch {
                        neighbor: peer,
                        expected: 8,
                        got: msg.len(),
                    })?;
            out.push(u64::from_le_bytes(raw));
        }
        Ok(out)
    }

    fn allreduce_sum_u64(&self, local: u64) -> Result<u64, DofMapError> {
        Ok(self.allgather_u64(local)?.into_iter().sum())
    }

    fn barrier(&self) -> Result<(), DofMapError> {
        self.allgather_u64(0).map(|_| ())
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::collective::SystemOperation;
    use mpi::point_to_point::{Destination, Source};
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// MPI world communicator. MPI must be initialized by the caller
    /// (`mpi::initialize()`) and stay initialized while this is alive.
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new() -> Self {
            Self::from_world(SimpleCommunicator::world())
        }

        pub fn from_world(world: SimpleCommunicator) -> Self {
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self { world, rank, size }
        }
    }

    impl Default for MpiComm {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Pending immediate send; owns the payload until completion.
    pub struct MpiSendHandle {
        request: Request<'static, [u8], StaticScope>,
        payload: *mut [u8],
    }

    impl Wait for MpiSendHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.request.wait();
            // SAFETY: `payload` came from `Box::leak` in `isend` and the request
            // that borrowed it has completed.
            drop(unsafe { Box::from_raw(self.payload) });
            None
        }
    }

    /// Receives complete eagerly: every send of the protocol is immediate, so
    /// a blocking receive cannot dead-lock.
    pub struct MpiRecvHandle(Vec<u8>);

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            Some(self.0)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let payload: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let raw: *mut [u8] = payload;
            // SAFETY: the leaked buffer outlives the request; it is reclaimed in `wait`.
            let shared: &'static [u8] = unsafe { &*raw };
            let request = self.world.process_at_rank(peer as i32).immediate_send_with_tag(
                StaticScope,
                shared,
                tag as i32,
            );
            MpiSendHandle {
                request,
                payload: raw,
            }
        }

        fn irecv(&self, peer: usize, tag: u16) -> MpiRecvHandle {
            let (data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(tag as i32);
            MpiRecvHandle(data)
        }

        fn allgather_u64(&self, local: u64) -> Result<Vec<u64>, DofMapError> {
            let mut out = vec![0u64; self.size];
            self.world.all_gather_into(&local, &mut out[..]);
            Ok(out)
        }

        fn allreduce_sum_u64(&self, local: u64) -> Result<u64, DofMapError> {
            let mut global = 0u64;
            self.world
                .all_reduce_into(&local, &mut global, SystemOperation::sum());
            Ok(global)
        }

        fn barrier(&self) -> Result<(), DofMapError> {
            self.world.barrier();
            Ok(())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
