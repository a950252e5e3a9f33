//! Thin façade over point-to-point and collective message passing.
//!
//! Messages are contiguous byte slices. Send/receive handles are waitable
//! but non-blocking; the exchange layer calls `.wait()` before trusting any
//! buffer. Two backends ship with the crate: [`NoComm`] for pure serial runs
//! and [`RayonComm`], which simulates ranks with threads inside one process
//! for the multi-rank test suites. A distributed backend (e.g. MPI) plugs in
//! by implementing [`Communicator`].

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::thread::JoinHandle;

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

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// This process's rank in `0..size()`.
    fn rank(&self) -> usize;
    /// Number of cooperating processes.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of `len` bytes from `peer`. Backends that match by
    /// message rather than by buffer may ignore `len`.
    fn irecv(&self, peer: usize, tag: u16, len: usize) -> Self::RecvHandle;

    /// Collective: every rank contributes `send`, every rank receives the
    /// concatenation of all contributions in rank order. All contributions
    /// must have the same length; `recv.len() == send.len() * size()`.
    fn allgather(&self, send: &[u8], recv: &mut [u8]);
}

/// Compile-time no-op comm for pure serial runs and unit tests.
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
    fn irecv(&self, _peer: usize, _tag: u16, _len: usize) {}
    fn allgather(&self, send: &[u8], recv: &mut [u8]) {
        recv[..send.len()].copy_from_slice(send);
    }
}

// --- RayonComm: intra-process rank simulation -------------------------------

// (world, src, dst, tag)
type Key = (u64, usize, usize, u16);

static MAILBOX: Lazy<DashMap<Key, Bytes>> = Lazy::new(DashMap::new);
// (world, epoch, rank) -> contribution; entries persist for the process
// lifetime, which is acceptable at the scale this backend targets (tests).
static BOARD: Lazy<DashMap<(u64, u64, usize), Bytes>> = Lazy::new(DashMap::new);

pub struct LocalHandle {
    buf: Arc<Mutex<Option<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Wait for LocalHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.buf.lock().take()
    }
}

/// One simulated rank. Each participating thread constructs its own
/// `RayonComm` with the same `world` id and `size`; collectives must be
/// entered by every rank in the same order (bulk-synchronous discipline).
#[derive(Debug)]
pub struct RayonComm {
    world: u64,
    rank: usize,
    size: usize,
    epoch: AtomicU64,
}

impl RayonComm {
    pub fn new(rank: usize, size: usize) -> Self {
        Self::with_world(0, rank, size)
    }

    /// Distinct `world` ids isolate concurrent simulations sharing the
    /// process-wide mailbox (one per test).
    pub fn with_world(world: u64, rank: usize, size: usize) -> Self {
        Self {
            world,
            rank,
            size,
            epoch: AtomicU64::new(0),
        }
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.world, self.rank, peer, tag);
        MAILBOX.insert(key, Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, _len: usize) -> LocalHandle {
        let key = (self.world, peer, self.rank, tag);
        let buf = Arc::new(Mutex::new(None));
        let buf_clone = Arc::clone(&buf);
        let handle = std::thread::spawn(move || {
            loop {
                if let Some((_, bytes)) = MAILBOX.remove(&key) {
                    *buf_clone.lock() = Some(bytes.to_vec());
                    break;
                }
                std::thread::yield_now();
            }
        });
        LocalHandle {
            buf,
            handle: Some(handle),
        }
    }

    fn allgather(&self, send: &[u8], recv: &mut [u8]) {
        let epoch = self.epoch.fetch_add(1, Relaxed);
        BOARD.insert((self.world, epoch, self.rank), Bytes::copy_from_slice(send));
        let n = send.len();
        for r in 0..self.size {
            loop {
                if let Some(entry) = BOARD.get(&(self.world, epoch, r)) {
                    recv[r * n..(r + 1) * n].copy_from_slice(&entry);
                    break;
                }
                std::thread::yield_now();
            }
        }
    }
}
