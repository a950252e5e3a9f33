//! Bulk-synchronous message exchange and global reductions.
//!
//! The layer protocol communicates in rounds: every rank packs variable-size
//! payloads addressed to specific peers, flushes, and then drains everything
//! addressed to it before the round completes. Receivers learn their inbound
//! sizes from an allgathered byte-count matrix, so the set of senders need
//! not be known a priori. Every rank must enter the exchange each round,
//! even with nothing to send, or the collective deadlocks.

use crate::algs::communicator::{Communicator, Wait};
use crate::mesh_error::MeshLayerError;
use itertools::Itertools;
use std::collections::HashMap;

/// One round of the pack → flush → drain collective.
pub struct Exchange<'c, C: Communicator> {
    comm: &'c C,
    tag: u16,
    outgoing: HashMap<usize, Vec<u8>>,
}

impl<'c, C: Communicator> Exchange<'c, C> {
    pub fn new(comm: &'c C, tag: u16) -> Self {
        Self {
            comm,
            tag,
            outgoing: HashMap::new(),
        }
    }

    /// The staging buffer for messages addressed to `to`.
    pub fn buffer(&mut self, to: usize) -> &mut Vec<u8> {
        self.outgoing.entry(to).or_default()
    }

    /// Appends a `Pod` record to the message addressed to `to`.
    pub fn pack<T: bytemuck::Pod>(&mut self, to: usize, value: &T) {
        self.buffer(to).extend_from_slice(bytemuck::bytes_of(value));
    }

    /// Flushes all staged messages and drains everything addressed to this
    /// rank. Returns `(sender, bytes)` pairs in ascending sender order.
    pub fn execute(mut self) -> Result<Vec<(usize, Vec<u8>)>, MeshLayerError> {
        let me = self.comm.rank();
        let size = self.comm.size();

        // Loopback messages never touch the transport.
        let self_message = self.outgoing.remove(&me).filter(|b| !b.is_empty());

        let mut counts = vec![0u8; size * 8];
        for (&to, buf) in &self.outgoing {
            counts[to * 8..(to + 1) * 8].copy_from_slice(&(buf.len() as u64).to_le_bytes());
        }
        let mut matrix = vec![0u8; size * size * 8];
        self.comm.allgather(&counts, &mut matrix);
        let byte_count = |src: usize, dst: usize| {
            let off = (src * size + dst) * 8;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&matrix[off..off + 8]);
            u64::from_le_bytes(raw) as usize
        };

        let mut receives = Vec::new();
        for src in (0..size).filter(|&s| s != me) {
            let len = byte_count(src, me);
            if len > 0 {
                receives.push((src, len, self.comm.irecv(src, self.tag, len)));
            }
        }
        let mut sends = Vec::new();
        for &to in self.outgoing.keys().sorted_unstable() {
            let buf = &self.outgoing[&to];
            if !buf.is_empty() {
                sends.push(self.comm.isend(to, self.tag, buf));
            }
        }

        let mut inbound = Vec::new();
        if let Some(bytes) = self_message {
            inbound.push((me, bytes));
        }
        for (src, len, handle) in receives {
            let raw = handle.wait().ok_or_else(|| MeshLayerError::CommError {
                neighbor: src,
                detail: "receive completed without data".into(),
            })?;
            if raw.len() != len {
                return Err(MeshLayerError::BufferSizeMismatch {
                    neighbor: src,
                    expected: len,
                    got: raw.len(),
                });
            }
            inbound.push((src, raw));
        }
        for send in sends {
            let _ = send.wait();
        }

        inbound.sort_unstable_by_key(|(src, _)| *src);
        Ok(inbound)
    }
}

/// Global sum over all ranks.
pub fn allreduce_sum<T, C>(comm: &C, value: T) -> T
where
    T: bytemuck::Pod + num_traits::Zero + core::ops::AddAssign + Copy,
    C: Communicator,
{
    let width = std::mem::size_of::<T>();
    let mut recv = vec![0u8; comm.size() * width];
    comm.allgather(bytemuck::bytes_of(&value), &mut recv);
    let mut total = T::zero();
    // Byte buffers carry no alignment guarantee, so read each part unaligned.
    for chunk in recv.chunks_exact(width) {
        total += bytemuck::pod_read_unaligned::<T>(chunk);
    }
    total
}

/// Global OR over all ranks.
pub fn global_or<C: Communicator>(comm: &C, value: bool) -> bool {
    allreduce_sum(comm, value as u64) > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, RayonComm};
    use serial_test::serial;

    #[test]
    fn serial_exchange_delivers_loopback_only() {
        let comm = NoComm;
        let mut ex = Exchange::new(&comm, 1);
        ex.pack(0, &7u64);
        let inbound = ex.execute().unwrap();
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].0, 0);
        assert_eq!(inbound[0].1, 7u64.to_le_bytes());
    }

    #[test]
    fn serial_empty_exchange_is_quiet() {
        let comm = NoComm;
        let inbound = Exchange::new(&comm, 2).execute().unwrap();
        assert!(inbound.is_empty());
    }

    #[test]
    fn serial_reductions() {
        let comm = NoComm;
        assert_eq!(allreduce_sum(&comm, 5u64), 5);
        assert!(global_or(&comm, true));
        assert!(!global_or(&comm, false));
    }

    #[test]
    #[serial]
    fn two_rank_exchange_crosses_ranks() {
        let handles: Vec<_> = (0..2usize)
            .map(|rank| {
                std::thread::spawn(move || {
                    let comm = RayonComm::with_world(910, rank, 2);
                    let mut ex = Exchange::new(&comm, 3);
                    ex.pack(1 - rank, &(rank as u64 + 100));
                    ex.execute().unwrap()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results[0][0].0, 1);
        assert_eq!(results[0][0].1, 101u64.to_le_bytes());
        assert_eq!(results[1][0].0, 0);
        assert_eq!(results[1][0].1, 100u64.to_le_bytes());
    }

    #[test]
    #[serial]
    fn two_rank_sum() {
        let handles: Vec<_> = (0..2usize)
            .map(|rank| {
                std::thread::spawn(move || {
                    let comm = RayonComm::with_world(911, rank, 2);
                    allreduce_sum(&comm, (rank as u64 + 1) * 10)
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 30);
        }
    }
}
