//! Distributed wavefront traversal over a prismatic layer.
//!
//! A [`Crawler`] supplies the per-entity logic; [`crawl_layers`] is the one
//! shared driver that runs the traversal to global quiescence. Each round:
//! crawl the local frontier, share every produced entity with its remote
//! copies, drain the inbound messages, and swap frontiers. The quiescence
//! check is a global reduction, so a rank with an empty frontier still
//! participates in every round; peers may still be generating work for it.
//!
//! Termination: crawl and recv reject already-flagged entities, so each
//! entity enters a frontier at most once per direction, and chain lengths
//! are bounded by the number of layer entities.

use crate::algs::communicator::Communicator;
use crate::algs::exchange::{Exchange, global_or};
use crate::mesh_error::MeshLayerError;
use crate::overlap::Overlap;
use crate::topology::point::PointId;

/// One wavefront of entities.
pub type Layer = Vec<PointId>;

/// Per-entity logic for one distributed traversal.
pub trait Crawler {
    /// Populate the initial frontier.
    fn begin(&mut self, first: &mut Layer) -> Result<(), MeshLayerError>;

    /// Visit `e` and return the entity to continue into, or `None` when
    /// propagation stops here.
    fn crawl(&mut self, e: PointId) -> Result<Option<PointId>, MeshLayerError>;

    /// Serialize the state the copy of `e` on rank `to` needs. Must append
    /// exactly [`Crawler::payload_len`] bytes.
    fn send(&mut self, e: PointId, to: usize, message: &mut Vec<u8>) -> Result<(), MeshLayerError>;

    /// Apply state received for the local copy of `e`; return whether this
    /// rank must now continue crawling from `e`.
    fn recv(&mut self, e: PointId, from: usize, message: &[u8]) -> Result<bool, MeshLayerError>;

    /// Invoked once after global quiescence.
    fn end(&mut self) -> Result<(), MeshLayerError> {
        Ok(())
    }

    /// Fixed per-entity payload size in bytes (zero for mark-only crawls).
    fn payload_len(&self) -> usize {
        0
    }
}

/// Runs `op` to global quiescence and returns the number of rounds executed.
pub fn crawl_layers<Op, C>(
    op: &mut Op,
    overlap: &Overlap,
    comm: &C,
    base_tag: u16,
) -> Result<usize, MeshLayerError>
where
    Op: Crawler,
    C: Communicator,
{
    let mut layer = Layer::new();
    op.begin(&mut layer)?;
    let mut rounds = 0usize;
    while global_or(comm, !layer.is_empty()) {
        // Local step: every produced entity continues locally...
        let mut next = Layer::new();
        for e in layer.drain(..) {
            if let Some(e2) = op.crawl(e)? {
                next.push(e2);
            }
        }
        // ...and is also shared with each of its remote copies.
        let mut ex = Exchange::new(comm, base_tag.wrapping_add(rounds as u16));
        for &e in &next {
            for remote in overlap.remotes(e) {
                let buf = ex.buffer(remote.rank);
                buf.extend_from_slice(&remote.remote_point.get().to_le_bytes());
                op.send(e, remote.rank, buf)?;
            }
        }
        let record = 8 + op.payload_len();
        for (from, bytes) in ex.execute()? {
            if bytes.len() % record != 0 {
                return Err(MeshLayerError::TruncatedRecordStream {
                    neighbor: from,
                    len: bytes.len(),
                    record,
                });
            }
            for chunk in bytes.chunks_exact(record) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&chunk[..8]);
                let e = PointId::new(u64::from_le_bytes(raw))?;
                if op.recv(e, from, &chunk[8..])? {
                    next.push(e);
                }
            }
        }
        layer = next;
        rounds += 1;
    }
    op.end()?;
    Ok(rounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use std::collections::{HashMap, HashSet};

    fn pt(id: u64) -> PointId {
        PointId::new(id).unwrap()
    }

    /// Walks a fixed successor map, rejecting revisits.
    struct ChainWalker {
        seeds: Vec<PointId>,
        next: HashMap<PointId, PointId>,
        visited: HashSet<PointId>,
        ended: bool,
    }

    impl Crawler for ChainWalker {
        fn begin(&mut self, first: &mut Layer) -> Result<(), MeshLayerError> {
            first.extend(self.seeds.iter().copied());
            Ok(())
        }
        fn crawl(&mut self, e: PointId) -> Result<Option<PointId>, MeshLayerError> {
            self.visited.insert(e);
            Ok(self
                .next
                .get(&e)
                .copied()
                .filter(|n| !self.visited.contains(n)))
        }
        fn send(
            &mut self,
            _e: PointId,
            _to: usize,
            _message: &mut Vec<u8>,
        ) -> Result<(), MeshLayerError> {
            Ok(())
        }
        fn recv(
            &mut self,
            e: PointId,
            _from: usize,
            _message: &[u8],
        ) -> Result<bool, MeshLayerError> {
            Ok(self.visited.insert(e))
        }
        fn end(&mut self) -> Result<(), MeshLayerError> {
            self.ended = true;
            Ok(())
        }
    }

    #[test]
    fn chain_runs_to_quiescence() {
        let mut op = ChainWalker {
            seeds: vec![pt(1)],
            next: HashMap::from([(pt(1), pt(2)), (pt(2), pt(3)), (pt(3), pt(4))]),
            visited: HashSet::new(),
            ended: false,
        };
        let rounds = crawl_layers(&mut op, &Overlap::new(), &NoComm, 0x100).unwrap();
        // Rounds: 1->2, 2->3, 3->4, 4->none.
        assert_eq!(rounds, 4);
        assert!(op.ended);
        assert_eq!(op.visited.len(), 4);
    }

    #[test]
    fn empty_frontier_still_calls_end() {
        let mut op = ChainWalker {
            seeds: Vec::new(),
            next: HashMap::new(),
            visited: HashSet::new(),
            ended: false,
        };
        let rounds = crawl_layers(&mut op, &Overlap::new(), &NoComm, 0x100).unwrap();
        assert_eq!(rounds, 0);
        assert!(op.ended);
    }
}
