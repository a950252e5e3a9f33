//! Ownership-aware global vertex numbering.
//!
//! Every vertex gets a globally unique, rank-independent number: owned
//! vertices are numbered rank-major (all of rank 0's, then rank 1's, ...)
//! and id-ascending within a rank; ghost copies receive their numbers from
//! the owning rank in one exchange. The owner of a shared vertex is the
//! smallest sharing rank, which every copy computes identically from its
//! overlap without communication.
//!
//! These numbers are the protocol's only tie-break source: two ranks
//! comparing the endpoints of a shared edge must reach the same verdict.

use crate::algs::communicator::Communicator;
use crate::algs::exchange::Exchange;
use crate::algs::wire::WirePair;
use crate::mesh_error::MeshLayerError;
use crate::overlap::Overlap;
use crate::topology::mesh::MeshTopology;
use crate::topology::point::PointId;
use itertools::Itertools;
use std::collections::HashMap;

const NUMBERING_TAG: u16 = 0x4E00;

/// Global numbers for this partition's vertices (owned and ghost).
#[derive(Clone, Debug, Default)]
pub struct GlobalNumbering {
    numbers: HashMap<PointId, u64>,
    total: u64,
}

impl GlobalNumbering {
    /// The global number of a local vertex.
    pub fn number(&self, v: PointId) -> Result<u64, MeshLayerError> {
        self.numbers
            .get(&v)
            .copied()
            .ok_or(MeshLayerError::MissingGlobalNumber(v))
    }

    /// Total number of owned vertices across all ranks.
    pub fn total(&self) -> u64 {
        self.total
    }
}

/// The smallest rank holding a copy of `p` (including this one).
fn owner(overlap: &Overlap, my_rank: usize, p: PointId) -> usize {
    overlap
        .remotes(p)
        .iter()
        .map(|r| r.rank)
        .fold(my_rank, usize::min)
}

/// Builds a synchronized global numbering of all vertices.
pub fn number_vertices<C: Communicator>(
    mesh: &MeshTopology,
    overlap: &Overlap,
    comm: &C,
) -> Result<GlobalNumbering, MeshLayerError> {
    let me = comm.rank();
    let owned: Vec<PointId> = mesh
        .points(0)
        .filter(|&p| owner(overlap, me, p) == me)
        .sorted_unstable()
        .collect();

    let mut totals = vec![0u8; comm.size() * 8];
    comm.allgather(&(owned.len() as u64).to_le_bytes(), &mut totals);
    let rank_count = |rank: usize| {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&totals[rank * 8..(rank + 1) * 8]);
        u64::from_le_bytes(raw)
    };
    let base: u64 = (0..me).map(rank_count).sum();
    let total: u64 = (0..comm.size()).map(rank_count).sum();

    let mut numbering = GlobalNumbering {
        numbers: HashMap::new(),
        total,
    };
    for (idx, &p) in owned.iter().enumerate() {
        numbering.numbers.insert(p, base + idx as u64);
    }

    // Owners push numbers to every ghost copy.
    let mut ex = Exchange::new(comm, NUMBERING_TAG);
    for &p in &owned {
        for remote in overlap.remotes(p) {
            ex.pack(
                remote.rank,
                &WirePair::new(remote.remote_point.get(), numbering.numbers[&p]),
            );
        }
    }
    for (from, bytes) in ex.execute()? {
        let record = std::mem::size_of::<WirePair>();
        if bytes.len() % record != 0 {
            return Err(MeshLayerError::TruncatedRecordStream {
                neighbor: from,
                len: bytes.len(),
                record,
            });
        }
        for chunk in bytes.chunks_exact(record) {
            let pair = bytemuck::pod_read_unaligned::<WirePair>(chunk);
            numbering
                .numbers
                .insert(PointId::new(pair.id())?, pair.value());
        }
    }

    for p in mesh.points(0) {
        if !numbering.numbers.contains_key(&p) {
            return Err(MeshLayerError::MissingGlobalNumber(p));
        }
    }
    Ok(numbering)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    #[test]
    fn serial_numbering_is_dense_and_ordered() {
        let mut mesh = MeshTopology::new();
        let a = mesh.add_vertex().unwrap();
        let b = mesh.add_vertex().unwrap();
        let c = mesh.add_vertex().unwrap();
        let numbering = number_vertices(&mesh, &Overlap::new(), &NoComm).unwrap();
        assert_eq!(numbering.total(), 3);
        assert_eq!(numbering.number(a).unwrap(), 0);
        assert_eq!(numbering.number(b).unwrap(), 1);
        assert_eq!(numbering.number(c).unwrap(), 2);
    }

    #[test]
    fn missing_vertex_is_an_error() {
        let mesh = MeshTopology::new();
        let numbering = number_vertices(&mesh, &Overlap::new(), &NoComm).unwrap();
        let stranger = PointId::new(99).unwrap();
        assert_eq!(
            numbering.number(stranger),
            Err(MeshLayerError::MissingGlobalNumber(stranger))
        );
    }
}
