//! Metadata that identifies remote copies of local entities.
//!
//! Entities on a partition boundary exist on several ranks at once. The
//! overlap records, for each local entity, the (rank, remote handle) pairs of
//! its copies, and is the only place the layer protocol learns where a
//! crawl must cross a process boundary.

use crate::topology::point::PointId;
use itertools::Itertools;
use std::collections::HashMap;

/// One remote copy of a local entity.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Remote {
    pub rank: usize,
    pub remote_point: PointId,
}

/// Remote-copy table for one partition.
#[derive(Clone, Debug, Default)]
pub struct Overlap {
    links: HashMap<PointId, Vec<Remote>>,
}

/// Matched-boundary (periodic) correspondences share the overlap's shape;
/// unlike remote copies, a match may live on the same rank.
pub type Matches = Overlap;

impl Overlap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `local` has a copy `remote` on `remote_rank`.
    pub fn add_link(&mut self, local: PointId, remote_rank: usize, remote: PointId) {
        self.links.entry(local).or_default().push(Remote {
            rank: remote_rank,
            remote_point: remote,
        });
    }

    /// Remote copies of `p` (empty for interior entities).
    pub fn remotes(&self, p: PointId) -> &[Remote] {
        self.links.get(&p).map_or(&[], Vec::as_slice)
    }

    /// True if `p` has at least one copy on another rank.
    pub fn is_shared(&self, p: PointId) -> bool {
        !self.remotes(p).is_empty()
    }

    /// All peer ranks this partition shares entities with, sorted.
    pub fn neighbor_ranks(&self) -> Vec<usize> {
        self.links
            .values()
            .flatten()
            .map(|r| r.rank)
            .sorted_unstable()
            .dedup()
            .collect()
    }

    /// Drops all links of `p` (used when `p` is destroyed).
    pub fn remove_point(&mut self, p: PointId) {
        self.links.remove(&p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(id: u64) -> PointId {
        PointId::new(id).unwrap()
    }

    #[test]
    fn links_and_neighbors() {
        let mut ovlp = Overlap::new();
        ovlp.add_link(pt(1), 2, pt(101));
        ovlp.add_link(pt(1), 1, pt(55));
        ovlp.add_link(pt(3), 2, pt(103));
        assert_eq!(ovlp.remotes(pt(1)).len(), 2);
        assert!(ovlp.is_shared(pt(3)));
        assert!(!ovlp.is_shared(pt(2)));
        assert_eq!(ovlp.neighbor_ranks(), vec![1, 2]);
    }

    #[test]
    fn remove_point_clears_links() {
        let mut ovlp = Overlap::new();
        ovlp.add_link(pt(4), 0, pt(40));
        ovlp.remove_point(pt(4));
        assert!(!ovlp.is_shared(pt(4)));
    }
}
