//! Per-entity protocol flags for one adaptation pass.
//!
//! Flags are scratch state scoped to a single phase of the layer protocol:
//! they are set during one phase and must be cleared (on every rank, for
//! every dimension touched) before the next phase begins. Stale flags are a
//! correctness bug, not a performance one, so the table lives in the
//! adaptation context rather than in process-wide state.

use crate::topology::mesh::MeshTopology;
use crate::topology::point::PointId;
use hashbrown::HashMap;
use std::ops::BitOr;

/// Bitmask of protocol flags on one entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityFlags(u8);

impl EntityFlags {
    /// Edge at the root of a prism column.
    pub const LAYER_BASE: EntityFlags = EntityFlags(1 << 0);
    /// Diagonal choice 0 on an edge or quad.
    pub const DIAGONAL_1: EntityFlags = EntityFlags(1 << 1);
    /// Diagonal choice 1 on an edge or quad.
    pub const DIAGONAL_2: EntityFlags = EntityFlags(1 << 2);
    /// Visited marker for the detection crawl.
    pub const CHECKED: EntityFlags = EntityFlags(1 << 3);
    /// Scheduled for forced subdivision.
    pub const SPLIT: EntityFlags = EntityFlags(1 << 4);

    /// Either diagonal flag.
    pub const ANY_DIAGONAL: EntityFlags = EntityFlags((1 << 1) | (1 << 2));

    /// True if any bit of `other` is set in `self`.
    #[inline]
    pub fn intersects(self, other: EntityFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// True if no bit is set.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    fn without(self, other: EntityFlags) -> EntityFlags {
        EntityFlags(self.0 & !other.0)
    }
}

impl BitOr for EntityFlags {
    type Output = EntityFlags;
    fn bitor(self, rhs: EntityFlags) -> EntityFlags {
        EntityFlags(self.0 | rhs.0)
    }
}

/// Side-table mapping entities to their protocol flags.
#[derive(Clone, Debug, Default)]
pub struct FlagTable {
    flags: HashMap<PointId, EntityFlags>,
}

impl FlagTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `e` carries any bit of `flag`.
    #[inline]
    pub fn has(&self, e: PointId, flag: EntityFlags) -> bool {
        self.flags.get(&e).is_some_and(|f| f.intersects(flag))
    }

    /// Sets all bits of `flag` on `e`.
    pub fn set(&mut self, e: PointId, flag: EntityFlags) {
        let entry = self.flags.entry(e).or_default();
        *entry = *entry | flag;
    }

    /// Clears all bits of `flag` on `e`.
    pub fn clear(&mut self, e: PointId, flag: EntityFlags) {
        if let Some(f) = self.flags.get_mut(&e) {
            *f = f.without(flag);
            if f.is_empty() {
                self.flags.remove(&e);
            }
        }
    }

    /// Drops every flag on `e`.
    pub fn clear_point(&mut self, e: PointId) {
        self.flags.remove(&e);
    }

    /// Clears `flag` from every entity of dimension `dim`.
    pub fn clear_from_dimension(&mut self, mesh: &MeshTopology, flag: EntityFlags, dim: u8) {
        for e in mesh.points(dim) {
            self.clear(e, flag);
        }
    }

    /// Entities of dimension `dim` carrying any bit of `flag`, in the mesh's
    /// deterministic stratum order.
    pub fn entities_with(&self, mesh: &MeshTopology, flag: EntityFlags, dim: u8) -> Vec<PointId> {
        mesh.points(dim).filter(|&e| self.has(e, flag)).collect()
    }

    /// Number of dimension-`dim` entities carrying any bit of `flag`.
    pub fn count_with(&self, mesh: &MeshTopology, flag: EntityFlags, dim: u8) -> usize {
        mesh.points(dim).filter(|&e| self.has(e, flag)).count()
    }
}
