//! `PointId`: a strong, zero-cost handle for mesh entities.
//!
//! Every entity (vertex, edge, face, region) is represented by a unique,
//! opaque identifier. `PointId` wraps a nonzero `u64` so that 0 stays
//! reserved as an invalid/sentinel value, including on the wire where
//! entity ids travel as raw `u64`s.

use crate::mesh_error::MeshLayerError;
use std::{fmt, num::NonZeroU64};

/// Opaque entity handle.
///
/// # Memory layout
/// `repr(transparent)` over `NonZeroU64`: same ABI and alignment as a `u64`,
/// so it can be cast into wire records without conversion.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct PointId(NonZeroU64);

impl PointId {
    /// Creates a new `PointId` from a raw `u64` value.
    ///
    /// Fails with [`MeshLayerError::InvalidPointId`] if `raw == 0`.
    #[inline]
    pub fn new(raw: u64) -> Result<Self, MeshLayerError> {
        NonZeroU64::new(raw)
            .map(PointId)
            .ok_or(MeshLayerError::InvalidPointId)
    }

    /// Returns the inner `u64` value of this `PointId`.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PointId").field(&self.get()).finish()
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}
