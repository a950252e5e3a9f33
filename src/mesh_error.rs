//! MeshLayerError: unified error type for mesh-layer public APIs.
//!
//! Every fallible operation in the crate reports through this enum. The
//! distributed protocol treats most of these as job-fatal: an inconsistency
//! detected mid-protocol means upstream flag state is wrong, and continuing
//! would silently corrupt mesh topology across partitions.

use crate::topology::cell_type::CellType;
use crate::topology::point::PointId;
use thiserror::Error;

/// Unified error type for mesh-layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshLayerError {
    /// Attempted to construct a PointId with a zero value (invalid).
    #[error("PointId must be non-zero (0 is reserved as invalid/sentinel)")]
    InvalidPointId,
    /// A point was referenced that the topology does not contain.
    #[error("point `{0}` not present in the mesh topology")]
    PointNotInMesh(PointId),
    /// An entity had an unexpected cell type for the operation.
    #[error("point `{point}` has cell type {found:?}, expected {expected}")]
    UnexpectedCellType {
        point: PointId,
        expected: &'static str,
        found: CellType,
    },
    /// A layer operation was invoked on a mesh with no boundary layer.
    #[error("mesh has no boundary layer (no prisms, pyramids, or quads)")]
    NoBoundaryLayer,
    /// An edge or quad required a diagonal flag but carried none.
    #[error("entity `{0}` has no diagonal flag where one is required")]
    MissingDiagonal(PointId),
    /// A diagonal value outside {0, 1} appeared in the protocol.
    #[error("invalid diagonal value {0} (must be 0 or 1)")]
    InvalidDiagonal(u64),
    /// The three face diagonals of a prism form the cyclic configuration,
    /// which cannot be split into three tetrahedra.
    #[error("prism `{0}` has cyclic face diagonals")]
    CyclicPrismDiagonals(PointId),
    /// A face diagonal did not match either diagonal of its region's frame.
    #[error("face `{face}` diagonal is inconsistent with region `{region}`")]
    InconsistentDiagonal { face: PointId, region: PointId },
    /// An edge was expected on the bounding cycle of a face but was absent.
    #[error("edge `{edge}` is not on the bounding cycle of face `{face}`")]
    EdgeNotOnFace { edge: PointId, face: PointId },
    /// A face cone did not form a closed edge cycle.
    #[error("face `{0}` cone is not a closed edge cycle")]
    BrokenFaceCycle(PointId),
    /// A vertex was missing from the global numbering after synchronization.
    #[error("vertex `{0}` has no global number")]
    MissingGlobalNumber(PointId),
    /// Communication with a peer rank failed.
    #[error("communication error with rank {neighbor}: {detail}")]
    CommError { neighbor: usize, detail: String },
    /// A received buffer did not match its announced length.
    #[error("rank {neighbor} buffer size mismatch: expected {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// An inbound message stream did not divide into whole records.
    #[error("rank {neighbor} sent a truncated record stream ({len} bytes, record size {record})")]
    TruncatedRecordStream {
        neighbor: usize,
        len: usize,
        record: usize,
    },
}
