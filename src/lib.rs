//! # mesh-layer
//!
//! mesh-layer is the boundary-layer handling engine of a parallel
//! mesh-adaptation stack: it converts an anisotropic layer of prismatic and
//! pyramidal elements into tetrahedra while the mesh is partitioned across
//! cooperating processes, and repairs any element the conversion left
//! inconsistent.
//!
//! ## Features
//! - A generic distributed wavefront driver ([`algs::crawler::crawl_layers`])
//!   that walks prism columns across partition boundaries to quiescence
//! - Globally consistent diagonal assignment per quad face, tie-broken only
//!   by rank-independent global vertex numbers, so two ranks sharing a face
//!   never split it two different ways
//! - A detection/repair pass that finds quads the propagation missed and
//!   force-splits the pyramids above them
//! - A collect → split → rebuild → cleanup pipeline with per-dimension
//!   `to_split` lists and mirrored scheduling on remote copies
//! - Pluggable transport: serial ([`algs::communicator::NoComm`]) and
//!   in-process multi-rank ([`algs::communicator::RayonComm`]) backends ship
//!   with the crate; a distributed backend implements
//!   [`algs::communicator::Communicator`]
//!
//! ## Determinism
//!
//! Re-running diagonal assignment on the same mesh and partitioning yields
//! the same choices: every decision derives from global vertex numbers, and
//! all traversals iterate strata in deterministic order.

pub mod adapt;
pub mod algs;
pub mod mesh_error;
pub mod overlap;
pub mod refine;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::adapt::{cleanup_layer, find_layer_base, tetrahedronize, Adapt, AdaptInput};
    pub use crate::algs::communicator::{Communicator, NoComm, RayonComm, Wait};
    pub use crate::algs::crawler::{crawl_layers, Crawler, Layer};
    pub use crate::algs::exchange::{allreduce_sum, global_or, Exchange};
    pub use crate::algs::numbering::{number_vertices, GlobalNumbering};
    pub use crate::mesh_error::MeshLayerError;
    pub use crate::overlap::{Matches, Overlap, Remote};
    pub use crate::refine::Refine;
    pub use crate::topology::cell_type::CellType;
    pub use crate::topology::flags::{EntityFlags, FlagTable};
    pub use crate::topology::labels::{LabelSet, LAYER_BASE_LABEL};
    pub use crate::topology::mesh::MeshTopology;
    pub use crate::topology::point::PointId;
}
