//! Adaptation context for one boundary-layer pass.
//!
//! [`Adapt`] bundles the partition's mesh, its overlap and matched-boundary
//! tables, classification labels, the protocol flag table, and the refine
//! collection state. Flag state lives here, scoped to one adaptation pass,
//! rather than in process-wide globals.

pub mod cleanup;
pub mod diagonal;
pub mod tetrahedronize;

pub use cleanup::cleanup_layer;
pub use tetrahedronize::tetrahedronize;

use crate::algs::communicator::Communicator;
use crate::overlap::{Matches, Overlap};
use crate::refine::Refine;
use crate::topology::cell_type::CellType;
use crate::topology::flags::{EntityFlags, FlagTable};
use crate::topology::labels::{LabelSet, LAYER_BASE_LABEL};
use crate::topology::mesh::MeshTopology;

/// Feature switches consumed by the layer drivers.
#[derive(Clone, Copy, Debug, Default)]
pub struct AdaptInput {
    /// Convert the whole prismatic layer to tetrahedra.
    pub turn_layer_to_tets: bool,
    /// Detect and force-split elements the conversion left inconsistent.
    pub cleanup_layer: bool,
}

/// State for one adaptation pass on one partition.
pub struct Adapt<'c, C: Communicator> {
    pub mesh: MeshTopology,
    pub overlap: Overlap,
    pub matches: Matches,
    pub labels: LabelSet,
    pub input: AdaptInput,
    pub flags: FlagTable,
    pub refine: Refine,
    /// Whether the mesh contained layer elements when the pass began.
    pub has_layer: bool,
    pub comm: &'c C,
}

impl<'c, C: Communicator> Adapt<'c, C> {
    pub fn new(
        mesh: MeshTopology,
        overlap: Overlap,
        labels: LabelSet,
        input: AdaptInput,
        comm: &'c C,
    ) -> Self {
        let has_layer = mesh.has_layer();
        Self {
            mesh,
            overlap,
            matches: Matches::new(),
            labels,
            input,
            flags: FlagTable::new(),
            refine: Refine::new(),
            has_layer,
            comm,
        }
    }
}

/// Flags every edge the classifier labeled as layer base. Idempotent;
/// returns the number of newly flagged edges.
pub fn find_layer_base<C: Communicator>(a: &mut Adapt<'_, C>) -> usize {
    let mut n = 0;
    for e in a.labels.stratum_points(LAYER_BASE_LABEL, 1) {
        if a.mesh.cell_type(e) == Some(CellType::Segment)
            && !a.flags.has(e, EntityFlags::LAYER_BASE)
        {
            a.flags.set(e, EntityFlags::LAYER_BASE);
            n += 1;
        }
    }
    n
}
