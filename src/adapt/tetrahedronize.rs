//! Whole-layer conversion driver.

use crate::adapt::Adapt;
use crate::adapt::diagonal::prepare_layer_to_tets;
use crate::algs::communicator::Communicator;
use crate::mesh_error::MeshLayerError;
use crate::refine::tetrahedronize_common;
use crate::topology::cell_type::CellType;
use std::time::Instant;

/// Schedules every quad, prism, and pyramid in the mesh for splitting.
fn add_all_layer_elements<C: Communicator>(a: &mut Adapt<'_, C>) {
    let quads: Vec<_> = a
        .mesh
        .points(2)
        .filter(|&f| a.mesh.cell_type(f) == Some(CellType::Quadrilateral))
        .collect();
    let regions: Vec<_> = a
        .mesh
        .points(3)
        .filter(|&r| {
            matches!(
                a.mesh.cell_type(r),
                Some(CellType::Prism) | Some(CellType::Pyramid)
            )
        })
        .collect();
    a.refine.to_split[2] = quads;
    a.refine.to_split[3] = regions;
}

/// Converts the whole boundary layer to tetrahedra.
///
/// No-op unless the adaptation input enables the conversion; invoking it on
/// a mesh that never had a layer is a logic error upstream.
pub fn tetrahedronize<C: Communicator>(a: &mut Adapt<'_, C>) -> Result<(), MeshLayerError> {
    if !a.input.turn_layer_to_tets {
        return Ok(());
    }
    if !a.has_layer {
        return Err(MeshLayerError::NoBoundaryLayer);
    }
    let t0 = Instant::now();
    prepare_layer_to_tets(a)?;
    add_all_layer_elements(a);
    let quads = a.refine.scheduled(2);
    let regions = a.refine.scheduled(3);
    tetrahedronize_common(a)?;
    log::info!(
        "boundary layer ({} quads, {} regions) converted to tets in {:.3}s",
        quads,
        regions,
        t0.elapsed().as_secs_f64()
    );
    Ok(())
}
