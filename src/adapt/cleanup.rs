//! Bad-element detection and forced repair.
//!
//! Diagonal propagation can leave quads unflagged: a chain runs off the edge
//! of the layer, or cross-rank delivery order leaves one copy stale. The
//! detection pass retraces the chains the diagonal crawl should have visited
//! (`QuadMarker`), sweeps for quads it never reached, synchronizes the
//! verdict across all copies, and force-splits the pyramids above them.

use crate::adapt::{find_layer_base, Adapt};
use crate::algs::communicator::Communicator;
use crate::algs::crawler::{crawl_layers, Crawler, Layer};
use crate::algs::exchange::{allreduce_sum, Exchange};
use crate::algs::wire::WireEntity;
use crate::mesh_error::MeshLayerError;
use crate::refine::tetrahedronize_common;
use crate::topology::cell_type::CellType;
use crate::topology::flags::{EntityFlags, FlagTable};
use crate::topology::mesh::MeshTopology;
use crate::topology::point::PointId;
use std::time::Instant;

const MARKER_TAG: u16 = 0x2000;
const BAD_QUAD_TAG: u16 = 0x3000;

/// Like `QuadFlagger`, but just sets `CHECKED` to find the remaining
/// delinquent quads.
pub struct QuadMarker<'a> {
    pub mesh: &'a MeshTopology,
    pub flags: &'a mut FlagTable,
}

impl Crawler for QuadMarker<'_> {
    fn begin(&mut self, first: &mut Layer) -> Result<(), MeshLayerError> {
        *first = self
            .flags
            .entities_with(self.mesh, EntityFlags::LAYER_BASE, 1);
        for &e in first.iter() {
            self.flags.set(e, EntityFlags::CHECKED);
        }
        Ok(())
    }

    fn crawl(&mut self, e: PointId) -> Result<Option<PointId>, MeshLayerError> {
        let q = self.mesh.support(e).iter().copied().find(|&f| {
            self.mesh.cell_type(f) == Some(CellType::Quadrilateral)
                && !self.flags.has(f, EntityFlags::CHECKED)
        });
        let Some(q) = q else {
            return Ok(None);
        };
        self.flags.set(q, EntityFlags::CHECKED);
        let opposite = self.mesh.quad_opposite_edge(q, e)?;
        self.flags.set(opposite, EntityFlags::CHECKED);
        Ok(Some(opposite))
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
        if self.flags.has(e, EntityFlags::CHECKED) {
            return Ok(false);
        }
        self.flags.set(e, EntityFlags::CHECKED);
        Ok(true)
    }

    fn end(&mut self) -> Result<(), MeshLayerError> {
        // Transient scratch state must not leak into later phases.
        self.flags
            .clear_from_dimension(self.mesh, EntityFlags::CHECKED, 1);
        Ok(())
    }
}

fn mark_good_quads<C: Communicator>(a: &mut Adapt<'_, C>) -> Result<(), MeshLayerError> {
    let mut op = QuadMarker {
        mesh: &a.mesh,
        flags: &mut a.flags,
    };
    crawl_layers(&mut op, &a.overlap, a.comm, MARKER_TAG)?;
    Ok(())
}

/// Every quad the marker never reached is bad: flag it locally and tell all
/// its copies, so every rank reaches the same verdict without ownership
/// tie-breaks.
fn mark_bad_quads<C: Communicator>(a: &mut Adapt<'_, C>) -> Result<(), MeshLayerError> {
    let mut ex = Exchange::new(a.comm, BAD_QUAD_TAG);
    let mut bad = Vec::new();
    for q in a.mesh.points(2) {
        if a.mesh.cell_type(q) == Some(CellType::Quadrilateral)
            && !a.flags.has(q, EntityFlags::CHECKED)
        {
            bad.push(q);
            for remote in a.overlap.remotes(q) {
                ex.pack(remote.rank, &WireEntity::of(remote.remote_point.get()));
            }
        }
    }
    for q in bad {
        a.flags.set(q, EntityFlags::SPLIT);
    }
    let record = std::mem::size_of::<WireEntity>();
    for (from, bytes) in ex.execute()? {
        if bytes.len() % record != 0 {
            return Err(MeshLayerError::TruncatedRecordStream {
                neighbor: from,
                len: bytes.len(),
                record,
            });
        }
        for chunk in bytes.chunks_exact(record) {
            let entity = bytemuck::pod_read_unaligned::<WireEntity>(chunk);
            a.flags.set(PointId::new(entity.get())?, EntityFlags::SPLIT);
        }
    }
    a.flags
        .clear_from_dimension(&a.mesh, EntityFlags::CHECKED, 2);
    Ok(())
}

/// Flags every pyramid above a bad quad and returns the global count.
fn mark_bad_pyramids<C: Communicator>(a: &mut Adapt<'_, C>) -> Result<u64, MeshLayerError> {
    let mut n = 0u64;
    for q in a.mesh.points(2) {
        if !a.flags.has(q, EntityFlags::SPLIT) {
            continue;
        }
        for &elem in a.mesh.support(q) {
            let found = a.mesh.try_cell_type(elem)?;
            if found != CellType::Pyramid {
                return Err(MeshLayerError::UnexpectedCellType {
                    point: elem,
                    expected: "pyramid",
                    found,
                });
            }
            if !a.flags.has(elem, EntityFlags::SPLIT) {
                a.flags.set(elem, EntityFlags::SPLIT);
                n += 1;
            }
        }
    }
    Ok(allreduce_sum(a.comm, n))
}

/// Schedules the `SPLIT`-flagged quads and pyramids for subdivision.
fn add_bad_pyramids<C: Communicator>(a: &mut Adapt<'_, C>) {
    for dim in 2..=3u8 {
        a.refine.to_split[dim as usize] =
            a.flags.entities_with(&a.mesh, EntityFlags::SPLIT, dim);
    }
}

fn prepare_layer_cleanup<C: Communicator>(a: &mut Adapt<'_, C>) -> Result<u64, MeshLayerError> {
    find_layer_base(a);
    mark_good_quads(a)?;
    mark_bad_quads(a)?;
    mark_bad_pyramids(a)
}

/// Detects and repairs elements the conversion left inconsistent.
///
/// Returns the global number of repaired pyramids; zero means the repair
/// pipeline was skipped entirely.
pub fn cleanup_layer<C: Communicator>(a: &mut Adapt<'_, C>) -> Result<u64, MeshLayerError> {
    if !a.input.cleanup_layer {
        return Ok(0);
    }
    if !a.has_layer {
        return Err(MeshLayerError::NoBoundaryLayer);
    }
    let t0 = Instant::now();
    let n = prepare_layer_cleanup(a)?;
    if n == 0 {
        log::info!("no bad pyramids found");
        return Ok(0);
    }
    add_bad_pyramids(a);
    tetrahedronize_common(a)?;
    log::info!(
        "tetrahedronized {} bad pyramids in {:.3}s",
        n,
        t0.elapsed().as_secs_f64()
    );
    Ok(n)
}
