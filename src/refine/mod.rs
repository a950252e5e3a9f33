//! Collect → split → rebuild → cleanup pipeline for layer subdivision.
//!
//! The pipeline owns the per-dimension `to_split` lists for the duration of
//! one run. Callers populate the lists (whole layer, or only `SPLIT`-flagged
//! elements for repair) and invoke [`tetrahedronize_common`], which runs the
//! stages in their fixed order. Collection bookkeeping is rebuilt fresh each
//! run; the lists themselves are cleared by the final cleanup stage.

pub mod templates;

use crate::adapt::Adapt;
use crate::adapt::diagonal::diagonal_from_flags;
use crate::algs::communicator::Communicator;
use crate::algs::exchange::Exchange;
use crate::algs::wire::WirePair;
use crate::mesh_error::MeshLayerError;
use crate::overlap::Overlap;
use crate::topology::cell_type::CellType;
use crate::topology::flags::EntityFlags;
use crate::topology::point::PointId;
use std::collections::{HashMap, HashSet};

const TRANSFER_TAG: u16 = 0x3100;
const MATCH_TAG: u16 = 0x3200;
const CENTROID_TAG: u16 = 0x3300;

/// Collection state for one pipeline run.
#[derive(Clone, Debug, Default)]
pub struct Refine {
    /// Entities scheduled for subdivision, by dimension.
    pub to_split: [Vec<PointId>; 4],
    /// `(parent, child)` records for post-split re-tagging.
    created: Vec<(PointId, PointId)>,
    /// Centroid vertices of force-split quads, keyed by parent quad.
    centroids: HashMap<PointId, PointId>,
}

impl Refine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities currently scheduled in dimension `dim`.
    pub fn scheduled(&self, dim: u8) -> usize {
        self.to_split[dim as usize].len()
    }
}

/// Stage 1: reset per-run bookkeeping (the `to_split` lists, populated by the
/// caller before this stage, are left alone).
pub fn reset_collection<C: Communicator>(a: &mut Adapt<'_, C>) {
    a.refine.created.clear();
    a.refine.centroids.clear();
}

#[derive(Clone, Copy)]
enum MirrorTable {
    Overlap,
    Matches,
}

fn mirror_scheduled<C: Communicator>(
    a: &mut Adapt<'_, C>,
    which: MirrorTable,
    tag: u16,
) -> Result<(), MeshLayerError> {
    let mut ex = Exchange::new(a.comm, tag);
    {
        let table: &Overlap = match which {
            MirrorTable::Overlap => &a.overlap,
            MirrorTable::Matches => &a.matches,
        };
        for dim in 0..4usize {
            for &e in &a.refine.to_split[dim] {
                for remote in table.remotes(e) {
                    ex.pack(
                        remote.rank,
                        &WirePair::new(remote.remote_point.get(), dim as u64),
                    );
                }
            }
        }
    }
    let mut scheduled: [HashSet<PointId>; 4] = Default::default();
    for dim in 0..4usize {
        scheduled[dim].extend(a.refine.to_split[dim].iter().copied());
    }
    let record = std::mem::size_of::<WirePair>();
    for (from, bytes) in ex.execute()? {
        if bytes.len() % record != 0 {
            return Err(MeshLayerError::TruncatedRecordStream {
                neighbor: from,
                len: bytes.len(),
                record,
            });
        }
        for chunk in bytes.chunks_exact(record) {
            let pair = bytemuck::pod_read_unaligned::<WirePair>(chunk);
            let e = PointId::new(pair.id())?;
            let dim = pair.value() as usize & 3;
            if scheduled[dim].insert(e) {
                a.refine.to_split[dim].push(e);
            }
        }
    }
    Ok(())
}

/// Stage 2: entities whose split must be mirrored on remote copies are
/// scheduled on every sharing rank.
pub fn collect_for_transfer<C: Communicator>(
    a: &mut Adapt<'_, C>,
) -> Result<(), MeshLayerError> {
    mirror_scheduled(a, MirrorTable::Overlap, TRANSFER_TAG)
}

/// Stage 3: the same sweep over matched-boundary (periodic) copies.
pub fn collect_for_matching<C: Communicator>(
    a: &mut Adapt<'_, C>,
) -> Result<(), MeshLayerError> {
    mirror_scheduled(a, MirrorTable::Matches, MATCH_TAG)
}

fn split_quad<C: Communicator>(a: &mut Adapt<'_, C>, q: PointId) -> Result<(), MeshLayerError> {
    let qv = a.mesh.quad_vertices(q)?;
    if a.flags.has(q, EntityFlags::SPLIT) {
        // Forced split: no diagonal exists, subdivide around a centroid.
        let c = a.mesh.add_vertex()?;
        a.refine.centroids.insert(q, c);
        a.refine.created.push((q, c));
        for tri in templates::quad_centroid_split(qv, c) {
            let f = a.mesh.get_or_add_triangle(tri)?;
            a.refine.created.push((q, f));
        }
    } else {
        let diagonal =
            diagonal_from_flags(&a.flags, q).ok_or(MeshLayerError::MissingDiagonal(q))?;
        let (tris, diag_pair) = templates::quad_split(qv, diagonal)?;
        let e = a.mesh.get_or_add_edge(diag_pair[0], diag_pair[1])?;
        a.refine.created.push((q, e));
        for tri in tris {
            let f = a.mesh.get_or_add_triangle(tri)?;
            a.refine.created.push((q, f));
        }
    }
    Ok(())
}

/// The diagonal code of each quad face of a prism, in the prism's frame:
/// code 0 on face `i` means the diagonal `{pv[i], pv[(i+1)%3+3]}`.
fn prism_face_codes<C: Communicator>(
    a: &Adapt<'_, C>,
    r: PointId,
    pv: &[PointId; 6],
) -> Result<[u64; 3], MeshLayerError> {
    let mut codes = [0u64; 3];
    for i in 0..3 {
        let j = (i + 1) % 3;
        let wanted: HashSet<PointId> = [pv[i], pv[j], pv[j + 3], pv[i + 3]].into();
        let q = a
            .mesh
            .cone(r)
            .iter()
            .copied()
            .find(|&f| {
                a.mesh.cell_type(f) == Some(CellType::Quadrilateral)
                    && a.mesh
                        .quad_vertices(f)
                        .is_ok_and(|fv| fv.iter().all(|v| wanted.contains(v)))
            })
            .ok_or(MeshLayerError::UnexpectedCellType {
                point: r,
                expected: "prism (2 triangles, 3 quads)",
                found: CellType::Prism,
            })?;
        let fv = a.mesh.quad_vertices(q)?;
        let diagonal =
            diagonal_from_flags(&a.flags, q).ok_or(MeshLayerError::MissingDiagonal(q))?;
        let mut pair = if diagonal == 0 {
            [fv[0], fv[2]]
        } else {
            [fv[1], fv[3]]
        };
        pair.sort_unstable();
        let mut rising = [pv[i], pv[j + 3]];
        rising.sort_unstable();
        let mut falling = [pv[j], pv[i + 3]];
        falling.sort_unstable();
        codes[i] = if pair == rising {
            0
        } else if pair == falling {
            1
        } else {
            return Err(MeshLayerError::InconsistentDiagonal { face: q, region: r });
        };
    }
    Ok(codes)
}

fn split_region<C: Communicator>(a: &mut Adapt<'_, C>, r: PointId) -> Result<(), MeshLayerError> {
    match a.mesh.try_cell_type(r)? {
        CellType::Prism => {
            let pv = a.mesh.prism_vertices(r)?;
            let codes = prism_face_codes(a, r, &pv)?;
            for tet in templates::prism_split(r, pv, codes)? {
                let t = a.mesh.add_tet(tet)?;
                a.refine.created.push((r, t));
            }
        }
        CellType::Pyramid => {
            let pv = a.mesh.pyramid_vertices(r)?;
            let base = a
                .mesh
                .cone(r)
                .iter()
                .copied()
                .find(|&f| a.mesh.cell_type(f) == Some(CellType::Quadrilateral))
                .ok_or(MeshLayerError::UnexpectedCellType {
                    point: r,
                    expected: "pyramid (1 quad, 4 triangles)",
                    found: CellType::Pyramid,
                })?;
            let tets: Vec<[PointId; 4]> = if a.flags.has(base, EntityFlags::SPLIT) {
                let c = *a
                    .refine
                    .centroids
                    .get(&base)
                    .ok_or(MeshLayerError::MissingDiagonal(base))?;
                templates::pyramid_centroid_split(pv, c).to_vec()
            } else {
                let diagonal = diagonal_from_flags(&a.flags, base)
                    .ok_or(MeshLayerError::MissingDiagonal(base))?;
                templates::pyramid_split(pv, diagonal)?.to_vec()
            };
            for tet in tets {
                let t = a.mesh.add_tet(tet)?;
                a.refine.created.push((r, t));
            }
        }
        found => {
            return Err(MeshLayerError::UnexpectedCellType {
                point: r,
                expected: "prism or pyramid",
                found,
            });
        }
    }
    Ok(())
}

/// Stage 4: perform the geometric split. Quads go first so the region
/// templates reuse their halves; originals stay in place until stage 6.
pub fn split_elements<C: Communicator>(a: &mut Adapt<'_, C>) -> Result<(), MeshLayerError> {
    let quads = a.refine.to_split[2].clone();
    for q in quads {
        let t = a.mesh.try_cell_type(q)?;
        if t != CellType::Quadrilateral {
            return Err(MeshLayerError::UnexpectedCellType {
                point: q,
                expected: "quadrilateral",
                found: t,
            });
        }
        split_quad(a, q)?;
    }
    let regions = a.refine.to_split[3].clone();
    for r in regions {
        split_region(a, r)?;
    }
    Ok(())
}

/// Stage 5: re-tag new elements (children inherit the parent's labels) and
/// mirror centroid vertices of shared force-split quads into the overlap.
pub fn process_new_elements<C: Communicator>(
    a: &mut Adapt<'_, C>,
) -> Result<(), MeshLayerError> {
    let parents: HashSet<PointId> = a.refine.created.iter().map(|&(p, _)| p).collect();
    let mut inherited: HashMap<PointId, Vec<(String, i32)>> = HashMap::new();
    for (name, point, value) in a.labels.iter() {
        if parents.contains(&point) {
            inherited
                .entry(point)
                .or_default()
                .push((name.to_string(), value));
        }
    }
    for &(parent, child) in &a.refine.created {
        if let Some(labels) = inherited.get(&parent) {
            for (name, value) in labels {
                a.labels.set_label(child, name, *value);
            }
        }
    }

    let mut ex = Exchange::new(a.comm, CENTROID_TAG);
    for (&q, &c) in &a.refine.centroids {
        for remote in a.overlap.remotes(q) {
            ex.pack(remote.rank, &WirePair::new(remote.remote_point.get(), c.get()));
        }
    }
    let record = std::mem::size_of::<WirePair>();
    for (from, bytes) in ex.execute()? {
        if bytes.len() % record != 0 {
            return Err(MeshLayerError::TruncatedRecordStream {
                neighbor: from,
                len: bytes.len(),
                record,
            });
        }
        for chunk in bytes.chunks_exact(record) {
            let pair = bytemuck::pod_read_unaligned::<WirePair>(chunk);
            let q = PointId::new(pair.id())?;
            let theirs = PointId::new(pair.value())?;
            let mine = *a.refine.centroids.get(&q).ok_or_else(|| {
                MeshLayerError::CommError {
                    neighbor: from,
                    detail: format!("centroid link for unsplit quad {q}"),
                }
            })?;
            a.overlap.add_link(mine, from, theirs);
        }
    }
    Ok(())
}

/// Stage 6: destroy the replaced originals (regions before their faces) and
/// scrub them from flags, labels, and the sharing tables.
pub fn destroy_split_elements<C: Communicator>(
    a: &mut Adapt<'_, C>,
) -> Result<(), MeshLayerError> {
    for dim in [3usize, 2] {
        let doomed = a.refine.to_split[dim].clone();
        for e in doomed {
            a.mesh.remove(e)?;
            a.flags.clear_point(e);
            a.labels.clear_points([e]);
            a.overlap.remove_point(e);
            a.matches.remove_point(e);
        }
    }
    Ok(())
}

/// Stage 7: clear scratch flags from every touched dimension and drop the
/// collection lists.
pub fn cleanup_after<C: Communicator>(a: &mut Adapt<'_, C>) {
    for dim in 1..=3u8 {
        a.flags.clear_from_dimension(
            &a.mesh,
            EntityFlags::SPLIT | EntityFlags::ANY_DIAGONAL,
            dim,
        );
    }
    for list in &mut a.refine.to_split {
        list.clear();
    }
    a.refine.created.clear();
    a.refine.centroids.clear();
}

/// Runs the pipeline stages in order over the already-populated lists.
pub fn tetrahedronize_common<C: Communicator>(
    a: &mut Adapt<'_, C>,
) -> Result<(), MeshLayerError> {
    reset_collection(a);
    collect_for_transfer(a)?;
    collect_for_matching(a)?;
    split_elements(a)?;
    process_new_elements(a)?;
    destroy_split_elements(a)?;
    cleanup_after(a);
    Ok(())
}
