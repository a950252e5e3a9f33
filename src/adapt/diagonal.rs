//! Globally consistent diagonal assignment for layer quads.
//!
//! Step 1 seeds every layer-base edge from the global vertex numbering: the
//! comparison of two rank-independent numbers is the protocol's only
//! tie-break, so every copy of a shared base edge reaches the same choice
//! without communication. Step 2 crawls each prism column, deriving every
//! quad's diagonal from the incoming edge with the flip-bit algebra and
//! re-seeding the opposite edge to continue the chain.

use crate::adapt::{find_layer_base, Adapt};
use crate::algs::communicator::Communicator;
use crate::algs::crawler::{crawl_layers, Crawler, Layer};
use crate::algs::numbering::{number_vertices, GlobalNumbering};
use crate::mesh_error::MeshLayerError;
use crate::topology::cell_type::CellType;
use crate::topology::flags::{EntityFlags, FlagTable};
use crate::topology::mesh::MeshTopology;
use crate::topology::point::PointId;

const DIAGONAL_TAG: u16 = 0x1000;

/// Reads an entity's diagonal choice, if it has one.
pub fn diagonal_from_flags(flags: &FlagTable, e: PointId) -> Option<u64> {
    if flags.has(e, EntityFlags::DIAGONAL_1) {
        return Some(0);
    }
    if flags.has(e, EntityFlags::DIAGONAL_2) {
        return Some(1);
    }
    None
}

/// The flag encoding a diagonal choice.
pub fn flag_from_diagonal(diagonal: u64) -> Result<EntityFlags, MeshLayerError> {
    match diagonal {
        0 => Ok(EntityFlags::DIAGONAL_1),
        1 => Ok(EntityFlags::DIAGONAL_2),
        d => Err(MeshLayerError::InvalidDiagonal(d)),
    }
}

/// True when the edge's first cone vertex has the smaller global number.
fn edge_direction(
    numbering: &GlobalNumbering,
    mesh: &MeshTopology,
    e: PointId,
) -> Result<bool, MeshLayerError> {
    let [a, b] = mesh.edge_vertices(e)?;
    Ok(numbering.number(a)? < numbering.number(b)?)
}

/// Seeds every `LAYER_BASE` edge with its canonical diagonal.
pub fn choose_base_diagonals(
    mesh: &MeshTopology,
    flags: &mut FlagTable,
    numbering: &GlobalNumbering,
) -> Result<(), MeshLayerError> {
    for e in mesh.points(1) {
        if flags.has(e, EntityFlags::LAYER_BASE) {
            if edge_direction(numbering, mesh, e)? {
                flags.set(e, EntityFlags::DIAGONAL_1);
            } else {
                flags.set(e, EntityFlags::DIAGONAL_2);
            }
        }
    }
    Ok(())
}

/// The first quad adjoining `e` not yet carrying `visited`, if any.
fn other_quad(
    mesh: &MeshTopology,
    flags: &FlagTable,
    e: PointId,
    visited: EntityFlags,
) -> Option<PointId> {
    mesh.support(e)
        .iter()
        .copied()
        .find(|&f| mesh.cell_type(f) == Some(CellType::Quadrilateral) && !flags.has(f, visited))
}

/// The correction bit an edge contributes on a quad: the parity of its index
/// in the face's edge cycle XOR its direction bit. This encodes the face's
/// orientation convention; combined with the raw diagonal bit it makes the
/// chosen geometric diagonal independent of cone order and cycle start.
fn quad_edge_diagonal_bit(
    edge: PointId,
    quad: PointId,
    edges: &[PointId; 4],
    directions: &[u8; 4],
) -> Result<u64, MeshLayerError> {
    let i = edges
        .iter()
        .position(|&e| e == edge)
        .ok_or(MeshLayerError::EdgeNotOnFace { edge, face: quad })?;
    Ok(((i as u64) & 1) ^ directions[i] as u64)
}

/// Derives `q`'s diagonal from incoming edge `e`, seeds the opposite edge,
/// and returns it as the next chain entity.
fn flag_quad(
    mesh: &MeshTopology,
    flags: &mut FlagTable,
    q: PointId,
    e: PointId,
) -> Result<PointId, MeshLayerError> {
    let mut diagonal =
        diagonal_from_flags(flags, e).ok_or(MeshLayerError::MissingDiagonal(e))?;
    let (edges, directions) = mesh.quad_edges_and_directions(q)?;
    diagonal ^= quad_edge_diagonal_bit(e, q, &edges, &directions)?;
    flags.set(q, flag_from_diagonal(diagonal)?);
    let out = mesh.quad_opposite_edge(q, e)?;
    // Bit flip going out is the opposite of bit flip going in.
    diagonal ^= 1 ^ quad_edge_diagonal_bit(out, q, &edges, &directions)?;
    flags.set(out, flag_from_diagonal(diagonal)?);
    Ok(out)
}

/// Crawler that propagates diagonal choices along prism columns.
pub struct QuadFlagger<'a> {
    pub mesh: &'a MeshTopology,
    pub flags: &'a mut FlagTable,
}

impl Crawler for QuadFlagger<'_> {
    fn begin(&mut self, first: &mut Layer) -> Result<(), MeshLayerError> {
        *first = self
            .flags
            .entities_with(self.mesh, EntityFlags::LAYER_BASE, 1);
        Ok(())
    }

    fn crawl(&mut self, e: PointId) -> Result<Option<PointId>, MeshLayerError> {
        let q = other_quad(self.mesh, self.flags, e, EntityFlags::ANY_DIAGONAL);
        let next = match q {
            Some(q) => Some(flag_quad(self.mesh, self.flags, q, e)?),
            None => None,
        };
        // The incoming edge is fully consumed once its quad is flagged.
        self.flags.clear(e, EntityFlags::ANY_DIAGONAL);
        Ok(next)
    }

    fn send(
        &mut self,
        e: PointId,
        _to: usize,
        message: &mut Vec<u8>,
    ) -> Result<(), MeshLayerError> {
        let diagonal =
            diagonal_from_flags(self.flags, e).ok_or(MeshLayerError::MissingDiagonal(e))?;
        message.extend_from_slice(&diagonal.to_le_bytes());
        Ok(())
    }

    fn recv(
        &mut self,
        e: PointId,
        _from: usize,
        message: &[u8],
    ) -> Result<bool, MeshLayerError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(message);
        let diagonal = u64::from_le_bytes(raw);
        if self.flags.has(e, EntityFlags::ANY_DIAGONAL) {
            return Ok(false);
        }
        self.flags.set(e, flag_from_diagonal(diagonal)?);
        Ok(true)
    }

    fn payload_len(&self) -> usize {
        8
    }
}

fn flag_quad_diagonals<C: Communicator>(a: &mut Adapt<'_, C>) -> Result<(), MeshLayerError> {
    let mut op = QuadFlagger {
        mesh: &a.mesh,
        flags: &mut a.flags,
    };
    crawl_layers(&mut op, &a.overlap, a.comm, DIAGONAL_TAG)?;
    Ok(())
}

/// Full preparation: base flags, global numbering, base choice, propagation.
pub fn prepare_layer_to_tets<C: Communicator>(
    a: &mut Adapt<'_, C>,
) -> Result<(), MeshLayerError> {
    find_layer_base(a);
    let numbering = number_vertices(&a.mesh, &a.overlap, a.comm)?;
    choose_base_diagonals(&a.mesh, &mut a.flags, &numbering)?;
    flag_quad_diagonals(a)
}
