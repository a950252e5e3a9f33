//! In-memory mesh topology for one partition.
//!
//! `MeshTopology` stores the downward adjacency (cone) of every entity in
//! creation order, the derived upward adjacency (support), cell types, and
//! per-dimension strata. Face cones are closed edge cycles; region cones are
//! faces. Shared lower-dimensional entities are deduplicated through
//! sorted-vertex lookups so that stacked cells reuse edges and faces.
//!
//! # Invariants
//! - A face's cone lists its bounding edges in cyclic order: edge `i` connects
//!   face vertices `i` and `i+1` (mod n).
//! - Strata iterate in insertion order, which is deterministic for a given
//!   construction sequence.
//! - Remote copies of an edge on other ranks store their cone in the same
//!   vertex order (aligned copies); the diagonal protocol depends on this.

use crate::mesh_error::MeshLayerError;
use crate::topology::cell_type::CellType;
use crate::topology::point::PointId;
use std::collections::HashMap;

/// One partition's mesh topology.
#[derive(Clone, Debug, Default)]
pub struct MeshTopology {
    cones: HashMap<PointId, Vec<PointId>>,
    supports: HashMap<PointId, Vec<PointId>>,
    types: HashMap<PointId, CellType>,
    strata: [Vec<PointId>; 4],
    edge_lookup: HashMap<(PointId, PointId), PointId>,
    face_lookup: HashMap<Vec<PointId>, PointId>,
    next_id: u64,
}

impl MeshTopology {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    fn alloc(&mut self) -> Result<PointId, MeshLayerError> {
        let id = PointId::new(self.next_id)?;
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(MeshLayerError::InvalidPointId)?;
        Ok(id)
    }

    fn insert(&mut self, p: PointId, cell_type: CellType, cone: Vec<PointId>) {
        for &child in &cone {
            self.supports.entry(child).or_default().push(p);
        }
        self.cones.insert(p, cone);
        self.types.insert(p, cell_type);
        self.strata[cell_type.dimension() as usize].push(p);
    }

    /// Creates a new vertex.
    pub fn add_vertex(&mut self) -> Result<PointId, MeshLayerError> {
        let p = self.alloc()?;
        self.insert(p, CellType::Vertex, Vec::new());
        Ok(p)
    }

    /// Returns the edge between `a` and `b`, creating it with cone `[a, b]`
    /// if it does not exist yet.
    pub fn get_or_add_edge(&mut self, a: PointId, b: PointId) -> Result<PointId, MeshLayerError> {
        let key = if a < b { (a, b) } else { (b, a) };
        if let Some(&e) = self.edge_lookup.get(&key) {
            return Ok(e);
        }
        let e = self.alloc()?;
        self.insert(e, CellType::Segment, vec![a, b]);
        self.edge_lookup.insert(key, e);
        Ok(e)
    }

    /// Returns the triangle on `v`, creating it (and its edges) if absent.
    pub fn get_or_add_triangle(&mut self, v: [PointId; 3]) -> Result<PointId, MeshLayerError> {
        let mut key = v.to_vec();
        key.sort_unstable();
        if let Some(&f) = self.face_lookup.get(&key) {
            return Ok(f);
        }
        let edges = vec![
            self.get_or_add_edge(v[0], v[1])?,
            self.get_or_add_edge(v[1], v[2])?,
            self.get_or_add_edge(v[2], v[0])?,
        ];
        let f = self.alloc()?;
        self.insert(f, CellType::Triangle, edges);
        self.face_lookup.insert(key, f);
        Ok(f)
    }

    /// Returns the quad on the vertex cycle `v`, creating it if absent.
    pub fn get_or_add_quad(&mut self, v: [PointId; 4]) -> Result<PointId, MeshLayerError> {
        let mut key = v.to_vec();
        key.sort_unstable();
        if let Some(&f) = self.face_lookup.get(&key) {
            return Ok(f);
        }
        let edges = vec![
            self.get_or_add_edge(v[0], v[1])?,
            self.get_or_add_edge(v[1], v[2])?,
            self.get_or_add_edge(v[2], v[3])?,
            self.get_or_add_edge(v[3], v[0])?,
        ];
        let f = self.alloc()?;
        self.insert(f, CellType::Quadrilateral, edges);
        self.face_lookup.insert(key, f);
        Ok(f)
    }

    /// Adds a prism with bottom triangle `v[0..3]` and top triangle `v[3..6]`
    /// (`v[i+3]` above `v[i]`).
    pub fn add_prism(&mut self, v: [PointId; 6]) -> Result<PointId, MeshLayerError> {
        let bottom = self.get_or_add_triangle([v[0], v[1], v[2]])?;
        let top = self.get_or_add_triangle([v[3], v[4], v[5]])?;
        let mut cone = vec![bottom];
        for i in 0..3 {
            let j = (i + 1) % 3;
            cone.push(self.get_or_add_quad([v[i], v[j], v[j + 3], v[i + 3]])?);
        }
        cone.push(top);
        let r = self.alloc()?;
        self.insert(r, CellType::Prism, cone);
        Ok(r)
    }

    /// Adds a pyramid with base quad `v[0..4]` and apex `v[4]`.
    pub fn add_pyramid(&mut self, v: [PointId; 5]) -> Result<PointId, MeshLayerError> {
        let base = self.get_or_add_quad([v[0], v[1], v[2], v[3]])?;
        let mut cone = vec![base];
        for i in 0..4 {
            let j = (i + 1) % 4;
            cone.push(self.get_or_add_triangle([v[i], v[j], v[4]])?);
        }
        let r = self.alloc()?;
        self.insert(r, CellType::Pyramid, cone);
        Ok(r)
    }

    /// Adds a tetrahedron on the four vertices `v`.
    pub fn add_tet(&mut self, v: [PointId; 4]) -> Result<PointId, MeshLayerError> {
        let cone = vec![
            self.get_or_add_triangle([v[0], v[1], v[2]])?,
            self.get_or_add_triangle([v[0], v[1], v[3]])?,
            self.get_or_add_triangle([v[1], v[2], v[3]])?,
            self.get_or_add_triangle([v[2], v[0], v[3]])?,
        ];
        let r = self.alloc()?;
        self.insert(r, CellType::Tetrahedron, cone);
        Ok(r)
    }

    /// Removes `p` from the topology, unlinking it from its cone children and
    /// from any remaining parents.
    pub fn remove(&mut self, p: PointId) -> Result<(), MeshLayerError> {
        let cell_type = self
            .types
            .remove(&p)
            .ok_or(MeshLayerError::PointNotInMesh(p))?;
        let cone = self.cones.remove(&p).unwrap_or_default();
        for child in &cone {
            if let Some(sup) = self.supports.get_mut(child) {
                sup.retain(|&q| q != p);
            }
        }
        if let Some(parents) = self.supports.remove(&p) {
            for parent in parents {
                if let Some(pc) = self.cones.get_mut(&parent) {
                    pc.retain(|&q| q != p);
                }
            }
        }
        self.strata[cell_type.dimension() as usize].retain(|&q| q != p);
        match cell_type {
            CellType::Segment => {
                let key = if cone[0] < cone[1] {
                    (cone[0], cone[1])
                } else {
                    (cone[1], cone[0])
                };
                self.edge_lookup.remove(&key);
            }
            CellType::Triangle | CellType::Quadrilateral => {
                let mut key = Vec::with_capacity(cone.len());
                for &e in &cone {
                    if let Some(ec) = self.cones.get(&e) {
                        key.extend_from_slice(ec);
                    }
                }
                key.sort_unstable();
                key.dedup();
                self.face_lookup.remove(&key);
            }
            _ => {}
        }
        Ok(())
    }

    /// Entities of dimension `dim` in insertion order.
    pub fn points(&self, dim: u8) -> impl Iterator<Item = PointId> + '_ {
        self.strata[dim as usize].iter().copied()
    }

    /// Downward adjacency of `p` (creation order; edge cycle for faces).
    pub fn cone(&self, p: PointId) -> &[PointId] {
        self.cones.get(&p).map_or(&[], Vec::as_slice)
    }

    /// Upward adjacency of `p`.
    pub fn support(&self, p: PointId) -> &[PointId] {
        self.supports.get(&p).map_or(&[], Vec::as_slice)
    }

    /// Cell type of `p`, if present.
    pub fn cell_type(&self, p: PointId) -> Option<CellType> {
        self.types.get(&p).copied()
    }

    /// Cell type of `p`, or an error for unknown points.
    pub fn try_cell_type(&self, p: PointId) -> Result<CellType, MeshLayerError> {
        self.cell_type(p).ok_or(MeshLayerError::PointNotInMesh(p))
    }

    /// Number of entities with the given cell type.
    pub fn count_of_type(&self, cell_type: CellType) -> usize {
        self.types.values().filter(|&&t| t == cell_type).count()
    }

    /// True if any boundary-layer element (quad, prism, pyramid) is present.
    pub fn has_layer(&self) -> bool {
        self.types.values().any(|t| t.is_layer_cell())
    }

    /// The two endpoint vertices of an edge, in cone order.
    pub fn edge_vertices(&self, e: PointId) -> Result<[PointId; 2], MeshLayerError> {
        let t = self.try_cell_type(e)?;
        if t != CellType::Segment {
            return Err(MeshLayerError::UnexpectedCellType {
                point: e,
                expected: "segment",
                found: t,
            });
        }
        let cone = self.cone(e);
        Ok([cone[0], cone[1]])
    }

    /// Vertex cycle of a face, derived from its edge cycle: vertex `i` is
    /// shared by edges `i-1` and `i`.
    fn face_vertex_cycle(&self, f: PointId) -> Result<Vec<PointId>, MeshLayerError> {
        let edges = self.cone(f).to_vec();
        let n = edges.len();
        let mut cycle = Vec::with_capacity(n);
        for i in 0..n {
            let [a, b] = self.edge_vertices(edges[i])?;
            let [pa, pb] = self.edge_vertices(edges[(i + n - 1) % n])?;
            let v = if a == pa || a == pb {
                a
            } else if b == pa || b == pb {
                b
            } else {
                return Err(MeshLayerError::BrokenFaceCycle(f));
            };
            cycle.push(v);
        }
        for i in 0..n {
            let [a, b] = self.edge_vertices(edges[i])?;
            let (u, w) = (cycle[i], cycle[(i + 1) % n]);
            if !((a == u && b == w) || (a == w && b == u)) {
                return Err(MeshLayerError::BrokenFaceCycle(f));
            }
        }
        Ok(cycle)
    }

    /// Vertex cycle of a triangle.
    pub fn triangle_vertices(&self, f: PointId) -> Result<[PointId; 3], MeshLayerError> {
        let t = self.try_cell_type(f)?;
        if t != CellType::Triangle {
            return Err(MeshLayerError::UnexpectedCellType {
                point: f,
                expected: "triangle",
                found: t,
            });
        }
        let cycle = self.face_vertex_cycle(f)?;
        Ok([cycle[0], cycle[1], cycle[2]])
    }

    /// Vertex cycle of a quad.
    pub fn quad_vertices(&self, f: PointId) -> Result<[PointId; 4], MeshLayerError> {
        let t = self.try_cell_type(f)?;
        if t != CellType::Quadrilateral {
            return Err(MeshLayerError::UnexpectedCellType {
                point: f,
                expected: "quadrilateral",
                found: t,
            });
        }
        let cycle = self.face_vertex_cycle(f)?;
        Ok([cycle[0], cycle[1], cycle[2], cycle[3]])
    }

    /// Bounding edges of a quad in cyclic order, with the direction bit of
    /// each: bit `i` is 0 when edge `i`'s cone starts at face vertex `i`.
    pub fn quad_edges_and_directions(
        &self,
        q: PointId,
    ) -> Result<([PointId; 4], [u8; 4]), MeshLayerError> {
        let cycle = self.quad_vertices(q)?;
        let cone = self.cone(q);
        let edges = [cone[0], cone[1], cone[2], cone[3]];
        let mut dirs = [0u8; 4];
        for i in 0..4 {
            let [a, _] = self.edge_vertices(edges[i])?;
            dirs[i] = (a != cycle[i]) as u8;
        }
        Ok((edges, dirs))
    }

    /// The edge opposite `e` on quad `q`.
    pub fn quad_opposite_edge(
        &self,
        q: PointId,
        e: PointId,
    ) -> Result<PointId, MeshLayerError> {
        let cone = self.cone(q);
        let i = cone
            .iter()
            .position(|&x| x == e)
            .ok_or(MeshLayerError::EdgeNotOnFace { edge: e, face: q })?;
        Ok(cone[(i + 2) % 4])
    }

    /// The six vertices of a prism: bottom triangle then top triangle, with
    /// `v[i+3]` above `v[i]`. Derived from the region's faces, not from
    /// construction order.
    pub fn prism_vertices(&self, r: PointId) -> Result<[PointId; 6], MeshLayerError> {
        let t = self.try_cell_type(r)?;
        if t != CellType::Prism {
            return Err(MeshLayerError::UnexpectedCellType {
                point: r,
                expected: "prism",
                found: t,
            });
        }
        let mut tris = Vec::new();
        let mut quads = Vec::new();
        for &f in self.cone(r) {
            match self.try_cell_type(f)? {
                CellType::Triangle => tris.push(f),
                CellType::Quadrilateral => quads.push(f),
                found => {
                    return Err(MeshLayerError::UnexpectedCellType {
                        point: f,
                        expected: "triangle or quadrilateral",
                        found,
                    });
                }
            }
        }
        if tris.len() != 2 || quads.len() != 3 {
            return Err(MeshLayerError::UnexpectedCellType {
                point: r,
                expected: "prism (2 triangles, 3 quads)",
                found: t,
            });
        }
        let bottom = self.triangle_vertices(tris[0])?;
        let top = self.triangle_vertices(tris[1])?;
        let mut verts = [bottom[0], bottom[1], bottom[2], bottom[0], bottom[1], bottom[2]];
        for i in 0..3 {
            verts[i + 3] = self.vertical_partner(bottom[i], &quads, &top)?;
        }
        Ok(verts)
    }

    /// Finds the top-triangle vertex joined to `base` by a vertical quad edge.
    fn vertical_partner(
        &self,
        base: PointId,
        quads: &[PointId],
        top: &[PointId],
    ) -> Result<PointId, MeshLayerError> {
        for &q in quads {
            for &e in self.cone(q) {
                let [a, b] = self.edge_vertices(e)?;
                if a == base && top.contains(&b) {
                    return Ok(b);
                }
                if b == base && top.contains(&a) {
                    return Ok(a);
                }
            }
        }
        Err(MeshLayerError::PointNotInMesh(base))
    }

    /// The five vertices of a pyramid: base quad cycle then apex.
    pub fn pyramid_vertices(&self, r: PointId) -> Result<[PointId; 5], MeshLayerError> {
        let t = self.try_cell_type(r)?;
        if t != CellType::Pyramid {
            return Err(MeshLayerError::UnexpectedCellType {
                point: r,
                expected: "pyramid",
                found: t,
            });
        }
        let mut base = None;
        let mut tri = None;
        for &f in self.cone(r) {
            match self.try_cell_type(f)? {
                CellType::Quadrilateral => base = Some(f),
                CellType::Triangle => tri = tri.or(Some(f)),
                found => {
                    return Err(MeshLayerError::UnexpectedCellType {
                        point: f,
                        expected: "triangle or quadrilateral",
                        found,
                    });
                }
            }
        }
        let (base, tri) = match (base, tri) {
            (Some(b), Some(f)) => (b, f),
            _ => {
                return Err(MeshLayerError::UnexpectedCellType {
                    point: r,
                    expected: "pyramid (1 quad, 4 triangles)",
                    found: t,
                });
            }
        };
        let bv = self.quad_vertices(base)?;
        let apex = self
            .triangle_vertices(tri)?
            .into_iter()
            .find(|v| !bv.contains(v))
            .ok_or(MeshLayerError::BrokenFaceCycle(tri))?;
        Ok([bv[0], bv[1], bv[2], bv[3], apex])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_mesh() -> (MeshTopology, [PointId; 4], PointId) {
        let mut m = MeshTopology::new();
        let v: Vec<_> = (0..4).map(|_| m.add_vertex().unwrap()).collect();
        let v = [v[0], v[1], v[2], v[3]];
        let q = m.get_or_add_quad(v).unwrap();
        (m, v, q)
    }

    #[test]
    fn quad_cycle_round_trips() {
        let (m, v, q) = quad_mesh();
        assert_eq!(m.quad_vertices(q).unwrap(), v);
        let (edges, dirs) = m.quad_edges_and_directions(q).unwrap();
        // All edges were created by this quad, so every direction bit is 0.
        assert_eq!(dirs, [0, 0, 0, 0]);
        assert_eq!(m.quad_opposite_edge(q, edges[0]).unwrap(), edges[2]);
        assert_eq!(m.quad_opposite_edge(q, edges[1]).unwrap(), edges[3]);
    }

    #[test]
    fn reused_edge_flips_direction_bit() {
        let mut m = MeshTopology::new();
        let v: Vec<_> = (0..6).map(|_| m.add_vertex().unwrap()).collect();
        // Edge created as (v1, v0) before the quad wants (v0, v1).
        m.get_or_add_edge(v[1], v[0]).unwrap();
        let q = m.get_or_add_quad([v[0], v[1], v[2], v[3]]).unwrap();
        let (_, dirs) = m.quad_edges_and_directions(q).unwrap();
        assert_eq!(dirs[0], 1);
        assert_eq!(&dirs[1..], &[0, 0, 0]);
    }

    #[test]
    fn prism_shares_faces_with_stacked_prism() {
        let mut m = MeshTopology::new();
        let v: Vec<_> = (0..9).map(|_| m.add_vertex().unwrap()).collect();
        let p0 = m
            .add_prism([v[0], v[1], v[2], v[3], v[4], v[5]])
            .unwrap();
        let _p1 = m
            .add_prism([v[3], v[4], v[5], v[6], v[7], v[8]])
            .unwrap();
        // The middle triangle is shared, so only 4 triangles and 6 quads exist.
        assert_eq!(m.count_of_type(CellType::Triangle), 4);
        assert_eq!(m.count_of_type(CellType::Quadrilateral), 6);
        let pv = m.prism_vertices(p0).unwrap();
        assert_eq!(&pv[..3], &[v[0], v[1], v[2]]);
        assert_eq!(&pv[3..], &[v[3], v[4], v[5]]);
    }

    #[test]
    fn pyramid_vertices_recovers_apex() {
        let mut m = MeshTopology::new();
        let v: Vec<_> = (0..5).map(|_| m.add_vertex().unwrap()).collect();
        let r = m.add_pyramid([v[0], v[1], v[2], v[3], v[4]]).unwrap();
        let pv = m.pyramid_vertices(r).unwrap();
        assert_eq!(pv[4], v[4]);
        assert_eq!(&pv[..4], &[v[0], v[1], v[2], v[3]]);
    }

    #[test]
    fn remove_unlinks_supports_and_lookups() {
        let (mut m, v, q) = quad_mesh();
        let e = m.get_or_add_edge(v[0], v[1]).unwrap();
        assert_eq!(m.support(e), &[q]);
        m.remove(q).unwrap();
        assert!(m.support(e).is_empty());
        assert_eq!(m.count_of_type(CellType::Quadrilateral), 0);
        // The vertex-set lookup slot is free again.
        let q2 = m.get_or_add_quad(v).unwrap();
        assert_ne!(q2, q);
    }
}
