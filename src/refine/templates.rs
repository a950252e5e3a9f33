//! Subdivision templates for layer elements.
//!
//! Pure vertex combinatorics: each template maps an element's vertex tuple
//! and its diagonal state to the vertex tuples of its replacement cells.
//! Diagonal bit 0 selects the face diagonal `{v0, v2}` of the face's own
//! vertex cycle; bit 1 selects `{v1, v3}`. The prism template consumes one
//! code per quad face expressed in the prism's frame: code 0 on face `i`
//! means the diagonal rises from bottom vertex `i` to top vertex `i+1`.

use crate::mesh_error::MeshLayerError;
use crate::topology::point::PointId;

/// Splits a quad cycle into two triangles along the chosen diagonal.
/// Returns the triangles and the diagonal's vertex pair.
pub fn quad_split(
    qv: [PointId; 4],
    diagonal: u64,
) -> Result<([[PointId; 3]; 2], [PointId; 2]), MeshLayerError> {
    match diagonal {
        0 => Ok((
            [[qv[0], qv[1], qv[2]], [qv[0], qv[2], qv[3]]],
            [qv[0], qv[2]],
        )),
        1 => Ok((
            [[qv[0], qv[1], qv[3]], [qv[1], qv[2], qv[3]]],
            [qv[1], qv[3]],
        )),
        d => Err(MeshLayerError::InvalidDiagonal(d)),
    }
}

/// Splits a quad cycle into four triangles around a centroid vertex.
/// Needs no diagonal choice, so all copies of a shared quad agree for free.
pub fn quad_centroid_split(qv: [PointId; 4], centroid: PointId) -> [[PointId; 3]; 4] {
    [
        [qv[0], qv[1], centroid],
        [qv[1], qv[2], centroid],
        [qv[2], qv[3], centroid],
        [qv[3], qv[0], centroid],
    ]
}

/// Splits a prism into three tetrahedra from its quad-face diagonal codes.
///
/// `pv` is bottom triangle then top triangle (`pv[i+3]` above `pv[i]`);
/// `codes[i]` is the diagonal code of the quad face over bottom edge
/// `(i, i+1)`. The all-equal configurations are cyclic and unsplittable;
/// globally consistent propagation never produces them.
pub fn prism_split(
    region: PointId,
    pv: [PointId; 6],
    codes: [u64; 3],
) -> Result<[[PointId; 4]; 3], MeshLayerError> {
    let i = (0..3)
        .find(|&i| codes[i] == 0 && codes[(i + 1) % 3] == 1)
        .ok_or(MeshLayerError::CyclicPrismDiagonals(region))?;
    let j = (i + 1) % 3;
    let k = (i + 2) % 3;
    // Both diagonals adjacent to the transition meet at top vertex j.
    let apex = pv[j + 3];
    let first = [pv[i], pv[j], pv[k], apex];
    let (second, third) = if codes[k] == 0 {
        (
            [pv[k], pv[i], pv[i + 3], apex],
            [pv[k], pv[i + 3], pv[k + 3], apex],
        )
    } else {
        (
            [pv[k], pv[i], pv[k + 3], apex],
            [pv[i], pv[i + 3], pv[k + 3], apex],
        )
    };
    Ok([first, second, third])
}

/// Splits a pyramid into two tetrahedra along its base diagonal.
pub fn pyramid_split(
    pv: [PointId; 5],
    diagonal: u64,
) -> Result<[[PointId; 4]; 2], MeshLayerError> {
    let apex = pv[4];
    match diagonal {
        0 => Ok([[pv[0], pv[1], pv[2], apex], [pv[0], pv[2], pv[3], apex]]),
        1 => Ok([[pv[0], pv[1], pv[3], apex], [pv[1], pv[2], pv[3], apex]]),
        d => Err(MeshLayerError::InvalidDiagonal(d)),
    }
}

/// Splits a pyramid into four tetrahedra over a base-centroid vertex.
pub fn pyramid_centroid_split(pv: [PointId; 5], centroid: PointId) -> [[PointId; 4]; 4] {
    let apex = pv[4];
    [
        [pv[0], pv[1], centroid, apex],
        [pv[1], pv[2], centroid, apex],
        [pv[2], pv[3], centroid, apex],
        [pv[3], pv[0], centroid, apex],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn pt(id: u64) -> PointId {
        PointId::new(id).unwrap()
    }

    fn pv6() -> [PointId; 6] {
        [pt(1), pt(2), pt(3), pt(4), pt(5), pt(6)]
    }

    /// Every interior face of a 3-tet prism split must be shared by exactly
    /// two tets, and every prism boundary face by exactly one.
    fn check_prism_conformity(tets: &[[PointId; 4]; 3]) {
        let mut face_counts: HashMap<Vec<PointId>, usize> = HashMap::new();
        for tet in tets {
            for skip in 0..4 {
                let mut face: Vec<PointId> = (0..4)
                    .filter(|&i| i != skip)
                    .map(|i| tet[i])
                    .collect();
                face.sort_unstable();
                *face_counts.entry(face).or_default() += 1;
            }
        }
        for (_, count) in &face_counts {
            assert!(*count <= 2);
        }
        let interior = face_counts.values().filter(|&&c| c == 2).count();
        let boundary = face_counts.values().filter(|&&c| c == 1).count();
        // 3 tets, 12 face slots: 2 interior faces (shared) + 8 boundary.
        assert_eq!(interior, 2);
        assert_eq!(boundary, 8);
    }

    #[test]
    fn prism_split_all_valid_codes() {
        for bits in 0u64..8 {
            let codes = [bits & 1, (bits >> 1) & 1, (bits >> 2) & 1];
            let result = prism_split(pt(100), pv6(), codes);
            if codes[0] == codes[1] && codes[1] == codes[2] {
                assert_eq!(
                    result,
                    Err(MeshLayerError::CyclicPrismDiagonals(pt(100)))
                );
            } else {
                check_prism_conformity(&result.unwrap());
            }
        }
    }

    #[test]
    fn prism_split_boundary_faces_match_quad_diagonals() {
        let codes = [0, 1, 0];
        let tets = prism_split(pt(100), pv6(), codes).unwrap();
        let mut faces: Vec<Vec<PointId>> = Vec::new();
        for tet in &tets {
            for skip in 0..4 {
                let mut face: Vec<PointId> = (0..4)
                    .filter(|&i| i != skip)
                    .map(|i| tet[i])
                    .collect();
                face.sort_unstable();
                faces.push(face);
            }
        }
        let pv = pv6();
        // Code 0 on face 0: diagonal (pv0, pv4) splits quad (pv0,pv1,pv4,pv3)
        // into triangles (pv0,pv1,pv4) and (pv0,pv4,pv3).
        for tri in [[pv[0], pv[1], pv[4]], [pv[0], pv[4], pv[3]]] {
            let mut key = tri.to_vec();
            key.sort_unstable();
            assert!(faces.contains(&key), "missing quad half {key:?}");
        }
    }

    #[test]
    fn quad_split_pairs() {
        let qv = [pt(1), pt(2), pt(3), pt(4)];
        let (tris, diag) = quad_split(qv, 0).unwrap();
        assert_eq!(diag, [pt(1), pt(3)]);
        assert_eq!(tris[0], [pt(1), pt(2), pt(3)]);
        let (_, diag) = quad_split(qv, 1).unwrap();
        assert_eq!(diag, [pt(2), pt(4)]);
        assert!(quad_split(qv, 2).is_err());
    }

    #[test]
    fn pyramid_splits() {
        let pv = [pt(1), pt(2), pt(3), pt(4), pt(9)];
        let tets = pyramid_split(pv, 0).unwrap();
        assert_eq!(tets.len(), 2);
        for tet in &tets {
            assert!(tet.contains(&pt(9)));
        }
        let c = pt(20);
        let forced = pyramid_centroid_split(pv, c);
        assert_eq!(forced.len(), 4);
        for tet in &forced {
            assert!(tet.contains(&c) && tet.contains(&pt(9)));
        }
    }
}
