//! Two-rank scenarios over the in-process communicator: chains that cross
//! the partition boundary, diagonal agreement on shared entities, and the
//! detection/repair pass under a cross-rank fault.

use mesh_layer::adapt::diagonal::{diagonal_from_flags, prepare_layer_to_tets};
use mesh_layer::adapt::{cleanup_layer, tetrahedronize, Adapt, AdaptInput};
use mesh_layer::algs::communicator::{NoComm, RayonComm};
use mesh_layer::prelude::*;
use serial_test::serial;

fn convert_input() -> AdaptInput {
    AdaptInput {
        turn_layer_to_tets: true,
        cleanup_layer: true,
    }
}

/// One half of a height-2 prism column, cut horizontally: rank 0 holds the
/// bottom prism and the labeled base edges, rank 1 the top prism. The middle
/// triangle, its edges, and its vertices are shared.
///
/// The cut edges are created first on both ranks, in the same vertex order:
/// copies of a shared edge must agree on their cone order for the raw
/// diagonal bit on the wire to mean the same thing (the aligned-copies
/// invariant a real mesh database maintains).
fn build_half_column(rank: usize) -> (MeshTopology, Overlap, LabelSet) {
    let mut mesh = MeshTopology::new();
    let lower: Vec<PointId> = (0..3).map(|_| mesh.add_vertex().unwrap()).collect();
    let upper: Vec<PointId> = (0..3).map(|_| mesh.add_vertex().unwrap()).collect();
    // The shared cut is rank 0's upper triangle and rank 1's lower one.
    let shared: Vec<PointId> = if rank == 0 { upper.clone() } else { lower.clone() };
    let mut cut_edges = Vec::new();
    for (i, j) in [(0usize, 1usize), (1, 2), (2, 0)] {
        cut_edges.push(mesh.get_or_add_edge(shared[i], shared[j]).unwrap());
    }
    mesh.add_prism([lower[0], lower[1], lower[2], upper[0], upper[1], upper[2]])
        .unwrap();

    let mut overlap = Overlap::new();
    let peer = 1 - rank;
    // Both ranks allocate ids in the same creation order: cut vertices are
    // rank 1's ids 1..=3 and rank 0's ids 4..=6, and the cut edges are ids
    // 7..=9 on both ranks.
    let peer_vertex_ids: [u64; 3] = if rank == 0 { [1, 2, 3] } else { [4, 5, 6] };
    for (k, &v) in shared.iter().enumerate() {
        overlap.add_link(v, peer, PointId::new(peer_vertex_ids[k]).unwrap());
    }
    for (k, &e) in cut_edges.iter().enumerate() {
        overlap.add_link(e, peer, PointId::new(7 + k as u64).unwrap());
    }

    let mut labels = LabelSet::new();
    if rank == 0 {
        for (i, j) in [(0usize, 1usize), (1, 2), (2, 0)] {
            let e = mesh.get_or_add_edge(lower[i], lower[j]).unwrap();
            labels.set_label(e, LAYER_BASE_LABEL, 1);
        }
    }
    (mesh, overlap, labels)
}

/// Every quad's chosen diagonal as a sorted pair of global vertex numbers.
fn diagonal_pairs<C: Communicator>(a: &Adapt<'_, C>) -> Vec<(u64, u64)> {
    let numbering = number_vertices(&a.mesh, &a.overlap, a.comm).unwrap();
    let mut pairs = Vec::new();
    for q in a.mesh.points(2) {
        if a.mesh.cell_type(q) != Some(CellType::Quadrilateral) {
            continue;
        }
        let qv = a.mesh.quad_vertices(q).unwrap();
        let d = diagonal_from_flags(&a.flags, q).expect("quad left without a diagonal");
        let (x, y) = match d {
            0 => (qv[0], qv[2]),
            _ => (qv[1], qv[3]),
        };
        let (gx, gy) = (
            numbering.number(x).unwrap(),
            numbering.number(y).unwrap(),
        );
        pairs.push((gx.min(gy), gx.max(gy)));
    }
    pairs
}

#[test]
#[serial]
fn cross_rank_propagation_matches_serial_run() {
    let world = 920;
    let handles: Vec<_> = (0..2usize)
        .map(|rank| {
            std::thread::spawn(move || {
                let comm = RayonComm::with_world(world, rank, 2);
                let (mesh, overlap, labels) = build_half_column(rank);
                let mut a = Adapt::new(mesh, overlap, labels, convert_input(), &comm);
                prepare_layer_to_tets(&mut a).unwrap();
                diagonal_pairs(&a)
            })
        })
        .collect();
    let mut parallel: Vec<(u64, u64)> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    parallel.sort_unstable();

    // Serial reference: the same column in one partition. Vertex creation
    // order makes the serial global numbers coincide with the parallel ones.
    let mut mesh = MeshTopology::new();
    let levels: Vec<Vec<PointId>> = (0..3)
        .map(|_| (0..3).map(|_| mesh.add_vertex().unwrap()).collect())
        .collect();
    for i in 0..2 {
        mesh.add_prism([
            levels[i][0],
            levels[i][1],
            levels[i][2],
            levels[i + 1][0],
            levels[i + 1][1],
            levels[i + 1][2],
        ])
        .unwrap();
    }
    let mut labels = LabelSet::new();
    for (i, j) in [(0usize, 1usize), (1, 2), (2, 0)] {
        let e = mesh.get_or_add_edge(levels[0][i], levels[0][j]).unwrap();
        labels.set_label(e, LAYER_BASE_LABEL, 1);
    }
    let comm = NoComm;
    let mut serial = Adapt::new(mesh, Overlap::new(), labels, convert_input(), &comm);
    prepare_layer_to_tets(&mut serial).unwrap();
    let mut reference = diagonal_pairs(&serial);
    reference.sort_unstable();

    assert_eq!(parallel.len(), 6);
    assert_eq!(parallel, reference);
}

#[test]
#[serial]
fn cross_rank_conversion_completes_on_both_ranks() {
    let world = 921;
    let handles: Vec<_> = (0..2usize)
        .map(|rank| {
            std::thread::spawn(move || {
                let comm = RayonComm::with_world(world, rank, 2);
                let (mesh, overlap, labels) = build_half_column(rank);
                let mut a = Adapt::new(mesh, overlap, labels, convert_input(), &comm);
                tetrahedronize(&mut a).unwrap();
                let repaired = cleanup_layer(&mut a).unwrap();
                (
                    a.mesh.count_of_type(CellType::Tetrahedron),
                    a.mesh.count_of_type(CellType::Prism),
                    a.mesh.count_of_type(CellType::Quadrilateral),
                    repaired,
                )
            })
        })
        .collect();
    for h in handles {
        let (tets, prisms, quads, repaired) = h.join().unwrap();
        assert_eq!(tets, 3);
        assert_eq!(prisms, 0);
        assert_eq!(quads, 0);
        assert_eq!(repaired, 0);
    }
}

#[test]
#[serial]
fn shared_bad_quad_is_repaired_identically_on_both_ranks() {
    // Two pyramids base-to-base across the partition boundary. No base edge
    // is labeled (the simulated fault: no chain ever reaches the quad), so
    // detection must flag the shared quad bad on both ranks and the forced
    // split must mirror, centroid links included.
    let world = 922;
    let handles: Vec<_> = (0..2usize)
        .map(|rank| {
            std::thread::spawn(move || {
                let peer = 1 - rank;
                let mut mesh = MeshTopology::new();
                let v: Vec<PointId> = (0..5).map(|_| mesh.add_vertex().unwrap()).collect();
                mesh.add_pyramid([v[0], v[1], v[2], v[3], v[4]]).unwrap();
                let mut overlap = Overlap::new();
                // Identical construction on both ranks: ids mirror 1:1.
                for &p in &v[..4] {
                    overlap.add_link(p, peer, p);
                }
                let quad = mesh
                    .points(2)
                    .find(|&f| mesh.cell_type(f) == Some(CellType::Quadrilateral))
                    .unwrap();
                for e in mesh.cone(quad).to_vec() {
                    overlap.add_link(e, peer, e);
                }
                overlap.add_link(quad, peer, quad);

                let comm = RayonComm::with_world(world, rank, 2);
                let mut a = Adapt::new(
                    mesh,
                    overlap,
                    LabelSet::new(),
                    AdaptInput {
                        turn_layer_to_tets: false,
                        cleanup_layer: true,
                    },
                    &comm,
                );
                let repaired = cleanup_layer(&mut a).unwrap();
                let shared_vertices = a
                    .mesh
                    .points(0)
                    .filter(|&p| a.overlap.is_shared(p))
                    .count();
                let second_pass = cleanup_layer(&mut a).unwrap();
                (
                    repaired,
                    a.mesh.count_of_type(CellType::Tetrahedron),
                    a.mesh.count_of_type(CellType::Pyramid),
                    a.mesh.count_of_type(CellType::Quadrilateral),
                    shared_vertices,
                    second_pass,
                )
            })
        })
        .collect();
    for h in handles {
        let (repaired, tets, pyramids, quads, shared_vertices, second_pass) =
            h.join().unwrap();
        // One bad pyramid per rank, summed globally.
        assert_eq!(repaired, 2);
        assert_eq!(tets, 4);
        assert_eq!(pyramids, 0);
        assert_eq!(quads, 0);
        // The four original base vertices plus the mirrored centroid.
        assert_eq!(shared_vertices, 5);
        assert_eq!(second_pass, 0);
    }
}
