mod util;
use util::*;

use std::collections::{HashMap, HashSet};

use atlas_halo::prelude::*;
use atlas_halo::topology::mesh::{CELLS_HUMAN_READABLE_KEY, nb_cells_including_halo_key};
use atlas_halo::topology::uid::{UniqueLonLat, element_uid};
use serial_test::serial;

fn regional_pair() -> StructuredGridConfig {
    StructuredGridConfig::regional(4, 3, [0.0, 40.0], [0.0, 30.0])
        .with_partitioner(Partitioner::Checkerboard { nx: 2, ny: 1 })
}

fn regional_quad() -> StructuredGridConfig {
    StructuredGridConfig::regional(6, 6, [0.0, 60.0], [0.0, 60.0])
        .with_partitioner(Partitioner::Checkerboard { nx: 2, ny: 2 })
}

fn global_bands(nlon: usize, nlat: usize) -> StructuredGridConfig {
    StructuredGridConfig {
        nlon,
        nlat,
        ..StructuredGridConfig::default()
    }
}

fn with_cells(grid: StructuredGridConfig, cell_type: StructuredCellType) -> StructuredGridConfig {
    StructuredGridConfig { cell_type, ..grid }
}

/// Cell corners in lonlat, shifted by whole turns so the centroid lies in [0, 360).
fn corners_on_the_sphere(mesh: &Mesh, e: usize) -> Vec<[f64; 2]> {
    let lonlat = mesh.nodes().lonlat();
    let pts: Vec<[f64; 2]> = mesh.cells().node_row(e).iter().map(|&n| lonlat[n]).collect();
    let lon = pts.iter().map(|p| p[0]).sum::<f64>() / pts.len() as f64;
    let shift = 360.0 * (lon / 360.0).floor();
    pts.iter().map(|p| [p[0] - shift, p[1]]).collect()
}

fn signed_area(pts: &[[f64; 2]]) -> f64 {
    let n = pts.len();
    (0..n)
        .map(|k| {
            let (a, b) = (pts[k], pts[(k + 1) % n]);
            a[0] * b[1] - b[0] * a[1]
        })
        .sum::<f64>()
        / 2.0
}

#[test]
#[serial]
fn two_rank_split_gains_one_column_each() {
    let grid = regional_pair();
    let before: Vec<_> = (0..2).map(|p| generate(&grid, p, 2).unwrap()).collect();
    let meshes = build_all(&grid, 2, 1, &HaloConfig::default());

    for (rank, (mesh, orig)) in meshes.iter().zip(&before).enumerate() {
        assert_eq!(mesh.cells().len(), orig.cells().len() + 3, "rank {rank}");
        assert_eq!(mesh.nodes().len(), orig.nodes().len() + 4, "rank {rank}");
        assert_eq!(mesh.halo().unwrap(), 1);
        for e in orig.cells().len()..mesh.cells().len() {
            assert_eq!(mesh.cells().halo(e), 1);
            assert_eq!(mesh.cells().partition(e) as usize, 1 - rank);
        }
    }

    // the owner's global index travels with the node
    let owner_index: Vec<_> = meshes.iter().map(node_index_by_uid).collect();
    for (rank, mesh) in meshes.iter().enumerate() {
        for (uid, g) in node_index_by_uid(mesh) {
            if let Some(&other) = owner_index[1 - rank].get(&uid) {
                assert_eq!(g, other);
            }
        }
    }
}

#[test]
#[serial]
fn triangle_bands_gain_a_row_and_both_seams() {
    let grid = with_cells(global_bands(8, 4), StructuredCellType::Triangle);
    let before: Vec<_> = (0..2).map(|p| generate(&grid, p, 2).unwrap()).collect();
    let meshes = build_all(&grid, 2, 1, &HaloConfig::default());

    for (rank, (mesh, orig)) in meshes.iter().zip(&before).enumerate() {
        assert_eq!(orig.cells().len(), 32);
        // 16 across the band edge, 5 and 6 across the seams
        assert_eq!(mesh.cells().len(), orig.cells().len() + 27, "rank {rank}");
        assert_eq!(mesh.nodes().len(), orig.nodes().len() + 16, "rank {rank}");
        let cells = mesh.cells();
        assert_eq!(cells.nb_types(), 1);
        for e in orig.cells().len()..cells.len() {
            assert_eq!(cells.element_type(e), ElementType::Triangle);
            assert_eq!(cells.halo(e), 1);
            let area = signed_area(&corners_on_the_sphere(mesh, e));
            assert!((area - 1012.5).abs() < 1e-6, "rank {rank} cell {e}: {area}");
        }
    }
}

#[test]
#[serial]
fn hybrid_halo_cells_land_in_the_block_of_their_shape() {
    let grid = with_cells(global_bands(8, 4), StructuredCellType::Hybrid);
    let meshes = build_all(&grid, 2, 2, &HaloConfig::default());

    let mut owned: HashMap<i64, ElementType> = HashMap::new();
    for mesh in &meshes {
        let cells = mesh.cells();
        for e in (0..cells.len()).filter(|&e| cells.halo(e) == 0) {
            owned.insert(element_uid(&corners_on_the_sphere(mesh, e)), cells.element_type(e));
        }
    }
    assert_eq!(owned.len(), 8 * 4 / 2 + 8 * 4);

    for (rank, mesh) in meshes.iter().enumerate() {
        let cells = mesh.cells();
        assert_eq!(cells.nb_types(), 2);
        let mut received = [0; 2];
        for (e, t, r) in cells.iter_indices() {
            let block = cells.block(t);
            assert_eq!(block.element_type(), cells.element_type(e));
            assert_eq!(block.node_connectivity().row(r).len(), block.element_type().nb_nodes());
            if cells.halo(e) == 0 {
                continue;
            }
            received[t] += 1;
            let pts = corners_on_the_sphere(mesh, e);
            assert_eq!(owned.get(&element_uid(&pts)), Some(&block.element_type()), "rank {rank} cell {e}");
            let expected = match block.element_type() {
                ElementType::Quadrilateral => 2025.0,
                _ => 1012.5,
            };
            assert!((signed_area(&pts) - expected).abs() < 1e-6, "rank {rank} cell {e}");
        }
        assert!(received.iter().all(|&k| k > 0), "rank {rank}: {received:?}");
    }
}

#[test]
#[serial]
fn ghosts_are_exactly_the_foreign_nodes_on_regional_grids() {
    let meshes = build_all(&regional_quad(), 4, 2, &HaloConfig::default());
    for (rank, mesh) in meshes.iter().enumerate() {
        let nodes = mesh.nodes();
        for k in 0..nodes.len() {
            let foreign = nodes.partition()[k] as usize != rank;
            assert_eq!(nodes.ghost()[k], foreign, "rank {rank} node {k}");
            assert_eq!(nodes.flags()[k].contains(NodeFlags::GHOST), foreign);
        }
        let cells = mesh.cells();
        for e in 0..cells.len() {
            assert_eq!(cells.halo(e) == 0, cells.partition(e) as usize == rank);
        }
    }
}

#[test]
#[serial]
fn corner_neighbours_are_included() {
    let meshes = build_all(&regional_quad(), 4, 1, &HaloConfig::default());
    for mesh in &meshes {
        // 3x3 owned block plus one ring on the two inner sides
        assert_eq!(mesh.cells().len(), 16);
        assert_eq!(mesh.nodes().len(), 25);
    }
}

#[test]
#[serial]
fn halo_grows_monotonically_and_rebuilding_is_a_noop() {
    let grid = global_bands(8, 6);
    let counts = run_ranks(3, |comm| {
        let mut mesh = generate(&grid, comm.rank(), 3).unwrap();
        let mut sizes = vec![(mesh.nodes().len(), mesh.cells().len())];
        for depth in [1, 2, 2] {
            build_halo(&mut mesh, depth, comm).unwrap();
            sizes.push((mesh.nodes().len(), mesh.cells().len()));
        }
        let md = mesh.metadata();
        let per_level: Vec<i64> = (0..=2)
            .map(|k| md.get_int(&nb_cells_including_halo_key(k)).unwrap().unwrap())
            .collect();
        (sizes, per_level)
    });
    for (sizes, per_level) in counts {
        assert!(sizes[0].0 < sizes[1].0 && sizes[1].0 < sizes[2].0);
        assert!(sizes[0].1 < sizes[1].1 && sizes[1].1 < sizes[2].1);
        assert_eq!(sizes[2], sizes[3]);
        assert!(per_level.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(per_level[2] as usize, sizes[3].1);
    }
}

#[test]
#[serial]
fn stepwise_and_direct_builds_agree() {
    let grid = global_bands(8, 6);
    let direct = build_all(&grid, 3, 2, &HaloConfig::default());
    let stepwise = run_ranks(3, |comm| {
        let mut mesh = generate(&grid, comm.rank(), 3).unwrap();
        build_halo(&mut mesh, 1, comm).unwrap();
        build_halo(&mut mesh, 2, comm).unwrap();
        mesh
    });
    for (a, b) in direct.iter().zip(&stepwise) {
        assert_eq!(a.nodes().len(), b.nodes().len());
        assert_eq!(a.cells().len(), b.cells().len());
        let ua: HashSet<_> = node_index_by_uid(a).into_keys().collect();
        let ub: HashSet<_> = node_index_by_uid(b).into_keys().collect();
        assert_eq!(ua, ub);
    }
}

#[test]
#[serial]
fn no_duplicate_uids_after_two_levels() {
    let meshes = build_all(&global_bands(12, 6), 3, 2, &HaloConfig::default());
    for mesh in &meshes {
        let uid = UniqueLonLat::new(mesh.nodes());
        let nodes: HashSet<_> = (0..mesh.nodes().len()).map(|n| uid.node(n)).collect();
        assert_eq!(nodes.len(), mesh.nodes().len());
        let cells = mesh.cells();
        let elems: HashSet<_> = (0..cells.len()).map(|e| uid.element(cells.node_row(e))).collect();
        assert_eq!(elems.len(), cells.len());
    }
}

#[test]
#[serial]
fn shared_periodic_ghosts_get_the_same_final_index() {
    let meshes = build_all(&global_bands(8, 4), 2, 1, &HaloConfig::default());
    for mesh in &meshes {
        assert!(mesh.nodes().global_index().iter().all(|&g| g > 0));
        assert!((0..mesh.cells().len()).all(|e| mesh.cells().global_index(e) > 0));
        assert_eq!(
            mesh.metadata().get_bool(CELLS_HUMAN_READABLE_KEY).unwrap(),
            Some(true)
        );
    }

    // (-45°, 0°) is a periodic ghost on both bands
    let seam = atlas_halo::topology::uid::unique_lonlat([-45.0, 0.0]);
    let nodes: Vec<_> = meshes.iter().map(node_index_by_uid).collect();
    assert!(nodes[0].contains_key(&seam) && nodes[1].contains_key(&seam));
    for (uid, g) in &nodes[0] {
        if let Some(other) = nodes[1].get(uid) {
            assert_eq!(g, other, "node uid {uid}");
        }
    }
    let cells: Vec<_> = meshes.iter().map(cell_index_by_uid).collect();
    let mut shared = 0;
    for (uid, g) in &cells[0] {
        if let Some(other) = cells[1].get(uid) {
            assert_eq!(g, other, "cell uid {uid}");
            shared += 1;
        }
    }
    assert!(shared > 0);
}

#[test]
#[serial]
fn checkerboard_seam_crosses_ranks() {
    let grid = global_bands(8, 4).with_partitioner(Partitioner::Checkerboard { nx: 2, ny: 1 });
    let before: Vec<_> = (0..2).map(|p| generate(&grid, p, 2).unwrap()).collect();
    let result = run_ranks(2, |comm| {
        let mut mesh = generate(&grid, comm.rank(), 2).unwrap();
        let mut builder = BuildHalo::new(HaloConfig::default()).unwrap();
        builder.build(&mut mesh, 1, comm).unwrap();
        let periodic_cells = builder.periodic_cells_local_index(&mesh);
        (mesh, periodic_cells)
    });

    for (rank, ((mesh, periodic_cells), orig)) in result.iter().zip(&before).enumerate() {
        // one interior column and one periodic column
        assert_eq!(mesh.nodes().len(), orig.nodes().len() + 10, "rank {rank}");
        assert_eq!(mesh.cells().len(), orig.cells().len() + 8, "rank {rank}");
        assert_eq!(periodic_cells.len(), 4);
        for &e in periodic_cells {
            assert_eq!(mesh.cells().partition(e) as usize, 1 - rank);
        }
    }

    let west = &result[0].0;
    let lons: Vec<f64> = west.nodes().lonlat().iter().map(|p| p[0]).collect();
    assert!(lons.iter().any(|&l| (l + 45.0).abs() < 1e-9));
    let east = &result[1].0;
    let lons: Vec<f64> = east.nodes().lonlat().iter().map(|p| p[0]).collect();
    assert!(lons.iter().any(|&l| (l - 405.0).abs() < 1e-9));
}

#[test]
#[serial]
fn exchange_strategies_agree() {
    for (grid, nb_parts) in [(global_bands(8, 6), 3), (regional_quad(), 4)] {
        let neighbours = build_all(&grid, nb_parts, 2, &HaloConfig::default());
        let global = build_all(
            &grid,
            nb_parts,
            2,
            &HaloConfig::default().with_exchange(ExchangeStrategy::Global),
        );
        for (a, b) in neighbours.iter().zip(&global) {
            assert_eq!(node_columns(a), node_columns(b));
            assert_eq!(cell_columns(a), cell_columns(b));
        }
    }
}

#[test]
#[serial]
fn boundary_strategies_agree() {
    for (grid, nb_parts) in [(global_bands(8, 6), 3), (regional_quad(), 4)] {
        let facets = build_all(&grid, nb_parts, 2, &HaloConfig::default());
        let polygon = build_all(
            &grid,
            nb_parts,
            2,
            &HaloConfig::default().with_boundary(BoundaryStrategy::Polygon),
        );
        for (a, b) in facets.iter().zip(&polygon) {
            assert_eq!(node_columns(a), node_columns(b));
            assert_eq!(cell_columns(a), cell_columns(b));
        }
    }
}

#[test]
fn mercator_seam_matches_lonlat_seam() {
    let grid = StructuredGridConfig {
        nlon: 8,
        nlat: 4,
        lat_min: -60.0,
        lat_max: 60.0,
        projection: Projection::mercator(0.0),
        ..StructuredGridConfig::default()
    };
    let mut mesh = generate(&grid, 0, 1).unwrap();
    let (n0, c0) = (mesh.nodes().len(), mesh.cells().len());
    build_halo(&mut mesh, 1, &NoComm).unwrap();
    assert_eq!(mesh.nodes().len(), n0 + 10);
    assert_eq!(mesh.cells().len(), c0 + 8);
    let nodes = mesh.nodes();
    for k in n0..nodes.len() {
        let lon = nodes.lonlat()[k][0];
        assert!((lon + 45.0).abs() < 1e-6 || (lon - 405.0).abs() < 1e-6, "lon {lon}");
        let back = mesh.projection().xy(nodes.lonlat()[k]);
        assert!((back[0] - nodes.xy()[k][0]).abs() < 1e-3);
    }
}

#[test]
fn non_periodic_configuration_skips_the_seam() {
    let mut mesh = generate(&global_bands(8, 4), 0, 1).unwrap();
    let (n0, c0) = (mesh.nodes().len(), mesh.cells().len());
    let mut builder = BuildHalo::new(HaloConfig::default().with_periodic(false)).unwrap();
    builder.build(&mut mesh, 1, &NoComm).unwrap();
    assert_eq!((mesh.nodes().len(), mesh.cells().len()), (n0, c0));
    assert_eq!(mesh.halo().unwrap(), 1);
    assert!(builder.periodic_points_local_index().is_empty());
}
