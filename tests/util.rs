#![allow(dead_code)]
use std::collections::HashMap;
use std::time::Duration;

use atlas_halo::algs::communicator::LocalComm;
use atlas_halo::prelude::*;
use atlas_halo::topology::Gidx;
use atlas_halo::topology::uid::UniqueLonLat;

/// Run `f` once per rank on its own thread; results are indexed by rank.
pub fn run_ranks<T, F>(nb_parts: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&LocalComm) -> T + Sync,
{
    run_on(LocalComm::world(nb_parts), f)
}

/// [`run_ranks`] with a custom receive timeout.
pub fn run_ranks_with_timeout<T, F>(nb_parts: usize, timeout: Duration, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&LocalComm) -> T + Sync,
{
    run_on(LocalComm::world_with_timeout(nb_parts, timeout), f)
}

fn run_on<T, F>(comms: Vec<LocalComm>, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&LocalComm) -> T + Sync,
{
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = comms.iter().map(|c| s.spawn(move || f(c))).collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Generate every piece of `grid` and grow it to `depth` with `config`.
pub fn build_all(
    grid: &StructuredGridConfig,
    nb_parts: usize,
    depth: usize,
    config: &HaloConfig,
) -> Vec<Mesh> {
    run_ranks(nb_parts, |comm| {
        let mut mesh = generate(grid, comm.rank(), nb_parts).unwrap();
        BuildHalo::new(config.clone())
            .unwrap()
            .build(&mut mesh, depth, comm)
            .unwrap();
        mesh
    })
}

/// Node uid -> global index.
pub fn node_index_by_uid(mesh: &Mesh) -> HashMap<i64, Gidx> {
    let uid = UniqueLonLat::new(mesh.nodes());
    (0..mesh.nodes().len())
        .map(|n| (uid.node(n), mesh.nodes().global_index()[n]))
        .collect()
}

/// Element uid -> global index.
pub fn cell_index_by_uid(mesh: &Mesh) -> HashMap<i64, Gidx> {
    let uid = UniqueLonLat::new(mesh.nodes());
    let cells = mesh.cells();
    (0..cells.len())
        .map(|e| (uid.element(cells.node_row(e)), cells.global_index(e)))
        .collect()
}

/// Node lonlat, global index, partition and flag bits in local order.
pub fn node_columns(mesh: &Mesh) -> Vec<([f64; 2], Gidx, i32, u32)> {
    let n = mesh.nodes();
    (0..n.len())
        .map(|k| (n.lonlat()[k], n.global_index()[k], n.partition()[k], n.flags()[k].bits()))
        .collect()
}

/// Cell connectivity, global index, partition and halo in local order.
pub fn cell_columns(mesh: &Mesh) -> Vec<(Vec<usize>, Gidx, i32, i32)> {
    let c = mesh.cells();
    (0..c.len())
        .map(|e| (c.node_row(e).to_vec(), c.global_index(e), c.partition(e), c.halo(e)))
        .collect()
}
