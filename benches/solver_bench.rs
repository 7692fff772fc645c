//! Benchmarks for assembly + linear solve at a few grid sizes

use std::collections::HashSet;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use truss_topopt::prelude::*;

fn build_grid(cols: usize, rows: usize, k: f64) -> Structure {
    let mut ids = vec![vec![0u32; cols]; rows];
    let mut nodes = Vec::with_capacity(cols * rows);
    let mut next_id = 0u32;
    for row in 0..rows {
        for col in 0..cols {
            nodes.push(Node::new(next_id, col as f64, row as f64));
            ids[row][col] = next_id;
            next_id += 1;
        }
    }

    let bottom_left = ids[rows - 1][0];
    let bottom_right = ids[rows - 1][cols - 1];
    let top_center = ids[0][cols / 2];
    nodes[bottom_left as usize] = nodes[bottom_left as usize].fixed();
    nodes[bottom_right as usize] = nodes[bottom_right as usize].pinned_z();
    nodes[top_center as usize] = nodes[top_center as usize].with_force(0.0, 10.0);

    let mut springs = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            if col + 1 < cols {
                springs.push(Spring::new(ids[row][col], ids[row][col + 1], k));
            }
            if row + 1 < rows {
                springs.push(Spring::new(ids[row][col], ids[row + 1][col], k));
            }
            if row + 1 < rows && col + 1 < cols {
                springs.push(Spring::new(ids[row][col], ids[row + 1][col + 1], k));
                springs.push(Spring::new(ids[row][col + 1], ids[row + 1][col], k));
            }
        }
    }

    Structure::new(nodes, springs)
}

fn benchmark_solve_small(c: &mut Criterion) {
    let structure = build_grid(5, 3, 100.0);
    c.bench_function("solve_5x3", |b| {
        b.iter(|| {
            let cache = KeCache::new();
            let disp = solve_displacements(&structure, &cache).unwrap();
            black_box(&disp);
        })
    });
}

fn benchmark_solve_medium(c: &mut Criterion) {
    let structure = build_grid(20, 10, 100.0);
    c.bench_function("solve_20x10", |b| {
        b.iter(|| {
            let cache = KeCache::new();
            let disp = solve_displacements(&structure, &cache).unwrap();
            black_box(&disp);
        })
    });
}

fn benchmark_solve_large(c: &mut Criterion) {
    let structure = build_grid(50, 20, 100.0);
    c.bench_function("solve_50x20", |b| {
        b.iter(|| {
            let cache = KeCache::new();
            let disp = solve_displacements(&structure, &cache).unwrap();
            black_box(&disp);
        })
    });
}

fn benchmark_optimize_small(c: &mut Criterion) {
    let structure = build_grid(10, 5, 100.0);
    let cols_protected: HashSet<u32> = {
        let bl = 4 * 10; // bottom-left of a 10x5 grid (row 4, col 0)
        let br = 4 * 10 + 9;
        let top_center = 5;
        [bl, br, top_center].into_iter().collect()
    };
    c.bench_function("optimize_10x5_to_80pct", |b| {
        b.iter(|| {
            let target = structure.total_mass() * 0.8;
            let config = OptimizerConfig::default();
            let mut callbacks = OptimizerCallbacks::default();
            let outcome = optimize_until_target(structure.clone(), cols_protected.clone(), target, 500, &config, &mut callbacks);
            black_box(&outcome.steps);
        })
    });
}

criterion_group!(
    benches,
    benchmark_solve_small,
    benchmark_solve_medium,
    benchmark_solve_large,
    benchmark_optimize_small,
);
criterion_main!(benches);
