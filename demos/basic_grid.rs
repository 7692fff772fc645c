//! Demo: build a small grid, solve it, and run the optimizer to a mass target.
//!
//! This binary is a worked example of wiring up the core library; grid
//! construction, support/load placement, and printing are the caller's
//! job, not the crate's.

use std::collections::HashSet;

use truss_topopt::prelude::*;

/// Build a `cols x rows` grid of unit-spaced nodes with edge and diagonal
/// springs of stiffness `k`, fix the bottom-left node on both axes, pin
/// the bottom-right node in z, and load the top-center node downward.
fn build_grid(cols: usize, rows: usize, k: f64, load_fz: f64) -> (Structure, HashSet<u32>) {
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
    nodes[top_center as usize] = nodes[top_center as usize].with_force(0.0, load_fz);

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

    let protected: HashSet<u32> = [bottom_left, bottom_right, top_center].into_iter().collect();
    (Structure::new(nodes, springs), protected)
}

fn main() {
    env_logger::init();

    let (structure, protected) = build_grid(5, 3, 100.0, 10.0);
    let cache = KeCache::new();

    let displacements = solve_displacements(&structure, &cache).expect("initial grid must solve");
    println!("initial nodes: {}, mass: {:.3}", structure.node_count(), structure.total_mass());
    for (id, (ux, uz)) in displacements.iter() {
        println!("  node {id}: ux={ux:.6} uz={uz:.6}");
    }

    let target_mass = structure.total_mass() * 0.5;
    let config = OptimizerConfig::default();
    let mut callbacks = OptimizerCallbacks {
        progress: Some(Box::new(|step, mass, target, nodes| {
            if step % 10 == 0 {
                println!("step {step}: mass {mass:.3} -> target {target:.3}, {nodes} nodes");
            }
        })),
        ..Default::default()
    };

    let outcome = optimize_until_target(structure, protected, target_mass, 2000, &config, &mut callbacks);

    match outcome.structure {
        Some(result) => {
            println!(
                "finished after {} steps with status {:?}: {} nodes, mass {:.3}",
                outcome.steps,
                outcome.status,
                result.node_count(),
                result.total_mass()
            );
        }
        None => println!("optimization produced no structure ({:?})", outcome.status),
    }
}
