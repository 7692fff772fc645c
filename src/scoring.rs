//! Node removal scoring

use std::collections::{BTreeMap, HashSet};

use crate::connectivity::{bfs_distances, protected_set};
use crate::error::SolveResult;
use crate::kernel::{strain_energy_matrix_form, KeCache};
use crate::linalg::Displacements;
use crate::structure::Structure;

/// Neighbor-smoothing weight: fraction of a node's raw score retained
/// versus blended in from its neighbors' average.
pub const SMOOTHING_ALPHA: f64 = 0.6;
/// Exponent applied to `(degree + 1)` in the effective-cost denominator.
pub const DEGREE_EXPONENT: f64 = 1.6;
/// Exponent applied to `(distance-to-protected + 1)` in the effective-cost
/// denominator.
pub const DISTANCE_EXPONENT: f64 = 0.8;

/// Per-node scores computed for one solved state.
#[derive(Debug, Clone)]
pub struct NodeScores {
    /// Raw half-sum of incident spring strain energies.
    pub raw: BTreeMap<u32, f64>,
    /// Neighbor-smoothed score.
    pub smoothed: BTreeMap<u32, f64>,
    /// Effective removal cost: lower means a more attractive removal
    /// candidate.
    pub effective: BTreeMap<u32, f64>,
}

/// Compute raw, smoothed, and effective-cost scores for every node in
/// `structure`, given its solved `displacements`.
///
/// Raw score for node `n`: half the sum of strain energy over springs
/// touching `n` (so that summing raw scores of both endpoints of a spring
/// recovers the spring's full strain energy). Smoothed score blends a
/// node's raw score with the unweighted mean of its neighbors' raw scores
/// via `alpha`. Effective cost divides the smoothed score by
/// `(degree + 1)^gamma * (distance_to_protected + 1)^beta`, biasing removal
/// toward low-energy, high-degree nodes far from the structure's protected
/// anchors. Pass [`SMOOTHING_ALPHA`]/[`DEGREE_EXPONENT`]/[`DISTANCE_EXPONENT`]
/// for the default weighting, or a caller-tuned triple (see
/// [`crate::optimizer::OptimizerConfig`]).
pub fn compute_scores(
    structure: &Structure,
    displacements: &Displacements,
    cache: &KeCache,
    alpha: f64,
    gamma: f64,
    beta: f64,
) -> SolveResult<NodeScores> {
    let mut raw: BTreeMap<u32, f64> = structure.nodes().map(|n| (n.id, 0.0)).collect();

    for spring in structure.springs() {
        let ni = structure.node(spring.i).expect("live spring endpoint");
        let nj = structure.node(spring.j).expect("live spring endpoint");
        let ke = cache.get_or_compute(spring, ni, nj)?;
        let (uxi, uzi) = displacements.get(spring.i).unwrap_or((0.0, 0.0));
        let (uxj, uzj) = displacements.get(spring.j).unwrap_or((0.0, 0.0));
        let ue = nalgebra::Vector4::new(uxi, uzi, uxj, uzj);
        let energy = strain_energy_matrix_form(&ke, &ue);
        *raw.get_mut(&spring.i).unwrap() += 0.5 * energy;
        *raw.get_mut(&spring.j).unwrap() += 0.5 * energy;
    }

    let adjacency = structure.adjacency();

    let smoothed: BTreeMap<u32, f64> = raw
        .iter()
        .map(|(&id, &score)| {
            let neighbors = &adjacency[&id];
            let smoothed_score = if neighbors.is_empty() {
                score
            } else {
                let mean: f64 = neighbors.iter().map(|nb| raw[nb]).sum::<f64>() / neighbors.len() as f64;
                alpha * score + (1.0 - alpha) * mean
            };
            (id, smoothed_score)
        })
        .collect();

    let protected = protected_set(structure);
    let distances = bfs_distances(&adjacency, &protected);

    let effective: BTreeMap<u32, f64> = smoothed
        .iter()
        .map(|(&id, &score)| {
            let degree = adjacency[&id].len() as f64;
            let dist = distances.get(&id).copied().unwrap_or(0) as f64;
            let denom = (degree + 1.0).powf(gamma) * (dist + 1.0).powf(beta);
            (id, score / denom)
        })
        .collect();

    Ok(NodeScores { raw, smoothed, effective })
}

/// Removable node ids (non-protected) sorted ascending by effective cost —
/// the cheapest-to-remove candidates first.
pub fn removable_candidates(structure: &Structure, scores: &NodeScores, protected: &HashSet<u32>) -> Vec<u32> {
    let mut candidates: Vec<(u32, f64)> = structure
        .nodes()
        .filter(|n| !protected.contains(&n.id))
        .map(|n| (n.id, scores.effective.get(&n.id).copied().unwrap_or(0.0)))
        .collect();
    candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    candidates.into_iter().map(|(id, _)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{Node, Spring};
    use crate::linalg::solve_displacements;

    fn two_bay() -> Structure {
        Structure::new(
            [
                Node::new(0, 0.0, 0.0).fixed(),
                Node::new(1, 1.0, 0.0).pinned_z(),
                Node::new(2, 2.0, 0.0).with_force(0.0, -1.0),
            ],
            [Spring::new(0, 1, 10.0), Spring::new(1, 2, 10.0)],
        )
    }

    #[test]
    fn test_raw_scores_nonnegative() {
        let s = two_bay();
        let cache = KeCache::new();
        let disp = solve_displacements(&s, &cache).unwrap();
        let scores = compute_scores(&s, &disp, &cache, SMOOTHING_ALPHA, DEGREE_EXPONENT, DISTANCE_EXPONENT).unwrap();
        for v in scores.raw.values() {
            assert!(*v >= 0.0);
        }
    }

    #[test]
    fn test_removable_candidates_exclude_protected() {
        let s = two_bay();
        let cache = KeCache::new();
        let disp = solve_displacements(&s, &cache).unwrap();
        let scores = compute_scores(&s, &disp, &cache, SMOOTHING_ALPHA, DEGREE_EXPONENT, DISTANCE_EXPONENT).unwrap();
        let protected = protected_set(&s);
        let candidates = removable_candidates(&s, &scores, &protected);
        assert!(!candidates.contains(&0));
        assert!(!candidates.contains(&2));
    }
}
