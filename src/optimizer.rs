//! Mass-targeted optimization driver

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;

use crate::connectivity::{self, DEFAULT_MAX_DEGREE_ONE_ROUNDS, DEFAULT_MAX_DEGREE_ZERO_ROUNDS};
use crate::kernel::KeCache;
use crate::linalg::solve_displacements;
use crate::scoring::{self, DEGREE_EXPONENT, DISTANCE_EXPONENT, SMOOTHING_ALPHA};
use crate::structure::Structure;

/// Every numeric knob the driver uses, with defaults matching the
/// constants used throughout §4.4/§4.6. Mirrors the builder style of the
/// teacher crate's analysis-options type: a `Default` plus `with_*`
/// setters, so callers can tune search behavior without touching the
/// algorithm itself.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Neighbor-smoothing weight (see [`crate::scoring::SMOOTHING_ALPHA`]).
    pub smoothing_alpha: f64,
    /// Degree exponent in the effective-cost denominator.
    pub degree_exponent: f64,
    /// Distance exponent in the effective-cost denominator.
    pub distance_exponent: f64,
    /// Fraction of node count used as the base adaptive batch size.
    pub batch_base_factor: f64,
    /// Minimum adaptive batch size.
    pub batch_min: usize,
    /// Maximum adaptive batch size.
    pub batch_max: usize,
    /// Number of times a rejected batch may be halved before escalating to
    /// stagnation handling.
    pub max_halvings: u32,
    /// Size of the normal candidate pool considered per iteration.
    pub candidate_pool_size: usize,
    /// Consecutive stagnant iterations before the pool widens to its
    /// maximum size.
    pub stagnation_patience: u64,
    /// Candidate pool size once patience is exhausted.
    pub stagnation_pool_size: usize,
    /// Candidate pool size before patience is exhausted.
    pub stagnation_pool_size_early: usize,
    /// Maximum number of random tail candidates mixed into a stagnation
    /// attempt.
    pub stagnation_random_mix: usize,
    /// Round cap for mid-iteration degree-0 pruning.
    pub prune_zero_rounds: usize,
    /// Round cap for final degree-<=1 pruning.
    pub prune_one_rounds: usize,
    /// Deterministic seed for the stagnation-escape PRNG. `None` seeds
    /// from a fixed constant rather than wall-clock or OS entropy, so that
    /// two runs with identical inputs always visit candidates in the same
    /// order.
    pub seed: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: SMOOTHING_ALPHA,
            degree_exponent: DEGREE_EXPONENT,
            distance_exponent: DISTANCE_EXPONENT,
            batch_base_factor: 0.012,
            batch_min: 8,
            batch_max: 120,
            max_halvings: 8,
            candidate_pool_size: 400,
            stagnation_patience: 80,
            stagnation_pool_size: 8000,
            stagnation_pool_size_early: 2000,
            stagnation_random_mix: 2000,
            prune_zero_rounds: DEFAULT_MAX_DEGREE_ZERO_ROUNDS,
            prune_one_rounds: DEFAULT_MAX_DEGREE_ONE_ROUNDS,
            seed: None,
        }
    }
}

impl OptimizerConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_batch_bounds(mut self, min: usize, max: usize) -> Self {
        self.batch_min = min;
        self.batch_max = max;
        self
    }

    pub fn with_candidate_pool_size(mut self, size: usize) -> Self {
        self.candidate_pool_size = size;
        self
    }

    pub fn with_stagnation_patience(mut self, patience: u64) -> Self {
        self.stagnation_patience = patience;
        self
    }
}

/// Reason an optimization run ended.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStatus {
    #[error("target mass reached")]
    TargetReached,
    #[error("maximum step count reached before target mass")]
    MaxStepsExceeded,
    #[error("stagnation escape exhausted without an accepted removal")]
    Stuck,
    #[error("cancelled by caller")]
    Cancelled,
    #[error("already below target mass at call time")]
    AlreadyBelowTarget,
}

/// Result of one `optimize_until_target` call.
pub struct OptimizationOutcome {
    /// The best structure reached, or `None` only if the input itself was
    /// unsolvable (never produced once optimization begins, since the
    /// driver always has at least the last committed state to fall back
    /// on).
    pub structure: Option<Structure>,
    pub steps: u64,
    pub status: TerminationStatus,
}

/// Optional side-effect hooks invoked at iteration boundaries. None of
/// these may influence control flow; they exist purely for progress
/// reporting, animation snapshots, and cooperative cancellation.
#[derive(Default)]
pub struct OptimizerCallbacks<'a> {
    /// `(step, current_mass, target_mass, node_count)`, called before each
    /// iteration's solve.
    pub progress: Option<Box<dyn FnMut(u64, f64, f64, usize) + 'a>>,
    /// Called with the committed structure after each accepted iteration.
    pub snapshot: Option<Box<dyn FnMut(u64, &Structure) + 'a>>,
    /// Polled at each iteration boundary; returning `true` cancels the run.
    pub cancel: Option<Box<dyn FnMut() -> bool + 'a>>,
}

/// Run the mass-targeted greedy removal loop described in §4.6: solve,
/// score, sort, batch-remove with rollback-and-halve on failure, prune,
/// and repeat until the target mass is reached, the step budget is spent,
/// the search stagnates, or the caller cancels.
pub fn optimize_until_target(
    mut structure: Structure,
    protected: HashSet<u32>,
    target_mass: f64,
    max_steps: u64,
    config: &OptimizerConfig,
    callbacks: &mut OptimizerCallbacks,
) -> OptimizationOutcome {
    let start_mass = structure.total_mass();

    if start_mass <= target_mass {
        return OptimizationOutcome {
            structure: Some(structure),
            steps: 0,
            status: TerminationStatus::AlreadyBelowTarget,
        };
    }

    let cache = KeCache::new();
    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or(0x5350_4543));
    let mut step: u64 = 0;
    let mut stagnation_count: u64 = 0;

    loop {
        if let Some(cancel) = callbacks.cancel.as_mut() {
            if cancel() {
                log::info!("optimization cancelled at step {step}");
                return OptimizationOutcome {
                    structure: Some(structure),
                    steps: step,
                    status: TerminationStatus::Cancelled,
                };
            }
        }

        let current_mass = structure.total_mass();
        if let Some(progress) = callbacks.progress.as_mut() {
            progress(step, current_mass, target_mass, structure.node_count());
        }
        log::debug!(
            "step {step}: mass {current_mass:.4} / target {target_mass:.4}, {} nodes",
            structure.node_count()
        );

        if step >= max_steps {
            log::info!("max step count ({max_steps}) reached at mass {current_mass:.4}");
            return OptimizationOutcome {
                structure: Some(structure),
                steps: step,
                status: TerminationStatus::MaxStepsExceeded,
            };
        }

        let displacements = match solve_displacements(&structure, &cache) {
            Ok(d) => d,
            Err(err) => {
                log::warn!("solve failed on committed state: {err}");
                return OptimizationOutcome {
                    structure: Some(structure),
                    steps: step,
                    status: TerminationStatus::Stuck,
                };
            }
        };

        let scores = match scoring::compute_scores(
            &structure,
            &displacements,
            &cache,
            config.smoothing_alpha,
            config.degree_exponent,
            config.distance_exponent,
        ) {
            Ok(s) => s,
            Err(err) => {
                log::warn!("scoring failed on committed state: {err}");
                return OptimizationOutcome {
                    structure: Some(structure),
                    steps: step,
                    status: TerminationStatus::Stuck,
                };
            }
        };

        let all_removable = scoring::removable_candidates(&structure, &scores, &protected);
        if all_removable.is_empty() {
            log::info!("no removable candidates remain at step {step}");
            return OptimizationOutcome {
                structure: Some(structure),
                steps: step,
                status: TerminationStatus::Stuck,
            };
        }

        let pool = candidate_pool(&structure, &all_removable, config.candidate_pool_size);
        let batch_size = adaptive_batch_size(config, structure.node_count(), current_mass, target_mass, start_mass);

        if let Some(accepted) = attempt_with_halving(&structure, &pool, &protected, &cache, batch_size, config.max_halvings, config) {
            structure = accepted;
            step += 1;
            stagnation_count = 0;
            log::info!("step {step}: accepted batch, mass now {:.4}", structure.total_mass());
            if let Some(snapshot) = callbacks.snapshot.as_mut() {
                snapshot(step, &structure);
            }

            if structure.total_mass() <= target_mass {
                connectivity::prune_dead_ends(&mut structure, &protected, config.prune_one_rounds);
                log::info!("target mass reached at step {step}");
                return OptimizationOutcome {
                    structure: Some(structure),
                    steps: step,
                    status: TerminationStatus::TargetReached,
                };
            }
            continue;
        }

        stagnation_count += 1;
        log::warn!("stagnation count now {stagnation_count} at step {step}");

        let escape_pool_size = if stagnation_count >= config.stagnation_patience {
            config.stagnation_pool_size
        } else {
            config.stagnation_pool_size_early
        };
        let escape_pool = stagnation_pool(&all_removable, escape_pool_size, config.stagnation_random_mix, &mut rng);

        match attempt_single(&structure, &escape_pool, &protected, &cache, config) {
            Some(accepted) => {
                structure = accepted;
                step += 1;
                stagnation_count = 0;
                log::info!("step {step}: stagnation escape accepted, mass now {:.4}", structure.total_mass());
                if let Some(snapshot) = callbacks.snapshot.as_mut() {
                    snapshot(step, &structure);
                }
                if structure.total_mass() <= target_mass {
                    connectivity::prune_dead_ends(&mut structure, &protected, config.prune_one_rounds);
                    log::info!("target mass reached at step {step}");
                    return OptimizationOutcome {
                        structure: Some(structure),
                        steps: step,
                        status: TerminationStatus::TargetReached,
                    };
                }
            }
            None => {
                log::warn!("stagnation escape exhausted at step {step}");
                return OptimizationOutcome {
                    structure: Some(structure),
                    steps: step,
                    status: TerminationStatus::Stuck,
                };
            }
        }
    }
}

/// Adaptive batch size per §4.6: a node-count-scaled base, tightened both
/// by remaining fractional progress and by absolute mass reduction so far.
fn adaptive_batch_size(config: &OptimizerConfig, node_count: usize, mass: f64, target_mass: f64, start_mass: f64) -> usize {
    let base = ((node_count as f64 * config.batch_base_factor).ceil() as usize).clamp(config.batch_min, config.batch_max);
    let mut k = base;

    if mass > 0.0 {
        let remaining_frac = (mass - target_mass) / mass;
        if remaining_frac < 0.20 {
            k = k.min(25);
        }
        if remaining_frac < 0.08 {
            k = k.min(8);
        }
        if remaining_frac < 0.03 {
            k = 1;
        }
    }

    if start_mass > 0.0 {
        let abs_frac = mass / start_mass;
        if abs_frac < 0.75 {
            k = k.min(10);
        }
        if abs_frac < 0.65 {
            k = k.min(5);
        }
        if abs_frac < 0.55 {
            k = 1;
        }
    }

    k.max(1)
}

/// Candidates in removal order, preferring the last-path mask when it is
/// non-empty (per §4.6), capped at `pool_size`.
fn candidate_pool(structure: &Structure, all_removable: &[u32], pool_size: usize) -> Vec<u32> {
    let last_path = connectivity::last_path_mask(structure);
    let filtered: Vec<u32> = if last_path.is_empty() {
        Vec::new()
    } else {
        all_removable.iter().copied().filter(|id| last_path.contains(id)).collect()
    };
    let source: &[u32] = if filtered.is_empty() { all_removable } else { &filtered };
    source.iter().copied().take(pool_size).collect()
}

/// Widen the candidate pool for stagnation escape: the head of the sorted
/// removable list up to `pool_size`, plus up to `random_mix` uniformly
/// sampled candidates from the remaining tail.
fn stagnation_pool(all_removable: &[u32], pool_size: usize, random_mix: usize, rng: &mut StdRng) -> Vec<u32> {
    let head_size = pool_size.min(all_removable.len());
    let mut pool: Vec<u32> = all_removable[..head_size].to_vec();

    let tail = &all_removable[head_size..];
    if !tail.is_empty() {
        let mut tail_vec = tail.to_vec();
        tail_vec.shuffle(rng);
        let mix_n = tail_vec.len().min(random_mix);
        pool.extend(tail_vec.into_iter().take(mix_n));
    }
    pool
}

/// Try removing the first `batch_size` entries of `pool` from `base`,
/// halving the batch on rejection up to `max_halvings` times. Returns the
/// accepted structure, or `None` if every halving level failed.
fn attempt_with_halving(
    base: &Structure,
    pool: &[u32],
    protected: &HashSet<u32>,
    cache: &KeCache,
    batch_size: usize,
    max_halvings: u32,
    config: &OptimizerConfig,
) -> Option<Structure> {
    let mut k = batch_size.max(1);
    for _ in 0..=max_halvings {
        let batch: Vec<u32> = pool.iter().take(k).copied().collect();
        if batch.is_empty() {
            return None;
        }
        if let Some(trial) = try_batch(base, &batch, protected, cache, config) {
            return Some(trial);
        }
        if k == 1 {
            break;
        }
        k = (k / 2).max(1);
    }
    None
}

/// Stagnation-escape fallback: try single-node removals through `pool` in
/// order until one is accepted.
fn attempt_single(base: &Structure, pool: &[u32], protected: &HashSet<u32>, cache: &KeCache, config: &OptimizerConfig) -> Option<Structure> {
    for &id in pool {
        if let Some(trial) = try_batch(base, &[id], protected, cache, config) {
            return Some(trial);
        }
    }
    None
}

/// Remove `ids` from a clone of `base`, checking protected connectivity
/// after each removal, pruning degree-0 islands, and confirming the result
/// still solves. Returns `None` on any rejection.
fn try_batch(base: &Structure, ids: &[u32], protected: &HashSet<u32>, cache: &KeCache, config: &OptimizerConfig) -> Option<Structure> {
    let mut trial = base.clone();
    for &id in ids {
        trial.remove_node(id);
        if !connectivity::protected_set_connected(&trial, protected) {
            return None;
        }
    }
    connectivity::prune_isolated(&mut trial, protected, config.prune_zero_rounds);
    match solve_displacements(&trial, cache) {
        Ok(_) => Some(trial),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Node;

    fn grid_3x2() -> (Structure, HashSet<u32>) {
        // 3 columns x 2 rows, unit spacing, k=100 diagonals+edges as a dense mesh.
        let mut nodes = Vec::new();
        let mut id = 0u32;
        let mut ids = vec![vec![0u32; 3]; 2];
        for row in 0..2 {
            for col in 0..3 {
                nodes.push(Node::new(id, col as f64, row as f64));
                ids[row][col] = id;
                id += 1;
            }
        }
        let bl = ids[1][0];
        let br = ids[1][2];
        let top_center = ids[0][1];
        nodes[bl as usize] = nodes[bl as usize].fixed();
        nodes[br as usize] = nodes[br as usize].pinned_z();
        nodes[top_center as usize] = nodes[top_center as usize].with_force(0.0, 10.0);

        let mut springs = Vec::new();
        for row in 0..2 {
            for col in 0..3 {
                if col + 1 < 3 {
                    springs.push(crate::elements::Spring::new(ids[row][col], ids[row][col + 1], 100.0));
                }
                if row + 1 < 2 {
                    springs.push(crate::elements::Spring::new(ids[row][col], ids[row + 1][col], 100.0));
                }
            }
        }
        // Diagonals for shear stiffness.
        for row in 0..1 {
            for col in 0..2 {
                springs.push(crate::elements::Spring::new(ids[row][col], ids[row + 1][col + 1], 100.0));
                springs.push(crate::elements::Spring::new(ids[row][col + 1], ids[row + 1][col], 100.0));
            }
        }

        let protected: HashSet<u32> = [bl, br, top_center].into_iter().collect();
        (Structure::new(nodes, springs), protected)
    }

    #[test]
    fn test_already_below_target_is_noop() {
        let (structure, protected) = grid_3x2();
        let initial_mass = structure.total_mass();
        let config = OptimizerConfig::default();
        let mut callbacks = OptimizerCallbacks::default();
        let outcome = optimize_until_target(structure, protected, initial_mass * 2.0, 100, &config, &mut callbacks);
        assert_eq!(outcome.steps, 0);
        assert_eq!(outcome.status, TerminationStatus::AlreadyBelowTarget);
        assert_eq!(outcome.structure.unwrap().total_mass(), initial_mass);
    }

    #[test]
    fn test_cancellation_stops_promptly() {
        let (structure, protected) = grid_3x2();
        let initial_mass = structure.total_mass();
        let config = OptimizerConfig::default();
        let mut calls = 0u32;
        let mut callbacks = OptimizerCallbacks {
            cancel: Some(Box::new(move || {
                calls += 1;
                calls > 1
            })),
            ..Default::default()
        };
        let outcome = optimize_until_target(structure, protected, initial_mass * 0.1, 1000, &config, &mut callbacks);
        assert_eq!(outcome.status, TerminationStatus::Cancelled);
    }

    #[test]
    fn test_determinism_same_seed_same_result() {
        let (s1, p1) = grid_3x2();
        let (s2, p2) = grid_3x2();
        let config = OptimizerConfig::default().with_seed(42);
        let mut cb1 = OptimizerCallbacks::default();
        let mut cb2 = OptimizerCallbacks::default();
        let target = s1.total_mass() * 0.8;
        let out1 = optimize_until_target(s1, p1, target, 200, &config, &mut cb1);
        let out2 = optimize_until_target(s2, p2, target, 200, &config, &mut cb2);
        let ids1 = out1.structure.unwrap().node_ids();
        let ids2 = out2.structure.unwrap().node_ids();
        assert_eq!(ids1, ids2);
        assert_eq!(out1.steps, out2.steps);
    }
}
