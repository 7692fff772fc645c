//! Assembly and linear solve for the 2D spring-truss

pub mod sparse;

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

pub use sparse::{
    apply_permutation, inverse_permutation, reverse_cuthill_mckee, solve_cg, solve_pcg, SparseCholeskySolver,
    SparseMatrixBuilder,
};

use crate::error::{SolveError, SolveResult};
use crate::kernel::KeCache;
use crate::structure::Structure;

/// Displacement solution for every free and fixed DOF, indexed by node id.
#[derive(Debug, Clone, PartialEq)]
pub struct Displacements {
    /// `(ux, uz)` per node, in the same order as `Structure::node_ids`.
    values: std::collections::BTreeMap<u32, (f64, f64)>,
}

impl Displacements {
    pub fn get(&self, node_id: u32) -> Option<(f64, f64)> {
        self.values.get(&node_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, (f64, f64))> + '_ {
        self.values.iter().map(|(&id, &uv)| (id, uv))
    }
}

/// Relative tolerance used to scale the diagonal regularization epsilon
/// when a solve hits a singular stiffness matrix. See
/// [`solve_displacements`] for the retry policy.
const REGULARIZATION_RELATIVE_EPS: f64 = 1e-9;
const REGULARIZATION_FALLBACK_EPS: f64 = 1e-9;

/// Assemble the global stiffness matrix (full `2n x 2n`, both free and
/// fixed DOFs) and load vector for a structure, using `cache` for
/// per-spring `Ke` matrices.
///
/// DOF layout: node at position `p` (per [`Structure::id_to_position`])
/// occupies global DOFs `2p` (x) and `2p + 1` (z).
pub fn assemble(structure: &Structure, cache: &KeCache) -> SolveResult<(CsrMatrix<f64>, DVector<f64>)> {
    let positions = structure.id_to_position();
    let n = positions.len();
    let ndofs = 2 * n;

    let mut builder = SparseMatrixBuilder::new(ndofs);
    let mut f = DVector::zeros(ndofs);

    for node in structure.nodes() {
        let p = positions[&node.id];
        f[2 * p] += node.fx;
        f[2 * p + 1] += node.fz;
    }

    for spring in structure.springs() {
        let ni = structure
            .node(spring.i)
            .expect("spring endpoint must reference a live node");
        let nj = structure
            .node(spring.j)
            .expect("spring endpoint must reference a live node");
        let ke = cache.get_or_compute(spring, ni, nj)?;

        let pi = positions[&spring.i];
        let pj = positions[&spring.j];
        let dofs = [2 * pi, 2 * pi + 1, 2 * pj, 2 * pj + 1];
        for (a, &da) in dofs.iter().enumerate() {
            for (b, &db) in dofs.iter().enumerate() {
                builder.add(da, db, ke[(a, b)]);
            }
        }
    }

    Ok((builder.to_csr(), f))
}

/// Solve `K u = F` restricted to the free DOFs, returning displacements for
/// every node (zero at fixed DOFs).
///
/// Fails immediately with [`SolveError::Singular`] if no node is restrained
/// on either axis — the whole structure is free to translate/rotate as a
/// rigid body, and no diagonal regularization can distinguish that from a
/// merely ill-conditioned system. Otherwise tries a skyline Cholesky
/// factorization of the free/free partition first; if that hits a zero or
/// negative pivot (a disconnected sub-structure or a node with no
/// transverse restraint), retries exactly once with a small diagonal
/// regularization added (`eps * I`, `eps` scaled to the mean magnitude of
/// the diagonal, or a fixed fallback if that mean is zero). A second
/// failure is reported as [`SolveError::Singular`]; this retry does not by
/// itself guarantee connectivity — callers that care must check separately
/// (the optimizer always does, via [`crate::connectivity`]).
pub fn solve_displacements(structure: &Structure, cache: &KeCache) -> SolveResult<Displacements> {
    if structure.node_count() > 0 && structure.nodes().all(|n| !n.fixed_x && !n.fixed_z) {
        // No node is restrained anywhere: the whole structure is free to
        // translate and rotate as a rigid body. This is trivially
        // detectable without a factorization attempt, and no amount of
        // diagonal regularization can distinguish "unconstrained" from
        // "barely constrained" in a physically meaningful way.
        return Err(SolveError::Singular);
    }

    let (k, f) = assemble(structure, cache)?;
    let positions = structure.id_to_position();
    let n = positions.len();

    let mut free_dofs = Vec::with_capacity(2 * n);
    for node in structure.nodes() {
        let p = positions[&node.id];
        if !node.fixed_x {
            free_dofs.push(2 * p);
        }
        if !node.fixed_z {
            free_dofs.push(2 * p + 1);
        }
    }

    let u_free = match solve_free_partition(&k, &f, &free_dofs, 0.0) {
        Ok(u) => u,
        Err(SolveError::Singular) => {
            let eps = regularization_epsilon(&k, &free_dofs);
            solve_free_partition(&k, &f, &free_dofs, eps)?
        }
        Err(other) => return Err(other),
    };

    for &v in u_free.iter() {
        if !v.is_finite() {
            return Err(SolveError::NonFinite);
        }
    }

    let mut full = vec![0.0f64; 2 * n];
    for (idx, &dof) in free_dofs.iter().enumerate() {
        full[dof] = u_free[idx];
    }

    let mut values = std::collections::BTreeMap::new();
    for node in structure.nodes() {
        let p = positions[&node.id];
        values.insert(node.id, (full[2 * p], full[2 * p + 1]));
    }

    Ok(Displacements { values })
}

fn regularization_epsilon(k: &CsrMatrix<f64>, free_dofs: &[usize]) -> f64 {
    if free_dofs.is_empty() {
        return REGULARIZATION_FALLBACK_EPS;
    }
    let mut sum = 0.0;
    let mut count = 0usize;
    for &dof in free_dofs {
        let row = k.row(dof);
        if let Some(pos) = row.col_indices().iter().position(|&c| c == dof) {
            sum += row.values()[pos].abs();
            count += 1;
        }
    }
    if count == 0 || sum == 0.0 {
        REGULARIZATION_FALLBACK_EPS
    } else {
        REGULARIZATION_RELATIVE_EPS * (sum / count as f64)
    }
}

/// Extract the free/free submatrix and free load subvector, reorder it with
/// a Reverse Cuthill-McKee permutation to shrink the skyline's bandwidth,
/// factorize with skyline Cholesky (optionally regularized by `diag_eps`),
/// solve, and map the result back to the original free-DOF ordering.
fn solve_free_partition(
    k: &CsrMatrix<f64>,
    f: &DVector<f64>,
    free_dofs: &[usize],
    diag_eps: f64,
) -> SolveResult<DVector<f64>> {
    let nf = free_dofs.len();
    if nf == 0 {
        return Ok(DVector::zeros(0));
    }

    let mut global_to_local = std::collections::HashMap::with_capacity(nf);
    for (local, &global) in free_dofs.iter().enumerate() {
        global_to_local.insert(global, local);
    }

    let mut builder = SparseMatrixBuilder::new(nf);
    for (row, col, &val) in k.triplet_iter() {
        if let (Some(&lr), Some(&lc)) = (global_to_local.get(&row), global_to_local.get(&col)) {
            builder.add(lr, lc, val);
        }
    }
    if diag_eps != 0.0 {
        for i in 0..nf {
            builder.add(i, i, diag_eps);
        }
    }
    let csr_ff = builder.to_csr();

    let mut f_free = DVector::zeros(nf);
    for (local, &global) in free_dofs.iter().enumerate() {
        f_free[local] = f[global];
    }

    // `perm[k]` is the pre-permutation index now occupying position `k`;
    // `inv` maps a pre-permutation index to its new position.
    let perm = reverse_cuthill_mckee(&csr_ff);
    let inv = inverse_permutation(&perm);

    let mut perm_builder = SparseMatrixBuilder::new(nf);
    for (row, col, &val) in csr_ff.triplet_iter() {
        perm_builder.add(inv[row], inv[col], val);
    }
    let csr_perm = perm_builder.to_csr();

    let f_free_vec: Vec<f64> = f_free.iter().copied().collect();
    let f_perm = DVector::from_vec(apply_permutation(&f_free_vec, &perm));

    let mut solver = SparseCholeskySolver::new(&csr_perm).ok_or(SolveError::Singular)?;
    solver.factorize().map_err(|_| SolveError::Singular)?;
    let x_perm = solver.solve(&f_perm);

    let x_perm_vec: Vec<f64> = x_perm.iter().copied().collect();
    Ok(DVector::from_vec(apply_permutation(&x_perm_vec, &inv)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{Node, Spring};

    #[test]
    fn test_assemble_symmetric() {
        let structure = Structure::new(
            [
                Node::new(0, 0.0, 0.0).fixed(),
                Node::new(1, 1.0, 0.0).with_force(0.0, -1.0),
            ],
            [Spring::new(0, 1, 10.0)],
        );
        let cache = KeCache::new();
        let (k, _f) = assemble(&structure, &cache).unwrap();
        let mut dense = nalgebra::DMatrix::zeros(4, 4);
        for (row, col, &val) in k.triplet_iter() {
            dense[(row, col)] += val;
        }
        for r in 0..4 {
            for c in 0..4 {
                assert!((dense[(r, c)] - dense[(c, r)]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_cantilever_displacement_sign() {
        let structure = Structure::new(
            [Node::new(0, 0.0, 0.0).fixed(), Node::new(1, 1.0, 0.0).with_force(0.0, -5.0)],
            [Spring::new(0, 1, 100.0)],
        );
        let cache = KeCache::new();
        let disp = solve_displacements(&structure, &cache).unwrap();
        let (_ux, uz) = disp.get(1).unwrap();
        assert!(uz < 0.0, "downward force should produce downward (negative z) displacement, got {uz}");
    }

    #[test]
    fn test_disconnected_node_is_singular() {
        // Node 2 is disconnected from the rest of the structure (no spring
        // reaches it) but the overall structure is still restrained
        // elsewhere, so this isn't the "no supports anywhere" short-circuit.
        // Regularization rescues the solve (the isolated DOF gets a tiny
        // but nonzero stiffness and a finite, if large, displacement); it is
        // the caller's job to reject this structure via a connectivity
        // check before ever reaching a solve, exactly as the optimizer does.
        let structure = Structure::new(
            [
                Node::new(0, 0.0, 0.0).fixed(),
                Node::new(1, 1.0, 0.0),
                Node::new(2, 5.0, 5.0).with_force(1.0, 0.0),
            ],
            [Spring::new(0, 1, 10.0)],
        );
        let cache = KeCache::new();
        let disp = solve_displacements(&structure, &cache).unwrap();
        for (_id, (ux, uz)) in disp.iter() {
            assert!(ux.is_finite() && uz.is_finite());
        }
    }
}
