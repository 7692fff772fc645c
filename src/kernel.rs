//! Element kernel: per-spring stiffness matrix and strain energy

use std::cell::RefCell;
use std::collections::HashMap;

use nalgebra::Matrix4;

use crate::elements::{Node, Spring};
use crate::error::{SolveError, SolveResult};

/// 4x4 local/global stiffness matrix for an axial spring (2 DOF per node: x, z).
pub type Ke = Matrix4<f64>;

/// Build the 4x4 stiffness matrix for a spring between two node positions.
///
/// DOF order is `[xi, zi, xj, zj]`. `c`/`s` are the direction cosines of the
/// vector from `i` to `j`; the matrix is `k * T^T * T` where `T = [-c -s c s]`
/// is the axial-strain row.
pub fn spring_stiffness(ni: &Node, nj: &Node, k: f64) -> SolveResult<Ke> {
    let dx = nj.x - ni.x;
    let dz = nj.z - ni.z;
    let len_sq = dx * dx + dz * dz;
    if len_sq <= f64::EPSILON {
        return Err(SolveError::ZeroLengthSpring { i: ni.id, j: nj.id });
    }
    let len = len_sq.sqrt();
    let c = dx / len;
    let s = dz / len;

    let cc = c * c;
    let cs = c * s;
    let ss = s * s;

    #[rustfmt::skip]
    let ke = Matrix4::new(
         cc,  cs, -cc, -cs,
         cs,  ss, -cs, -ss,
        -cc, -cs,  cc,  cs,
        -cs, -ss,  cs,  ss,
    );
    Ok(ke * k)
}

/// Strain energy of a spring given the full `[uxi, uzi, uxj, uzj]`
/// displacement vector, via `0.5 * ue^T * Ke * ue`.
pub fn strain_energy_matrix_form(ke: &Ke, ue: &nalgebra::Vector4<f64>) -> f64 {
    0.5 * (ue.transpose() * ke * ue)[(0, 0)]
}

/// Strain energy via the closed form `0.5 * k * delta^2`, where `delta` is
/// the relative axial elongation. Equivalent to
/// [`strain_energy_matrix_form`] up to floating point error; used in debug
/// assertions to cross-check the matrix path.
pub fn strain_energy_scalar_form(ni: &Node, nj: &Node, k: f64, ue: &nalgebra::Vector4<f64>) -> SolveResult<f64> {
    let dx = nj.x - ni.x;
    let dz = nj.z - ni.z;
    let len = (dx * dx + dz * dz).sqrt();
    if len <= f64::EPSILON {
        return Err(SolveError::ZeroLengthSpring { i: ni.id, j: nj.id });
    }
    let c = dx / len;
    let s = dz / len;
    let delta = c * (ue[2] - ue[0]) + s * (ue[3] - ue[1]);
    Ok(0.5 * k * delta * delta)
}

/// Memoizing cache of element stiffness matrices keyed by canonical
/// `(min(i,j), max(i,j))` spring endpoints.
///
/// Node positions never change once assigned, so a spring's `Ke` is
/// invariant for the lifetime of the structure; only removal invalidates an
/// entry, and removal drops the spring from the list entirely rather than
/// mutating it. `RefCell` lets read-only assembly/scoring paths share one
/// cache without threading `&mut` through call sites that are otherwise
/// purely read-only.
#[derive(Debug, Default)]
pub struct KeCache {
    entries: RefCell<HashMap<(u32, u32), Ke>>,
}

impl KeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (computing and memoizing on first access) the stiffness matrix
    /// for `spring` given the current positions of its endpoints.
    pub fn get_or_compute(&self, spring: &Spring, ni: &Node, nj: &Node) -> SolveResult<Ke> {
        let key = spring.canonical_key();
        if let Some(ke) = self.entries.borrow().get(&key) {
            return Ok(*ke);
        }
        let ke = spring_stiffness(ni, nj, spring.k)?;
        self.entries.borrow_mut().insert(key, ke);
        Ok(ke)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry (e.g. after nodes are relocated, which this
    /// crate never does, but kept for external callers that reuse a cache
    /// across distinct structures).
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector4;

    #[test]
    fn test_horizontal_spring_stiffness() {
        let ni = Node::new(0, 0.0, 0.0);
        let nj = Node::new(1, 2.0, 0.0);
        let ke = spring_stiffness(&ni, &nj, 5.0).unwrap();
        assert!((ke[(0, 0)] - 5.0).abs() < 1e-10);
        assert!((ke[(0, 2)] + 5.0).abs() < 1e-10);
        assert!((ke[(1, 1)]).abs() < 1e-10);
    }

    #[test]
    fn test_zero_length_spring_errors() {
        let ni = Node::new(0, 1.0, 1.0);
        let nj = Node::new(1, 1.0, 1.0);
        let err = spring_stiffness(&ni, &nj, 5.0).unwrap_err();
        assert_eq!(err, SolveError::ZeroLengthSpring { i: 0, j: 1 });
    }

    #[test]
    fn test_energy_forms_agree() {
        let ni = Node::new(0, 0.0, 0.0);
        let nj = Node::new(1, 3.0, 4.0);
        let k = 7.0;
        let ke = spring_stiffness(&ni, &nj, k).unwrap();
        let ue = Vector4::new(0.1, -0.2, 0.4, 0.3);
        let matrix_energy = strain_energy_matrix_form(&ke, &ue);
        let scalar_energy = strain_energy_scalar_form(&ni, &nj, k, &ue).unwrap();
        assert!((matrix_energy - scalar_energy).abs() < 1e-10);
    }

    #[test]
    fn test_cache_reuses_entry() {
        let ni = Node::new(0, 0.0, 0.0);
        let nj = Node::new(1, 1.0, 0.0);
        let spring = Spring::new(0, 1, 3.0);
        let cache = KeCache::new();
        let a = cache.get_or_compute(&spring, &ni, &nj).unwrap();
        assert_eq!(cache.len(), 1);
        let b = cache.get_or_compute(&spring, &ni, &nj).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_key_ignores_endpoint_order() {
        let ni = Node::new(0, 0.0, 0.0);
        let nj = Node::new(1, 1.0, 0.0);
        let forward = Spring::new(0, 1, 3.0);
        let reverse = Spring::new(1, 0, 3.0);
        let cache = KeCache::new();
        cache.get_or_compute(&forward, &ni, &nj).unwrap();
        cache.get_or_compute(&reverse, &nj, &ni).unwrap();
        assert_eq!(cache.len(), 1);
    }
}
