//! Spring element - an axial connection between two nodes

use serde::{Deserialize, Serialize};

/// An axial spring between two nodes.
///
/// Semantically undirected: `(i, j)` and `(j, i)` denote the same element.
/// [`Spring::canonical_key`] gives the `(min, max)` pair every lookup table
/// in this crate keys on, so storage order never produces duplicate entries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spring {
    /// First endpoint.
    pub i: u32,
    /// Second endpoint.
    pub j: u32,
    /// Stiffness (must be > 0).
    pub k: f64,
}

impl Spring {
    /// Create a new spring. Does not validate geometry — a spring with
    /// coincident endpoints is only rejected when it reaches the solver,
    /// since the optimizer may remove one of its endpoints before it is
    /// ever assembled.
    pub fn new(i: u32, j: u32, k: f64) -> Self {
        Self { i, j, k }
    }

    /// Canonical `(min(i,j), max(i,j))` key used by every energy/adjacency map.
    pub fn canonical_key(&self) -> (u32, u32) {
        if self.i <= self.j {
            (self.i, self.j)
        } else {
            (self.j, self.i)
        }
    }

    /// True if this spring touches the given node.
    pub fn touches(&self, node_id: u32) -> bool {
        self.i == node_id || self.j == node_id
    }

    /// The other endpoint, given one.
    pub fn other(&self, node_id: u32) -> Option<u32> {
        if self.i == node_id {
            Some(self.j)
        } else if self.j == node_id {
            Some(self.i)
        } else {
            None
        }
    }
}
