//! Node element - a point in the planar truss frame

use serde::{Deserialize, Serialize};

/// A node in the 2D spring-truss model.
///
/// Identity is the stable `id`, assigned once when the structure is built
/// and never reused or renumbered, even as the optimizer removes nodes
/// around it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identity, assigned at construction time.
    pub id: u32,
    /// X coordinate.
    pub x: f64,
    /// Z coordinate (increases downward).
    pub z: f64,
    /// Restrained in X translation.
    pub fixed_x: bool,
    /// Restrained in Z translation.
    pub fixed_z: bool,
    /// Applied force in X.
    pub fx: f64,
    /// Applied force in Z.
    pub fz: f64,
    /// Scalar mass contribution of this node to the structure's total mass.
    pub mass: f64,
}

impl Node {
    /// Create an unloaded, unsupported node at the given position.
    pub fn new(id: u32, x: f64, z: f64) -> Self {
        Self {
            id,
            x,
            z,
            fixed_x: false,
            fixed_z: false,
            fx: 0.0,
            fz: 0.0,
            mass: 1.0,
        }
    }

    /// Builder: fix both axes (a rigid support).
    pub fn fixed(mut self) -> Self {
        self.fixed_x = true;
        self.fixed_z = true;
        self
    }

    /// Builder: fix only the Z axis (a roller resisting vertical motion).
    pub fn pinned_z(mut self) -> Self {
        self.fixed_z = true;
        self
    }

    /// Builder: apply a force.
    pub fn with_force(mut self, fx: f64, fz: f64) -> Self {
        self.fx = fx;
        self.fz = fz;
        self
    }

    /// Builder: override the default unit mass.
    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    /// True if any axis is restrained.
    pub fn is_support(&self) -> bool {
        self.fixed_x || self.fixed_z
    }

    /// True if the node carries a nonzero applied force.
    pub fn is_loaded(&self) -> bool {
        self.fx != 0.0 || self.fz != 0.0
    }

    /// Squared distance to another node (avoids the sqrt for cheap comparisons).
    pub fn distance_squared_to(&self, other: &Node) -> f64 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        dx * dx + dz * dz
    }

    /// Euclidean distance to another node.
    pub fn distance_to(&self, other: &Node) -> f64 {
        self.distance_squared_to(other).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_builders() {
        let n = Node::new(0, 1.0, 2.0).fixed().with_force(0.0, 10.0);
        assert!(n.fixed_x && n.fixed_z);
        assert!(n.is_support());
        assert!(n.is_loaded());
    }

    #[test]
    fn test_node_distance() {
        let a = Node::new(0, 0.0, 0.0);
        let b = Node::new(1, 3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-10);
    }
}
