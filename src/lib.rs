//! truss-topopt - mass-targeted topology optimization for 2D spring-trusses
//!
//! Given a dense grid of nodes connected by axial springs, with supports
//! and a point load already placed, this crate solves the linear static
//! problem and greedily removes the least-loaded nodes until a target
//! total mass is reached, while keeping the load path from supports to
//! the loaded node solvable at every accepted step.
//!
//! ## Example
//! ```rust
//! use std::collections::HashSet;
//! use truss_topopt::prelude::*;
//!
//! let nodes = vec![
//!     Node::new(0, 0.0, 0.0).fixed(),
//!     Node::new(1, 1.0, 0.0).pinned_z(),
//!     Node::new(2, 2.0, 0.0).with_force(0.0, -10.0),
//! ];
//! let springs = vec![Spring::new(0, 1, 100.0), Spring::new(1, 2, 100.0)];
//! let structure = Structure::new(nodes, springs);
//!
//! let protected: HashSet<u32> = [0, 1, 2].into_iter().collect();
//! let config = OptimizerConfig::default();
//! let mut callbacks = OptimizerCallbacks::default();
//! // Target already met (mass can only grow past its current value here),
//! // so the driver returns immediately without attempting any removal.
//! let start_mass = structure.total_mass();
//! let outcome = optimize_until_target(structure, protected, start_mass * 10.0, 10, &config, &mut callbacks);
//! assert_eq!(outcome.status, TerminationStatus::AlreadyBelowTarget);
//! ```

pub mod connectivity;
pub mod elements;
pub mod error;
pub mod kernel;
pub mod linalg;
pub mod optimizer;
pub mod scoring;
pub mod structure;

pub mod prelude {
    pub use crate::connectivity::{last_path_mask, protected_set, protected_set_connected};
    pub use crate::elements::{Node, Spring};
    pub use crate::error::{SolveError, SolveResult, TopoError, TopoResult};
    pub use crate::kernel::KeCache;
    pub use crate::linalg::{solve_displacements, Displacements};
    pub use crate::optimizer::{
        optimize_until_target, OptimizationOutcome, OptimizerCallbacks, OptimizerConfig, TerminationStatus,
    };
    pub use crate::scoring::{compute_scores, removable_candidates, NodeScores};
    pub use crate::structure::Structure;
}
