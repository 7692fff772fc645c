//! Structure store - in-memory representation of a spring-truss

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::elements::{Node, Spring};

/// The spring-truss structure: a node map plus an ordered spring list.
///
/// Node ids are never renumbered, even as the optimizer removes nodes
/// around survivors — a `BTreeMap` keeps iteration deterministic without
/// needing a separate sort step at every query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Structure {
    nodes: BTreeMap<u32, Node>,
    springs: Vec<Spring>,
}

impl Structure {
    /// Build a structure from an explicit node list and spring list.
    pub fn new(nodes: impl IntoIterator<Item = Node>, springs: impl IntoIterator<Item = Spring>) -> Self {
        let nodes = nodes.into_iter().map(|n| (n.id, n)).collect();
        let springs = springs.into_iter().collect();
        Self { nodes, springs }
    }

    /// An empty structure.
    pub fn empty() -> Self {
        Self {
            nodes: BTreeMap::new(),
            springs: Vec::new(),
        }
    }

    /// Number of nodes currently in the structure.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of springs currently in the structure.
    pub fn spring_count(&self) -> usize {
        self.springs.len()
    }

    /// Look up a node by id.
    pub fn node(&self, id: u32) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// True if a node with this id is still present.
    pub fn contains_node(&self, id: u32) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Iterate nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Node ids in ascending order.
    pub fn node_ids(&self) -> Vec<u32> {
        self.nodes.keys().copied().collect()
    }

    /// All springs, in storage order.
    pub fn springs(&self) -> &[Spring] {
        &self.springs
    }

    /// Total mass: the sum of every remaining node's `mass`.
    pub fn total_mass(&self) -> f64 {
        self.nodes.values().map(|n| n.mass).sum()
    }

    /// Map from node id to its position in the sorted DOF ordering
    /// (node position index `p` -> DOFs `2p`, `2p+1`).
    pub fn id_to_position(&self) -> BTreeMap<u32, usize> {
        self.nodes.keys().enumerate().map(|(pos, &id)| (id, pos)).collect()
    }

    /// Remove a node and every spring touching it. A no-op if the node is
    /// already absent.
    pub fn remove_node(&mut self, id: u32) {
        if self.nodes.remove(&id).is_none() {
            return;
        }
        self.springs.retain(|s| !s.touches(id));
    }

    /// Remove a batch of nodes in one pass (cheaper than repeated
    /// `remove_node` calls — springs are filtered once).
    pub fn remove_nodes(&mut self, ids: &HashSet<u32>) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            self.nodes.remove(id);
        }
        self.springs.retain(|s| !ids.contains(&s.i) && !ids.contains(&s.j));
    }

    /// Adjacency map: node id -> set of neighbor ids, derived from the
    /// current spring list. Recomputed on demand; never cached on the
    /// structure itself since it would go stale on every removal.
    pub fn adjacency(&self) -> BTreeMap<u32, HashSet<u32>> {
        let mut adj: BTreeMap<u32, HashSet<u32>> =
            self.nodes.keys().map(|&id| (id, HashSet::new())).collect();
        for s in &self.springs {
            if self.nodes.contains_key(&s.i) && self.nodes.contains_key(&s.j) {
                adj.entry(s.i).or_default().insert(s.j);
                adj.entry(s.j).or_default().insert(s.i);
            }
        }
        adj
    }

    /// Degree of a node (0 if absent).
    pub fn degree(&self, id: u32) -> usize {
        self.springs.iter().filter(|s| s.touches(id)).count()
    }
}
