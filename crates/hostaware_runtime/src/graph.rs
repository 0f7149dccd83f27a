//! Instance Dependency Graph
//!
//! Tracks which instances depend on which and keeps an incrementally updated
//! "available" flag per instance. An instance is available when every instance
//! it depends on exists and is itself available.
//!
//! # Design
//!
//! - Nodes live in a slab arena addressed by index, looked up by name
//! - Each node owns its outgoing edges (`from -> to`, "from depends on to")
//! - An in-edge index maps a target name to the instances that depend on it,
//!   including targets that do not exist yet
//! - Availability changes propagate breadth-first with a visited set, so the
//!   cost of an update is bounded by the region it affects
//!
//! Cycles are never available: the flags always equal the least fixed point
//! of the availability rule.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::error;

/// One `from -> to` dependency as reported by queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    /// `to` exists and is available
    pub resolved: bool,
    /// `to` exists in the graph
    pub present: bool,
}

#[derive(Debug, Clone)]
struct Edge {
    to: String,
    resolved: bool,
}

#[derive(Debug)]
struct Node {
    name: String,
    deps: Vec<Edge>,
    /// Number of resolved edges in `deps`
    satisfied: usize,
    available: bool,
}

impl Node {
    fn edge_mut(&mut self, to: &str) -> Option<&mut Edge> {
        self.deps.iter_mut().find(|edge| edge.to == to)
    }
}

/// Incrementally maintained instance dependency graph
#[derive(Debug, Default)]
pub struct DependencyGraph {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    /// target -> instances that declare an edge to it
    dependents: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.node(name).is_some_and(|node| node.available)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────────

    /// Add an instance with its declared dependencies
    ///
    /// Dependents already waiting on `name` become available if this node is.
    /// Returns `false` if the name is already present.
    pub fn add_instance<I, S>(&mut self, name: &str, deps: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.contains(name) {
            return false;
        }

        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        for dep in deps {
            let to: String = dep.into();
            if !seen.insert(to.clone()) {
                continue;
            }
            // A node that is not in the graph yet cannot be available, which
            // also leaves a self-dependency unresolved.
            let resolved = self.is_available(&to);
            self.dependents
                .entry(to.clone())
                .or_default()
                .insert(name.to_string());
            edges.push(Edge { to, resolved });
        }

        let satisfied = edges.iter().filter(|edge| edge.resolved).count();
        let available = satisfied == edges.len();
        let node = Node {
            name: name.to_string(),
            deps: edges,
            satisfied,
            available,
        };

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.index.insert(name.to_string(), slot);

        if available {
            self.propagate_available(name);
        }
        true
    }

    /// Remove an instance
    ///
    /// Instances that depend on it keep their edges (now pointing at a missing
    /// node) and become unavailable. Returns `false` if the name is unknown.
    pub fn delete_instance(&mut self, name: &str) -> bool {
        let Some(slot) = self.index.remove(name) else {
            return false;
        };
        let Some(node) = self.slots[slot].take() else {
            return false;
        };
        self.free.push(slot);

        for edge in &node.deps {
            if let Some(sources) = self.dependents.get_mut(&edge.to) {
                sources.remove(name);
                if sources.is_empty() {
                    self.dependents.remove(&edge.to);
                }
            }
        }

        if node.available {
            self.propagate_unavailable(name);
        }
        true
    }

    /// Declare that `from` depends on `to`
    ///
    /// An edge that would close a cycle through available nodes is recorded
    /// but never resolved. Returns `false` if `from` is unknown or the edge
    /// already exists.
    pub fn add_edge(&mut self, from: &str, to: &str) -> bool {
        let resolved = self.is_available(to) && !self.reaches(to, from);
        let Some(node) = self.node_mut(from) else {
            return false;
        };
        if node.deps.iter().any(|edge| edge.to == to) {
            return false;
        }

        let was_available = node.available;
        node.deps.push(Edge {
            to: to.to_string(),
            resolved,
        });
        if resolved {
            node.satisfied += 1;
        }
        node.available = node.satisfied == node.deps.len();
        let now_available = node.available;

        self.dependents
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());

        if was_available && !now_available {
            self.propagate_unavailable(from);
        }
        true
    }

    /// Remove the `from -> to` edge. Returns `false` if it did not exist.
    pub fn delete_edge(&mut self, from: &str, to: &str) -> bool {
        let Some(node) = self.node_mut(from) else {
            return false;
        };
        let Some(pos) = node.deps.iter().position(|edge| edge.to == to) else {
            return false;
        };

        let edge = node.deps.remove(pos);
        if edge.resolved {
            node.satisfied -= 1;
        }
        let became_available = !node.available && node.satisfied == node.deps.len();
        if became_available {
            node.available = true;
        }

        if let Some(sources) = self.dependents.get_mut(to) {
            sources.remove(from);
            if sources.is_empty() {
                self.dependents.remove(to);
            }
        }

        if became_available {
            self.propagate_available(from);
        }
        true
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Direct dependencies of `name`, or `None` if it is not in the graph
    pub fn query_dependencies(&self, name: &str) -> Option<Vec<DependencyEdge>> {
        let node = self.node(name)?;
        Some(self.edges_of(node))
    }

    /// Every edge in the graph, grouped by source in name order
    pub fn query_all_dependencies(&self) -> Vec<DependencyEdge> {
        let mut nodes: Vec<&Node> = self.slots.iter().flatten().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes.into_iter().flat_map(|node| self.edges_of(node)).collect()
    }

    /// Everything `name` depends on, directly or transitively, in BFS order
    ///
    /// Missing targets are included; they terminate their branch.
    pub fn transitive_dependencies(&self, name: &str) -> Vec<String> {
        let mut visited = HashSet::from([name.to_string()]);
        let mut queue = VecDeque::from([name.to_string()]);
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            let Some(node) = self.node(&current) else {
                continue;
            };
            for edge in &node.deps {
                if visited.insert(edge.to.clone()) {
                    result.push(edge.to.clone());
                    queue.push_back(edge.to.clone());
                }
            }
        }
        result
    }

    /// Instances that declare a direct dependency on `name`
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.dependents
            .get(name)
            .map(|sources| sources.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct dependencies of `name` that are missing or unavailable
    pub fn unresolved_dependencies(&self, name: &str) -> Vec<String> {
        self.node(name)
            .map(|node| {
                node.deps
                    .iter()
                    .filter(|edge| !edge.resolved)
                    .map(|edge| edge.to.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn node(&self, name: &str) -> Option<&Node> {
        let slot = *self.index.get(name)?;
        self.slots.get(slot)?.as_ref()
    }

    fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        let slot = *self.index.get(name)?;
        self.slots.get_mut(slot)?.as_mut()
    }

    fn edges_of(&self, node: &Node) -> Vec<DependencyEdge> {
        node.deps
            .iter()
            .map(|edge| DependencyEdge {
                from: node.name.clone(),
                to: edge.to.clone(),
                resolved: edge.resolved,
                present: self.contains(&edge.to),
            })
            .collect()
    }

    /// Whether `target` is reachable from `start` along dependency edges
    fn reaches(&self, start: &str, target: &str) -> bool {
        if start == target {
            return true;
        }
        let mut visited = HashSet::from([start]);
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            for edge in &node.deps {
                if edge.to == target {
                    return true;
                }
                if visited.insert(edge.to.as_str()) {
                    stack.push(edge.to.as_str());
                }
            }
        }
        false
    }

    /// `start` just became available: resolve edges pointing at it and
    /// promote dependents whose edges are now all resolved.
    fn propagate_available(&mut self, start: &str) {
        let mut visited = HashSet::from([start.to_string()]);
        let mut queue = VecDeque::from([start.to_string()]);

        while let Some(current) = queue.pop_front() {
            for source in self.dependents_of(&current) {
                let Some(node) = self.node_mut(&source) else {
                    continue;
                };
                let Some(edge) = node.edge_mut(&current) else {
                    continue;
                };
                if edge.resolved {
                    continue;
                }
                edge.resolved = true;
                node.satisfied += 1;

                if !node.available && node.satisfied == node.deps.len() {
                    node.available = true;
                    if visited.insert(source.clone()) {
                        queue.push_back(source);
                    }
                }
            }
        }
    }

    /// `start` just became unavailable or was removed: unresolve edges
    /// pointing at it and demote dependents.
    fn propagate_unavailable(&mut self, start: &str) {
        let mut visited = HashSet::from([start.to_string()]);
        let mut queue = VecDeque::from([start.to_string()]);

        while let Some(current) = queue.pop_front() {
            for source in self.dependents_of(&current) {
                let Some(node) = self.node_mut(&source) else {
                    continue;
                };
                let Some(edge) = node.edge_mut(&current) else {
                    continue;
                };
                if !edge.resolved {
                    continue;
                }
                edge.resolved = false;
                debug_assert!(node.satisfied > 0, "satisfied count underflow on {source}");
                if node.satisfied == 0 {
                    error!(instance = %source, dependency = %current, "Satisfied count underflow");
                } else {
                    node.satisfied -= 1;
                }

                if node.available {
                    node.available = false;
                    if visited.insert(source.clone()) {
                        queue.push_back(source);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Recompute availability from scratch as the least fixed point
    fn expected_available(graph: &DependencyGraph) -> BTreeSet<String> {
        let mut available = BTreeSet::new();
        loop {
            let mut changed = false;
            for node in graph.slots.iter().flatten() {
                if available.contains(&node.name) {
                    continue;
                }
                if node.deps.iter().all(|edge| available.contains(&edge.to)) {
                    available.insert(node.name.clone());
                    changed = true;
                }
            }
            if !changed {
                return available;
            }
        }
    }

    fn assert_consistent(graph: &DependencyGraph) {
        let expected = expected_available(graph);
        for node in graph.slots.iter().flatten() {
            assert_eq!(
                node.available,
                expected.contains(&node.name),
                "availability of {} diverged",
                node.name
            );
            let resolved = node.deps.iter().filter(|edge| edge.resolved).count();
            assert_eq!(node.satisfied, resolved, "satisfied count of {}", node.name);
            for edge in &node.deps {
                assert_eq!(edge.resolved, graph.is_available(&edge.to));
            }
        }
    }

    #[test]
    fn test_chain_becomes_available_bottom_up() {
        let mut graph = DependencyGraph::new();
        graph.add_instance("C", ["B"]);
        graph.add_instance("B", ["A"]);
        assert!(!graph.is_available("B"));
        assert!(!graph.is_available("C"));

        graph.add_instance("A", Vec::<String>::new());
        assert!(graph.is_available("A"));
        assert!(graph.is_available("B"));
        assert!(graph.is_available("C"));
        assert_consistent(&graph);
    }

    #[test]
    fn test_delete_keeps_dependent_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_instance("A", Vec::<String>::new());
        graph.add_instance("B", ["A"]);
        graph.add_instance("C", ["B"]);

        assert!(graph.delete_instance("A"));
        assert!(!graph.is_available("B"));
        assert!(!graph.is_available("C"));

        let deps = graph.query_dependencies("B").unwrap();
        assert_eq!(
            deps,
            vec![DependencyEdge {
                from: "B".into(),
                to: "A".into(),
                resolved: false,
                present: false,
            }]
        );

        graph.add_instance("A", Vec::<String>::new());
        assert!(graph.is_available("C"));
        assert_consistent(&graph);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "satisfied count underflow"))]
    fn test_corrupted_count_is_left_alone() {
        let mut graph = DependencyGraph::new();
        graph.add_instance("A", Vec::<String>::new());
        graph.add_instance("B", ["A"]);
        assert!(graph.is_available("B"));

        if let Some(node) = graph.node_mut("B") {
            node.satisfied = 0;
        }
        graph.delete_instance("A");

        let node = graph.node("B").unwrap();
        assert_eq!(node.satisfied, 0);
        assert!(!node.available);
    }

    #[test]
    fn test_cycle_is_never_available() {
        let mut graph = DependencyGraph::new();
        graph.add_instance("A", ["B"]);
        graph.add_instance("B", ["A"]);
        assert!(!graph.is_available("A"));
        assert!(!graph.is_available("B"));

        graph.add_instance("S", ["S"]);
        assert!(!graph.is_available("S"));
        assert_consistent(&graph);
    }

    #[test]
    fn test_add_edge_closing_cycle_demotes_members() {
        let mut graph = DependencyGraph::new();
        graph.add_instance("A", Vec::<String>::new());
        graph.add_instance("B", ["A"]);
        graph.add_instance("C", ["B"]);
        assert!(graph.is_available("C"));

        assert!(graph.add_edge("A", "C"));
        assert!(!graph.is_available("A"));
        assert!(!graph.is_available("B"));
        assert!(!graph.is_available("C"));
        assert_consistent(&graph);

        assert!(graph.delete_edge("A", "C"));
        assert!(graph.is_available("C"));
        assert_consistent(&graph);
    }

    #[test]
    fn test_edge_to_missing_node() {
        let mut graph = DependencyGraph::new();
        graph.add_instance("A", Vec::<String>::new());
        assert!(graph.add_edge("A", "ghost"));
        assert!(!graph.add_edge("A", "ghost"));
        assert!(!graph.is_available("A"));
        assert_eq!(graph.unresolved_dependencies("A"), vec!["ghost"]);
        assert!(!graph.add_edge("nobody", "A"));
    }

    #[test]
    fn test_transitive_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.add_instance("tune", ["scenario", "pmu"]);
        graph.add_instance("scenario", ["pmu", "loadavg"]);
        graph.add_instance("pmu", Vec::<String>::new());

        assert_eq!(
            graph.transitive_dependencies("tune"),
            vec!["scenario", "pmu", "loadavg"]
        );
        assert!(graph.transitive_dependencies("pmu").is_empty());
        assert_eq!(graph.dependents_of("pmu"), vec!["scenario", "tune"]);
        assert_eq!(graph.query_all_dependencies().len(), 4);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut graph = DependencyGraph::new();
        assert!(graph.add_instance("A", ["B", "B"]));
        assert!(!graph.add_instance("A", Vec::<String>::new()));
        assert_eq!(graph.query_dependencies("A").unwrap().len(), 1);
        assert!(!graph.delete_instance("missing"));
    }

    #[test]
    fn test_random_operations_match_fixed_point() {
        const NAMES: [&str; 7] = ["a", "b", "c", "d", "e", "f", "g"];
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut graph = DependencyGraph::new();

        for _ in 0..2000 {
            let name = NAMES[rng.gen_range(0..NAMES.len())];
            let other = NAMES[rng.gen_range(0..NAMES.len())];
            match rng.gen_range(0..4) {
                0 => {
                    let deps: Vec<&str> = NAMES
                        .iter()
                        .copied()
                        .filter(|_| rng.gen_bool(0.25))
                        .collect();
                    graph.add_instance(name, deps);
                }
                1 => {
                    graph.delete_instance(name);
                }
                2 => {
                    graph.add_edge(name, other);
                }
                _ => {
                    graph.delete_edge(name, other);
                }
            }
            assert_consistent(&graph);
        }
    }
}
