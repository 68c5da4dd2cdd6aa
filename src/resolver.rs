//! Dependency graph resolution.
//!
//! Computes an initialization order over registered services with a
//! depth-first traversal using white/grey/black marking. Reaching a grey node
//! means a back-edge, so the traversal stack from that node onward is the
//! cycle. Roots are visited in registration order and edges in declaration
//! order, which makes the output deterministic.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::{CorewireError, Result};
use crate::registry::ServiceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Grey,
    Black,
}

/// Result of walking the whole graph.
#[derive(Debug, Default)]
pub(crate) struct GraphAnalysis {
    /// Dependencies before dependents. Only meaningful when `errors` is empty.
    pub order: Vec<String>,
    /// Cycles first, then missing dependencies, each in discovery order.
    pub errors: Vec<CorewireError>,
}

struct Walker<'a> {
    nodes: &'a [(String, Vec<String>)],
    index: HashMap<&'a str, usize>,
    marks: Vec<Mark>,
    stack: Vec<usize>,
    order: Vec<String>,
    cycles: Vec<CorewireError>,
    seen_cycles: HashSet<Vec<String>>,
    missing: Vec<CorewireError>,
}

impl<'a> Walker<'a> {
    fn new(nodes: &'a [(String, Vec<String>)]) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.as_str(), i))
            .collect();
        Self {
            nodes,
            index,
            marks: vec![Mark::White; nodes.len()],
            stack: Vec::new(),
            order: Vec::with_capacity(nodes.len()),
            cycles: Vec::new(),
            seen_cycles: HashSet::new(),
            missing: Vec::new(),
        }
    }

    fn visit(&mut self, node: usize) {
        self.marks[node] = Mark::Grey;
        self.stack.push(node);

        let nodes = self.nodes;
        let (name, deps) = &nodes[node];
        for dep in deps {
            let Some(&next) = self.index.get(dep.as_str()) else {
                self.missing.push(CorewireError::MissingDependency {
                    service: name.clone(),
                    dependency: dep.clone(),
                });
                continue;
            };
            match self.marks[next] {
                Mark::White => self.visit(next),
                Mark::Grey => self.record_cycle(next),
                Mark::Black => {}
            }
        }

        self.stack.pop();
        self.marks[node] = Mark::Black;
        self.order.push(name.clone());
    }

    fn record_cycle(&mut self, back_to: usize) {
        let Some(start) = self.stack.iter().position(|&n| n == back_to) else {
            return;
        };
        let mut path: Vec<String> = self.stack[start..]
            .iter()
            .map(|&n| self.nodes[n].0.clone())
            .collect();

        // Same cycle found from another entry point is the same rotation.
        let mut key = path.clone();
        if let Some(min) = key.iter().enumerate().min_by(|a, b| a.1.cmp(b.1)).map(|(i, _)| i) {
            key.rotate_left(min);
        }
        if !self.seen_cycles.insert(key) {
            return;
        }

        path.push(self.nodes[back_to].0.clone());
        self.cycles.push(CorewireError::CircularDependency { path });
    }

    fn finish(mut self) -> GraphAnalysis {
        let mut errors = std::mem::take(&mut self.cycles);
        errors.append(&mut self.missing);
        GraphAnalysis {
            order: self.order,
            errors,
        }
    }
}

/// Walk `nodes` (name, declared dependencies) given in registration order.
pub(crate) fn analyze(nodes: &[(String, Vec<String>)]) -> GraphAnalysis {
    let mut walker = Walker::new(nodes);
    for root in 0..nodes.len() {
        if walker.marks[root] == Mark::White {
            walker.visit(root);
        }
    }
    walker.finish()
}

impl ServiceRegistry {
    fn graph_nodes(&self) -> Vec<(String, Vec<String>)> {
        self.records_in_order()
            .iter()
            .map(|r| (r.name().to_string(), r.dependencies().to_vec()))
            .collect()
    }

    /// Topological initialization order: every service after all of its dependencies.
    ///
    /// Fails with the first graph error (cycles are reported before missing
    /// dependencies).
    pub fn initialization_order(&self) -> Result<Vec<String>> {
        let analysis = analyze(&self.graph_nodes());
        match analysis.errors.into_iter().next() {
            Some(err) => {
                warn!(error = %err, "Dependency resolution failed");
                Err(err)
            }
            None => {
                debug!(order = ?analysis.order, "Resolved initialization order");
                Ok(analysis.order)
            }
        }
    }

    /// Every cycle and missing dependency in the current graph, without failing.
    pub fn validate_dependencies(&self) -> Vec<CorewireError> {
        let errors = analyze(&self.graph_nodes()).errors;
        for err in &errors {
            warn!(error = %err, "Dependency graph problem");
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> Vec<(String, Vec<String>)> {
        edges.iter()
            .map(|(name, deps)| {
                (
                    name.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_linear_chain() {
        let analysis = analyze(&graph(&[
            ("database", &["config", "logger"]),
            ("logger", &["config"]),
            ("config", &[]),
        ]));
        assert!(analysis.errors.is_empty());
        assert_eq!(analysis.order, vec!["config", "logger", "database"]);
    }

    #[test]
    fn test_independent_roots_keep_registration_order() {
        let analysis = analyze(&graph(&[("b", &[]), ("a", &[]), ("c", &[])]));
        assert_eq!(analysis.order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_diamond() {
        let analysis = analyze(&graph(&[
            ("app", &["left", "right"]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("base", &[]),
        ]));
        let order = analysis.order;
        assert_eq!(order.len(), 4);
        assert!(position(&order, "base") < position(&order, "left"));
        assert!(position(&order, "base") < position(&order, "right"));
        assert!(position(&order, "left") < position(&order, "app"));
        assert!(position(&order, "right") < position(&order, "app"));
    }

    #[test]
    fn test_three_node_cycle_path() {
        let analysis = analyze(&graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]));
        assert_eq!(analysis.errors.len(), 1);
        match &analysis.errors[0] {
            CorewireError::CircularDependency { path } => {
                assert_eq!(path, &vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let analysis = analyze(&graph(&[("loop", &["loop"])]));
        match &analysis.errors[0] {
            CorewireError::CircularDependency { path } => {
                assert_eq!(path, &vec!["loop", "loop"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_reported_once() {
        // Both `x` and `y` enter the same a <-> b cycle.
        let analysis = analyze(&graph(&[
            ("x", &["a"]),
            ("a", &["b"]),
            ("b", &["a"]),
            ("y", &["b"]),
        ]));
        let cycles = analysis
            .errors
            .iter()
            .filter(|e| matches!(e, CorewireError::CircularDependency { .. }))
            .count();
        assert_eq!(cycles, 1);
    }

    #[test]
    fn test_overlapping_cycles_reported_separately() {
        let analysis = analyze(&graph(&[
            ("a", &["b", "c"]),
            ("b", &["c", "a"]),
            ("c", &["a", "b"]),
        ]));
        let paths: Vec<Vec<String>> = analysis
            .errors
            .iter()
            .filter_map(|e| match e {
                CorewireError::CircularDependency { path } => Some(path.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            paths,
            vec![
                vec!["a", "b", "c", "a"],
                vec!["b", "c", "b"],
                vec!["a", "b", "a"],
            ]
        );
    }

    #[test]
    fn test_missing_dependency() {
        let analysis = analyze(&graph(&[("api", &["auth"])]));
        assert_eq!(analysis.errors.len(), 1);
        assert!(matches!(
            &analysis.errors[0],
            CorewireError::MissingDependency { service, dependency }
                if service == "api" && dependency == "auth"
        ));
    }

    #[test]
    fn test_cycles_listed_before_missing() {
        let analysis = analyze(&graph(&[
            ("api", &["auth"]),
            ("a", &["b"]),
            ("b", &["a"]),
        ]));
        assert_eq!(analysis.errors.len(), 2);
        assert!(matches!(
            analysis.errors[0],
            CorewireError::CircularDependency { .. }
        ));
        assert!(matches!(
            analysis.errors[1],
            CorewireError::MissingDependency { .. }
        ));
    }

    #[test]
    fn test_empty_graph() {
        let analysis = analyze(&[]);
        assert!(analysis.order.is_empty());
        assert!(analysis.errors.is_empty());
    }
}
