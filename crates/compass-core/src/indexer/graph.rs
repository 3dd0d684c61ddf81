//! File-level dependency graph built from resolved imports.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexSet;

use crate::indexer::imports::ModuleResolver;
use crate::models::FileRecord;

/// Directed import graph over project file paths.
///
/// Edges form a set: inserting an existing edge or a self-loop is a no-op.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    nodes: IndexSet<String>,
    forward: BTreeMap<String, BTreeSet<String>>,
    reverse: BTreeMap<String, BTreeSet<String>>,
    edge_count: usize,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every record as a node and add one edge per resolved target.
    pub fn build(records: &[FileRecord], resolver: &ModuleResolver) -> Self {
        let mut graph = Self::new();
        for record in records {
            graph.add_node(&record.path);
        }
        for record in records {
            for spec in &record.imports {
                for target in resolver.resolve(&record.path, spec) {
                    graph.add_edge(&record.path, &target);
                }
            }
        }
        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Built dependency graph"
        );
        graph
    }

    pub fn add_node(&mut self, path: &str) {
        if !self.nodes.contains(path) {
            self.nodes.insert(path.to_string());
        }
    }

    /// Returns whether a new edge was inserted.
    pub fn add_edge(&mut self, source: &str, target: &str) -> bool {
        if source == target {
            return false;
        }
        self.add_node(source);
        self.add_node(target);
        let inserted = self
            .forward
            .entry(source.to_string())
            .or_default()
            .insert(target.to_string());
        if inserted {
            self.reverse
                .entry(target.to_string())
                .or_default()
                .insert(source.to_string());
            self.edge_count += 1;
        }
        inserted
    }

    /// Files `path` imports.
    pub fn dependencies(&self, path: &str) -> Vec<&str> {
        Self::neighbours(&self.forward, path)
    }

    /// Files importing `path`.
    pub fn dependents(&self, path: &str) -> Vec<&str> {
        Self::neighbours(&self.reverse, path)
    }

    fn neighbours<'g>(adjacency: &'g BTreeMap<String, BTreeSet<String>>, path: &str) -> Vec<&'g str> {
        adjacency
            .get(path)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn out_degree(&self, path: &str) -> usize {
        self.forward.get(path).map_or(0, BTreeSet::len)
    }

    pub fn in_degree(&self, path: &str) -> usize {
        self.reverse.get(path).map_or(0, BTreeSet::len)
    }

    /// All edges as `(source, target)`, sorted.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.forward
            .iter()
            .flat_map(|(source, targets)| {
                targets
                    .iter()
                    .map(move |target| (source.as_str(), target.as_str()))
            })
            .collect()
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains(path)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuffixFallback;
    use crate::models::ImportSpec;

    fn record(path: &str, imports: Vec<ImportSpec>) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            language: "python".to_string(),
            content_hash: String::new(),
            size_bytes: 0,
            symbols: Vec::new(),
            imports,
            diagnostic: None,
        }
    }

    #[test]
    fn test_add_edge_is_idempotent_and_rejects_self_loops() {
        let mut graph = DependencyGraph::new();
        assert!(graph.add_edge("a.py", "b.py"));
        assert!(!graph.add_edge("a.py", "b.py"));
        assert!(!graph.add_edge("a.py", "a.py"));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.dependencies("a.py"), vec!["b.py"]);
        assert_eq!(graph.dependents("b.py"), vec!["a.py"]);
        assert!(graph.dependencies("b.py").is_empty());
        assert_eq!(graph.out_degree("a.py"), 1);
        assert_eq!(graph.in_degree("a.py"), 0);
    }

    #[test]
    fn test_edges_are_sorted() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("c.py", "a.py");
        graph.add_edge("a.py", "c.py");
        graph.add_edge("a.py", "b.py");
        assert_eq!(
            graph.edges(),
            vec![("a.py", "b.py"), ("a.py", "c.py"), ("c.py", "a.py")]
        );
    }

    #[test]
    fn test_build_from_records() {
        let records = vec![
            record(
                "pkg/__init__.py",
                vec![ImportSpec::from_import("", 1, vec!["sessions".to_string()], 1)],
            ),
            record("pkg/sessions.py", vec![ImportSpec::absolute("os", 1)]),
            record(
                "main.py",
                vec![
                    ImportSpec::absolute("pkg", 1),
                    ImportSpec::absolute("pkg.sessions", 2),
                    ImportSpec::absolute("pkg.sessions", 3),
                ],
            ),
            record("isolated.py", Vec::new()),
        ];
        let resolver = ModuleResolver::for_records(&records, SuffixFallback::FirstMatch);
        let graph = DependencyGraph::build(&records, &resolver);

        assert_eq!(graph.node_count(), 4);
        assert!(graph.contains("isolated.py"));
        assert_eq!(
            graph.edges(),
            vec![
                ("main.py", "pkg/__init__.py"),
                ("main.py", "pkg/sessions.py"),
                ("pkg/__init__.py", "pkg/sessions.py"),
            ]
        );
        assert_eq!(graph.dependents("pkg/sessions.py"), vec!["main.py", "pkg/__init__.py"]);
    }
}
