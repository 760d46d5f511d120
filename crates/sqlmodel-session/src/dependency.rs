//! Dependency graph construction for insert ordering.
//!
//! Every pending insert of a flush becomes one node, identified by its
//! position in the original flush order. A foreign-key reference from row B
//! to row A becomes an edge A -> B ("A must be inserted before B") when A is
//! part of the same flush. References to rows that already exist in the
//! database impose no ordering and are dropped.

use crate::ObjectKey;
use crate::flush::PendingInsert;
use crate::insert_order::OrderingError;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// One pending insert inside the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    /// Object key of the pending insert.
    pub key: ObjectKey,
    /// Table name.
    pub table: &'static str,
    /// Nodes that must be inserted before this one (ascending, no duplicates).
    pub dependencies: Vec<usize>,
}

/// Counters collected while resolving references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Edges between rows of the same flush.
    pub edges: usize,
    /// References to rows persisted by an earlier flush.
    pub external: usize,
    /// References that could not be resolved at all.
    pub unresolved: usize,
    /// References from a row to itself.
    pub self_references: usize,
}

/// Directed "must precede" graph over the pending inserts of one flush.
///
/// Node indices are positions in the original flush order, so a node's
/// index doubles as its sequence number.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    /// Node -> nodes unblocked by inserting it (ascending).
    dependents: Vec<Vec<usize>>,
    report: BuildReport,
}

impl DependencyGraph {
    /// Build the graph for a flush with no previously persisted rows.
    pub fn build<T>(inserts: &[PendingInsert<T>]) -> Result<Self, OrderingError> {
        Self::build_with_persisted(inserts, &HashSet::new())
    }

    /// Build the graph, treating references to `persisted` keys as already
    /// satisfied.
    ///
    /// Fails if two inserts share the same key. References that are neither
    /// pending nor persisted are dropped with a warning; the database will
    /// report the resulting foreign-key violation.
    #[tracing::instrument(level = "trace", skip_all, fields(rows = inserts.len()))]
    pub fn build_with_persisted<T>(
        inserts: &[PendingInsert<T>],
        persisted: &HashSet<ObjectKey>,
    ) -> Result<Self, OrderingError> {
        let mut index: HashMap<ObjectKey, usize> = HashMap::with_capacity(inserts.len());
        for (seq, insert) in inserts.iter().enumerate() {
            match index.entry(insert.key) {
                Entry::Occupied(existing) => {
                    return Err(OrderingError::DuplicateKey {
                        key: insert.key,
                        table: insert.table,
                        first: *existing.get(),
                        second: seq,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(seq);
                }
            }
        }

        let mut report = BuildReport::default();
        let mut nodes = Vec::with_capacity(inserts.len());
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); inserts.len()];

        for (seq, insert) in inserts.iter().enumerate() {
            let mut dependencies = Vec::with_capacity(insert.references.len());

            for reference in &insert.references {
                match index.get(reference) {
                    Some(&dep) if dep == seq => report.self_references += 1,
                    Some(&dep) => dependencies.push(dep),
                    None if persisted.contains(reference) => report.external += 1,
                    None => {
                        report.unresolved += 1;
                        tracing::warn!(
                            table = insert.table,
                            key = ?insert.key,
                            reference = ?reference,
                            "Dropping reference to object that is neither pending nor persisted"
                        );
                    }
                }
            }

            dependencies.sort_unstable();
            dependencies.dedup();

            for &dep in &dependencies {
                dependents[dep].push(seq);
            }
            report.edges += dependencies.len();

            nodes.push(GraphNode {
                key: insert.key,
                table: insert.table,
                dependencies,
            });
        }

        tracing::trace!(
            nodes = nodes.len(),
            edges = report.edges,
            external = report.external,
            unresolved = report.unresolved,
            "Built insert dependency graph"
        );

        Ok(Self {
            nodes,
            dependents,
            report,
        })
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes, in original flush order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Get a node by sequence number.
    pub fn node(&self, seq: usize) -> Option<&GraphNode> {
        self.nodes.get(seq)
    }

    /// Nodes that must precede `seq`.
    pub fn dependencies_of(&self, seq: usize) -> &[usize] {
        match self.nodes.get(seq) {
            Some(node) => &node.dependencies,
            None => &[],
        }
    }

    /// Nodes that wait on `seq`.
    pub fn dependents_of(&self, seq: usize) -> &[usize] {
        match self.dependents.get(seq) {
            Some(dependents) => dependents,
            None => &[],
        }
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.report.edges
    }

    /// Counters collected while resolving references.
    pub fn report(&self) -> &BuildReport {
        &self.report
    }
}
