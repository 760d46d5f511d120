//! Insert ordering for SQLModel Session flushes.
//!
//! Before new rows are written, the pending inserts of a flush are put into
//! an order that
//! - inserts every referenced row before the rows referencing it, and
//! - keeps rows of the same table together, so each table run can be sent
//!   as one batched INSERT.
//!
//! The scheduler is a Kahn-style topological sort with a table cursor: it
//! keeps extending the current table run while that table has ready rows,
//! and only switches tables when it has to. Dependency order always wins;
//! contiguity is best effort.

use crate::ObjectKey;
use crate::dependency::DependencyGraph;
use crate::flush::{FlushConfig, OrderedInserts, PendingInsert};
use sqlmodel_core::{ConfigError, Error, FlushError, FlushErrorKind};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Error type for insert ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderingError {
    /// Pending inserts depend on each other in a cycle, so no valid order exists.
    CycleDetected {
        /// Objects along one cycle, in "must precede" order.
        keys: Vec<ObjectKey>,
        /// Tables of those objects.
        tables: Vec<&'static str>,
        /// Number of pending inserts that could not be placed.
        unplaced: usize,
    },
    /// The same object was queued for insertion twice.
    DuplicateKey {
        /// The object key.
        key: ObjectKey,
        /// Table of the second occurrence.
        table: &'static str,
        /// Position of the first occurrence in the flush.
        first: usize,
        /// Position of the second occurrence in the flush.
        second: usize,
    },
}

impl std::fmt::Display for OrderingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderingError::CycleDetected {
                tables, unplaced, ..
            } => {
                write!(
                    f,
                    "Dependency cycle between pending inserts: {} ({} inserts could not be ordered)",
                    tables.join(" -> "),
                    unplaced
                )
            }
            OrderingError::DuplicateKey {
                key,
                table,
                first,
                second,
            } => {
                write!(
                    f,
                    "Object {:?} queued for insertion into {} twice (positions {} and {})",
                    key, table, first, second
                )
            }
        }
    }
}

impl std::error::Error for OrderingError {}

impl From<OrderingError> for Error {
    fn from(e: OrderingError) -> Self {
        let (kind, tables) = match &e {
            OrderingError::CycleDetected { tables, .. } => {
                (FlushErrorKind::DependencyCycle, tables.clone())
            }
            OrderingError::DuplicateKey { table, .. } => (FlushErrorKind::DuplicateKey, vec![*table]),
        };
        Error::Flush(FlushError::new(kind, e.to_string()).with_tables(tables))
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Ready nodes, bucketed by table and ordered by sequence number.
///
/// Tables without ready nodes are not kept in the map.
#[derive(Debug, Default)]
struct ReadySet {
    by_table: HashMap<&'static str, BTreeSet<usize>>,
}

impl ReadySet {
    fn insert(&mut self, table: &'static str, seq: usize) {
        self.by_table.entry(table).or_default().insert(seq);
    }

    fn pop_first(&mut self, table: &str) -> Option<usize> {
        let ready = self.by_table.get_mut(table)?;
        let seq = ready.pop_first()?;
        if ready.is_empty() {
            self.by_table.remove(table);
        }
        Some(seq)
    }

    /// Pick the table to start the next run with.
    ///
    /// Ranked by: no unplaced row of the table waits on another table, then
    /// the number of ready rows (counting at most `lookahead`), then the
    /// earliest ready row. Sequence numbers are unique, so the ranking is
    /// total.
    ///
    /// A table none of whose rows waits on another table can be drained in
    /// one run: its remaining rows only depend on each other.
    fn best_new_table(
        &self,
        blocked: &HashMap<&'static str, usize>,
        lookahead: usize,
    ) -> Option<&'static str> {
        self.by_table
            .iter()
            .max_by_key(|(table, ready)| {
                let complete = blocked.get(*table).copied().unwrap_or(0) == 0;
                let first = ready.first().copied().unwrap_or(usize::MAX);
                (complete, ready.len().min(lookahead), Reverse(first))
            })
            .map(|(table, _)| *table)
    }
}

/// Compute an insert order for `graph`.
///
/// Returns node indices (sequence numbers) in insert order. `lookahead` caps
/// how many ready rows count toward a table when choosing which run to start
/// next; it is usually the flush batch size.
///
/// Fails with [`OrderingError::CycleDetected`] if the graph contains a cycle;
/// no partial order is returned in that case.
pub fn schedule(graph: &DependencyGraph, lookahead: usize) -> Result<Vec<usize>, OrderingError> {
    let nodes = graph.nodes();
    let lookahead = lookahead.max(1);

    let mut in_degree: Vec<usize> = nodes.iter().map(|node| node.dependencies.len()).collect();
    // Unplaced dependencies of each node that live in another table.
    let mut foreign: Vec<usize> = nodes
        .iter()
        .map(|node| {
            node.dependencies
                .iter()
                .filter(|&&dep| nodes[dep].table != node.table)
                .count()
        })
        .collect();
    // Per table, unplaced rows with at least one foreign dependency left.
    let mut blocked: HashMap<&'static str, usize> = HashMap::new();
    let mut ready = ReadySet::default();

    for (seq, node) in nodes.iter().enumerate() {
        if foreign[seq] > 0 {
            *blocked.entry(node.table).or_insert(0) += 1;
        }
        if in_degree[seq] == 0 {
            ready.insert(node.table, seq);
        }
    }

    let mut order = Vec::with_capacity(nodes.len());
    let mut current: Option<&'static str> = None;

    loop {
        let next = match current.and_then(|table| ready.pop_first(table)) {
            Some(seq) => Some(seq),
            None => match ready.best_new_table(&blocked, lookahead) {
                Some(table) => {
                    tracing::trace!(table = table, position = order.len(), "Starting insert run");
                    current = Some(table);
                    ready.pop_first(table)
                }
                None => None,
            },
        };
        let Some(seq) = next else {
            break;
        };

        let table = nodes[seq].table;
        order.push(seq);

        for &dependent in graph.dependents_of(seq) {
            let dependent_table = nodes[dependent].table;
            if dependent_table != table {
                foreign[dependent] -= 1;
                if foreign[dependent] == 0 {
                    if let Some(count) = blocked.get_mut(dependent_table) {
                        *count -= 1;
                    }
                }
            }
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(nodes[dependent].table, dependent);
            }
        }
    }

    if order.len() < nodes.len() {
        let err = cycle_error(graph, &in_degree, nodes.len() - order.len());
        tracing::warn!(error = %err, "Insert order could not be computed");
        return Err(err);
    }

    Ok(order)
}

/// Describe one cycle among the nodes left unplaced.
///
/// Every unplaced node still has an unplaced dependency, so walking
/// dependencies from any of them must revisit a node.
fn cycle_error(graph: &DependencyGraph, in_degree: &[usize], unplaced: usize) -> OrderingError {
    let mut path: Vec<usize> = Vec::new();
    let mut seen: HashMap<usize, usize> = HashMap::new();
    let mut cursor = in_degree.iter().position(|&degree| degree > 0);

    while let Some(seq) = cursor {
        if let Some(&pos) = seen.get(&seq) {
            path.drain(..pos);
            break;
        }
        seen.insert(seq, path.len());
        path.push(seq);
        cursor = graph
            .dependencies_of(seq)
            .iter()
            .copied()
            .find(|&dep| in_degree[dep] > 0);
    }

    // The walk followed dependencies; report parents first.
    path.reverse();

    let nodes = graph.nodes();
    OrderingError::CycleDetected {
        keys: path.iter().map(|&seq| nodes[seq].key).collect(),
        tables: path.iter().map(|&seq| nodes[seq].table).collect(),
        unplaced,
    }
}

// ============================================================================
// Insert Orderer
// ============================================================================

/// Orders the pending inserts of a flush.
///
/// Combines dependency graph construction and scheduling behind one call.
/// Holds no state between flushes; one orderer can be shared by many
/// sessions.
#[derive(Debug, Clone, Default)]
pub struct InsertOrderer {
    config: FlushConfig,
}

impl InsertOrderer {
    /// Create a new insert orderer.
    ///
    /// A zero batch size is treated as one row per batch.
    pub fn new(config: FlushConfig) -> Self {
        Self { config }
    }

    /// Create a new insert orderer, rejecting an invalid configuration.
    pub fn try_new(config: FlushConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the flush configuration.
    pub fn config(&self) -> &FlushConfig {
        &self.config
    }

    /// Order inserts for a flush with no previously persisted rows.
    pub fn order<T>(
        &self,
        inserts: Vec<PendingInsert<T>>,
    ) -> Result<OrderedInserts<T>, OrderingError> {
        self.order_with_persisted(inserts, &HashSet::new())
    }

    /// Order inserts, treating references to `persisted` keys as satisfied.
    ///
    /// With `order_inserts` disabled the original order is kept, but
    /// duplicate keys are still rejected.
    #[tracing::instrument(level = "debug", skip_all, fields(rows = inserts.len()))]
    pub fn order_with_persisted<T>(
        &self,
        inserts: Vec<PendingInsert<T>>,
        persisted: &HashSet<ObjectKey>,
    ) -> Result<OrderedInserts<T>, OrderingError> {
        let batch_size = self.config.effective_batch_size();
        let graph = DependencyGraph::build_with_persisted(&inserts, persisted)?;
        let report = *graph.report();

        if !self.config.order_inserts {
            tracing::debug!("Insert ordering disabled; keeping flush order");
            return Ok(OrderedInserts::new(inserts, batch_size, report));
        }

        let order = schedule(&graph, batch_size)?;
        let ordered = OrderedInserts::new(permute(inserts, &order), batch_size, report);

        let stats = ordered.stats();
        tracing::debug!(
            rows = stats.rows,
            runs = stats.runs,
            batches = stats.batches,
            longest_run = stats.longest_run,
            edges = stats.edges,
            dropped_external = stats.dropped_external,
            dropped_unresolved = stats.dropped_unresolved,
            "Ordered pending inserts"
        );

        Ok(ordered)
    }
}

/// Rearrange `inserts` so that position `i` holds `inserts[order[i]]`.
fn permute<T>(inserts: Vec<PendingInsert<T>>, order: &[usize]) -> Vec<PendingInsert<T>> {
    let mut slots: Vec<Option<PendingInsert<T>>> = inserts.into_iter().map(Some).collect();
    order.iter().filter_map(|&seq| slots[seq].take()).collect()
}
