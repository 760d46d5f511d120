//! Flush planning types for SQLModel Session.
//!
//! This module holds the pieces on either side of insert ordering:
//! - `PendingInsert`: one new row queued for the next flush
//! - `FlushConfig`: batch size and ordering switch
//! - `OrderedInserts`: the ordered rows, grouped by table into batches
//!
//! Rows are batched by table for performance: every contiguous run of rows
//! targeting the same table becomes one multi-row INSERT, split at the
//! configured batch size.

use crate::ObjectKey;
use crate::dependency::BuildReport;
use serde::{Deserialize, Serialize};
use sqlmodel_core::ConfigError;

/// Default number of rows per batched INSERT.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// A new row waiting to be inserted during the next flush.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInsert<T> {
    /// Object key for identity map.
    pub key: ObjectKey,
    /// Table name.
    pub table: &'static str,
    /// Objects this row points to through non-null foreign keys.
    pub references: Vec<ObjectKey>,
    /// Row payload (columns and values), carried through untouched.
    pub row: T,
}

impl<T> PendingInsert<T> {
    /// Create a pending insert with no references.
    pub fn new(key: ObjectKey, table: &'static str, row: T) -> Self {
        Self {
            key,
            table,
            references: Vec::new(),
            row,
        }
    }

    /// Record a foreign-key reference to another object (builder pattern).
    #[must_use]
    pub fn depends_on(mut self, key: ObjectKey) -> Self {
        self.references.push(key);
        self
    }

    /// Record several foreign-key references (builder pattern).
    #[must_use]
    pub fn with_references(mut self, keys: impl IntoIterator<Item = ObjectKey>) -> Self {
        self.references.extend(keys);
        self
    }

    /// Consume the descriptor and return its row payload.
    pub fn into_row(self) -> T {
        self.row
    }
}

// ============================================================================
// Flush Configuration
// ============================================================================

/// Configuration for flush planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Maximum number of rows per batched INSERT.
    ///
    /// The insert scheduler also uses it as its lookahead: when picking the
    /// next table to start a run with, it never counts more ready rows than
    /// fit into one batch.
    pub batch_size: usize,
    /// Whether to reorder inserts by dependency and table before flushing.
    pub order_inserts: bool,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            order_inserts: true,
        }
    }
}

impl FlushConfig {
    /// Create a new flush configuration with the given batch size.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Default::default()
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// Enable/disable insert ordering.
    #[must_use]
    pub fn order_inserts(mut self, enabled: bool) -> Self {
        self.order_inserts = enabled;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::new("flush batch_size must be at least 1"));
        }
        Ok(())
    }

    /// Batch size with a zero value clamped to one row per batch.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

// ============================================================================
// Ordered Inserts and Batches
// ============================================================================

/// A contiguous group of ordered inserts targeting the same table.
#[derive(Debug)]
pub struct InsertBatch<'a, T> {
    /// Table name shared by every row of the batch.
    pub table: &'static str,
    /// Rows of the batch, in insert order.
    pub rows: &'a [PendingInsert<T>],
}

impl<T> InsertBatch<'_, T> {
    /// Number of rows in the batch.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Object keys of the batch rows.
    pub fn keys(&self) -> impl Iterator<Item = ObjectKey> + '_ {
        self.rows.iter().map(|insert| insert.key)
    }
}

/// Summary of an ordering, for logging and diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderStats {
    /// Number of rows ordered.
    pub rows: usize,
    /// Number of maximal same-table runs.
    pub runs: usize,
    /// Number of batches after splitting runs at the batch size.
    pub batches: usize,
    /// Length of the longest run.
    pub longest_run: usize,
    /// Dependency edges inside the flush.
    pub edges: usize,
    /// References to rows persisted by an earlier flush.
    pub dropped_external: usize,
    /// References to rows that are neither pending nor known to be persisted.
    pub dropped_unresolved: usize,
}

/// Pending inserts in flush order.
#[derive(Debug, Clone)]
pub struct OrderedInserts<T> {
    inserts: Vec<PendingInsert<T>>,
    batch_size: usize,
    report: BuildReport,
}

impl<T> OrderedInserts<T> {
    pub(crate) fn new(inserts: Vec<PendingInsert<T>>, batch_size: usize, report: BuildReport) -> Self {
        Self {
            inserts,
            batch_size: batch_size.max(1),
            report,
        }
    }

    /// Number of ordered inserts.
    pub fn len(&self) -> usize {
        self.inserts.len()
    }

    /// Check if there is nothing to insert.
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty()
    }

    /// The ordered inserts as a slice.
    pub fn as_slice(&self) -> &[PendingInsert<T>] {
        &self.inserts
    }

    /// Iterate over the inserts in flush order.
    pub fn iter(&self) -> std::slice::Iter<'_, PendingInsert<T>> {
        self.inserts.iter()
    }

    /// Take the ordered inserts.
    pub fn into_inner(self) -> Vec<PendingInsert<T>> {
        self.inserts
    }

    /// Graph construction counters for this ordering.
    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// Group inserts into maximal same-table runs.
    pub fn runs(&self) -> Vec<InsertBatch<'_, T>> {
        batch_by_table(&self.inserts)
    }

    /// Group inserts into same-table batches of at most `batch_size` rows.
    pub fn batches(&self) -> Vec<InsertBatch<'_, T>> {
        self.runs()
            .into_iter()
            .flat_map(|run| {
                run.rows.chunks(self.batch_size).map(move |rows| InsertBatch {
                    table: run.table,
                    rows,
                })
            })
            .collect()
    }

    /// Summarize the ordering.
    pub fn stats(&self) -> OrderStats {
        let runs = self.runs();
        OrderStats {
            rows: self.inserts.len(),
            runs: runs.len(),
            batches: runs
                .iter()
                .map(|run| run.len().div_ceil(self.batch_size))
                .sum(),
            longest_run: runs.iter().map(InsertBatch::len).max().unwrap_or(0),
            edges: self.report.edges,
            dropped_external: self.report.external,
            dropped_unresolved: self.report.unresolved,
        }
    }
}

impl<T> IntoIterator for OrderedInserts<T> {
    type Item = PendingInsert<T>;
    type IntoIter = std::vec::IntoIter<PendingInsert<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.inserts.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a OrderedInserts<T> {
    type Item = &'a PendingInsert<T>;
    type IntoIter = std::slice::Iter<'a, PendingInsert<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.inserts.iter()
    }
}

/// Group consecutive inserts by table name.
fn batch_by_table<T>(inserts: &[PendingInsert<T>]) -> Vec<InsertBatch<'_, T>> {
    let mut batches = Vec::new();
    let mut start = 0;

    for end in 1..=inserts.len() {
        if end == inserts.len() || inserts[end].table != inserts[start].table {
            batches.push(InsertBatch {
                table: inserts[start].table,
                rows: &inserts[start..end],
            });
            start = end;
        }
    }

    batches
}
