//! Session-side flush planning for SQLModel Rust.
//!
//! `sqlmodel-session` decides **in which order** pending inserts reach the
//! database. The session layer hands over every new row queued for a flush,
//! together with the rows it points to through foreign keys; this crate
//! returns the same rows reordered so that:
//!
//! - **Parents come first**: a row is never inserted before a row it references.
//! - **Tables stay together**: rows of the same table form long contiguous
//!   runs, so each run can be sent as a single multi-row `INSERT`.
//!
//! # Layout
//!
//! - [`flush`]: pending insert descriptors, flush configuration and batch grouping.
//! - [`dependency`]: builds the per-flush dependency graph.
//! - [`insert_order`]: the topological batch scheduler and its errors.
//!
//! # Example
//!
//! ```ignore
//! let orderer = InsertOrderer::new(FlushConfig::default().batch_size(100));
//!
//! let team = ObjectKey::new::<Team>(1);
//! let hero = ObjectKey::new::<Hero>(1);
//!
//! let ordered = orderer.order(vec![
//!     PendingInsert::new(hero, "heroes", hero_row).depends_on(team),
//!     PendingInsert::new(team, "teams", team_row),
//! ])?;
//!
//! for batch in ordered.batches() {
//!     // one INSERT ... VALUES (...), (...) per batch
//! }
//! ```

pub mod dependency;
pub mod flush;
pub mod insert_order;

pub use dependency::{BuildReport, DependencyGraph, GraphNode};
pub use flush::{FlushConfig, InsertBatch, OrderStats, OrderedInserts, PendingInsert};
pub use insert_order::{InsertOrderer, OrderingError, schedule};

use std::any::TypeId;
use std::hash::{Hash, Hasher};

// ============================================================================
// Object Key
// ============================================================================

/// Identity of an in-memory object queued for persistence.
///
/// Two pending inserts with equal keys describe the same object. The key is
/// assigned before the row is written and is not necessarily the primary key
/// the database ends up generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Type identifier for the Model type.
    type_id: TypeId,
    /// Hash of the identity value(s).
    pk_hash: u64,
}

impl ObjectKey {
    /// Create an object key for model type `M` from an already computed hash.
    pub fn new<M: 'static>(pk_hash: u64) -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            pk_hash,
        }
    }

    /// Create an object key from raw parts.
    pub fn from_parts(type_id: TypeId, pk_hash: u64) -> Self {
        Self { type_id, pk_hash }
    }

    /// Create an object key for model type `M` by hashing an identity value
    /// (a UUID, a tuple of primary key values, ...).
    pub fn from_identity<M: 'static, I: Hash + ?Sized>(identity: &I) -> Self {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        identity.hash(&mut hasher);
        Self::new::<M>(hasher.finish())
    }

    /// Get the identity hash.
    pub fn pk_hash(&self) -> u64 {
        self.pk_hash
    }

    /// Get the type identifier.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}
