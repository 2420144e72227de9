//! # docset — an indexed, observable document collection
//!
//! docset is an in-process, single-document-store primitive: an ordered,
//! indexable, observable collection of documents, paired with a
//! MongoDB-style query matcher/update engine and a key-path accessor.
//!
//! ## Key Features
//!
//! - **Live secondary indexes**: unique or grouped, simple or compound,
//!   rebuilt once and maintained incrementally from change batches
//! - **Batched observation**: nestable `begin()`/`end()` brackets coalesce
//!   change records into one index-maintenance pass and one `change` event
//! - **Mark/purge**: a stage-then-sweep protocol for syncing a collection
//!   against an external snapshot
//! - **Declarative selection**: `select` evaluates MongoDB-style queries,
//!   `update` applies the update-operator grammar, `comparator` compiles
//!   sort specifications
//! - **Key paths**: dotted/bracketed accessors with array broadcast, plus
//!   deep merge and minimal diff
//!
//! Everything executes synchronously within a single thread of control; no
//! persistence, transactions, or I/O.
//!
//! ## Quick Start
//!
//! ```rust
//! use docset::{doc, Collection, CollectionConfig, Document};
//!
//! # fn main() -> docset::DocsetResult<()> {
//! let users = Collection::with_config(
//!     CollectionConfig::new()
//!         .with_index("age", false)
//!         .with_identity("id"),
//! )?;
//!
//! users.push(Document::new(doc! { id: 1, name: "Alice", age: 30 }))?;
//! users.push(Document::new(doc! { id: 2, name: "Bob", age: 30 }))?;
//!
//! // identity lookup, keyed lookup, and queries
//! let alice = users.get(1)?.unwrap();
//! assert_eq!(alice.get("name"), Some("Alice".into()));
//! assert_eq!(users.all_by("age", 30)?.len(), 2);
//! let adults = users.find(&doc! { age: { "$gte": 18 } })?;
//! assert_eq!(adults.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`collection`] - The collection, document handles, change records, and
//!   the listener registry
//! - [`common`] - The document value model and shared utilities
//! - [`errors`] - Error types and result definitions
//! - [`index`] - Live secondary indexes and grouped aggregation
//! - [`path`] - Key-path parsing and access
//! - [`selector`] - Query matching, sort comparison, update operators

pub mod collection;
pub mod common;
pub mod errors;
pub mod index;
pub mod path;
pub mod selector;

pub use collection::{
    ChangeAction, ChangeRecord, Collection, CollectionConfig, CollectionEvent, Document,
    EqualityCheck, EventEmitter, ListenerFn, ListenerId,
};
pub use common::{atomic, Atomic, Object, ReadExecutor, Value, ValueKind, WriteExecutor};
pub use errors::{DocsetError, DocsetResult, ErrorKind};
pub use index::{CalcOptions, Index, IndexOptions, KeyAccessor, KeySpec};
pub use selector::{
    comparator, compare, compare_values, select, update, update_in_place, Comparator, SortOrder,
};
