//! Secondary indexes over a collection.
//!
//! An index maintains one key (simple or compound) to item mapping,
//! rebuilt in full on creation and maintained incrementally from change
//! batches afterwards. A `unique` index maps each key to a single item; a
//! `grouped` index maps each key to the ordered group of items sharing it.
//! After any completed batch an index's contents equal what a full rebuild
//! from the collection would produce.

mod calc;
mod index;
mod key_spec;

pub use calc::CalcOptions;
pub(crate) use calc::calc;
pub use index::{Index, IndexOptions, KeyAccessor};
pub use key_spec::KeySpec;
