//! The document selector: query matching, sort comparison, and
//! update-operator application.
//!
//! Everything here operates statelessly on plain [Value](crate::common::Value)
//! documents; nothing requires the documents to live in a collection.

mod query;
mod sort;
mod update;

pub use query::select;
pub use sort::{comparator, compare, compare_values, Comparator, SortOrder};
pub use update::{update, update_in_place};
