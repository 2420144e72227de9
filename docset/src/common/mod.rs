//! Common types and utilities shared across the crate.

pub mod constants;
mod type_utils;
mod value;

pub use constants::*;
pub use type_utils::{atomic, Atomic, ReadExecutor, WriteExecutor};
pub use value::{Object, Value, ValueKind};
