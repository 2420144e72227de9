//! Key-path access over document values.
//!
//! A path is a dotted/bracketed key expression (`"a.b"`, `"a[0].b"`,
//! `"items[1,3].price"`). Paths are parsed into an explicit segment sequence
//! and interpreted against a [Value](crate::common::Value); applying a
//! non-index key to an array broadcasts the remaining path over every
//! element.

mod accessor;
mod segment;

pub use accessor::{classify, diff, equals, get, get_path, get_segments, join, merge, merge_all, set};
pub use segment::{parse, Segment};
