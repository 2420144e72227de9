//! The ordered, indexable, observable document collection.
//!
//! A [Collection] owns its items, zero or more named [indexes](crate::index),
//! an optional identity designation, an ephemeral marked set, and a listener
//! registry. Mutators emit [ChangeRecord] batches that keep every index
//! consistent and feed the `change` event.

mod change;
#[allow(clippy::module_inception)]
mod collection;
mod document;
mod event;

pub use change::{ChangeAction, ChangeRecord};
pub use collection::{Collection, CollectionConfig, EqualityCheck};
pub use document::Document;
pub use event::{CollectionEvent, EventEmitter, ListenerFn, ListenerId};
