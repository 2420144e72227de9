//! Crate-wide constants.

/// Separator used to join the parts of a compound index key.
pub const COMPOUND_KEY_SEPARATOR: &str = "\u{0}";

/// Event emitted after every delivered change batch.
pub const CHANGE_EVENT: &str = "change";

/// Meta-event emitted when a listener is registered.
pub const NEW_LISTENER_EVENT: &str = "newListener";

/// Meta-event emitted when a listener is removed.
pub const REMOVE_LISTENER_EVENT: &str = "removeListener";

/// Soft cap on listeners per event before a warning is logged.
pub const DEFAULT_MAX_LISTENERS: usize = 10_000;

/// Conventional identity key, used as the default sort key.
pub const DEFAULT_ID_KEY: &str = "id";

/// Default key under which `calc` injects the rollup total.
pub const DEFAULT_TOTAL_KEY: &str = "total";
