use crate::common::{Object, Value};
use crate::errors::DocsetResult;
use crate::path;
use crate::selector;
use parking_lot::RwLock;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// A shared, mutable document handle.
///
/// Collections, indexes, and change records all hold the same handle, so a
/// field mutation through any clone is visible everywhere. Identity is
/// pointer identity ([Document::ptr_eq]); two documents with equal contents
/// are still distinct items. After mutating a document that lives in a
/// collection, call `Collection::changed` so indexes and listeners
/// resynchronize.
#[derive(Clone)]
pub struct Document {
    inner: Arc<RwLock<Value>>,
}

impl Document {
    /// Creates a document holding the given value.
    pub fn new(value: impl Into<Value>) -> Self {
        Document {
            inner: Arc::new(RwLock::new(value.into())),
        }
    }

    /// Creates a document holding an empty object.
    pub fn empty() -> Self {
        Document::new(Value::Object(Object::new()))
    }

    /// Returns a deep copy of the current value.
    pub fn snapshot(&self) -> Value {
        self.inner.read().clone()
    }

    /// Pointer identity: `true` when both handles refer to the same
    /// document.
    #[inline]
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Structural equality of the two documents' current values.
    pub fn equals(&self, other: &Document) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        *self.inner.read() == *other.inner.read()
    }

    /// Gets the value at a key path; `None` when absent.
    pub fn get(&self, key_path: &str) -> Option<Value> {
        path::get(&self.inner.read(), key_path)
    }

    /// Sets the value at a key path, creating intermediates as needed.
    pub fn set(&self, key_path: &str, value: impl Into<Value>) {
        path::set(&mut self.inner.write(), key_path, Some(value.into()));
    }

    /// Deletes the value at a key path.
    pub fn unset(&self, key_path: &str) {
        path::set(&mut self.inner.write(), key_path, None);
    }

    /// Replaces the whole document value.
    pub fn replace_with(&self, value: impl Into<Value>) {
        *self.inner.write() = value.into();
    }

    /// Applies an update-operator specification in place.
    pub fn apply_update(&self, spec: &Value) -> DocsetResult<()> {
        selector::update_in_place(&mut self.inner.write(), spec)
    }

    /// Evaluates a query against this document.
    pub fn matches(&self, query: &Value) -> DocsetResult<bool> {
        selector::select(query, &self.inner.read())
    }

    /// Runs a closure against the current value without cloning it.
    pub fn with_value<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.inner.read())
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Document::new(value)
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::empty()
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner.read())
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Document({})", self.inner.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{doc, val};

    #[test]
    fn clones_share_the_same_document() {
        let doc = Document::new(doc! { a: 1 });
        let alias = doc.clone();
        alias.set("a", 2);
        assert_eq!(doc.get("a"), Some(val!(2)));
        assert!(doc.ptr_eq(&alias));
    }

    #[test]
    fn identity_differs_from_structural_equality() {
        let a = Document::new(doc! { a: 1 });
        let b = Document::new(doc! { a: 1 });
        assert!(!a.ptr_eq(&b));
        assert!(a.equals(&b));
    }

    #[test]
    fn apply_update_and_matches() {
        let doc = Document::new(doc! { n: 1 });
        doc.apply_update(&doc! { "$inc": { n: 4 } }).unwrap();
        assert!(doc.matches(&doc! { n: { "$gte": 5 } }).unwrap());
    }

    #[test]
    fn unset_removes_the_key() {
        let doc = Document::new(doc! { a: 1, b: 2 });
        doc.unset("b");
        assert_eq!(doc.get("b"), None);
    }
}
