use super::key_spec::KeySpec;
use crate::collection::{ChangeAction, ChangeRecord, Document};
use crate::common::{Value, COMPOUND_KEY_SEPARATOR};
use crate::path;
use indexmap::IndexMap;
use itertools::Itertools;
use parking_lot::RwLock;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Custom key accessor, for sourcing index values from non-standard
/// document shapes.
pub type KeyAccessor = Arc<dyn Fn(&Value, &str) -> Option<Value> + Send + Sync>;

/// Index construction options.
#[derive(Clone, Default)]
pub struct IndexOptions {
    pub unique: bool,
    pub key_get: Option<KeyAccessor>,
}

impl IndexOptions {
    pub fn unique() -> Self {
        IndexOptions {
            unique: true,
            key_get: None,
        }
    }

    pub fn grouped() -> Self {
        IndexOptions::default()
    }

    pub fn with_key_get(
        mut self,
        key_get: impl Fn(&Value, &str) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.key_get = Some(Arc::new(key_get));
        self
    }
}

impl From<bool> for IndexOptions {
    fn from(unique: bool) -> Self {
        IndexOptions {
            unique,
            key_get: None,
        }
    }
}

struct UniqueSlot {
    value: Value,
    item: Document,
}

struct Group {
    value: Value,
    items: Vec<Document>,
}

enum IndexState {
    Unique(IndexMap<Value, UniqueSlot>),
    Grouped(IndexMap<Value, Group>),
}

impl IndexState {
    fn clear(&mut self) {
        match self {
            IndexState::Unique(map) => map.clear(),
            IndexState::Grouped(map) => map.clear(),
        }
    }
}

/// A live secondary index over a collection.
///
/// Rebuilt in full on creation; incrementally maintained from change
/// batches via [Index::did_change]. Distinct key values are kept in
/// first-seen order.
#[derive(Clone)]
pub struct Index {
    inner: Arc<IndexInner>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("spec", &self.inner.spec)
            .field("unique", &self.inner.unique)
            .finish_non_exhaustive()
    }
}

struct IndexInner {
    spec: KeySpec,
    unique: bool,
    key_get: Option<KeyAccessor>,
    state: RwLock<IndexState>,
}

impl Index {
    /// Creates an empty index; callers rebuild it against the owning
    /// collection's items.
    pub fn new(spec: KeySpec, options: IndexOptions) -> Self {
        let state = if options.unique {
            IndexState::Unique(IndexMap::new())
        } else {
            IndexState::Grouped(IndexMap::new())
        };
        Index {
            inner: Arc::new(IndexInner {
                spec,
                unique: options.unique,
                key_get: options.key_get,
                state: RwLock::new(state),
            }),
        }
    }

    /// The normalized key specification this index is registered under.
    pub fn key(&self) -> &str {
        self.inner.spec.normalized()
    }

    /// The parsed key specification.
    pub fn spec(&self) -> &KeySpec {
        &self.inner.spec
    }

    pub fn is_unique(&self) -> bool {
        self.inner.unique
    }

    pub fn is_simple(&self) -> bool {
        self.inner.spec.is_simple()
    }

    /// The item's value for this index's key: the raw value for a simple
    /// index, an ordered tuple for a compound one. Absent paths contribute
    /// `Null`.
    pub fn item_value(&self, item: &Document) -> Value {
        item.with_value(|value| self.value_of(value))
    }

    fn value_of(&self, doc: &Value) -> Value {
        let lookup = |key: &str| match &self.inner.key_get {
            Some(accessor) => accessor(doc, key),
            None => path::get(doc, key),
        };
        if self.inner.spec.is_simple() {
            lookup(&self.inner.spec.keys()[0]).unwrap_or(Value::Null)
        } else {
            Value::Array(
                self.inner
                    .spec
                    .keys()
                    .iter()
                    .map(|key| lookup(key).unwrap_or(Value::Null))
                    .collect(),
            )
        }
    }

    /// The map key for an index value: the value itself for a simple index,
    /// the tuple parts joined with the null byte separator for a compound
    /// one.
    pub fn value_key(&self, value: &Value) -> Value {
        if self.inner.spec.is_simple() {
            return value.clone();
        }
        let joined = match value {
            Value::Array(parts) => parts
                .iter()
                .map(|part| part.to_key_string())
                .join(COMPOUND_KEY_SEPARATOR),
            other => other.to_key_string(),
        };
        Value::String(joined)
    }

    /// The map key for an item.
    pub fn item_key(&self, item: &Document) -> Value {
        self.value_key(&self.item_value(item))
    }

    /// Clears the index and re-includes every item in order.
    pub fn rebuild(&self, items: &[Document]) {
        let mut state = self.inner.state.write();
        state.clear();
        for item in items {
            self.include_into(&mut state, item);
        }
    }

    /// Adds an item to the index.
    pub fn include(&self, item: &Document) {
        let mut state = self.inner.state.write();
        self.include_into(&mut state, item);
    }

    fn include_into(&self, state: &mut IndexState, item: &Document) {
        let value = self.item_value(item);
        let key = self.value_key(&value);
        match state {
            IndexState::Unique(map) => {
                if let Some(slot) = map.get_mut(&key) {
                    // key collision on a unique index: last write wins
                    log::warn!(
                        "Unique index '{}' collision on key {:?}; keeping the newest item",
                        self.key(),
                        key
                    );
                    slot.item = item.clone();
                } else {
                    map.insert(
                        key,
                        UniqueSlot {
                            value,
                            item: item.clone(),
                        },
                    );
                }
            }
            IndexState::Grouped(map) => {
                map.entry(key)
                    .or_insert_with(|| Group {
                        value,
                        items: Vec::new(),
                    })
                    .items
                    .push(item.clone());
            }
        }
    }

    /// Removes an item from the index; returns whether anything was
    /// removed. When the item's key has drifted since it was indexed, the
    /// computed key misses and a full identity scan finds the stale entry.
    pub fn exclude(&self, item: &Document) -> bool {
        let mut state = self.inner.state.write();
        self.exclude_from(&mut state, item)
    }

    fn exclude_from(&self, state: &mut IndexState, item: &Document) -> bool {
        let key = self.item_key(item);
        match state {
            IndexState::Unique(map) => {
                if map.get(&key).is_some_and(|slot| slot.item.ptr_eq(item)) {
                    map.shift_remove(&key);
                    return true;
                }
                let stale = map
                    .iter()
                    .find(|(_, slot)| slot.item.ptr_eq(item))
                    .map(|(k, _)| k.clone());
                match stale {
                    Some(stale_key) => {
                        map.shift_remove(&stale_key);
                        true
                    }
                    None => false,
                }
            }
            IndexState::Grouped(map) => {
                if Self::remove_from_group(map, &key, item) {
                    return true;
                }
                let stale = map
                    .iter()
                    .find(|(_, group)| group.items.iter().any(|existing| existing.ptr_eq(item)))
                    .map(|(k, _)| k.clone());
                match stale {
                    Some(stale_key) => Self::remove_from_group(map, &stale_key, item),
                    None => false,
                }
            }
        }
    }

    fn remove_from_group(map: &mut IndexMap<Value, Group>, key: &Value, item: &Document) -> bool {
        let Some(group) = map.get_mut(key) else {
            return false;
        };
        let before = group.items.len();
        group.items.retain(|existing| !existing.ptr_eq(item));
        let removed = group.items.len() != before;
        if removed && group.items.is_empty() {
            map.shift_remove(key);
        }
        removed
    }

    /// Incremental maintenance from a delivered change batch.
    pub fn did_change(&self, changes: &[ChangeRecord]) {
        let mut state = self.inner.state.write();
        for change in changes {
            match change.action {
                ChangeAction::Add => self.include_into(&mut state, &change.item),
                ChangeAction::Replace => {
                    let old = change.old.as_ref().unwrap_or(&change.item);
                    self.exclude_from(&mut state, old);
                    self.include_into(&mut state, &change.item);
                }
                ChangeAction::Remove => {
                    self.exclude_from(&mut state, &change.item);
                }
            }
        }
    }

    /// The single item for a key value (unique), or the first of its group.
    pub fn get(&self, value: &Value) -> Option<Document> {
        let key = self.value_key(value);
        self.get_at_key(&key)
    }

    /// Lookup by an already-computed map key.
    pub(crate) fn get_at_key(&self, key: &Value) -> Option<Document> {
        match &*self.inner.state.read() {
            IndexState::Unique(map) => map.get(key).map(|slot| slot.item.clone()),
            IndexState::Grouped(map) => map.get(key).and_then(|group| group.items.first().cloned()),
        }
    }

    /// Every item for a key value, in insertion order. A unique index
    /// yields a singleton group.
    pub fn all(&self, value: &Value) -> Vec<Document> {
        let key = self.value_key(value);
        match &*self.inner.state.read() {
            IndexState::Unique(map) => map
                .get(&key)
                .map(|slot| vec![slot.item.clone()])
                .unwrap_or_default(),
            IndexState::Grouped(map) => map
                .get(&key)
                .map(|group| group.items.clone())
                .unwrap_or_default(),
        }
    }

    /// The distinct key values, in first-seen order.
    pub fn values(&self) -> Vec<Value> {
        match &*self.inner.state.read() {
            IndexState::Unique(map) => map.values().map(|slot| slot.value.clone()).collect(),
            IndexState::Grouped(map) => map.values().map(|group| group.value.clone()).collect(),
        }
    }

    /// The map keys, in first-seen order.
    pub fn item_keys(&self) -> Vec<Value> {
        match &*self.inner.state.read() {
            IndexState::Unique(map) => map.keys().cloned().collect(),
            IndexState::Grouped(map) => map.keys().cloned().collect(),
        }
    }

    /// The number of distinct keys.
    pub fn len(&self) -> usize {
        match &*self.inner.state.read() {
            IndexState::Unique(map) => map.len(),
            IndexState::Grouped(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Display for Index {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let keys = self
            .item_keys()
            .iter()
            .map(|key| key.to_key_string())
            .join(",");
        write!(f, "Index({}:{{{}}})", self.key(), keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{doc, val};

    fn items(values: Vec<Value>) -> Vec<Document> {
        values.into_iter().map(Document::new).collect()
    }

    fn grouped_on(key: &str, docs: &[Document]) -> Index {
        let index = Index::new(KeySpec::parse(key).unwrap(), IndexOptions::grouped());
        index.rebuild(docs);
        index
    }

    fn unique_on(key: &str, docs: &[Document]) -> Index {
        let index = Index::new(KeySpec::parse(key).unwrap(), IndexOptions::unique());
        index.rebuild(docs);
        index
    }

    #[test]
    fn grouped_index_preserves_insertion_order() {
        let docs = items(vec![
            doc! { a: 1, b: 1 },
            doc! { a: 1, b: 2 },
            doc! { a: 2, b: 2 },
            doc! { a: 2, b: 1 },
        ]);
        let index = grouped_on("a", &docs);
        let group = index.all(&val!(1));
        assert_eq!(group.len(), 2);
        assert!(group[0].ptr_eq(&docs[0]));
        assert!(group[1].ptr_eq(&docs[1]));
        assert_eq!(index.values(), vec![val!(1), val!(2)]);
    }

    #[test]
    fn unique_index_get_and_all() {
        let docs = items(vec![doc! { id: "x" }, doc! { id: "y" }]);
        let index = unique_on("id", &docs);
        assert!(index.get(&val!("x")).unwrap().ptr_eq(&docs[0]));
        assert!(index.get(&val!("z")).is_none());
        // all() on a unique index is a singleton group
        let group = index.all(&val!("y"));
        assert_eq!(group.len(), 1);
        assert!(group[0].ptr_eq(&docs[1]));
    }

    #[test]
    fn unique_collision_keeps_newest_without_duplicating_values() {
        let docs = items(vec![doc! { id: 1, v: "old" }, doc! { id: 1, v: "new" }]);
        let index = unique_on("id", &docs);
        assert_eq!(index.len(), 1);
        assert_eq!(index.values(), vec![val!(1)]);
        assert!(index.get(&val!(1)).unwrap().ptr_eq(&docs[1]));
    }

    #[test]
    fn compound_index_joins_parts_with_null_byte() {
        let docs = items(vec![doc! { a: 1, b: 2 }, doc! { a: 3, b: 1 }]);
        let index = unique_on("a,b", &docs);
        assert!(!index.is_simple());
        let found = index.get(&val!(vec![1, 2]));
        assert!(found.unwrap().ptr_eq(&docs[0]));
        assert!(index.get(&val!(vec![3, 1])).unwrap().ptr_eq(&docs[1]));
        assert!(index.get(&val!(vec![2, 1])).is_none());
        assert_eq!(
            index.value_key(&val!(vec![1, 2])),
            Value::String("1\u{0}2".to_string())
        );
    }

    #[test]
    fn missing_key_paths_index_under_null() {
        let docs = items(vec![doc! { a: 1 }, doc! { b: 2 }]);
        let index = grouped_on("a", &docs);
        let group = index.all(&Value::Null);
        assert_eq!(group.len(), 1);
        assert!(group[0].ptr_eq(&docs[1]));
    }

    #[test]
    fn exclude_falls_back_to_identity_scan_after_key_drift() {
        let docs = items(vec![doc! { id: 1 }, doc! { id: 2 }]);
        let index = unique_on("id", &docs);
        // mutate the key without telling the index
        docs[0].set("id", 99);
        assert!(index.exclude(&docs[0]));
        assert!(index.get(&val!(1)).is_none());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn did_change_applies_batches() {
        let docs = items(vec![doc! { a: 1 }, doc! { a: 2 }]);
        let index = grouped_on("a", &docs);
        let extra = Document::new(doc! { a: 1 });
        index.did_change(&[ChangeRecord::added(extra.clone())]);
        assert_eq!(index.all(&val!(1)).len(), 2);
        index.did_change(&[ChangeRecord::removed(docs[0].clone())]);
        assert_eq!(index.all(&val!(1)).len(), 1);
        let replacement = Document::new(doc! { a: 3 });
        index.did_change(&[ChangeRecord::replaced(
            replacement.clone(),
            Some(extra.clone()),
        )]);
        assert!(index.all(&val!(1)).is_empty());
        assert!(index.get(&val!(3)).unwrap().ptr_eq(&replacement));
    }

    #[test]
    fn custom_key_accessor_overrides_lookup() {
        let docs = items(vec![doc! { wrapped: { id: 7 } }]);
        let options = IndexOptions {
            unique: true,
            key_get: None,
        }
        .with_key_get(|doc, key| path::get(doc, &format!("wrapped.{}", key)));
        let index = Index::new(KeySpec::parse("id").unwrap(), options);
        index.rebuild(&docs);
        assert!(index.get(&val!(7)).unwrap().ptr_eq(&docs[0]));
    }
}
