use super::change::ChangeRecord;
use super::document::Document;
use super::event::{CollectionEvent, EventEmitter, ListenerFn, ListenerId};
use crate::common::{Value, CHANGE_EVENT};
use crate::errors::{DocsetError, DocsetResult, ErrorKind};
use crate::index::{calc, CalcOptions, Index, IndexOptions, KeySpec};
use crate::selector;
use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Equality check used by [Collection::put_with] to decide whether an
/// incoming item is equivalent to the one already stored under its key.
#[derive(Clone)]
pub enum EqualityCheck {
    /// Structural equality of the two documents' values.
    Structural,
    /// A caller-supplied predicate over the two documents' values.
    Custom(Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>),
}

/// Collection construction configuration: named indexes declared up front,
/// plus the explicit identity designation.
#[derive(Clone, Default)]
pub struct CollectionConfig {
    indexes: Vec<(String, IndexOptions)>,
    identity: Option<String>,
}

impl CollectionConfig {
    pub fn new() -> Self {
        CollectionConfig::default()
    }

    /// Declares an index. `true` means unique, `false` grouped, and a full
    /// [IndexOptions] may carry a custom key accessor.
    pub fn with_index(mut self, key: &str, options: impl Into<IndexOptions>) -> Self {
        self.indexes.push((key.to_string(), options.into()));
        self
    }

    /// Designates the identity index. The named index must be unique; it is
    /// created implicitly when not otherwise declared. Declaration order
    /// never influences the designation.
    pub fn with_identity(mut self, key: &str) -> Self {
        self.identity = Some(key.to_string());
        self
    }
}

struct BatchState {
    depth: i64,
    changes: Vec<ChangeRecord>,
}

struct CollectionInner {
    items: RwLock<Vec<Document>>,
    indexes: RwLock<IndexMap<String, Index>>,
    identity: RwLock<Option<String>>,
    marked: RwLock<Option<IndexSet<Value>>>,
    batch: Mutex<BatchState>,
    emitter: EventEmitter,
}

/// An ordered, indexable, observable collection of documents.
///
/// Every mutator wraps itself in a `begin()`/`end()` bracket and appends
/// [ChangeRecord]s; when the outermost bracket closes, the batch goes first
/// to every index (incremental maintenance) and then to the collection's
/// `change` listeners, which therefore always observe a consistent
/// post-mutation state. Brackets nest, so composite mutators built from
/// simpler ones still deliver one batch.
///
/// Clones share the same underlying collection.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

impl Collection {
    /// Creates an empty collection with no indexes.
    pub fn new() -> Self {
        Collection {
            inner: Arc::new(CollectionInner {
                items: RwLock::new(Vec::new()),
                indexes: RwLock::new(IndexMap::new()),
                identity: RwLock::new(None),
                marked: RwLock::new(None),
                batch: Mutex::new(BatchState {
                    depth: 0,
                    changes: Vec::new(),
                }),
                emitter: EventEmitter::new(),
            }),
        }
    }

    /// Creates an empty collection from a configuration.
    pub fn with_config(config: CollectionConfig) -> DocsetResult<Self> {
        let collection = Collection::new();
        for (key, options) in &config.indexes {
            collection.index(key, options.clone())?;
        }
        if let Some(identity) = &config.identity {
            let name = KeySpec::parse(identity)?.normalized().to_string();
            let declared = collection.inner.indexes.read().contains_key(&name);
            if !declared {
                collection.index(identity, IndexOptions::unique())?;
            }
            collection.designate_identity(identity)?;
        }
        Ok(collection)
    }

    /// Creates a collection from a configuration, seeded with items.
    pub fn with_items(config: CollectionConfig, items: Vec<Document>) -> DocsetResult<Self> {
        let collection = Collection::with_config(config)?;
        collection.push_all(items)?;
        Ok(collection)
    }

    // ------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------

    /// Returns the index registered for `key`, creating and rebuilding it
    /// when absent. Re-declaring an existing index with the opposite
    /// uniqueness is an error.
    pub fn index(&self, key: &str, options: impl Into<IndexOptions>) -> DocsetResult<Index> {
        let options = options.into();
        let spec = KeySpec::parse(key)?;
        let name = spec.normalized().to_string();
        {
            let indexes = self.inner.indexes.read();
            if let Some(existing) = indexes.get(&name) {
                if options.unique != existing.is_unique() {
                    log::error!("Index '{}' already exists with a different uniqueness", name);
                    return Err(DocsetError::new(
                        &format!("Index '{}' already exists with a different uniqueness", name),
                        ErrorKind::IndexTypeMismatch,
                    ));
                }
                return Ok(existing.clone());
            }
        }
        let index = Index::new(spec, options);
        {
            let items = self.inner.items.read();
            index.rebuild(&items);
        }
        let mut indexes = self.inner.indexes.write();
        Ok(indexes.entry(name).or_insert(index).clone())
    }

    /// Lazy lookup used by keyed reads and `calc`: reuses whatever index
    /// exists under the key, creating a grouped one when none does.
    fn ensure_index(&self, key: &str) -> DocsetResult<Index> {
        let name = KeySpec::parse(key)?.normalized().to_string();
        if let Some(existing) = self.inner.indexes.read().get(&name) {
            return Ok(existing.clone());
        }
        self.index(key, IndexOptions::grouped())
    }

    /// Designates the identity index backing single-argument lookup and the
    /// mark/purge protocol. The index must exist and be unique.
    pub fn designate_identity(&self, key: &str) -> DocsetResult<()> {
        let name = KeySpec::parse(key)?.normalized().to_string();
        let indexes = self.inner.indexes.read();
        match indexes.get(&name) {
            Some(index) if index.is_unique() => {
                *self.inner.identity.write() = Some(name);
                Ok(())
            }
            Some(_) => {
                log::error!("Identity index '{}' must be unique", name);
                Err(DocsetError::new(
                    &format!("Identity index '{}' must be unique", name),
                    ErrorKind::IndexTypeMismatch,
                ))
            }
            None => {
                log::error!("No index '{}' to designate as identity", name);
                Err(DocsetError::new(
                    &format!("No index '{}' to designate as identity", name),
                    ErrorKind::IndexNotFound,
                ))
            }
        }
    }

    /// The designated identity index.
    pub fn identity_index(&self) -> DocsetResult<Index> {
        let identity = self.inner.identity.read();
        let Some(name) = identity.as_ref() else {
            return Err(DocsetError::new(
                "Collection has no identity index",
                ErrorKind::NoIdentityIndex,
            ));
        };
        self.inner.indexes.read().get(name).cloned().ok_or_else(|| {
            log::error!("Identity index '{}' is missing from the registry", name);
            DocsetError::new(
                &format!("Identity index '{}' is missing from the registry", name),
                ErrorKind::InternalError,
            )
        })
    }

    // ------------------------------------------------------------------
    // Batch brackets
    // ------------------------------------------------------------------

    /// Opens a change bracket. Brackets nest; only the outermost matching
    /// [Collection::end] delivers the accumulated batch.
    pub fn begin(&self) {
        self.inner.batch.lock().depth += 1;
    }

    /// Closes a change bracket. When the outermost bracket closes with a
    /// non-empty batch, every index is updated first and the `change` event
    /// fires afterwards.
    pub fn end(&self) -> DocsetResult<()> {
        let delivery = {
            let mut batch = self.inner.batch.lock();
            batch.depth -= 1;
            if batch.depth < 0 {
                batch.depth = 0;
                log::error!("end() called without a matching begin()");
                return Err(DocsetError::new(
                    "end() called without a matching begin()",
                    ErrorKind::BracketMismatch,
                ));
            }
            if batch.depth == 0 && !batch.changes.is_empty() {
                Some(std::mem::take(&mut batch.changes))
            } else {
                None
            }
        };
        if let Some(changes) = delivery {
            let indexes: Vec<Index> = self.inner.indexes.read().values().cloned().collect();
            for index in indexes {
                index.did_change(&changes);
            }
            self.inner
                .emitter
                .emit(CHANGE_EVENT, &CollectionEvent::Change(changes))?;
        }
        Ok(())
    }

    fn record(&self, change: ChangeRecord) {
        self.inner.batch.lock().changes.push(change);
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Appends an item; returns the new length.
    pub fn push(&self, item: impl Into<Document>) -> DocsetResult<usize> {
        self.push_all(vec![item.into()])
    }

    /// Appends items in order; returns the new length.
    pub fn push_all(&self, items: Vec<Document>) -> DocsetResult<usize> {
        self.begin();
        let len = {
            let mut list = self.inner.items.write();
            for item in items {
                self.record(ChangeRecord::added(item.clone()));
                list.push(item);
            }
            list.len()
        };
        self.end()?;
        Ok(len)
    }

    /// Removes and returns the last item; an empty collection is a no-op
    /// that emits nothing.
    pub fn pop(&self) -> DocsetResult<Option<Document>> {
        if self.inner.items.read().is_empty() {
            return Ok(None);
        }
        self.begin();
        let item = {
            let mut list = self.inner.items.write();
            let item = list.pop();
            if let Some(item) = &item {
                self.record(ChangeRecord::removed(item.clone()));
            }
            item
        };
        self.end()?;
        Ok(item)
    }

    /// Removes and returns the first item; an empty collection is a no-op
    /// that emits nothing.
    pub fn shift(&self) -> DocsetResult<Option<Document>> {
        if self.inner.items.read().is_empty() {
            return Ok(None);
        }
        self.begin();
        let item = {
            let mut list = self.inner.items.write();
            let item = list.remove(0);
            self.record(ChangeRecord::removed(item.clone()));
            Some(item)
        };
        self.end()?;
        Ok(item)
    }

    /// Prepends items, keeping their order; returns the new length.
    pub fn unshift(&self, item: impl Into<Document>) -> DocsetResult<usize> {
        self.unshift_all(vec![item.into()])
    }

    /// Prepends items, keeping their order; returns the new length.
    pub fn unshift_all(&self, items: Vec<Document>) -> DocsetResult<usize> {
        self.begin();
        let len = {
            let mut list = self.inner.items.write();
            for (position, item) in items.into_iter().enumerate() {
                self.record(ChangeRecord::added(item.clone()));
                list.insert(position, item);
            }
            list.len()
        };
        self.end()?;
        Ok(len)
    }

    /// Removes `delete_count` items at `start` (clamped into range; a
    /// negative `start` counts from the end) and inserts the given items in
    /// their place. Emits one remove per displaced item in original order,
    /// then one add per inserted item. Returns the removed items.
    pub fn splice(
        &self,
        start: isize,
        delete_count: isize,
        insert: Vec<Document>,
    ) -> DocsetResult<Vec<Document>> {
        self.begin();
        let removed = {
            let mut list = self.inner.items.write();
            let len = list.len() as isize;
            let start = if start < 0 {
                (len + start).max(0)
            } else {
                start.min(len)
            } as usize;
            let delete_count = delete_count.clamp(0, len - start as isize) as usize;
            let removed: Vec<Document> = list
                .splice(start..start + delete_count, insert.iter().cloned())
                .collect();
            for item in &removed {
                self.record(ChangeRecord::removed(item.clone()));
            }
            for item in &insert {
                self.record(ChangeRecord::added(item.clone()));
            }
            removed
        };
        self.end()?;
        Ok(removed)
    }

    /// Removes every item, emitting one remove per item.
    pub fn clear(&self) -> DocsetResult<()> {
        self.begin();
        {
            let mut list = self.inner.items.write();
            for item in list.iter() {
                self.record(ChangeRecord::removed(item.clone()));
            }
            list.clear();
        }
        self.end()
    }

    /// Removes every occurrence of the item (by identity); returns whether
    /// at least one was removed.
    pub fn remove(&self, item: &Document) -> DocsetResult<bool> {
        self.begin();
        let mut count = 0;
        loop {
            let position = self
                .inner
                .items
                .read()
                .iter()
                .position(|existing| existing.ptr_eq(item));
            match position {
                Some(position) => {
                    self.splice(position as isize, 1, Vec::new())?;
                    count += 1;
                }
                None => break,
            }
        }
        self.end()?;
        Ok(count > 0)
    }

    /// Appends the item unless it is already present; an already-present
    /// item survives an active mark cycle instead.
    pub fn add(&self, item: Document) -> DocsetResult<()> {
        if !self.contains(&item) {
            self.push(item)?;
        } else if self.inner.marked.read().is_some() {
            let index = self.identity_index()?;
            let key = index.item_key(&item);
            if let Some(marked) = self.inner.marked.write().as_mut() {
                marked.shift_remove(&key);
            }
        }
        Ok(())
    }

    /// Stores the item under its identity key. Appends when the key is new
    /// (returns `true`); otherwise replaces the existing item in place with
    /// a `replace` record (returns `false`). Requires an identity index.
    pub fn put(&self, item: Document) -> DocsetResult<bool> {
        self.put_with(item, None)
    }

    /// [Collection::put] with an equivalence check: when the check reports
    /// the stored and incoming items equivalent, the collection is left
    /// untouched and nothing is emitted (returns `false`).
    pub fn put_with(&self, item: Document, equality: Option<EqualityCheck>) -> DocsetResult<bool> {
        let index = self.identity_index()?;
        let key = index.item_key(&item);
        let Some(old) = index.get_at_key(&key) else {
            self.push(item)?;
            return Ok(true);
        };
        // a put item counts as seen by an active mark cycle
        if let Some(marked) = self.inner.marked.write().as_mut() {
            marked.shift_remove(&key);
        }
        if let Some(equality) = equality {
            let equal = match equality {
                EqualityCheck::Structural => old.equals(&item),
                EqualityCheck::Custom(check) => check(&old.snapshot(), &item.snapshot()),
            };
            if equal {
                return Ok(false);
            }
        }
        let position = self
            .inner
            .items
            .read()
            .iter()
            .position(|existing| existing.ptr_eq(&old))
            .ok_or_else(|| {
                log::error!("Identity index out of sync with collection");
                DocsetError::new(
                    "Identity index out of sync with collection",
                    ErrorKind::InternalError,
                )
            })?;
        self.begin();
        {
            let mut list = self.inner.items.write();
            list[position] = item.clone();
            self.record(ChangeRecord::replaced(item, Some(old)));
        }
        self.end()?;
        Ok(false)
    }

    /// Announces that an item was mutated in place: emits a `replace`
    /// record for it without relocating it, so indexes and listeners
    /// resynchronize.
    pub fn changed(&self, item: &Document) -> DocsetResult<()> {
        self.begin();
        self.record(ChangeRecord::replaced(item.clone(), None));
        self.end()
    }

    // ------------------------------------------------------------------
    // Mark / purge
    // ------------------------------------------------------------------

    /// Snapshots every current identity key into the marked set. Errors
    /// when already marked or without an identity index.
    pub fn mark(&self) -> DocsetResult<()> {
        let index = self.identity_index()?;
        let mut marked = self.inner.marked.write();
        if marked.is_some() {
            log::error!("Collection already marked");
            return Err(DocsetError::new(
                "Collection already marked",
                ErrorKind::InvalidMark,
            ));
        }
        *marked = Some(index.item_keys().into_iter().collect());
        Ok(())
    }

    /// Clears one item's mark, so [Collection::purge] will spare it. Errors
    /// when no mark cycle is active or the item's key is not marked.
    pub fn unmark(&self, item: &Document) -> DocsetResult<()> {
        let index = self.identity_index()?;
        let key = index.item_key(item);
        let mut marked = self.inner.marked.write();
        let Some(set) = marked.as_mut() else {
            log::error!("Collection not marked");
            return Err(DocsetError::new(
                "Collection not marked",
                ErrorKind::InvalidMark,
            ));
        };
        if !set.shift_remove(&key) {
            log::error!("Item not marked: {:?}", key);
            return Err(DocsetError::new(
                &format!("Item not marked: {:?}", key),
                ErrorKind::InvalidMark,
            ));
        }
        Ok(())
    }

    /// Discards the mark state without purging.
    pub fn cancel_mark(&self) {
        *self.inner.marked.write() = None;
    }

    /// Removes, inside one bracket, every item whose identity key is still
    /// marked, then clears the mark. Errors when not marked.
    pub fn purge(&self) -> DocsetResult<()> {
        let index = self.identity_index()?;
        let marked = self.inner.marked.write().take().ok_or_else(|| {
            log::error!("Collection not marked");
            DocsetError::new("Collection not marked", ErrorKind::InvalidMark)
        })?;
        self.begin();
        for key in &marked {
            if let Some(item) = index.get_at_key(key) {
                self.remove(&item)?;
            }
        }
        self.end()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.read().is_empty()
    }

    /// The item at a position.
    pub fn at(&self, position: usize) -> Option<Document> {
        self.inner.items.read().get(position).cloned()
    }

    /// A snapshot of the item handles in order.
    pub fn items(&self) -> Vec<Document> {
        self.inner.items.read().clone()
    }

    pub fn first(&self) -> Option<Document> {
        self.inner.items.read().first().cloned()
    }

    pub fn last(&self) -> Option<Document> {
        self.inner.items.read().last().cloned()
    }

    /// Whether the item is present: by identity key when an identity index
    /// is designated, by pointer identity otherwise.
    pub fn contains(&self, item: &Document) -> bool {
        if let Ok(index) = self.identity_index() {
            return index.get_at_key(&index.item_key(item)).is_some();
        }
        self.inner
            .items
            .read()
            .iter()
            .any(|existing| existing.ptr_eq(item))
    }

    /// Single-argument lookup by identity key value. Errors without an
    /// identity index.
    pub fn get(&self, value: impl Into<Value>) -> DocsetResult<Option<Document>> {
        let index = self.identity_index()?;
        Ok(index.get(&value.into()))
    }

    /// Keyed lookup: the single item (or first of the group) under `value`
    /// in the `key` index, creating the index on demand. Compound indexes
    /// take the parts as an array value.
    pub fn get_by(&self, key: &str, value: impl Into<Value>) -> DocsetResult<Option<Document>> {
        let index = self.ensure_index(key)?;
        Ok(index.get(&value.into()))
    }

    /// Keyed lookup of the whole group under `value`, in insertion order.
    pub fn all_by(&self, key: &str, value: impl Into<Value>) -> DocsetResult<Vec<Document>> {
        let index = self.ensure_index(key)?;
        Ok(index.all(&value.into()))
    }

    /// The items matching a selector query, in collection order.
    pub fn find(&self, query: &Value) -> DocsetResult<Vec<Document>> {
        let mut matches = Vec::new();
        for item in self.items() {
            if item.matches(query)? {
                matches.push(item);
            }
        }
        Ok(matches)
    }

    /// The items matching a query, ordered by a sort specification.
    pub fn find_sorted(&self, query: &Value, sort: &Value) -> DocsetResult<Vec<Document>> {
        let comparator = selector::comparator(sort)?;
        let mut keyed: Vec<(Value, Document)> = self
            .find(query)?
            .into_iter()
            .map(|item| (item.snapshot(), item))
            .collect();
        keyed.sort_by(|a, b| comparator.compare(&a.0, &b.0));
        Ok(keyed.into_iter().map(|(_, item)| item).collect())
    }

    /// Hierarchical grouped aggregation over the collection; indexes for
    /// the grouping keys are created on demand.
    pub fn calc(&self, keys: &[&str], options: &CalcOptions) -> DocsetResult<Value> {
        let items = self.items();
        let first_index = match keys.first() {
            Some(key) => Some(self.ensure_index(key)?),
            None => None,
        };
        calc(&items, keys, options, first_index)
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Registers a listener for an event; returns its removal token.
    pub fn on(&self, event: &str, callback: ListenerFn) -> DocsetResult<ListenerId> {
        self.inner.emitter.on(event, callback)
    }

    /// Registers a listener removed after its first dispatch.
    pub fn once(&self, event: &str, callback: ListenerFn) -> DocsetResult<ListenerId> {
        self.inner.emitter.once(event, callback)
    }

    /// Removes a listener by token.
    pub fn off(&self, event: &str, id: ListenerId) -> DocsetResult<bool> {
        self.inner.emitter.off(event, id)
    }

    /// Removes every listener for an event.
    pub fn remove_all_listeners(&self, event: &str) -> DocsetResult<()> {
        self.inner.emitter.remove_all(event)
    }

    /// Sets the soft cap on listeners per event (warning only).
    pub fn set_max_listeners(&self, count: usize) {
        self.inner.emitter.set_max_listeners(count);
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.emitter.listener_count(event)
    }

    /// Convenience registration for `change` batches.
    pub fn on_change(
        &self,
        callback: impl Fn(&[ChangeRecord]) -> DocsetResult<()> + Send + Sync + 'static,
    ) -> DocsetResult<ListenerId> {
        self.on(
            CHANGE_EVENT,
            Arc::new(move |event| match event {
                CollectionEvent::Change(changes) => callback(changes),
                _ => Ok(()),
            }),
        )
    }
}

impl Default for Collection {
    fn default() -> Self {
        Collection::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{doc, val};
    use parking_lot::Mutex as PlMutex;

    fn seeded() -> Collection {
        Collection::with_items(
            CollectionConfig::new().with_index("a", false),
            vec![
                Document::new(doc! { a: 1, b: 1 }),
                Document::new(doc! { a: 1, b: 2 }),
                Document::new(doc! { a: 2, b: 2 }),
                Document::new(doc! { a: 2, b: 1 }),
            ],
        )
        .unwrap()
    }

    fn with_identity(items: Vec<Value>) -> Collection {
        Collection::with_items(
            CollectionConfig::new().with_identity("id"),
            items.into_iter().map(Document::new).collect(),
        )
        .unwrap()
    }

    fn b_values(group: &[Document]) -> Vec<Value> {
        group.iter().map(|item| item.get("b").unwrap()).collect()
    }

    #[test]
    fn grouped_lookup_tracks_mutations() {
        let collection = seeded();
        let group = collection.all_by("a", 1).unwrap();
        assert_eq!(b_values(&group), vec![val!(1), val!(2)]);

        collection.shift().unwrap();
        collection.push(Document::new(doc! { a: 1, b: 3 })).unwrap();
        let group = collection.all_by("a", 1).unwrap();
        assert_eq!(b_values(&group), vec![val!(2), val!(3)]);
    }

    #[test]
    fn compound_index_lookup() {
        let collection = seeded();
        let found = collection.get_by("a,b", val!(vec![1, 2])).unwrap().unwrap();
        assert_eq!(found.get("a"), Some(val!(1)));
        assert_eq!(found.get("b"), Some(val!(2)));
        assert!(collection.get_by("a,b", val!(vec![3, 1])).unwrap().is_none());
    }

    #[test]
    fn indexes_match_full_rebuild_after_mutator_storm() {
        let collection = seeded();
        let index = collection.index("a", false).unwrap();

        collection.unshift(Document::new(doc! { a: 3, b: 0 })).unwrap();
        collection.splice(1, 2, vec![Document::new(doc! { a: 3, b: 9 })]).unwrap();
        collection.pop().unwrap();
        collection.push(Document::new(doc! { a: 1, b: 7 })).unwrap();

        let rebuilt = Index::new(KeySpec::parse("a").unwrap(), IndexOptions::grouped());
        rebuilt.rebuild(&collection.items());
        // the distinct-value lists agree up to first-seen order
        let mut live_values = index.values();
        let mut fresh_values = rebuilt.values();
        live_values.sort();
        fresh_values.sort();
        assert_eq!(live_values, fresh_values);
        for value in index.values() {
            let live: Vec<_> = index.all(&value);
            let fresh: Vec<_> = rebuilt.all(&value);
            assert_eq!(live.len(), fresh.len());
            for (a, b) in live.iter().zip(fresh.iter()) {
                assert!(a.ptr_eq(b));
            }
        }
    }

    #[test]
    fn splice_clamps_range() {
        let collection = seeded();
        // start beyond the end inserts at the end, deleting nothing
        let removed = collection
            .splice(99, 5, vec![Document::new(doc! { a: 9, b: 9 })])
            .unwrap();
        assert!(removed.is_empty());
        assert_eq!(collection.len(), 5);
        assert_eq!(collection.last().unwrap().get("a"), Some(val!(9)));
        // negative start counts from the end
        let removed = collection.splice(-1, 1, Vec::new()).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(collection.len(), 4);
    }

    #[test]
    fn pop_and_shift_on_empty_emit_nothing() {
        let collection = Collection::new();
        let batches: Arc<PlMutex<usize>> = Arc::new(PlMutex::new(0));
        let seen = batches.clone();
        collection
            .on_change(move |_| {
                *seen.lock() += 1;
                Ok(())
            })
            .unwrap();
        assert!(collection.pop().unwrap().is_none());
        assert!(collection.shift().unwrap().is_none());
        assert_eq!(*batches.lock(), 0);
    }

    #[test]
    fn nested_brackets_deliver_one_batch() {
        let collection = Collection::new();
        let batches: Arc<PlMutex<Vec<usize>>> = Arc::new(PlMutex::new(Vec::new()));
        let seen = batches.clone();
        collection
            .on_change(move |changes| {
                seen.lock().push(changes.len());
                Ok(())
            })
            .unwrap();
        collection.begin();
        collection.push(Document::new(doc! { a: 1 })).unwrap();
        collection.push(Document::new(doc! { a: 2 })).unwrap();
        collection.end().unwrap();
        assert_eq!(batches.lock().as_slice(), &[2]);
    }

    #[test]
    fn unbalanced_end_is_an_error() {
        let collection = Collection::new();
        let err = collection.end().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::BracketMismatch);
        // the depth recovers afterwards
        collection.push(Document::new(doc! { a: 1 })).unwrap();
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn remove_deletes_every_occurrence_by_identity() {
        let collection = Collection::new();
        let dup = Document::new(doc! { a: 1 });
        collection
            .push_all(vec![dup.clone(), Document::new(doc! { a: 2 }), dup.clone()])
            .unwrap();
        assert!(collection.remove(&dup).unwrap());
        assert_eq!(collection.len(), 1);
        assert!(!collection.remove(&dup).unwrap());
    }

    #[test]
    fn put_appends_replaces_or_leaves_untouched() {
        let collection = with_identity(vec![doc! { id: 1, v: "a" }]);
        // new key: added
        assert!(collection.put(Document::new(doc! { id: 2, v: "b" })).unwrap());
        // same key: replaced in place, not "added"
        let replacement = Document::new(doc! { id: 1, v: "c" });
        assert!(!collection.put(replacement.clone()).unwrap());
        assert_eq!(collection.len(), 2);
        assert!(collection.at(0).unwrap().ptr_eq(&replacement));
        // equivalent item: untouched, nothing emitted
        let batches: Arc<PlMutex<usize>> = Arc::new(PlMutex::new(0));
        let seen = batches.clone();
        collection
            .on_change(move |_| {
                *seen.lock() += 1;
                Ok(())
            })
            .unwrap();
        let equivalent = Document::new(doc! { id: 1, v: "c" });
        assert!(!collection
            .put_with(equivalent.clone(), Some(EqualityCheck::Structural))
            .unwrap());
        assert_eq!(*batches.lock(), 0);
        assert!(collection.at(0).unwrap().ptr_eq(&replacement));
    }

    #[test]
    fn put_replacement_emits_replace_record_with_old() {
        let collection = with_identity(vec![doc! { id: 1, v: "a" }]);
        let original = collection.at(0).unwrap();
        let records: Arc<PlMutex<Vec<ChangeRecord>>> = Arc::new(PlMutex::new(Vec::new()));
        let seen = records.clone();
        collection
            .on_change(move |changes| {
                seen.lock().extend(changes.iter().cloned());
                Ok(())
            })
            .unwrap();
        let replacement = Document::new(doc! { id: 1, v: "b" });
        collection.put(replacement.clone()).unwrap();
        let records = records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, crate::collection::ChangeAction::Replace);
        assert!(records[0].item.ptr_eq(&replacement));
        assert!(records[0].old.as_ref().unwrap().ptr_eq(&original));
    }

    #[test]
    fn single_argument_get_requires_identity() {
        let collection = seeded();
        let err = collection.get(1).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NoIdentityIndex);

        let collection = with_identity(vec![doc! { id: 1, v: "a" }]);
        assert!(collection.get(1).unwrap().is_some());
        assert!(collection.get(9).unwrap().is_none());
    }

    #[test]
    fn identity_designation_ignores_declaration_order() {
        // the identity is the designated index, not the first unique one
        let collection = Collection::with_config(
            CollectionConfig::new()
                .with_index("email", true)
                .with_index("id", true)
                .with_identity("id"),
        )
        .unwrap();
        collection
            .push(Document::new(doc! { id: 7, email: "x@y.z" }))
            .unwrap();
        assert!(collection.get(7).unwrap().is_some());
        assert!(collection.get("x@y.z").unwrap().is_none());
    }

    #[test]
    fn identity_designation_requires_a_unique_index() {
        let collection = Collection::new();
        collection.index("tag", false).unwrap();
        let err = collection.designate_identity("tag").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexTypeMismatch);
        let err = collection.designate_identity("nope").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexNotFound);
    }

    #[test]
    fn redeclaring_an_index_with_opposite_uniqueness_errors() {
        let collection = seeded();
        let err = collection.index("a", true).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexTypeMismatch);

        collection.index("b", true).unwrap();
        let err = collection.index("b", false).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexTypeMismatch);
        // lazy keyed reads reuse the unique index without re-declaring it
        assert!(collection.get_by("b", 1).unwrap().is_some());
    }

    #[test]
    fn mark_purge_empties_without_unmark() {
        let collection = with_identity(vec![doc! { id: 1 }, doc! { id: 2 }]);
        collection.mark().unwrap();
        collection.purge().unwrap();
        assert!(collection.is_empty());
    }

    #[test]
    fn unmarked_items_survive_purge() {
        let collection = with_identity(vec![doc! { id: 1 }, doc! { id: 2 }, doc! { id: 3 }]);
        let spared = collection.get(2).unwrap().unwrap();
        collection.mark().unwrap();
        collection.unmark(&spared).unwrap();
        collection.purge().unwrap();
        assert_eq!(collection.len(), 1);
        assert!(collection.at(0).unwrap().ptr_eq(&spared));
    }

    #[test]
    fn add_and_put_clear_marks() {
        let collection = with_identity(vec![doc! { id: 1 }, doc! { id: 2 }]);
        collection.mark().unwrap();
        // add() of a present item clears its mark
        let present = collection.get(1).unwrap().unwrap();
        collection.add(present).unwrap();
        // put() of a replacement clears the old item's mark
        collection.put(Document::new(doc! { id: 2, v: 1 })).unwrap();
        collection.purge().unwrap();
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn mark_errors_are_contractual() {
        let collection = with_identity(vec![doc! { id: 1 }]);
        assert_eq!(
            collection.purge().unwrap_err().kind(),
            &ErrorKind::InvalidMark
        );
        collection.mark().unwrap();
        assert_eq!(
            collection.mark().unwrap_err().kind(),
            &ErrorKind::InvalidMark
        );
        let foreign = Document::new(doc! { id: 99 });
        assert_eq!(
            collection.unmark(&foreign).unwrap_err().kind(),
            &ErrorKind::InvalidMark
        );
        // cancel_mark discards without purging
        collection.cancel_mark();
        assert_eq!(collection.len(), 1);
        assert_eq!(
            collection.purge().unwrap_err().kind(),
            &ErrorKind::InvalidMark
        );
    }

    #[test]
    fn changed_resynchronizes_indexes() {
        let collection = seeded();
        let item = collection.at(0).unwrap();
        item.set("a", 5);
        // the index still files the item under its stale key
        assert_eq!(collection.all_by("a", 5).unwrap().len(), 0);
        collection.changed(&item).unwrap();
        let group = collection.all_by("a", 5).unwrap();
        assert_eq!(group.len(), 1);
        assert!(group[0].ptr_eq(&item));
        assert_eq!(collection.all_by("a", 1).unwrap().len(), 1);
    }

    #[test]
    fn find_and_find_sorted() {
        let collection = seeded();
        let found = collection.find(&doc! { a: 2 }).unwrap();
        assert_eq!(found.len(), 2);
        let sorted = collection
            .find_sorted(&Value::Null, &doc! { b: (-1), a: 1 })
            .unwrap();
        let pairs: Vec<(Value, Value)> = sorted
            .iter()
            .map(|item| (item.get("b").unwrap(), item.get("a").unwrap()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (val!(2), val!(1)),
                (val!(2), val!(2)),
                (val!(1), val!(1)),
                (val!(1), val!(2)),
            ]
        );
    }

    #[test]
    fn calc_creates_indexes_on_demand() {
        let collection = seeded();
        let options = CalcOptions::new(|_, accumulator| {
            let count = crate::path::get(accumulator, "count")
                .and_then(|v| v.as_int())
                .unwrap_or(0);
            crate::path::set(accumulator, "count", Some(Value::Int(count + 1)));
        });
        let result = collection.calc(&["a"], &options).unwrap();
        assert_eq!(crate::path::get(&result, "1.count"), Some(val!(2)));
        assert_eq!(crate::path::get(&result, "2.count"), Some(val!(2)));
        assert_eq!(crate::path::get(&result, "total.count"), Some(val!(4)));
    }

    #[test]
    fn listener_errors_aggregate_but_indexes_stay_consistent() {
        let collection = seeded();
        collection
            .on_change(|_| Err(DocsetError::new("observer one", ErrorKind::InternalError)))
            .unwrap();
        collection
            .on_change(|_| Err(DocsetError::new("observer two", ErrorKind::InternalError)))
            .unwrap();
        let err = collection
            .push(Document::new(doc! { a: 1, b: 9 }))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::EventError);
        assert_eq!(err.related().len(), 2);
        // index maintenance ran before listener dispatch
        assert_eq!(collection.all_by("a", 1).unwrap().len(), 3);
    }
}
