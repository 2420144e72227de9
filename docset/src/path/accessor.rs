use super::segment::{numeric_key, parse, Segment};
use crate::common::{Object, Value, ValueKind};
use itertools::Itertools;

/// Gets the value at the given key path.
///
/// Returns `None` when the path is absent, which is distinct from a stored
/// `Value::Null`. An empty path yields the document itself.
///
/// Array traversal: a bracketed index (or an all-digits key) indexes into
/// the array; an index list multi-indexes and returns an array; any other
/// key **broadcasts** — the full remaining path is applied to every element
/// and the results are collected (absent elements contribute `Null`).
pub fn get(doc: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(doc.clone());
    }
    let segments = parse(path);
    get_segments(doc, &segments)
}

/// Gets the value at an already-parsed segment sequence.
pub fn get_segments(node: &Value, segments: &[Segment]) -> Option<Value> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(node.clone());
    };
    match node {
        Value::Array(items) => match first {
            Segment::Index(index) => items.get(*index).and_then(|item| get_segments(item, rest)),
            Segment::IndexList(list) => Some(Value::Array(
                list.iter()
                    .map(|index| {
                        items
                            .get(*index)
                            .and_then(|item| get_segments(item, rest))
                            .unwrap_or(Value::Null)
                    })
                    .collect(),
            )),
            Segment::Key(key) => match numeric_key(key) {
                Some(index) => items.get(index).and_then(|item| get_segments(item, rest)),
                None => Some(Value::Array(
                    items
                        .iter()
                        .map(|item| get_segments(item, segments).unwrap_or(Value::Null))
                        .collect(),
                )),
            },
        },
        Value::Object(map) => {
            let field = match first {
                Segment::Key(key) => map.get(key.as_str()),
                Segment::Index(index) => map.get(index.to_string().as_str()),
                Segment::IndexList(_) => None,
            };
            field.and_then(|item| get_segments(item, rest))
        }
        _ => None,
    }
}

/// Path-of-paths lookup: applies each path in turn to the previous result.
pub fn get_path(doc: &Value, paths: &[&str]) -> Option<Value> {
    let mut current = doc.clone();
    for path in paths {
        current = get(&current, path)?;
    }
    Some(current)
}

/// Sets (or deletes, when `value` is `None`) the value at the given path.
///
/// Intermediate objects and arrays are created as needed when storing;
/// deleting along an absent path is a no-op. Bracket index lists broadcast
/// the same value to every listed slot, and a non-index key applied to an
/// array broadcasts the assignment into every element. Deleting an array
/// slot stores `Null` in it (positions do not shift).
pub fn set(doc: &mut Value, path: &str, value: Option<Value>) {
    if path.is_empty() {
        return;
    }
    let segments = parse(path);
    if segments.is_empty() {
        return;
    }
    if doc.is_null() && value.is_some() {
        *doc = empty_container_for(&segments[0]);
    }
    set_segments(doc, &segments, &value);
}

fn empty_container_for(segment: &Segment) -> Value {
    match segment {
        Segment::Key(key) if numeric_key(key).is_none() => Value::Object(Object::new()),
        _ => Value::Array(Vec::new()),
    }
}

fn set_segments(node: &mut Value, segments: &[Segment], value: &Option<Value>) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    match node {
        Value::Array(items) => match first {
            Segment::Index(index) => set_array_slot(items, *index, rest, value),
            Segment::IndexList(list) => {
                for index in list {
                    set_array_slot(items, *index, rest, value);
                }
            }
            Segment::Key(key) => match numeric_key(key) {
                Some(index) => set_array_slot(items, index, rest, value),
                None => {
                    for item in items.iter_mut() {
                        set_segments(item, segments, value);
                    }
                }
            },
        },
        Value::Object(map) => {
            let key = match first {
                Segment::Key(key) => key.clone(),
                Segment::Index(index) => index.to_string(),
                Segment::IndexList(_) => return,
            };
            if rest.is_empty() {
                match value {
                    Some(v) => {
                        map.insert(key, v.clone());
                    }
                    None => {
                        map.shift_remove(&key);
                    }
                }
            } else {
                match map.get_mut(&key) {
                    Some(child) => {
                        if child.is_null() && value.is_some() {
                            *child = empty_container_for(&rest[0]);
                        }
                        set_segments(child, rest, value);
                    }
                    None => {
                        if value.is_some() {
                            let mut child = empty_container_for(&rest[0]);
                            set_segments(&mut child, rest, value);
                            map.insert(key, child);
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

fn set_array_slot(items: &mut Vec<Value>, index: usize, rest: &[Segment], value: &Option<Value>) {
    if rest.is_empty() {
        match value {
            Some(v) => {
                if items.len() <= index {
                    items.resize(index + 1, Value::Null);
                }
                items[index] = v.clone();
            }
            None => {
                if index < items.len() {
                    items[index] = Value::Null;
                }
            }
        }
    } else {
        if items.len() <= index {
            if value.is_none() {
                return;
            }
            items.resize(index + 1, Value::Null);
        }
        let child = &mut items[index];
        if child.is_null() && value.is_some() {
            *child = empty_container_for(&rest[0]);
        }
        set_segments(child, rest, value);
    }
}

/// Deep-merges `source` into `target`.
///
/// Object fields merge recursively; a `Null` source value deletes the target
/// key; an array paired with a `{+: [...], -: [...]}` mapping is patched in
/// place (`-` removes structural matches, `+` appends) instead of replaced;
/// anything else replaces the target value. Non-object sources are ignored,
/// and a `Null` target is first materialized as an empty object.
pub fn merge(target: &mut Value, source: &Value) {
    if target.is_null() {
        *target = Value::Object(Object::new());
    }
    if let (Value::Object(a), Value::Object(b)) = (target, source) {
        merge_objects(a, b);
    }
}

/// Merges each source into `target` in order.
pub fn merge_all(target: &mut Value, sources: &[&Value]) {
    for source in sources {
        merge(target, source);
    }
}

fn merge_objects(a: &mut Object, b: &Object) {
    for (key, b_value) in b {
        if b_value.is_null() {
            a.shift_remove(key);
            continue;
        }
        match a.get_mut(key) {
            Some(a_value) => match (&mut *a_value, b_value) {
                (Value::Object(a_child), Value::Object(b_child)) => {
                    merge_objects(a_child, b_child)
                }
                (Value::Array(a_items), Value::Object(b_child)) if is_array_delta(b_child) => {
                    apply_array_delta(a_items, b_child)
                }
                (slot, _) => *slot = b_value.clone(),
            },
            None => {
                a.insert(key.clone(), b_value.clone());
            }
        }
    }
}

fn is_array_delta(object: &Object) -> bool {
    object.keys().all(|k| k == "+" || k == "-")
}

fn apply_array_delta(items: &mut Vec<Value>, delta: &Object) {
    if let Some(Value::Array(removed)) = delta.get("-") {
        for entry in removed {
            items.retain(|item| item != entry);
        }
    }
    if let Some(Value::Array(added)) = delta.get("+") {
        items.extend(added.iter().cloned());
    }
}

/// Returns the minimal mapping `d` such that `merge(target.clone(), d)`
/// reproduces `update`, or `None` when the two are already equal.
///
/// Keys missing from `update` become `Null` (deletions). Arrays and dates
/// are compared by value equality and replaced whole on any difference.
pub fn diff(target: &Value, update: &Value) -> Option<Value> {
    if target == update {
        return None;
    }
    match (target, update) {
        (Value::Object(a), Value::Object(b)) => diff_objects(a, b).map(Value::Object),
        _ => Some(update.clone()),
    }
}

fn diff_objects(a: &Object, b: &Object) -> Option<Object> {
    let mut changes: Option<Object> = None;
    for key in a.keys() {
        if !b.contains_key(key) {
            changes
                .get_or_insert_with(Object::new)
                .insert(key.clone(), Value::Null);
        }
    }
    for (key, b_value) in b {
        let Some(a_value) = a.get(key) else {
            changes
                .get_or_insert_with(Object::new)
                .insert(key.clone(), b_value.clone());
            continue;
        };
        if a_value == b_value {
            continue;
        }
        let changed = match (a_value, b_value) {
            (Value::Object(a_child), Value::Object(b_child)) => {
                diff_objects(a_child, b_child).map(Value::Object)
            }
            _ => Some(b_value.clone()),
        };
        if let Some(changed) = changed {
            changes
                .get_or_insert_with(Object::new)
                .insert(key.clone(), changed);
        }
    }
    changes
}

/// Structural value equality; see [Value]'s `PartialEq` for the type-tag
/// dispatch rules.
#[inline]
pub fn equals(a: &Value, b: &Value) -> bool {
    a == b
}

/// Returns the type tag of a value.
#[inline]
pub fn classify(value: &Value) -> ValueKind {
    value.kind()
}

/// Joins key fragments into a dotted path, skipping empty fragments.
pub fn join(keys: &[&str]) -> String {
    keys.iter().filter(|key| !key.is_empty()).join(".")
}
