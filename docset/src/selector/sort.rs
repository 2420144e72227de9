use crate::common::{Value, ValueKind, DEFAULT_ID_KEY};
use crate::errors::{DocsetError, DocsetResult, ErrorKind};
use crate::path;
use icu_collator::options::CollatorOptions;
use icu_collator::{Collator, CollatorBorrowed, CollatorPreferences};
use itertools::Itertools;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Sort direction for a single sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

thread_local! {
    static COLLATOR: Option<CollatorBorrowed<'static>> =
        Collator::try_new(CollatorPreferences::default(), CollatorOptions::default()).ok();
}

/// Locale-aware string comparison, falling back to code point order when no
/// collator is available.
fn collate(a: &str, b: &str) -> Ordering {
    COLLATOR.with(|collator| {
        collator
            .as_ref()
            .map(|cb| cb.compare(a, b))
            .unwrap_or_else(|| a.cmp(b))
    })
}

/// Normalized, compiled forms keyed by the canonical spec rendering. The
/// cache is a crate-owned side table; caller-supplied sort documents are
/// never touched.
static COMPARATOR_CACHE: Lazy<Mutex<HashMap<String, Arc<Vec<(String, SortOrder)>>>>> =
    Lazy::new(Default::default);

/// A compiled document comparator.
///
/// Cheap to clone; the normalized key/direction list is shared.
#[derive(Clone, Debug)]
pub struct Comparator {
    spec: Arc<Vec<(String, SortOrder)>>,
}

impl Comparator {
    /// Compares two documents under this sort specification.
    ///
    /// Null documents sort before any concrete document. Per key, a missing
    /// value sorts opposite to that key's direction relative to a present
    /// value; a type mismatch between field values is broken by the lexical
    /// order of the type names; same-type values compare numerically, by
    /// locale string order, by epoch difference for dates, or by the locale
    /// order of their string forms.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        if a.is_null() {
            return Ordering::Less;
        }
        if b.is_null() {
            return Ordering::Greater;
        }
        for (key, order) in self.spec.iter() {
            let a_value = path::get(a, key);
            let b_value = path::get(b, key);
            if a_value == b_value {
                continue;
            }
            let (a_value, b_value) = match (a_value, b_value) {
                (None, _) | (Some(Value::Null), _) => return directed(Ordering::Less, *order),
                (_, None) | (_, Some(Value::Null)) => return directed(Ordering::Greater, *order),
                (Some(a_value), Some(b_value)) => (a_value, b_value),
            };
            let a_kind = a_value.kind();
            let b_kind = b_value.kind();
            if a_kind != b_kind {
                let ordering = a_kind.name().cmp(b_kind.name());
                if ordering != Ordering::Equal {
                    return directed(ordering, *order);
                }
            }
            let ordering = match a_kind {
                ValueKind::Number | ValueKind::Date => a_value.cmp(&b_value),
                ValueKind::String => collate(
                    a_value.as_str().unwrap_or_default(),
                    b_value.as_str().unwrap_or_default(),
                ),
                _ => collate(&a_value.to_string(), &b_value.to_string()),
            };
            if ordering != Ordering::Equal {
                return directed(ordering, *order);
            }
        }
        Ordering::Equal
    }

    /// The normalized key/direction pairs this comparator sorts by.
    pub fn keys(&self) -> &[(String, SortOrder)] {
        &self.spec
    }
}

#[inline]
fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Ascending => ordering,
        SortOrder::Descending => ordering.reverse(),
    }
}

/// Builds (or fetches from the cache) the comparator for a sort
/// specification.
///
/// Accepted shapes: an array of `[key, dir]` pairs, one such pair, a mapping
/// of key to direction, a bare key string, or null/absent — which defaults
/// to ascending order on `"id"`. Any other shape is an error.
pub fn comparator(sort: &Value) -> DocsetResult<Comparator> {
    let fields = normalize(sort)?;
    let key = fields
        .iter()
        .map(|(k, order)| {
            format!(
                "{}:{}",
                k,
                if *order == SortOrder::Descending { -1 } else { 1 }
            )
        })
        .join(",");
    let mut cache = COMPARATOR_CACHE.lock();
    let spec = cache.entry(key).or_insert_with(|| Arc::new(fields)).clone();
    Ok(Comparator { spec })
}

/// One-shot comparison of two documents under a sort specification.
pub fn compare(sort: &Value, a: &Value, b: &Value) -> DocsetResult<Ordering> {
    Ok(comparator(sort)?.compare(a, b))
}

fn normalize(sort: &Value) -> DocsetResult<Vec<(String, SortOrder)>> {
    let mut fields: Vec<(String, SortOrder)> = Vec::new();
    match sort {
        Value::Null => {}
        Value::String(key) => fields.push((key.clone(), SortOrder::Ascending)),
        Value::Array(entries) => {
            let single_pair = entries.len() == 2
                && entries[0].is_string()
                && matches!(entries[1], Value::Int(_) | Value::Float(_));
            if single_pair {
                fields.push(pair_field(entries)?);
            } else {
                for entry in entries {
                    match entry {
                        Value::String(key) => fields.push((key.clone(), SortOrder::Ascending)),
                        Value::Array(pair) => fields.push(pair_field(pair)?),
                        other => return Err(invalid_sort(other)),
                    }
                }
            }
        }
        Value::Object(map) => {
            for (key, dir) in map {
                fields.push((key.clone(), order_of(dir)));
            }
        }
        other => return Err(invalid_sort(other)),
    }
    if fields.is_empty() {
        fields.push((DEFAULT_ID_KEY.to_string(), SortOrder::Ascending));
    }
    Ok(fields)
}

fn pair_field(pair: &[Value]) -> DocsetResult<(String, SortOrder)> {
    let key = pair
        .first()
        .and_then(|k| k.as_str())
        .ok_or_else(|| invalid_sort(&Value::Array(pair.to_vec())))?;
    let order = pair.get(1).map(order_of).unwrap_or(SortOrder::Ascending);
    Ok((key.to_string(), order))
}

fn order_of(dir: &Value) -> SortOrder {
    match dir.as_number() {
        Some(n) if n < 0.0 => SortOrder::Descending,
        _ => SortOrder::Ascending,
    }
}

fn invalid_sort(sort: &Value) -> DocsetError {
    log::error!("Invalid sort specification: {}", sort);
    DocsetError::new(
        &format!("Invalid sort specification: {}", sort),
        ErrorKind::InvalidSortSpec,
    )
}

/// Three-way compare used by the query operators.
///
/// Null (and, at call sites, absent) sorts after every concrete value.
/// Numbers compare numerically, dates by epoch, arrays element-wise,
/// objects by sorted keys then values. Any other kind pairing is an error.
pub fn compare_values(a: &Value, b: &Value) -> DocsetResult<Ordering> {
    if a == b {
        return Ok(Ordering::Equal);
    }
    if a.is_null() {
        return Ok(Ordering::Greater);
    }
    if b.is_null() {
        return Ok(Ordering::Less);
    }
    match (a, b) {
        (Value::Array(a_items), Value::Array(b_items)) => {
            for (x, y) in a_items.iter().zip(b_items.iter()) {
                let ordering = compare_values(x, y)?;
                if ordering != Ordering::Equal {
                    return Ok(ordering);
                }
            }
            Ok(a_items.len().cmp(&b_items.len()))
        }
        (Value::Object(a_map), Value::Object(b_map)) => {
            let mut a_keys: Vec<&String> = a_map.keys().collect();
            let mut b_keys: Vec<&String> = b_map.keys().collect();
            a_keys.sort();
            b_keys.sort();
            let ordering = a_keys.cmp(&b_keys);
            if ordering != Ordering::Equal {
                return Ok(ordering);
            }
            for key in a_keys {
                let ordering = compare_values(&a_map[key], &b_map[key])?;
                if ordering != Ordering::Equal {
                    return Ok(ordering);
                }
            }
            Ok(Ordering::Equal)
        }
        _ if a.kind() == b.kind() => Ok(a.cmp(b)),
        _ => {
            log::error!("Cannot compare {} with {}", a.kind(), b.kind());
            Err(DocsetError::new(
                &format!("Cannot compare {} with {}", a.kind(), b.kind()),
                ErrorKind::IncomparableTypes,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{doc, val};

    #[test]
    fn comparator_sorts_by_single_key() {
        let cmp = comparator(&doc! { age: 1 }).unwrap();
        let a = doc! { age: 30 };
        let b = doc! { age: 40 };
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
        assert_eq!(cmp.compare(&b, &a), Ordering::Greater);
        assert_eq!(cmp.compare(&a, &a.clone()), Ordering::Equal);
    }

    #[test]
    fn comparator_descending_reverses() {
        let cmp = comparator(&doc! { age: (-1) }).unwrap();
        let a = doc! { age: 30 };
        let b = doc! { age: 40 };
        assert_eq!(cmp.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn comparator_accepts_pair_and_pair_list_spellings() {
        let from_pair = comparator(&val!(vec![val!("age"), val!(-1)])).unwrap();
        let from_list =
            comparator(&Value::Array(vec![Value::Array(vec![val!("age"), val!(-1)])])).unwrap();
        let from_object = comparator(&doc! { age: (-1) }).unwrap();
        assert_eq!(from_pair.keys(), from_list.keys());
        assert_eq!(from_pair.keys(), from_object.keys());
    }

    #[test]
    fn comparator_defaults_to_id_ascending() {
        let cmp = comparator(&Value::Null).unwrap();
        assert_eq!(cmp.keys(), &[("id".to_string(), SortOrder::Ascending)]);
        let empty = comparator(&doc! {}).unwrap();
        assert_eq!(empty.keys(), cmp.keys());
    }

    #[test]
    fn comparator_rejects_malformed_specs() {
        let err = comparator(&val!(42)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidSortSpec);
    }

    #[test]
    fn null_documents_sort_first() {
        let cmp = comparator(&doc! { age: 1 }).unwrap();
        let a = doc! { age: 30 };
        assert_eq!(cmp.compare(&Value::Null, &a), Ordering::Less);
        assert_eq!(cmp.compare(&a, &Value::Null), Ordering::Greater);
    }

    #[test]
    fn missing_values_sort_opposite_to_direction() {
        let asc = comparator(&doc! { age: 1 }).unwrap();
        let desc = comparator(&doc! { age: (-1) }).unwrap();
        let missing = doc! { name: "x" };
        let present = doc! { age: 1 };
        assert_eq!(asc.compare(&missing, &present), Ordering::Less);
        assert_eq!(desc.compare(&missing, &present), Ordering::Greater);
    }

    #[test]
    fn type_mismatch_breaks_tie_by_type_name() {
        let cmp = comparator(&doc! { v: 1 }).unwrap();
        let number = doc! { v: 10 };
        let string = doc! { v: "10" };
        // "number" < "string"
        assert_eq!(cmp.compare(&number, &string), Ordering::Less);
    }

    #[test]
    fn secondary_key_decides_when_primary_ties() {
        let cmp = comparator(&Value::Array(vec![
            Value::Array(vec![val!("a"), val!(1)]),
            Value::Array(vec![val!("b"), val!(-1)]),
        ]))
        .unwrap();
        let x = doc! { a: 1, b: 1 };
        let y = doc! { a: 1, b: 2 };
        assert_eq!(cmp.compare(&x, &y), Ordering::Greater);
    }

    #[test]
    fn compare_values_orders_scalars() {
        assert_eq!(compare_values(&val!(1), &val!(2)).unwrap(), Ordering::Less);
        assert_eq!(
            compare_values(&val!("a"), &val!("b")).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&val!(2), &val!(2.0)).unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn compare_values_null_sorts_last() {
        assert_eq!(
            compare_values(&Value::Null, &val!(1)).unwrap(),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(&val!(1), &Value::Null).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn compare_values_rejects_mismatched_kinds() {
        let err = compare_values(&val!(1), &val!("1")).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IncomparableTypes);
    }
}
