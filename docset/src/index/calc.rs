use super::index::{Index, IndexOptions};
use super::key_spec::KeySpec;
use crate::collection::Document;
use crate::common::{Object, Value, DEFAULT_ID_KEY, DEFAULT_TOTAL_KEY};
use crate::errors::DocsetResult;
use std::sync::Arc;

/// Options for hierarchical grouped aggregation.
///
/// The `iterator` folds each (filtered) item into the accumulator, which
/// starts from a clone of `initial`; `finalize` runs once per aggregated
/// group. Each grouping level injects the group's key value under `id_key`
/// and, when `total_key` is set, a rollup aggregate of the whole level
/// under that key.
#[derive(Clone)]
pub struct CalcOptions {
    iterator: Arc<dyn Fn(&Document, &mut Value) + Send + Sync>,
    filter: Option<Arc<dyn Fn(&Document, usize, usize) -> bool + Send + Sync>>,
    finalize: Option<Arc<dyn Fn(&mut Value) + Send + Sync>>,
    initial: Value,
    total_key: Option<String>,
    id_key: String,
}

impl CalcOptions {
    pub fn new(iterator: impl Fn(&Document, &mut Value) + Send + Sync + 'static) -> Self {
        CalcOptions {
            iterator: Arc::new(iterator),
            filter: None,
            finalize: None,
            initial: Value::Object(Object::new()),
            total_key: Some(DEFAULT_TOTAL_KEY.to_string()),
            id_key: DEFAULT_ID_KEY.to_string(),
        }
    }

    /// Only items passing the filter are folded; the filter also receives
    /// the item's position and the group size.
    pub fn with_filter(
        mut self,
        filter: impl Fn(&Document, usize, usize) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_finalize(mut self, finalize: impl Fn(&mut Value) + Send + Sync + 'static) -> Self {
        self.finalize = Some(Arc::new(finalize));
        self
    }

    pub fn with_initial(mut self, initial: Value) -> Self {
        self.initial = initial;
        self
    }

    pub fn with_total_key(mut self, total_key: &str) -> Self {
        self.total_key = Some(total_key.to_string());
        self
    }

    /// Suppresses rollup totals.
    pub fn without_total(mut self) -> Self {
        self.total_key = None;
        self
    }

    pub fn with_id_key(mut self, id_key: &str) -> Self {
        self.id_key = id_key.to_string();
        self
    }

    pub(crate) fn id_key(&self) -> &str {
        &self.id_key
    }
}

fn aggregate(items: &[Document], options: &CalcOptions) -> Value {
    let mut accumulator = options.initial.clone();
    let count = items.len();
    for (position, item) in items.iter().enumerate() {
        let keep = options
            .filter
            .as_ref()
            .map(|filter| filter(item, position, count))
            .unwrap_or(true);
        if keep {
            (options.iterator)(item, &mut accumulator);
        }
    }
    if let Some(finalize) = &options.finalize {
        finalize(&mut accumulator);
    }
    accumulator
}

impl Index {
    /// Hierarchical grouping: aggregates each distinct value's group,
    /// recursing into the remaining keys, and keys the results by the
    /// group's map key.
    pub fn calc(&self, keys: &[&str], options: &CalcOptions) -> DocsetResult<Value> {
        let mut result = Object::new();
        for value in self.values() {
            let group = self.all(&value);
            let mut sub = calc(&group, keys, options, None)?;
            if let Some(map) = sub.as_object_mut() {
                map.insert(options.id_key().to_string(), value.clone());
            }
            result.insert(self.value_key(&value).to_key_string(), sub);
        }
        Ok(Value::Object(result))
    }
}

/// Aggregates `items`, grouping by each key in `keys` in turn.
///
/// With no keys left this is a flat aggregate. Otherwise the first key's
/// index groups the items (a caller-supplied index for the top level, a
/// transient one below), every group recurses on the remaining keys, and
/// the level's rollup total is injected under the configured total key.
pub(crate) fn calc(
    items: &[Document],
    keys: &[&str],
    options: &CalcOptions,
    first_index: Option<Index>,
) -> DocsetResult<Value> {
    let total = if keys.is_empty() || options.total_key.is_some() {
        Some(aggregate(items, options))
    } else {
        None
    };
    let Some((first_key, rest)) = keys.split_first() else {
        return Ok(total.unwrap_or(Value::Null));
    };
    let index = match first_index {
        Some(index) => index,
        None => {
            let index = Index::new(KeySpec::parse(first_key)?, IndexOptions::grouped());
            index.rebuild(items);
            index
        }
    };
    let mut result = index.calc(rest, options)?;
    if let (Some(total_key), Some(total)) = (&options.total_key, total) {
        if let Some(map) = result.as_object_mut() {
            map.insert(total_key.clone(), total);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use crate::{doc, val};

    fn sample() -> Vec<Document> {
        vec![
            Document::new(doc! { region: "east", kind: "a", amount: 10 }),
            Document::new(doc! { region: "east", kind: "b", amount: 5 }),
            Document::new(doc! { region: "west", kind: "a", amount: 7 }),
        ]
    }

    fn summing() -> CalcOptions {
        CalcOptions::new(|item, accumulator| {
            let amount = item.get("amount").and_then(|v| v.as_int()).unwrap_or(0);
            let sum = path::get(accumulator, "sum").and_then(|v| v.as_int()).unwrap_or(0);
            path::set(accumulator, "sum", Some(Value::Int(sum + amount)));
        })
    }

    #[test]
    fn flat_aggregate_with_no_keys() {
        let result = calc(&sample(), &[], &summing(), None).unwrap();
        assert_eq!(path::get(&result, "sum"), Some(val!(22)));
    }

    #[test]
    fn groups_by_key_and_injects_id_and_total() {
        let result = calc(&sample(), &["region"], &summing(), None).unwrap();
        assert_eq!(path::get(&result, "east.sum"), Some(val!(15)));
        assert_eq!(path::get(&result, "east.id"), Some(val!("east")));
        assert_eq!(path::get(&result, "west.sum"), Some(val!(7)));
        assert_eq!(path::get(&result, "total.sum"), Some(val!(22)));
    }

    #[test]
    fn recurses_into_nested_keys() {
        let result = calc(&sample(), &["region", "kind"], &summing().without_total(), None)
            .unwrap();
        assert_eq!(path::get(&result, "east.a.sum"), Some(val!(10)));
        assert_eq!(path::get(&result, "east.b.sum"), Some(val!(5)));
        assert_eq!(path::get(&result, "west.a.sum"), Some(val!(7)));
        assert_eq!(path::get(&result, "east.a.id"), Some(val!("a")));
    }

    #[test]
    fn filter_and_finalize_apply() {
        let options = summing()
            .with_filter(|item, _, _| {
                item.get("kind").and_then(|v| v.as_str().map(String::from)) == Some("a".into())
            })
            .with_finalize(|accumulator| {
                let sum = path::get(accumulator, "sum").and_then(|v| v.as_int()).unwrap_or(0);
                path::set(accumulator, "doubled", Some(Value::Int(sum * 2)));
            })
            .without_total();
        let result = calc(&sample(), &[], &options, None).unwrap();
        assert_eq!(path::get(&result, "sum"), Some(val!(17)));
        assert_eq!(path::get(&result, "doubled"), Some(val!(34)));
    }
}
