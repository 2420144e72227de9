use super::sort::compare_values;
use crate::common::{Object, Value};
use crate::errors::{DocsetError, DocsetResult, ErrorKind};
use crate::path;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Compiled patterns keyed by (pattern, options). Caller-supplied query
/// documents are never mutated to hold compiled state.
static REGEX_CACHE: Lazy<Mutex<HashMap<(String, String), Regex>>> = Lazy::new(Default::default);

fn compiled_regex(pattern: &str, options: &str) -> DocsetResult<Regex> {
    let key = (pattern.to_string(), options.to_string());
    let mut cache = REGEX_CACHE.lock();
    if let Some(regex) = cache.get(&key) {
        return Ok(regex.clone());
    }
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            _ => log::warn!("Ignoring unknown regex option '{}'", flag),
        }
    }
    let regex = builder.build().map_err(|e| {
        log::error!("Invalid regex pattern '{}': {}", pattern, e);
        DocsetError::new(
            &format!("Invalid regex pattern '{}': {}", pattern, e),
            ErrorKind::InvalidDataType,
        )
    })?;
    cache.insert(key, regex.clone());
    Ok(regex)
}

/// Evaluates a query against a document.
///
/// Top-level query keys combine with an implicit AND. `$and` requires every
/// sub-query to match; `$or` at least one; `$nor` none. A per-field operand
/// that is not an operator mapping is an equality test — or a containment
/// test when the document value at that path is an array. Operator mappings
/// evaluate `$lt, $lte, $gt, $gte, $ne, $in, $nin, $all, $exists, $mod,
/// $size, $type, $regex` (with its sibling `$options`) and `$elemMatch`.
/// Unknown `$`-prefixed keys are an error.
///
/// A null query matches everything; a null document matches nothing. Field
/// lookups use [path::get], so dotted/bracketed/broadcast semantics apply
/// inside queries; a broadcast comparison against the resulting candidate
/// array is satisfied when any candidate matches.
pub fn select(query: &Value, doc: &Value) -> DocsetResult<bool> {
    if query.is_null() {
        return Ok(true);
    }
    if doc.is_null() {
        return Ok(false);
    }
    let Some(query_map) = query.as_object() else {
        log::error!("Query must be an object, got {}", query.kind());
        return Err(DocsetError::new(
            &format!("Query must be an object, got {}", query.kind()),
            ErrorKind::InvalidDataType,
        ));
    };
    for (key, operand) in query_map {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub_query in sub_queries(operand, key)? {
                    if !select(sub_query, doc)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" | "$nor" => {
                let mut any = false;
                for sub_query in sub_queries(operand, key)? {
                    if select(sub_query, doc)? {
                        any = true;
                        break;
                    }
                }
                if key == "$or" {
                    any
                } else {
                    !any
                }
            }
            other if other.starts_with('$') => {
                return Err(unsupported_operator(other));
            }
            field => match_field(doc, field, operand)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_queries<'a>(operand: &'a Value, op: &str) -> DocsetResult<&'a Vec<Value>> {
    operand.as_array().ok_or_else(|| {
        log::error!("{} requires an array of sub-queries", op);
        DocsetError::new(
            &format!("{} requires an array of sub-queries", op),
            ErrorKind::InvalidDataType,
        )
    })
}

fn unsupported_operator(op: &str) -> DocsetError {
    log::error!("Unsupported operator: {}", op);
    DocsetError::new(
        &format!("Unsupported operator: {}", op),
        ErrorKind::UnsupportedOperator,
    )
}

fn match_field(doc: &Value, field: &str, operand: &Value) -> DocsetResult<bool> {
    let value = path::get(doc, field);
    if let Some(ops) = operand.as_object() {
        if ops.keys().any(|k| k.starts_with('$')) {
            return match_operators(value.as_ref(), ops);
        }
    }
    Ok(equality_match(value.as_ref(), operand))
}

/// Equality test, or containment when the document value is an array and
/// the operand is not. An absent value matches nothing.
fn equality_match(value: Option<&Value>, operand: &Value) -> bool {
    match value {
        None => false,
        Some(v) => {
            if v == operand {
                return true;
            }
            match v {
                Value::Array(items) if !operand.is_array() => items.contains(operand),
                _ => false,
            }
        }
    }
}

fn match_operators(value: Option<&Value>, ops: &Object) -> DocsetResult<bool> {
    for (op, operand) in ops {
        let matched = match op.as_str() {
            "$lt" => ordered_match(value, operand, |o| o == Ordering::Less)?,
            "$lte" => ordered_match(value, operand, |o| o != Ordering::Greater)?,
            "$gt" => ordered_match(value, operand, |o| o == Ordering::Greater)?,
            "$gte" => ordered_match(value, operand, |o| o != Ordering::Less)?,
            "$ne" => !equality_match(value, operand),
            "$in" => in_match(value, operand)?,
            "$nin" => !in_match(value, operand)?,
            "$all" => all_match(value, operand)?,
            "$exists" => value.is_some() == operand.is_truthy(),
            "$mod" => mod_match(value, operand)?,
            "$size" => size_match(value, operand),
            "$type" => type_match(value, operand)?,
            "$regex" => regex_match(value, operand, ops)?,
            // consumed together with $regex
            "$options" => true,
            "$elemMatch" => elem_match(value, operand)?,
            other => return Err(unsupported_operator(other)),
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Ordered comparison; an array value (broadcast lookup or natural array)
/// satisfies the operator when any element does.
fn ordered_match(
    value: Option<&Value>,
    operand: &Value,
    accept: impl Fn(Ordering) -> bool,
) -> DocsetResult<bool> {
    let Some(value) = value else {
        return Ok(false);
    };
    if let (Value::Array(items), false) = (value, operand.is_array()) {
        for item in items {
            if !item.is_null() && accept(compare_values(item, operand)?) {
                return Ok(true);
            }
        }
        return Ok(false);
    }
    Ok(accept(compare_values(value, operand)?))
}

fn in_match(value: Option<&Value>, operand: &Value) -> DocsetResult<bool> {
    let Some(candidates) = operand.as_array() else {
        log::error!("$in/$nin requires an array operand");
        return Err(DocsetError::new(
            "$in/$nin requires an array operand",
            ErrorKind::InvalidDataType,
        ));
    };
    let Some(value) = value else {
        return Ok(false);
    };
    match value {
        Value::Array(items) => Ok(items.iter().any(|item| candidates.contains(item))),
        v => Ok(candidates.contains(v)),
    }
}

fn all_match(value: Option<&Value>, operand: &Value) -> DocsetResult<bool> {
    let Some(required) = operand.as_array() else {
        log::error!("$all requires an array operand");
        return Err(DocsetError::new(
            "$all requires an array operand",
            ErrorKind::InvalidDataType,
        ));
    };
    let Some(value) = value else {
        return Ok(false);
    };
    match value {
        Value::Array(items) => Ok(required.iter().all(|entry| items.contains(entry))),
        v => Ok(required.len() == 1 && &required[0] == v),
    }
}

fn mod_match(value: Option<&Value>, operand: &Value) -> DocsetResult<bool> {
    let parts = operand.as_array().filter(|a| a.len() == 2);
    let (divisor, remainder) = match parts {
        Some(parts) => match (parts[0].as_number(), parts[1].as_number()) {
            (Some(divisor), Some(remainder)) => (divisor, remainder),
            _ => {
                return Err(DocsetError::new(
                    "$mod requires a [divisor, remainder] operand",
                    ErrorKind::InvalidDataType,
                ))
            }
        },
        None => {
            log::error!("$mod requires a [divisor, remainder] operand");
            return Err(DocsetError::new(
                "$mod requires a [divisor, remainder] operand",
                ErrorKind::InvalidDataType,
            ));
        }
    };
    if divisor == 0.0 {
        return Ok(false);
    }
    let check = |v: &Value| v.as_number().is_some_and(|n| n % divisor == remainder);
    Ok(match value {
        Some(Value::Array(items)) => items.iter().any(check),
        Some(v) => check(v),
        None => false,
    })
}

fn size_match(value: Option<&Value>, operand: &Value) -> bool {
    match (value, operand.as_number()) {
        (Some(Value::Array(items)), Some(size)) => items.len() as f64 == size,
        _ => false,
    }
}

fn type_match(value: Option<&Value>, operand: &Value) -> DocsetResult<bool> {
    let Some(value) = value else {
        return Ok(false);
    };
    let kind = value.kind();
    match operand {
        // the BSON type codes with a docset counterpart
        Value::Int(code) => Ok(match code {
            1 | 16 | 18 => kind == crate::common::ValueKind::Number,
            2 => kind == crate::common::ValueKind::String,
            3 => kind == crate::common::ValueKind::Object,
            4 => kind == crate::common::ValueKind::Array,
            8 => kind == crate::common::ValueKind::Boolean,
            9 => kind == crate::common::ValueKind::Date,
            10 => kind == crate::common::ValueKind::Null,
            11 => kind == crate::common::ValueKind::Regex,
            _ => false,
        }),
        Value::String(name) => Ok(kind.name() == name),
        other => {
            log::error!("$type requires a numeric code or type name, got {}", other);
            Err(DocsetError::new(
                &format!("$type requires a numeric code or type name, got {}", other),
                ErrorKind::InvalidDataType,
            ))
        }
    }
}

fn regex_match(value: Option<&Value>, operand: &Value, ops: &Object) -> DocsetResult<bool> {
    let pattern = match operand {
        Value::String(pattern) => pattern.as_str(),
        Value::Regex(pattern) => pattern.as_str(),
        other => {
            log::error!("$regex requires a pattern, got {}", other);
            return Err(DocsetError::new(
                &format!("$regex requires a pattern, got {}", other),
                ErrorKind::InvalidDataType,
            ));
        }
    };
    let options = ops
        .get("$options")
        .and_then(|o| o.as_str())
        .unwrap_or_default();
    let regex = compiled_regex(pattern, options)?;
    Ok(match value {
        Some(Value::String(s)) => regex.is_match(s),
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| item.as_str().is_some_and(|s| regex.is_match(s))),
        _ => false,
    })
}

fn elem_match(value: Option<&Value>, operand: &Value) -> DocsetResult<bool> {
    let Some(Value::Array(items)) = value else {
        return Ok(false);
    };
    for item in items {
        if select(operand, item)? {
            return Ok(true);
        }
    }
    Ok(false)
}
