use crate::common::{Object, Value};
use crate::errors::{DocsetError, DocsetResult, ErrorKind};
use crate::path;

/// Applies an update specification to a deep copy of the document and
/// returns the result; the original is left untouched.
///
/// Supported operators: `$set`, `$unset`, `$inc`, `$push`, `$pushAll`,
/// `$addToSet` (with `$each`), `$pop`, `$pull`, `$pullAll`, `$rename`,
/// `$bit`. Non-`$`-prefixed top-level keys are an implicit `$set`. Unknown
/// `$`-prefixed keys are an error.
pub fn update(doc: &Value, spec: &Value) -> DocsetResult<Value> {
    let mut copy = doc.clone();
    update_in_place(&mut copy, spec)?;
    Ok(copy)
}

/// Applies an update specification to the document in place.
pub fn update_in_place(doc: &mut Value, spec: &Value) -> DocsetResult<()> {
    if spec.is_null() {
        return Ok(());
    }
    if !doc.is_object() {
        log::error!("Update target must be an object, got {}", doc.kind());
        return Err(DocsetError::new(
            &format!("Update target must be an object, got {}", doc.kind()),
            ErrorKind::InvalidDataType,
        ));
    }
    let Some(spec_map) = spec.as_object() else {
        log::error!("Update spec must be an object, got {}", spec.kind());
        return Err(DocsetError::new(
            &format!("Update spec must be an object, got {}", spec.kind()),
            ErrorKind::InvalidDataType,
        ));
    };
    for (op, operand) in spec_map {
        match op.as_str() {
            "$set" => {
                for (key, value) in operand_map(operand, op)? {
                    path::set(doc, key, Some(value.clone()));
                }
            }
            "$unset" => {
                for (key, _) in operand_map(operand, op)? {
                    path::set(doc, key, None);
                }
            }
            "$inc" => {
                for (key, amount) in operand_map(operand, op)? {
                    let next = increment(doc, key, amount)?;
                    path::set(doc, key, Some(next));
                }
            }
            "$push" => {
                for (key, value) in operand_map(operand, op)? {
                    with_array(doc, key, |items| items.push(value.clone()));
                }
            }
            "$pushAll" => {
                for (key, values) in operand_map(operand, op)? {
                    let values = array_operand(values, op)?;
                    with_array(doc, key, |items| items.extend(values.iter().cloned()));
                }
            }
            "$addToSet" => {
                for (key, value) in operand_map(operand, op)? {
                    let additions = each_operand(value);
                    with_array(doc, key, |items| {
                        for addition in additions {
                            if !items.contains(addition) {
                                items.push(addition.clone());
                            }
                        }
                    });
                }
            }
            "$pop" => {
                for (key, direction) in operand_map(operand, op)? {
                    let from_front = direction.as_number().is_some_and(|n| n < 0.0);
                    with_array(doc, key, |items| {
                        if items.is_empty() {
                            return;
                        }
                        if from_front {
                            items.remove(0);
                        } else {
                            items.pop();
                        }
                    });
                }
            }
            "$pull" => {
                for (key, value) in operand_map(operand, op)? {
                    with_array(doc, key, |items| items.retain(|item| item != value));
                }
            }
            "$pullAll" => {
                for (key, values) in operand_map(operand, op)? {
                    let values = array_operand(values, op)?;
                    with_array(doc, key, |items| {
                        items.retain(|item| !values.contains(item))
                    });
                }
            }
            "$rename" => {
                for (key, new_key) in operand_map(operand, op)? {
                    let Some(new_key) = new_key.as_str() else {
                        log::error!("$rename target must be a string path");
                        return Err(DocsetError::new(
                            "$rename target must be a string path",
                            ErrorKind::InvalidDataType,
                        ));
                    };
                    let value = path::get(doc, key);
                    path::set(doc, new_key, value);
                    path::set(doc, key, None);
                }
            }
            "$bit" => {
                for (key, ops) in operand_map(operand, op)? {
                    let next = apply_bits(doc, key, operand_map(ops, op)?)?;
                    path::set(doc, key, Some(Value::Int(next)));
                }
            }
            other if other.starts_with('$') => {
                log::error!("Unsupported update operator: {}", other);
                return Err(DocsetError::new(
                    &format!("Unsupported update operator: {}", other),
                    ErrorKind::UnsupportedOperator,
                ));
            }
            // bare top-level keys are an implicit $set
            field => path::set(doc, field, Some(operand.clone())),
        }
    }
    Ok(())
}

fn operand_map<'a>(operand: &'a Value, op: &str) -> DocsetResult<&'a Object> {
    operand.as_object().ok_or_else(|| {
        log::error!("{} requires an object operand", op);
        DocsetError::new(
            &format!("{} requires an object operand", op),
            ErrorKind::InvalidDataType,
        )
    })
}

fn array_operand<'a>(operand: &'a Value, op: &str) -> DocsetResult<&'a Vec<Value>> {
    operand.as_array().ok_or_else(|| {
        log::error!("{} requires an array of values", op);
        DocsetError::new(
            &format!("{} requires an array of values", op),
            ErrorKind::InvalidDataType,
        )
    })
}

/// `$addToSet` accepts either one value or `{$each: [..]}`.
fn each_operand(value: &Value) -> Vec<&Value> {
    if let Some(Value::Array(each)) = value.as_object().and_then(|map| map.get("$each")) {
        each.iter().collect()
    } else {
        vec![value]
    }
}

/// Reads, modifies, and stores back the array at `key`, creating it when
/// absent (or replacing a non-array value).
fn with_array(doc: &mut Value, key: &str, mutate: impl FnOnce(&mut Vec<Value>)) {
    let mut items = match path::get(doc, key) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    mutate(&mut items);
    path::set(doc, key, Some(Value::Array(items)));
}

fn increment(doc: &Value, key: &str, amount: &Value) -> DocsetResult<Value> {
    let Some(delta) = amount.as_number() else {
        log::error!("$inc requires a numeric amount for '{}'", key);
        return Err(DocsetError::new(
            &format!("$inc requires a numeric amount for '{}'", key),
            ErrorKind::InvalidDataType,
        ));
    };
    let current = path::get(doc, key);
    // integer arithmetic survives as long as both sides are integers
    Ok(match (&current, amount) {
        (Some(Value::Int(base)), Value::Int(delta)) => Value::Int(base + delta),
        (None, Value::Int(delta)) => Value::Int(*delta),
        _ => Value::Float(current.and_then(|c| c.as_number()).unwrap_or(0.0) + delta),
    })
}

fn apply_bits(doc: &Value, key: &str, ops: &Object) -> DocsetResult<i64> {
    let mut current = path::get(doc, key)
        .and_then(|v| v.as_number())
        .map(|n| n as i64)
        .unwrap_or(0);
    for (bit_op, operand) in ops {
        let Some(mask) = operand.as_number().map(|n| n as i64) else {
            log::error!("$bit requires numeric operands");
            return Err(DocsetError::new(
                "$bit requires numeric operands",
                ErrorKind::InvalidDataType,
            ));
        };
        match bit_op.as_str() {
            "and" => current &= mask,
            "or" => current |= mask,
            other => {
                log::error!("Unsupported $bit operation: {}", other);
                return Err(DocsetError::new(
                    &format!("Unsupported $bit operation: {}", other),
                    ErrorKind::UnsupportedOperator,
                ));
            }
        }
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{doc, val};

    #[test]
    fn set_and_unset() {
        let doc = doc! { a: 1, b: 2 };
        let updated = update(&doc, &doc! { "$set": { a: 9, "c.d": 3 }, "$unset": { b: 1 } })
            .unwrap();
        assert_eq!(path::get(&updated, "a"), Some(val!(9)));
        assert_eq!(path::get(&updated, "c.d"), Some(val!(3)));
        assert_eq!(path::get(&updated, "b"), None);
        // the original is untouched
        assert_eq!(path::get(&doc, "a"), Some(val!(1)));
    }

    #[test]
    fn implicit_set_for_bare_keys() {
        let updated = update(&doc! { a: 1 }, &doc! { a: 2, b: 3 }).unwrap();
        assert_eq!(path::get(&updated, "a"), Some(val!(2)));
        assert_eq!(path::get(&updated, "b"), Some(val!(3)));
    }

    #[test]
    fn inc_defaults_base_to_zero() {
        let updated = update(&doc! { n: 5 }, &doc! { "$inc": { n: 2, fresh: 7 } }).unwrap();
        assert_eq!(path::get(&updated, "n"), Some(val!(7)));
        assert_eq!(path::get(&updated, "fresh"), Some(val!(7)));
    }

    #[test]
    fn inc_preserves_integers_and_mixes_to_float() {
        let updated = update(&doc! { n: 1 }, &doc! { "$inc": { n: 2 } }).unwrap();
        assert_eq!(path::get(&updated, "n"), Some(Value::Int(3)));
        let updated = update(&doc! { n: 1 }, &doc! { "$inc": { n: 0.5 } }).unwrap();
        assert_eq!(path::get(&updated, "n"), Some(Value::Float(1.5)));
    }

    #[test]
    fn push_appends_and_creates() {
        let doc = doc! { a: 1, b: [{ x: 1 }, { x: 2 }] };
        let updated = update(&doc, &doc! { "$push": { b: { x: 3 } } }).unwrap();
        assert_eq!(
            path::get(&updated, "b"),
            Some(Value::Array(vec![
                doc! { x: 1 },
                doc! { x: 2 },
                doc! { x: 3 },
            ]))
        );
        let updated = update(&doc, &doc! { "$push": { fresh: 1 } }).unwrap();
        assert_eq!(path::get(&updated, "fresh"), Some(val!(vec![1])));
    }

    #[test]
    fn push_all_extends() {
        let updated =
            update(&doc! { xs: [1] }, &doc! { "$pushAll": { xs: [2, 3] } }).unwrap();
        assert_eq!(path::get(&updated, "xs"), Some(val!(vec![1, 2, 3])));
    }

    #[test]
    fn add_to_set_skips_duplicates() {
        let updated =
            update(&doc! { xs: [1, 2] }, &doc! { "$addToSet": { xs: 2 } }).unwrap();
        assert_eq!(path::get(&updated, "xs"), Some(val!(vec![1, 2])));
        let updated = update(
            &doc! { xs: [1, 2] },
            &doc! { "$addToSet": { xs: { "$each": [2, 3, 4] } } },
        )
        .unwrap();
        assert_eq!(path::get(&updated, "xs"), Some(val!(vec![1, 2, 3, 4])));
    }

    #[test]
    fn pop_front_and_back() {
        let updated = update(&doc! { xs: [1, 2, 3] }, &doc! { "$pop": { xs: 1 } }).unwrap();
        assert_eq!(path::get(&updated, "xs"), Some(val!(vec![1, 2])));
        let updated =
            update(&doc! { xs: [1, 2, 3] }, &doc! { "$pop": { xs: (-1) } }).unwrap();
        assert_eq!(path::get(&updated, "xs"), Some(val!(vec![2, 3])));
    }

    #[test]
    fn pull_removes_structural_matches() {
        let updated = update(
            &doc! { xs: [1, 2, 1, 3] },
            &doc! { "$pull": { xs: 1 } },
        )
        .unwrap();
        assert_eq!(path::get(&updated, "xs"), Some(val!(vec![2, 3])));
        let updated = update(
            &doc! { xs: [1, 2, 3, 4] },
            &doc! { "$pullAll": { xs: [2, 4] } },
        )
        .unwrap();
        assert_eq!(path::get(&updated, "xs"), Some(val!(vec![1, 3])));
    }

    #[test]
    fn rename_moves_the_value() {
        let updated = update(
            &doc! { a: { b: 5 } },
            &doc! { "$rename": { "a.b": "c.d" } },
        )
        .unwrap();
        assert_eq!(path::get(&updated, "c.d"), Some(val!(5)));
        assert_eq!(path::get(&updated, "a.b"), None);
    }

    #[test]
    fn bit_and_or() {
        let updated =
            update(&doc! { flags: 0b1100 }, &doc! { "$bit": { flags: { and: 0b1010 } } })
                .unwrap();
        assert_eq!(path::get(&updated, "flags"), Some(val!(0b1000)));
        let updated =
            update(&doc! { flags: 0b1100 }, &doc! { "$bit": { flags: { or: 0b0011 } } })
                .unwrap();
        assert_eq!(path::get(&updated, "flags"), Some(val!(0b1111)));
    }

    #[test]
    fn in_place_update_mutates_target() {
        let mut doc = doc! { a: 1 };
        update_in_place(&mut doc, &doc! { "$inc": { a: 1 } }).unwrap();
        assert_eq!(path::get(&doc, "a"), Some(val!(2)));
    }

    #[test]
    fn unknown_operator_errors() {
        let err = update(&doc! { a: 1 }, &doc! { "$merge": { a: 2 } }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnsupportedOperator);
    }

    #[test]
    fn non_object_document_errors() {
        let err = update(&val!(5), &doc! { a: 1 }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidDataType);
    }
}
