//! Update documents, projections and upsert seeding

use crate::core::value::{get_path, get_path_mut, remove_path, set_path, type_name, values_equal};
use crate::core::{Document, Result, StoreError};
use serde_json::{Map, Number, Value};

pub const ID_FIELD: &str = "_id";

/// Returns true when `update` is made of `$` operators (as opposed to a
/// replacement document).
pub fn is_operator_update(update: &Document) -> bool {
    update.keys().next().is_some_and(|k| k.starts_with('$'))
}

/// Applies an operator update (`$set`, `$unset`, `$inc`, `$push`) in place.
pub fn apply_update(doc: &mut Document, update: &Document) -> Result<()> {
    if update.is_empty() {
        return Err(StoreError::FailedToParse("Update document requires atomic operators".into()));
    }

    for (operator, fields) in update {
        let fields = fields.as_object().ok_or_else(|| {
            StoreError::FailedToParse(format!(
                "Modifiers operate on fields but we found type {} instead",
                type_name(fields)
            ))
        })?;

        for (path, argument) in fields {
            if path == ID_FIELD && operator != "$set" {
                return Err(immutable_id());
            }
            match operator.as_str() {
                "$set" => {
                    if path == ID_FIELD && !doc.get(ID_FIELD).is_some_and(|id| values_equal(id, argument)) {
                        return Err(immutable_id());
                    }
                    set_path(doc, path, argument.clone())?;
                }
                "$unset" => {
                    remove_path(doc, path);
                }
                "$inc" => increment(doc, path, argument)?,
                "$push" => push(doc, path, argument)?,
                other if other.starts_with('$') => {
                    return Err(StoreError::FailedToParse(format!(
                        "Unknown modifier: {}. Expected a valid update modifier",
                        other
                    )));
                }
                _ => {
                    return Err(StoreError::FailedToParse(
                        "Update document requires atomic operators".into(),
                    ));
                }
            }
        }
    }

    Ok(())
}

fn immutable_id() -> StoreError {
    StoreError::BadValue("Performing an update on the path '_id' would modify the immutable field '_id'".into())
}

fn increment(doc: &mut Document, path: &str, amount: &Value) -> Result<()> {
    let Value::Number(amount) = amount else {
        return Err(StoreError::TypeMismatch(format!(
            "Cannot increment with non-numeric argument: {{{}: {}}}",
            path, amount
        )));
    };

    let next = match get_path(doc, path) {
        None => Value::Number(amount.clone()),
        Some(Value::Number(current)) => add_numbers(current, amount),
        Some(other) => {
            return Err(StoreError::TypeMismatch(format!(
                "Cannot apply $inc to a value of non-numeric type {}",
                type_name(other)
            )));
        }
    };

    set_path(doc, path, next)
}

fn add_numbers(a: &Number, b: &Number) -> Value {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Value::from(sum);
        }
    }
    let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).map(Value::Number).unwrap_or(Value::Null)
}

fn push(doc: &mut Document, path: &str, item: &Value) -> Result<()> {
    match get_path_mut(doc, path) {
        None => set_path(doc, path, Value::Array(vec![item.clone()])),
        Some(Value::Array(items)) => {
            items.push(item.clone());
            Ok(())
        }
        Some(other) => Err(StoreError::BadValue(format!(
            "The field '{}' must be an array but is of type {}",
            path,
            type_name(other)
        ))),
    }
}

/// Replaces the body of `doc` with `replacement`, keeping its `_id`.
pub fn replace_document(doc: &mut Document, replacement: &Document) -> Result<()> {
    if is_operator_update(replacement) {
        return Err(StoreError::BadValue("Replacement document must not contain atomic operators".into()));
    }
    if let (Some(current), Some(requested)) = (doc.get(ID_FIELD), replacement.get(ID_FIELD)) {
        if !values_equal(current, requested) {
            return Err(immutable_id());
        }
    }

    let id = doc.get(ID_FIELD).cloned();
    doc.clear();
    if let Some(id) = id {
        doc.insert(ID_FIELD.to_string(), id);
    }
    for (key, value) in replacement {
        if key != ID_FIELD {
            doc.insert(key.clone(), value.clone());
        }
    }
    Ok(())
}

/// Builds the starting document of an upsert from the equality clauses of a filter.
pub fn seed_from_filter(filter: &Document) -> Result<Document> {
    let mut seed = Map::new();
    for (path, condition) in filter {
        if path.starts_with('$') {
            continue;
        }
        let value = match condition {
            Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => match ops.get("$eq") {
                Some(value) => value.clone(),
                None => continue,
            },
            other => other.clone(),
        };
        set_path(&mut seed, path, value)?;
    }
    Ok(seed)
}

/// Applies an inclusion or exclusion projection.
pub fn project(doc: &Document, projection: &Document) -> Result<Document> {
    if projection.is_empty() {
        return Ok(doc.clone());
    }

    let flag = |value: &Value| match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    };

    let include_id = projection.get(ID_FIELD).is_none_or(flag);
    let fields: Vec<(&String, bool)> = projection
        .iter()
        .filter(|(key, _)| key.as_str() != ID_FIELD)
        .map(|(key, value)| (key, flag(value)))
        .collect();

    let inclusive = match fields.first() {
        Some((_, included)) => *included,
        None => include_id,
    };
    if fields.iter().any(|(_, included)| *included != inclusive) {
        return Err(StoreError::BadValue(
            "Cannot do exclusion on field in inclusion projection".into(),
        ));
    }

    let mut result = if inclusive {
        let mut projected = Map::new();
        if include_id {
            if let Some(id) = doc.get(ID_FIELD) {
                projected.insert(ID_FIELD.to_string(), id.clone());
            }
        }
        projected
    } else {
        doc.clone()
    };

    if inclusive {
        for (path, _) in &fields {
            if let Some(value) = get_path(doc, path) {
                set_path(&mut result, path, value.clone())?;
            }
        }
    } else {
        for (path, _) in &fields {
            remove_path(&mut result, path);
        }
        if !include_id {
            result.remove(ID_FIELD);
        }
    }

    Ok(result)
}
