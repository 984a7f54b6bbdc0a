use serde_json::{Map, Value};
use std::cmp::Ordering;
use crate::core::{Result, StoreError};

/// A stored document: an ordered JSON object
pub type Document = Map<String, Value>;

/// Canonical BSON-like type ordering used when values of different types meet
/// in a sort: null < numbers < strings < objects < arrays < booleans.
pub fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Object(_) => 4,
        Value::Array(_) => 5,
        Value::Bool(_) => 8,
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Total order over JSON values, used for sorting.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (rank_a, rank_b) = (type_rank(a), type_rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = compare_values(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((key_a, val_a), (key_b, val_b)) in x.iter().zip(y.iter()) {
                let ord = key_a.cmp(key_b).then_with(|| compare_values(val_a, val_b));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

/// Ordering for range operators: only values of the same type class compare.
pub fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    if type_rank(a) != type_rank(b) {
        return None;
    }
    Some(compare_values(a, b))
}

/// Equality with numeric coercion (`1` equals `1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        _ => a == b,
    }
}

/// Resolves a dotted path (`address.city`, `tags.0`) inside a document.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Writes `value` at a dotted path, creating intermediate objects.
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> Result<()> {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, path),
    };

    let target = match parent {
        None => doc,
        Some(parent) => {
            let mut current = doc;
            for segment in parent.split('.') {
                let slot = current
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                current = match slot {
                    Value::Object(map) => map,
                    other => {
                        return Err(StoreError::BadValue(format!(
                            "Cannot create field '{}' in element {{{}: {}}}",
                            leaf,
                            segment,
                            type_name(other)
                        )));
                    }
                };
            }
            current
        }
    };

    target.insert(leaf.to_string(), value);
    Ok(())
}

/// Removes the value at a dotted path; returns whether something was removed.
pub fn remove_path(doc: &mut Document, path: &str) -> bool {
    match path.split_once('.') {
        None => doc.remove(path).is_some(),
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Value::Object(map)) => remove_path(map, rest),
            _ => false,
        },
    }
}

pub fn get_path_mut<'a>(doc: &'a mut Document, path: &str) -> Option<&'a mut Value> {
    match path.split_once('.') {
        None => doc.get_mut(path),
        Some((head, rest)) => match doc.get_mut(head)? {
            Value::Object(map) => get_path_mut(map, rest),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_numeric_equality_ignores_representation() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn test_mixed_types_sort_by_rank() {
        let mut values = vec![json!(true), json!("b"), json!(null), json!(3), json!("a")];
        values.sort_by(compare_values);
        assert_eq!(values, vec![json!(null), json!(3), json!("a"), json!("b"), json!(true)]);
    }

    #[test]
    fn test_range_comparison_requires_same_type() {
        assert_eq!(compare_same_type(&json!(5), &json!(2.5)), Some(Ordering::Greater));
        assert_eq!(compare_same_type(&json!(5), &json!("5")), None);
    }

    #[test]
    fn test_dotted_paths() {
        let mut d = doc(json!({"address": {"city": "Oslo"}, "tags": ["a", "b"]}));
        assert_eq!(get_path(&d, "address.city"), Some(&json!("Oslo")));
        assert_eq!(get_path(&d, "tags.1"), Some(&json!("b")));
        assert_eq!(get_path(&d, "address.zip"), None);

        set_path(&mut d, "address.zip", json!("0150")).unwrap();
        set_path(&mut d, "meta.created.by", json!("me")).unwrap();
        assert_eq!(get_path(&d, "address.zip"), Some(&json!("0150")));
        assert_eq!(get_path(&d, "meta.created.by"), Some(&json!("me")));

        assert!(remove_path(&mut d, "address.city"));
        assert!(!remove_path(&mut d, "address.city"));
    }

    #[test]
    fn test_set_path_through_scalar_fails() {
        let mut d = doc(json!({"name": "x"}));
        assert!(set_path(&mut d, "name.first", json!("y")).is_err());
    }
}
