//! Query filter evaluation
//!
//! Filters are JSON objects in the usual document-store query language:
//! plain fields match by equality (with array membership), `$`-prefixed
//! operators compare, and `$and` / `$or` / `$nor` combine sub-filters.

use crate::core::value::{compare_same_type, compare_values, get_path, type_name, values_equal};
use crate::core::{Document, Result, StoreError};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::cmp::Ordering;

/// Returns true when `doc` satisfies every clause of `filter`.
pub fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in sub_filters(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in sub_filters(key, condition)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in sub_filters(key, condition)? {
                    if matches(doc, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            other if other.starts_with('$') => {
                return Err(StoreError::BadValue(format!(
                    "unknown top level operator: {}",
                    other
                )));
            }
            path => field_matches(get_path(doc, path), condition)?,
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn sub_filters<'a>(operator: &str, condition: &'a Value) -> Result<Vec<&'a Document>> {
    let clauses = condition.as_array().ok_or_else(|| {
        StoreError::BadValue(format!("{} must be an array", operator))
    })?;
    if clauses.is_empty() {
        return Err(StoreError::BadValue(format!(
            "{} must be a nonempty array",
            operator
        )));
    }

    clauses
        .iter()
        .map(|clause| {
            clause.as_object().ok_or_else(|| {
                StoreError::BadValue(format!("{} argument's entries must be objects", operator))
            })
        })
        .collect()
}

fn is_operator_object(condition: &Value) -> Option<&Document> {
    match condition {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => {
            Some(map)
        }
        _ => None,
    }
}

fn field_matches(field: Option<&Value>, condition: &Value) -> Result<bool> {
    let Some(operators) = is_operator_object(condition) else {
        return Ok(equals(field, condition));
    };

    for (operator, argument) in operators {
        let satisfied = match operator.as_str() {
            "$eq" => equals(field, argument),
            "$ne" => !equals(field, argument),
            "$gt" => compares(field, argument, |ord| ord == Ordering::Greater),
            "$gte" => compares(field, argument, |ord| ord != Ordering::Less),
            "$lt" => compares(field, argument, |ord| ord == Ordering::Less),
            "$lte" => compares(field, argument, |ord| ord != Ordering::Greater),
            "$in" => in_list(field, operator, argument)?,
            "$nin" => !in_list(field, operator, argument)?,
            "$exists" => truthy(argument) == field.is_some(),
            "$size" => {
                let expected = argument.as_u64().ok_or_else(|| {
                    StoreError::BadValue("$size needs a non-negative integer".into())
                })?;
                matches!(field, Some(Value::Array(items)) if items.len() as u64 == expected)
            }
            "$regex" => {
                let options = operators.get("$options").and_then(Value::as_str).unwrap_or("");
                let pattern = compile_regex(argument, options)?;
                regex_matches(field, &pattern)
            }
            "$options" => {
                if !operators.contains_key("$regex") {
                    return Err(StoreError::BadValue("$options needs a $regex".into()));
                }
                true
            }
            "$not" => {
                if is_operator_object(argument).is_none() {
                    return Err(StoreError::BadValue("$not needs a regex or a document".into()));
                }
                !field_matches(field, argument)?
            }
            other => {
                return Err(StoreError::BadValue(format!("unknown operator: {}", other)));
            }
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Equality, where a missing field equals `null` and an array field matches
/// when any of its elements does.
fn equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(actual) => {
            values_equal(actual, expected)
                || matches!(actual, Value::Array(items) if items.iter().any(|item| values_equal(item, expected)))
        }
    }
}

fn compares(field: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |value: &Value| compare_same_type(value, bound).is_some_and(&accept);
    match field {
        None => false,
        Some(Value::Array(items)) if !bound.is_array() => items.iter().any(check),
        Some(value) => check(value),
    }
}

fn in_list(field: Option<&Value>, operator: &str, argument: &Value) -> Result<bool> {
    let candidates = argument
        .as_array()
        .ok_or_else(|| StoreError::BadValue(format!("{} needs an array", operator)))?;
    Ok(candidates.iter().any(|candidate| equals(field, candidate)))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

fn compile_regex(pattern: &Value, options: &str) -> Result<Regex> {
    let source = pattern.as_str().ok_or_else(|| {
        StoreError::BadValue(format!("$regex has to be a string, not {}", type_name(pattern)))
    })?;

    let mut builder = RegexBuilder::new(source);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(StoreError::BadValue(format!(
                    "invalid flag in regex options: {}",
                    other
                )));
            }
        };
    }

    Ok(builder.build()?)
}

fn regex_matches(field: Option<&Value>, pattern: &Regex) -> bool {
    match field {
        Some(Value::String(s)) => pattern.is_match(s),
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| item.as_str().is_some_and(|s| pattern.is_match(s))),
        _ => false,
    }
}

/// Orders two documents according to a sort specification (`{field: 1|-1}`).
pub fn compare_by_sort(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (path, direction) in sort {
        let descending = direction.as_f64().is_some_and(|d| d < 0.0);
        let left = get_path(a, path).unwrap_or(&Value::Null);
        let right = get_path(b, path).unwrap_or(&Value::Null);
        let ord = compare_values(left, right);
        let ord = if descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn check(document: Value, filter: Value) -> bool {
        matches(&doc(document), &doc(filter)).unwrap()
    }

    #[test]
    fn test_equality_and_array_membership() {
        assert!(check(json!({"name": "ann"}), json!({"name": "ann"})));
        assert!(check(json!({"tags": ["a", "b"]}), json!({"tags": "b"})));
        assert!(check(json!({"x": 1}), json!({"missing": null})));
        assert!(!check(json!({"name": "ann"}), json!({"name": "bob"})));
    }

    #[test]
    fn test_range_operators() {
        let person = json!({"age": 30});
        assert!(check(person.clone(), json!({"age": {"$gt": 21}})));
        assert!(check(person.clone(), json!({"age": {"$gte": 30, "$lt": 31}})));
        assert!(!check(person.clone(), json!({"age": {"$lte": 29}})));
        assert!(!check(person, json!({"age": {"$gt": "21"}})));
        assert!(!check(json!({}), json!({"age": {"$gt": 21}})));
    }

    #[test]
    fn test_set_operators_and_exists() {
        let d = json!({"status": "active", "n": 2});
        assert!(check(d.clone(), json!({"status": {"$in": ["active", "new"]}})));
        assert!(check(d.clone(), json!({"status": {"$nin": ["gone"]}})));
        assert!(check(d.clone(), json!({"n": {"$exists": true}, "z": {"$exists": false}})));
        assert!(check(d, json!({"n": {"$ne": 3}})));
    }

    #[test]
    fn test_logical_combinators() {
        let d = json!({"a": 1, "b": 2});
        assert!(check(d.clone(), json!({"$or": [{"a": 5}, {"b": 2}]})));
        assert!(!check(d.clone(), json!({"$and": [{"a": 1}, {"b": 3}]})));
        assert!(check(d.clone(), json!({"$nor": [{"a": 5}]})));
        assert!(check(d, json!({"a": {"$not": {"$gt": 4}}})));
    }

    #[test]
    fn test_regex_with_options() {
        let d = json!({"email": "Ann@Example.com"});
        assert!(check(d.clone(), json!({"email": {"$regex": "example", "$options": "i"}})));
        assert!(!check(d, json!({"email": {"$regex": "^bob"}})));
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let err = matches(&doc(json!({"a": 1})), &doc(json!({"a": {"$near": 1}}))).unwrap_err();
        assert_eq!(err.code(), 2);
        assert!(matches(&doc(json!({})), &doc(json!({"$where": "1"}))).is_err());
    }

    #[test]
    fn test_sort_order() {
        let a = doc(json!({"age": 20, "name": "b"}));
        let b = doc(json!({"age": 20, "name": "a"}));
        let sort = doc(json!({"age": -1, "name": 1}));
        assert_eq!(compare_by_sort(&a, &b, &sort), Ordering::Greater);
    }
}
