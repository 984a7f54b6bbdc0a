use crate::core::Result;
use crate::result::RawValue;
use serde_json::{Map, Number, Value};

/// Turns an action result into a plain JSON tree.
///
/// A top-level cursor is drained first. Anything JSON cannot carry (driver
/// handles, nested cursors, NaN and infinities) is dropped: skipped inside
/// arrays and objects, `null` at the top. Only draining the cursor can fail.
pub async fn normalize(raw: RawValue) -> Result<Value> {
    match raw {
        RawValue::Cursor(cursor) => {
            let documents = cursor.try_collect().await?;
            Ok(Value::Array(documents.into_iter().map(Value::Object).collect()))
        }
        other => Ok(transport_safe(other).unwrap_or(Value::Null)),
    }
}

fn transport_safe(raw: RawValue) -> Option<Value> {
    match raw {
        RawValue::Json(value) => Some(value),
        RawValue::Float(value) => Number::from_f64(value).map(Value::Number),
        RawValue::List(items) => Some(Value::Array(
            items.into_iter().filter_map(transport_safe).collect(),
        )),
        RawValue::Record(fields) => Some(Value::Object(
            fields
                .into_iter()
                .filter_map(|(name, value)| transport_safe(value).map(|value| (name, value)))
                .collect::<Map<_, _>>(),
        )),
        RawValue::Cursor(_) | RawValue::Handle(_) => None,
    }
}
