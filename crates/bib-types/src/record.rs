//! Record bodies and the (source, GUID) key space.

use serde_json::{Map, Value};

use crate::error::TypeError;

/// A record body: a JSON object whose key order is preserved.
///
/// Order matters because the serialized form feeds the fingerprint; a record
/// written as `{"Name":..,"Age":..}` must hash the same way every time.
pub type Record = Map<String, Value>;

/// Validate a source hash.
pub fn validate_source(source: &str) -> Result<(), TypeError> {
    if source.is_empty() {
        return Err(TypeError::EmptySource);
    }
    Ok(())
}

/// Validate a record GUID.
pub fn validate_guid(guid: &str) -> Result<(), TypeError> {
    if guid.is_empty() {
        return Err(TypeError::EmptyGuid);
    }
    Ok(())
}

/// Unwrap a JSON value into a record, rejecting anything that is not an object.
pub fn record_from_value(value: Value) -> Result<Record, TypeError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Err(TypeError::NotAMap("null")),
        Value::Bool(_) => Err(TypeError::NotAMap("boolean")),
        Value::Number(_) => Err(TypeError::NotAMap("number")),
        Value::String(_) => Err(TypeError::NotAMap("string")),
        Value::Array(_) => Err(TypeError::NotAMap("array")),
    }
}

/// Compact JSON text of a record, in key insertion order.
pub fn serialize_record(record: &Record) -> String {
    // Serializing a map of `Value`s cannot fail: keys are strings and every
    // value is already valid JSON.
    serde_json::to_string(record).unwrap_or_else(|_| String::from("{}"))
}
