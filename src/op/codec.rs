//! Positional tuple codec for the operation log
//!
//! One JSON array per line:
//!
//! ```text
//! ["m", <counter>, <targetId>, <parentId|null>]
//! ["p", <counter>, <targetId>, <key>, <value|{}>]
//! ```
//!
//! The origin id is not part of the line; it comes from the shard the line was read from.
//! The tag alone selects the schema, so arity is checked per tag and nothing is inferred
//! from the shape of the array.

use super::{MoveOp, OpId, Operation, PropertyUpdate, PropertyValue, SetPropertyOp};
use crate::error::DecodeError;
use serde_json::{Map, Value};
use std::borrow::Cow;

pub const MOVE_TAG: &str = "m";
pub const SET_PROPERTY_TAG: &str = "p";

const MOVE_ARITY: usize = 4;
const SET_PROPERTY_ARITY: usize = 5;

/// Encode one operation as a log line (no trailing newline).
pub fn encode_line(op: &Operation) -> String {
    let tuple = match op {
        Operation::Move(op) => vec![
            Value::from(MOVE_TAG),
            Value::from(op.id.counter),
            Value::from(op.target_id.as_str()),
            op.parent_id
                .as_deref()
                .map(Value::from)
                .unwrap_or(Value::Null),
        ],
        Operation::SetProperty(op) => vec![
            Value::from(SET_PROPERTY_TAG),
            Value::from(op.id.counter),
            Value::from(op.target_id.as_str()),
            Value::from(op.key.as_str()),
            encode_update(&op.value),
        ],
    };
    Value::Array(tuple).to_string()
}

/// Encode a run of operations as newline-terminated JSONL.
pub fn encode_lines<'a>(ops: impl IntoIterator<Item = &'a Operation>) -> String {
    let mut out = String::new();
    for op in ops {
        out.push_str(&encode_line(op));
        out.push('\n');
    }
    out
}

fn encode_update(update: &PropertyUpdate) -> Value {
    match update {
        PropertyUpdate::Clear => Value::Object(Map::new()),
        PropertyUpdate::Set(value) => encode_value(value),
    }
}

fn encode_value(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::String(s) => Value::from(s.as_str()),
        PropertyValue::Number(n) => Value::Number(n.clone()),
        PropertyValue::Boolean(b) => Value::Bool(*b),
        PropertyValue::StringArray(items) => {
            Value::Array(items.iter().map(|s| Value::from(s.as_str())).collect())
        }
        PropertyValue::NumberArray(items) => {
            Value::Array(items.iter().cloned().map(Value::Number).collect())
        }
        PropertyValue::BooleanArray(items) => {
            Value::Array(items.iter().copied().map(Value::Bool).collect())
        }
    }
}

/// Strip whitespace, NUL bytes and one pair of stray surrounding quotes from a raw line.
pub fn sanitize_line(line: &str) -> Cow<'_, str> {
    let mut cleaned: Cow<'_, str> = if line.contains('\0') {
        Cow::Owned(line.replace('\0', ""))
    } else {
        Cow::Borrowed(line)
    };

    let trimmed = {
        let s = cleaned.trim();
        let s = s.strip_prefix('"').unwrap_or(s);
        let s = s.strip_suffix('"').unwrap_or(s);
        s.trim()
    };
    if trimmed.len() != cleaned.len() {
        cleaned = Cow::Owned(trimmed.to_string());
    }
    cleaned
}

/// Decode one sanitized log line, stamping it with `origin_id`.
pub fn decode_line(line: &str, origin_id: &str) -> Result<Operation, DecodeError> {
    let parsed: Value =
        serde_json::from_str(line).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    let Value::Array(fields) = parsed else {
        return Err(DecodeError::NotAnArray);
    };

    let tag = match fields.first() {
        Some(Value::String(tag)) => tag.as_str(),
        Some(_) | None => return Err(DecodeError::MissingTag),
    };

    match tag {
        MOVE_TAG => {
            check_arity(MOVE_TAG, MOVE_ARITY, fields.len())?;
            let id = OpId::new(decode_counter(&fields[1])?, origin_id);
            let target_id = decode_string(&fields[2], "target id")?;
            let parent_id = match &fields[3] {
                Value::Null => None,
                Value::String(parent) => Some(parent.clone()),
                _ => return Err(invalid("parent id", "must be a string or null")),
            };
            Ok(Operation::Move(MoveOp {
                id,
                target_id,
                parent_id,
            }))
        }
        SET_PROPERTY_TAG => {
            check_arity(SET_PROPERTY_TAG, SET_PROPERTY_ARITY, fields.len())?;
            let id = OpId::new(decode_counter(&fields[1])?, origin_id);
            let target_id = decode_string(&fields[2], "target id")?;
            let key = decode_string(&fields[3], "key")?;
            let value = decode_update(&fields[4])?;
            Ok(Operation::SetProperty(SetPropertyOp {
                id,
                target_id,
                key,
                value,
                transient: false,
            }))
        }
        other => Err(DecodeError::UnknownTag(other.to_string())),
    }
}

fn check_arity(tag: &'static str, expected: usize, found: usize) -> Result<(), DecodeError> {
    if expected == found {
        Ok(())
    } else {
        Err(DecodeError::Arity {
            tag,
            expected,
            found,
        })
    }
}

fn invalid(field: &'static str, reason: &str) -> DecodeError {
    DecodeError::InvalidField {
        field,
        reason: reason.to_string(),
    }
}

fn decode_counter(value: &Value) -> Result<u64, DecodeError> {
    value
        .as_u64()
        .ok_or_else(|| invalid("counter", "must be an unsigned integer"))
}

fn decode_string(value: &Value, field: &'static str) -> Result<String, DecodeError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(field, "must be a string"))
}

fn decode_update(value: &Value) -> Result<PropertyUpdate, DecodeError> {
    let decoded = match value {
        Value::Object(map) if map.is_empty() => return Ok(PropertyUpdate::Clear),
        Value::Object(_) => return Err(invalid("value", "objects other than {} are not allowed")),
        Value::Null => return Err(invalid("value", "null is not a property value")),
        Value::String(s) => PropertyValue::String(s.clone()),
        Value::Number(n) => PropertyValue::Number(n.clone()),
        Value::Bool(b) => PropertyValue::Boolean(*b),
        Value::Array(items) => decode_array(items)?,
    };
    Ok(PropertyUpdate::Set(decoded))
}

fn decode_array(items: &[Value]) -> Result<PropertyValue, DecodeError> {
    let mixed = || invalid("value", "array elements must share one primitive type");

    match items.first() {
        None | Some(Value::String(_)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(mixed))
            .collect::<Result<Vec<_>, _>>()
            .map(PropertyValue::StringArray),
        Some(Value::Number(_)) => items
            .iter()
            .map(|v| match v {
                Value::Number(n) => Ok(n.clone()),
                _ => Err(mixed()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(PropertyValue::NumberArray),
        Some(Value::Bool(_)) => items
            .iter()
            .map(|v| v.as_bool().ok_or_else(mixed))
            .collect::<Result<Vec<_>, _>>()
            .map(PropertyValue::BooleanArray),
        Some(_) => Err(invalid("value", "arrays may only hold strings, numbers or booleans")),
    }
}
