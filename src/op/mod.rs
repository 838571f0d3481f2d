//! Replicated tree operations
//!
//! The closed set of edits a vertex tree accepts. Every operation carries an
//! [`OpId`]; the external reducer orders and applies them.

pub mod codec;
pub mod id;
pub mod parser;

pub use codec::{decode_line, encode_line, encode_lines, sanitize_line};
pub use id::{OpId, OpIdParseError};
pub use parser::OpsParser;

use serde_json::Number;

/// A property value a vertex can hold.
///
/// Arrays are homogeneous; an empty array decodes as [`PropertyValue::StringArray`].
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Number(Number),
    Boolean(bool),
    StringArray(Vec<String>),
    NumberArray(Vec<Number>),
    BooleanArray(Vec<bool>),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Number(value.into())
    }
}

/// What a SetProperty does to its key: set a value, or clear it.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyUpdate {
    Set(PropertyValue),
    /// Written as `{}` on the wire
    Clear,
}

impl From<PropertyValue> for PropertyUpdate {
    fn from(value: PropertyValue) -> Self {
        PropertyUpdate::Set(value)
    }
}

impl From<&str> for PropertyUpdate {
    fn from(value: &str) -> Self {
        PropertyUpdate::Set(value.into())
    }
}

impl From<String> for PropertyUpdate {
    fn from(value: String) -> Self {
        PropertyUpdate::Set(value.into())
    }
}

impl From<bool> for PropertyUpdate {
    fn from(value: bool) -> Self {
        PropertyUpdate::Set(value.into())
    }
}

impl From<i64> for PropertyUpdate {
    fn from(value: i64) -> Self {
        PropertyUpdate::Set(value.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveOp {
    pub id: OpId,
    pub target_id: String,
    /// `None` detaches the vertex (or marks a tree root)
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetPropertyOp {
    pub id: OpId,
    pub target_id: String,
    pub key: String,
    pub value: PropertyUpdate,
    /// Live-only edit (e.g. a draft or cursor); never written to the log
    pub transient: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Move(MoveOp),
    SetProperty(SetPropertyOp),
}

impl Operation {
    pub fn new_move(
        counter: u64,
        origin_id: impl Into<String>,
        target_id: impl Into<String>,
        parent_id: Option<&str>,
    ) -> Self {
        Operation::Move(MoveOp {
            id: OpId::new(counter, origin_id),
            target_id: target_id.into(),
            parent_id: parent_id.map(str::to_string),
        })
    }

    pub fn new_set_property(
        counter: u64,
        origin_id: impl Into<String>,
        target_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<PropertyUpdate>,
    ) -> Self {
        Operation::SetProperty(SetPropertyOp {
            id: OpId::new(counter, origin_id),
            target_id: target_id.into(),
            key: key.into(),
            value: value.into(),
            transient: false,
        })
    }

    /// A SetProperty that is shared live but never persisted.
    pub fn new_transient_property(
        counter: u64,
        origin_id: impl Into<String>,
        target_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<PropertyUpdate>,
    ) -> Self {
        Operation::SetProperty(SetPropertyOp {
            id: OpId::new(counter, origin_id),
            target_id: target_id.into(),
            key: key.into(),
            value: value.into(),
            transient: true,
        })
    }

    pub fn new_clear_property(
        counter: u64,
        origin_id: impl Into<String>,
        target_id: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::new_set_property(counter, origin_id, target_id, key, PropertyUpdate::Clear)
    }

    pub fn id(&self) -> &OpId {
        match self {
            Operation::Move(op) => &op.id,
            Operation::SetProperty(op) => &op.id,
        }
    }

    pub fn target_id(&self) -> &str {
        match self {
            Operation::Move(op) => &op.target_id,
            Operation::SetProperty(op) => &op.target_id,
        }
    }

    pub fn origin_id(&self) -> &str {
        &self.id().origin_id
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Operation::SetProperty(op) if op.transient)
    }

    /// Short tag used on the wire and in listings
    pub fn tag(&self) -> &'static str {
        match self {
            Operation::Move(_) => codec::MOVE_TAG,
            Operation::SetProperty(_) => codec::SET_PROPERTY_TAG,
        }
    }
}
