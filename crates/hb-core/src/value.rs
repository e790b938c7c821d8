use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::handle::{FunctionRef, ObjectRef};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScriptValue {
    Null,
    #[default]
    Undefined,
    Bool(bool),
    Int(i64),
    Number(f64),
    String(String),
    Array(Vec<ScriptValue>),
    Map(BTreeMap<String, ScriptValue>),
    Object(ObjectRef),
    Function(FunctionRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
    /// Any decodable value; only used as an expectation.
    Any,
    Null,
    Undefined,
    Boolean,
    Int,
    Number,
    String,
    Array,
    Map,
    Object,
    Function,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Any => "value",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Boolean => "boolean",
            Self::Int => "int",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Map => "map",
            Self::Object => "object",
            Self::Function => "function",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ScriptValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Undefined => ValueKind::Undefined,
            Self::Bool(_) => ValueKind::Boolean,
            Self::Int(_) => ValueKind::Int,
            Self::Number(_) => ValueKind::Number,
            Self::String(_) => ValueKind::String,
            Self::Array(_) => ValueKind::Array,
            Self::Map(_) => ValueKind::Map,
            Self::Object(_) => ValueKind::Object,
            Self::Function(_) => ValueKind::Function,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Null | Self::Undefined)
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Number(value) if is_integral(*value) => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionRef> {
        match self {
            Self::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn decode<T: FromScriptValue>(self) -> Result<T, DecodeError> {
        T::from_script_value(self)
    }

    pub fn to_text(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Undefined => "undefined".to_string(),
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Number(value) => {
                if is_integral(*value) {
                    (*value as i64).to_string()
                } else {
                    value.to_string()
                }
            }
            Self::String(value) => value.clone(),
            Self::Array(values) => format!(
                "[{}]",
                values
                    .iter()
                    .map(ScriptValue::to_text)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::Map(values) => format!(
                "#{{{}}}",
                values
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, value.to_text()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::Object(object) => format!("[object {}]", object.type_name()),
            Self::Function(function) => format!("[function {}]", function.name()),
        }
    }
}

fn is_integral(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0
}

pub trait FromScriptValue: Sized {
    const EXPECTED: ValueKind;

    fn from_script_value(value: ScriptValue) -> Result<Self, DecodeError>;
}

fn mismatch<T: FromScriptValue>(value: &ScriptValue) -> DecodeError {
    DecodeError::new(T::EXPECTED, value.type_name())
}

impl FromScriptValue for ScriptValue {
    const EXPECTED: ValueKind = ValueKind::Any;

    fn from_script_value(value: ScriptValue) -> Result<Self, DecodeError> {
        Ok(value)
    }
}

impl FromScriptValue for bool {
    const EXPECTED: ValueKind = ValueKind::Boolean;

    fn from_script_value(value: ScriptValue) -> Result<Self, DecodeError> {
        value.as_bool().ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl FromScriptValue for i64 {
    const EXPECTED: ValueKind = ValueKind::Int;

    fn from_script_value(value: ScriptValue) -> Result<Self, DecodeError> {
        value.as_int().ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl FromScriptValue for f64 {
    const EXPECTED: ValueKind = ValueKind::Number;

    fn from_script_value(value: ScriptValue) -> Result<Self, DecodeError> {
        value.as_number().ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl FromScriptValue for String {
    const EXPECTED: ValueKind = ValueKind::String;

    fn from_script_value(value: ScriptValue) -> Result<Self, DecodeError> {
        match value {
            ScriptValue::String(text) => Ok(text),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromScriptValue for ObjectRef {
    const EXPECTED: ValueKind = ValueKind::Object;

    fn from_script_value(value: ScriptValue) -> Result<Self, DecodeError> {
        match value {
            ScriptValue::Object(object) => Ok(object),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromScriptValue for FunctionRef {
    const EXPECTED: ValueKind = ValueKind::Function;

    fn from_script_value(value: ScriptValue) -> Result<Self, DecodeError> {
        match value {
            ScriptValue::Function(function) => Ok(function),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: FromScriptValue> FromScriptValue for Option<T> {
    const EXPECTED: ValueKind = T::EXPECTED;

    fn from_script_value(value: ScriptValue) -> Result<Self, DecodeError> {
        if value.is_nullish() {
            return Ok(None);
        }
        T::from_script_value(value).map(Some)
    }
}

impl<T: FromScriptValue> FromScriptValue for Vec<T> {
    const EXPECTED: ValueKind = ValueKind::Array;

    fn from_script_value(value: ScriptValue) -> Result<Self, DecodeError> {
        match value {
            ScriptValue::Array(values) => values
                .into_iter()
                .map(T::from_script_value)
                .collect::<Result<Vec<_>, _>>(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl From<()> for ScriptValue {
    fn from(_: ()) -> Self {
        Self::Undefined
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ScriptValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ScriptValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for ScriptValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<ObjectRef> for ScriptValue {
    fn from(value: ObjectRef) -> Self {
        Self::Object(value)
    }
}

impl From<FunctionRef> for ScriptValue {
    fn from(value: FunctionRef) -> Self {
        Self::Function(value)
    }
}

impl<T: Into<ScriptValue>> From<Vec<T>> for ScriptValue {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ScriptValue>> From<Option<T>> for ScriptValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}
