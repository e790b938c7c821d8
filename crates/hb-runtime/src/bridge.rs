use std::collections::BTreeMap;

use hb_core::{DecodeError, FromScriptValue, FunctionRef, ObjectRef, ScriptValue, ValueKind};
use rhai::{Array, Dynamic, FnPtr, ImmutableString, Map};

/// Engine-side representation of `null`. The engine has no null of its own;
/// unit stands for `undefined`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullValue;

pub fn encode(value: &ScriptValue) -> Dynamic {
    match value {
        ScriptValue::Null => Dynamic::from(NullValue),
        ScriptValue::Undefined => Dynamic::UNIT,
        ScriptValue::Bool(value) => Dynamic::from_bool(*value),
        ScriptValue::Int(value) => Dynamic::from_int(*value),
        ScriptValue::Number(value) => Dynamic::from_float(*value),
        ScriptValue::String(value) => Dynamic::from(value.clone()),
        ScriptValue::Array(values) => {
            Dynamic::from_array(values.iter().map(encode).collect::<Array>())
        }
        ScriptValue::Map(values) => {
            let mut map = Map::new();
            for (key, value) in values {
                map.insert(key.as_str().into(), encode(value));
            }
            Dynamic::from_map(map)
        }
        ScriptValue::Object(object) => Dynamic::from(object.clone()),
        ScriptValue::Function(function) => function
            .downcast::<FnPtr>()
            .map_or(Dynamic::UNIT, |pointer| Dynamic::from(pointer.clone())),
    }
}

pub fn decode(value: &Dynamic) -> Result<ScriptValue, DecodeError> {
    let value = value.flatten_clone();

    if value.is_unit() {
        return Ok(ScriptValue::Undefined);
    }
    if value.is::<NullValue>() {
        return Ok(ScriptValue::Null);
    }
    if let Ok(flag) = value.as_bool() {
        return Ok(ScriptValue::Bool(flag));
    }
    if let Ok(number) = value.as_int() {
        return Ok(ScriptValue::Int(number));
    }
    if let Ok(number) = value.as_float() {
        return Ok(ScriptValue::Number(number));
    }
    if let Ok(ch) = value.as_char() {
        return Ok(ScriptValue::String(ch.to_string()));
    }
    if value.is::<ImmutableString>() {
        let text = value
            .into_immutable_string()
            .map_err(|found| DecodeError::new(ValueKind::String, found))?;
        return Ok(ScriptValue::String(text.as_str().to_owned()));
    }
    if value.is::<ObjectRef>() {
        let type_name = value.type_name();
        return value
            .try_cast::<ObjectRef>()
            .map(ScriptValue::Object)
            .ok_or_else(|| DecodeError::new(ValueKind::Object, type_name));
    }
    if value.is::<FnPtr>() {
        let type_name = value.type_name();
        return value
            .try_cast::<FnPtr>()
            .map(|pointer| {
                let name = pointer.fn_name().to_string();
                ScriptValue::Function(FunctionRef::new(name, pointer))
            })
            .ok_or_else(|| DecodeError::new(ValueKind::Function, type_name));
    }
    if value.is::<Array>() {
        let type_name = value.type_name();
        let array = value
            .try_cast::<Array>()
            .ok_or_else(|| DecodeError::new(ValueKind::Array, type_name))?;
        return array
            .iter()
            .map(decode)
            .collect::<Result<Vec<_>, _>>()
            .map(ScriptValue::Array);
    }
    if value.is::<Map>() {
        let type_name = value.type_name();
        let map = value
            .try_cast::<Map>()
            .ok_or_else(|| DecodeError::new(ValueKind::Map, type_name))?;
        let mut out = BTreeMap::new();
        for (key, entry) in &map {
            out.insert(key.to_string(), decode(entry)?);
        }
        return Ok(ScriptValue::Map(out));
    }

    Err(DecodeError::new(ValueKind::Any, value.type_name()))
}

pub fn decode_as<T: FromScriptValue>(value: &Dynamic) -> Result<T, DecodeError> {
    decode(value).and_then(T::from_script_value)
}
