//! Handle markers: object references and typed-array literals on the wire.
//!
//! Param encodings (caller -> owner):
//! - object handle: `{"__jsonclass__": [constructorName, objectId]}`
//! - typed array:   `{"__jsonclass__": [typeName, [n0, n1, ...]]}`
//!
//! Result encoding (owner -> caller):
//! - `{"id": n, "class": "object", "__jsonclass__": [constructorName, n]}`

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{DynbusError, Result};

/// Marker key carried by every non-primitive wire value.
pub const HANDLE_TAG: &str = "__jsonclass__";

/// Object id, scoped to the endpoint that owns the object.
pub type ObjectId = u64;

/// Non-owning reference to a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    pub constructor: String,
    pub object_id: ObjectId,
}

impl Handle {
    pub fn new(constructor: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            constructor: constructor.into(),
            object_id,
        }
    }

    /// Param encoding.
    pub fn to_param(&self) -> Value {
        json!({ HANDLE_TAG: [self.constructor, self.object_id] })
    }

    /// Result encoding produced by the owning endpoint.
    pub fn to_result(&self) -> Value {
        json!({
            "id": self.object_id,
            "class": "object",
            HANDLE_TAG: [self.constructor, self.object_id],
        })
    }

    /// Decode a result value that must carry a handle marker.
    ///
    /// Accepts the tagged form and the bare `{id, class}` form; in the latter
    /// the class name doubles as constructor name.
    pub fn from_result(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(DynbusError::BadRequest("result is not a handle".into()));
        };
        if let Some(tagged) = map.get(HANDLE_TAG) {
            return match Tagged::from_tag(tagged)? {
                Tagged::Object(handle) => Ok(handle),
                Tagged::Array(_) => Err(DynbusError::BadRequest(
                    "typed array literal is not a valid result".into(),
                )),
            };
        }
        match (map.get("id").and_then(Value::as_u64), map.get("class").and_then(Value::as_str)) {
            (Some(id), Some(class)) => Ok(Handle::new(class, id)),
            _ => Err(DynbusError::BadRequest(
                "object result without handle marker".into(),
            )),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.constructor, self.object_id)
    }
}

/// Typed-array element types accepted inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypedArrayKind {
    Int8Array,
    Uint8Array,
    Uint8ClampedArray,
    Int16Array,
    Uint16Array,
    Int32Array,
    Uint32Array,
    Float32Array,
    Float64Array,
}

impl TypedArrayKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TypedArrayKind::Int8Array => "Int8Array",
            TypedArrayKind::Uint8Array => "Uint8Array",
            TypedArrayKind::Uint8ClampedArray => "Uint8ClampedArray",
            TypedArrayKind::Int16Array => "Int16Array",
            TypedArrayKind::Uint16Array => "Uint16Array",
            TypedArrayKind::Int32Array => "Int32Array",
            TypedArrayKind::Uint32Array => "Uint32Array",
            TypedArrayKind::Float32Array => "Float32Array",
            TypedArrayKind::Float64Array => "Float64Array",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let kind = match name {
            "Int8Array" => TypedArrayKind::Int8Array,
            "Uint8Array" => TypedArrayKind::Uint8Array,
            "Uint8ClampedArray" => TypedArrayKind::Uint8ClampedArray,
            "Int16Array" => TypedArrayKind::Int16Array,
            "Uint16Array" => TypedArrayKind::Uint16Array,
            "Int32Array" => TypedArrayKind::Int32Array,
            "Uint32Array" => TypedArrayKind::Uint32Array,
            "Float32Array" => TypedArrayKind::Float32Array,
            "Float64Array" => TypedArrayKind::Float64Array,
            _ => return None,
        };
        Some(kind)
    }

    /// Size of one element in bytes.
    pub fn element_size(self) -> usize {
        match self {
            TypedArrayKind::Int8Array
            | TypedArrayKind::Uint8Array
            | TypedArrayKind::Uint8ClampedArray => 1,
            TypedArrayKind::Int16Array | TypedArrayKind::Uint16Array => 2,
            TypedArrayKind::Int32Array
            | TypedArrayKind::Uint32Array
            | TypedArrayKind::Float32Array => 4,
            TypedArrayKind::Float64Array => 8,
        }
    }
}

/// Inline numeric block that becomes a fresh object on the receiving side.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArray {
    pub kind: TypedArrayKind,
    pub values: Vec<f64>,
}

impl TypedArray {
    pub fn new(kind: TypedArrayKind, values: impl Into<Vec<f64>>) -> Self {
        Self {
            kind,
            values: values.into(),
        }
    }

    pub fn float32(values: impl Into<Vec<f64>>) -> Self {
        Self::new(TypedArrayKind::Float32Array, values)
    }

    pub fn uint16(values: impl Into<Vec<f64>>) -> Self {
        Self::new(TypedArrayKind::Uint16Array, values)
    }

    pub fn uint8(values: impl Into<Vec<f64>>) -> Self {
        Self::new(TypedArrayKind::Uint8Array, values)
    }

    pub fn byte_length(&self) -> usize {
        self.values.len() * self.kind.element_size()
    }

    pub fn to_param(&self) -> Value {
        json!({ HANDLE_TAG: [self.kind.as_str(), self.values] })
    }
}

/// What a `__jsonclass__` marker points at.
#[derive(Debug, Clone, PartialEq)]
pub enum Tagged {
    Object(Handle),
    Array(TypedArray),
}

impl Tagged {
    /// Inspect a param value. `Ok(None)` means plain data.
    pub fn from_param(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Object(map) => match map.get(HANDLE_TAG) {
                Some(tagged) => Ok(Some(Self::from_tag(tagged)?)),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn from_tag(tagged: &Value) -> Result<Self> {
        let Some([name, payload]) = tagged.as_array().map(Vec::as_slice) else {
            return Err(DynbusError::BadRequest(format!("{HANDLE_TAG} must be a pair")));
        };
        let name = name
            .as_str()
            .ok_or_else(|| DynbusError::BadRequest(format!("{HANDLE_TAG} name must be a string")))?;

        match payload {
            Value::Array(items) => {
                let kind = TypedArrayKind::parse(name).ok_or_else(|| {
                    DynbusError::BadRequest(format!("unknown typed array type: {name}"))
                })?;
                let values = items
                    .iter()
                    .map(|v| {
                        v.as_f64().ok_or_else(|| {
                            DynbusError::BadRequest(format!("{name} element is not numeric"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Tagged::Array(TypedArray { kind, values }))
            }
            other => {
                let id = other.as_u64().ok_or_else(|| {
                    DynbusError::BadRequest(format!("{HANDLE_TAG} object id must be unsigned"))
                })?;
                Ok(Tagged::Object(Handle::new(name, id)))
            }
        }
    }
}

/// True for values that cross the wire unchanged.
pub fn is_primitive(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn handle_param_shape() {
        let h = Handle::new("RootObjectType", 0);
        assert_eq!(h.to_param(), json!({ "__jsonclass__": ["RootObjectType", 0] }));
    }

    #[test]
    fn result_keeps_id_and_class() {
        let v = Handle::new("HTMLCanvasElement", 3).to_result();
        assert_eq!(v["id"], 3);
        assert_eq!(v["class"], "object");
        assert_eq!(Handle::from_result(&v).unwrap(), Handle::new("HTMLCanvasElement", 3));
    }

    #[test]
    fn bare_id_class_result_uses_class_as_constructor() {
        let h = Handle::from_result(&json!({ "id": 1, "class": "object" })).unwrap();
        assert_eq!(h, Handle::new("object", 1));
    }

    #[test]
    fn typed_array_param_decodes_to_same_values() {
        let arr = TypedArray::float32(vec![-1.0, 0.5, 1.0]);
        let back = Tagged::from_param(&arr.to_param()).unwrap();
        assert_eq!(back, Some(Tagged::Array(arr)));
    }

    #[test]
    fn plain_data_is_not_tagged() {
        assert_eq!(Tagged::from_param(&json!([1, 2, 3])).unwrap(), None);
        assert_eq!(Tagged::from_param(&json!({ "x": 1 })).unwrap(), None);
    }

    #[test]
    fn unknown_typed_array_is_rejected() {
        let err = Tagged::from_param(&json!({ "__jsonclass__": ["BigInt64Array", [1]] })).unwrap_err();
        assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
    }
}
