//! Client-side values: what callers pass in and get back.

use serde_json::Value;

use dynbus_core::error::{DynbusError, Result};
use dynbus_core::protocol::TypedArray;

use super::proxy::ObjectProxy;

/// A call argument.
#[derive(Debug, Clone)]
pub enum Arg {
    /// Plain data; sent as is.
    Value(Value),
    /// Reference to an object owned by the called peer.
    Object(ObjectProxy),
    /// Inline numeric block; becomes a fresh object on the other side.
    TypedArray(TypedArray),
}

impl Arg {
    pub fn null() -> Self {
        Arg::Value(Value::Null)
    }
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Arg::Value(v)
    }
}

impl From<ObjectProxy> for Arg {
    fn from(p: ObjectProxy) -> Self {
        Arg::Object(p)
    }
}

impl From<&ObjectProxy> for Arg {
    fn from(p: &ObjectProxy) -> Self {
        Arg::Object(p.clone())
    }
}

impl From<TypedArray> for Arg {
    fn from(a: TypedArray) -> Self {
        Arg::TypedArray(a)
    }
}

macro_rules! arg_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Arg {
            fn from(v: $t) -> Self {
                Arg::Value(Value::from(v))
            }
        })*
    };
}

arg_from!(bool, i32, i64, u32, u64, f32, f64, String, &str);

/// Build a `Vec<Arg>` from heterogeneous values.
#[macro_export]
macro_rules! args {
    () => { ::std::vec::Vec::<$crate::client::Arg>::new() };
    ($($x:expr),+ $(,)?) => { ::std::vec![$($crate::client::Arg::from($x)),+] };
}

/// A decoded result.
#[derive(Debug, Clone, PartialEq)]
pub enum Returned {
    Value(Value),
    Object(ObjectProxy),
}

impl Returned {
    pub fn into_object(self) -> Result<ObjectProxy> {
        match self {
            Returned::Object(p) => Ok(p),
            Returned::Value(v) => Err(DynbusError::BadRequest(format!(
                "expected an object, got {v}"
            ))),
        }
    }

    pub fn into_value(self) -> Result<Value> {
        match self {
            Returned::Value(v) => Ok(v),
            Returned::Object(p) => Err(DynbusError::BadRequest(format!(
                "expected data, got object {}",
                p.handle()
            ))),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Returned::Value(v) => Some(v),
            Returned::Object(_) => None,
        }
    }
}
