//! Typed argument cursor over a call's params.
//!
//! Missing, surplus or mistyped arguments fail with `MethodError`. The
//! server checks for surplus arguments only after the handler returns, so a
//! handler with side effects must take its arguments and call
//! [`Params::finish`] before it mutates anything.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use dynbus_core::error::{DynbusError, Result};
use dynbus_core::protocol::{Tagged, TypedArray};

use super::class::{Local, RemoteObject};
use super::registry::ObjectRegistry;
use super::typed_array::TypedArrayObject;

pub struct Params<'a> {
    method: &'a str,
    registry: &'a ObjectRegistry,
    items: std::vec::IntoIter<Value>,
    position: usize,
}

impl<'a> Params<'a> {
    pub(crate) fn new(method: &'a str, registry: &'a ObjectRegistry, items: Vec<Value>) -> Self {
        Self {
            method,
            registry,
            items: items.into_iter(),
            position: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }

    fn next_raw(&mut self) -> Result<Value> {
        let v = self.items.next().ok_or_else(|| {
            DynbusError::Method(format!(
                "{}: missing argument {}",
                self.method, self.position
            ))
        })?;
        self.position += 1;
        Ok(v)
    }

    fn mistyped(&self, expected: &str) -> DynbusError {
        DynbusError::Method(format!(
            "{}: argument {} must be {expected}",
            self.method,
            self.position.saturating_sub(1)
        ))
    }

    /// Plain data argument.
    pub fn next<T: DeserializeOwned>(&mut self) -> Result<T> {
        let v = self.next_raw()?;
        if Tagged::from_param(&v)?.is_some() {
            return Err(self.mistyped("plain data"));
        }
        serde_json::from_value(v).map_err(|e| {
            DynbusError::Method(format!(
                "{}: argument {}: {e}",
                self.method,
                self.position.saturating_sub(1)
            ))
        })
    }

    /// Any argument: handles resolve to registered objects, typed-array
    /// literals become fresh objects, everything else stays data.
    pub fn next_local(&mut self) -> Result<Local> {
        let v = self.next_raw()?;
        self.decode(v)
    }

    pub fn next_object(&mut self) -> Result<Arc<dyn RemoteObject>> {
        match self.next_local()? {
            Local::Object(o) => Ok(o),
            Local::Value(_) => Err(self.mistyped("an object")),
        }
    }

    /// `null` is accepted as "no object".
    pub fn next_optional_object(&mut self) -> Result<Option<Arc<dyn RemoteObject>>> {
        match self.next_local()? {
            Local::Object(o) => Ok(Some(o)),
            Local::Value(Value::Null) => Ok(None),
            Local::Value(_) => Err(self.mistyped("an object or null")),
        }
    }

    /// Typed-array literal, or a typed-array object sent by handle.
    pub fn next_typed_array(&mut self) -> Result<TypedArray> {
        let v = self.next_raw()?;
        match Tagged::from_param(&v).map_err(|e| DynbusError::Method(e.to_string()))? {
            Some(Tagged::Array(a)) => Ok(a),
            Some(Tagged::Object(h)) => {
                let obj = self.lookup(h.object_id)?;
                obj.as_any()
                    .downcast_ref::<TypedArrayObject>()
                    .map(|t| t.array().clone())
                    .ok_or_else(|| self.mistyped("a typed array"))
            }
            None => Err(self.mistyped("a typed array")),
        }
    }

    /// Fails if arguments are left over.
    pub fn finish(&self) -> Result<()> {
        match self.items.len() {
            0 => Ok(()),
            n => Err(DynbusError::Method(format!(
                "{}: {n} unexpected extra argument(s)",
                self.method
            ))),
        }
    }

    pub(crate) fn decode(&self, v: Value) -> Result<Local> {
        match Tagged::from_param(&v).map_err(|e| DynbusError::Method(e.to_string()))? {
            Some(Tagged::Object(h)) => Ok(Local::Object(self.lookup(h.object_id)?)),
            Some(Tagged::Array(a)) => Ok(Local::Object(Arc::new(TypedArrayObject::new(a)))),
            None => Ok(Local::Value(v)),
        }
    }

    fn lookup(&self, id: u64) -> Result<Arc<dyn RemoteObject>> {
        self.registry
            .get(id)
            .ok_or_else(|| DynbusError::Method(format!("{}: unknown object id {id}", self.method)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arity_is_checked() {
        let reg = ObjectRegistry::new();
        let mut p = Params::new("drawArrays", &reg, vec![json!(4), json!(0)]);
        assert_eq!(p.remaining(), 2);
        assert_eq!(p.next::<u32>().unwrap(), 4);
        assert!(p.finish().is_err());
        assert_eq!(p.next::<u32>().unwrap(), 0);
        assert_eq!(p.remaining(), 0);
        p.finish().unwrap();
        let err = p.next::<u32>().unwrap_err();
        assert_eq!(err.client_code().as_str(), "METHOD_ERROR");
    }

    #[test]
    fn typed_array_literal_becomes_object() {
        let reg = ObjectRegistry::new();
        let lit = TypedArray::uint16(vec![0.0, 1.0, 2.0]).to_param();
        let mut p = Params::new("bufferData", &reg, vec![lit]);
        let obj = p.next_object().unwrap();
        assert_eq!(obj.class().name(), "Uint16Array");
    }

    #[test]
    fn unknown_handle_is_a_method_error() {
        let reg = ObjectRegistry::new();
        let mut p = Params::new("bindBuffer", &reg, vec![json!({"__jsonclass__": ["WebGLBuffer", 9]})]);
        let err = p.next_local().unwrap_err();
        assert_eq!(err.client_code().as_str(), "METHOD_ERROR");
    }

    #[test]
    fn handles_are_not_plain_data() {
        let reg = ObjectRegistry::new();
        let mut p = Params::new("m", &reg, vec![json!({"__jsonclass__": ["X", 0]})]);
        assert!(p.next::<Value>().is_err());
    }
}
