//! Server role: answers calls against locally exposed objects.
//!
//! Params always start with the target (`null` = root object). Builtins:
//! - `__getter__ [target, name]`
//! - `__setter__ [target, name, value]`
//! - `__inspect__ [null, constructorName]` -> Constructor Spec or `null`
//! - `__root__` / `getRootObject [null]`
//! - `__release__ [target]` -> whether an id was dropped
//!
//! Any other method is looked up in the target's class chain. Every failure
//! becomes an error reply; none of them ends the receive loop.

pub mod class;
pub mod params;
pub mod registry;
pub mod typed_array;

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use dynbus_core::error::{DynbusError, Result};
use dynbus_core::protocol::{is_primitive, methods, Call, Handle, Message, Reply};

pub use class::{Class, ClassBuilder, Local, RemoteObject};
pub use params::Params;
pub use registry::ObjectRegistry;
pub use typed_array::TypedArrayObject;

pub struct Server {
    root: Arc<dyn RemoteObject>,
    registry: ObjectRegistry,
    classes: DashMap<String, Arc<Class>>,
}

impl Server {
    /// The root object is registered first and therefore always has id 0.
    pub fn new(root: Arc<dyn RemoteObject>) -> Self {
        let server = Self {
            root,
            registry: ObjectRegistry::new(),
            classes: DashMap::new(),
        };
        server.registry.id_of(&server.root);
        server.register_class(&server.root.class());
        server
    }

    /// Make a class (and its ancestors) answerable through `__inspect__`
    /// before any instance has been handed out.
    pub fn register_class(&self, class: &Arc<Class>) {
        let mut cur = Some(Arc::clone(class));
        while let Some(c) = cur {
            if self.classes.contains_key(c.name()) {
                break;
            }
            cur = c.parent().cloned();
            self.classes.insert(c.name().to_string(), c);
        }
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// Handle one incoming call; `Some(reply)` when the call carries an id.
    pub fn handle(&self, call: Call) -> Option<Message> {
        let id = call.id;
        let method = call.method.clone();

        let outcome = call.check_version().and_then(|()| self.invoke(call));
        match (id, outcome) {
            (Some(id), Ok(v)) => Some(Reply::result(id, v).into()),
            (Some(id), Err(e)) => {
                tracing::debug!(id, method = %method, error = %e, "call failed");
                Some(Reply::error(Some(id), &e).into())
            }
            (None, Ok(_)) => None,
            (None, Err(e)) => {
                tracing::warn!(method = %method, error = %e, "one-way call failed");
                None
            }
        }
    }

    fn invoke(&self, call: Call) -> Result<Value> {
        let Call { method, params, .. } = call;
        let mut params = Params::new(&method, &self.registry, params);
        self.dispatch(&method, &mut params).map_err(|e| match e {
            DynbusError::Method(_) | DynbusError::Remote { .. } => e,
            other => DynbusError::Method(other.to_string()),
        })
    }

    fn dispatch(&self, method: &str, params: &mut Params<'_>) -> Result<Value> {
        match method {
            methods::GETTER => {
                let target = self.target(params)?;
                let name: String = params.next()?;
                params.finish()?;
                let v = target.class().get(&*target, &name)?;
                self.marshal(v)
            }
            methods::SETTER => {
                let target = self.target(params)?;
                let name: String = params.next()?;
                let value = params.next_local()?;
                params.finish()?;
                target.class().set(&*target, &name, value)?;
                Ok(Value::Null)
            }
            methods::INSPECT => {
                let _: Value = params.next()?;
                let name: String = params.next()?;
                params.finish()?;
                match self.classes.get(&name) {
                    Some(c) => serde_json::to_value(c.spec())
                        .map_err(|e| DynbusError::Internal(format!("spec encode failed: {e}"))),
                    None => Ok(Value::Null),
                }
            }
            methods::ROOT | methods::GET_ROOT_OBJECT => {
                let _ = self.target(params)?;
                params.finish()?;
                self.marshal(Local::Object(Arc::clone(&self.root)))
            }
            methods::RELEASE => {
                let target = params.next_object()?;
                params.finish()?;
                if Arc::ptr_eq(&target, &self.root) {
                    return Err(DynbusError::Method("the root object cannot be released".into()));
                }
                let id = self.registry.id_of(&target);
                Ok(Value::Bool(self.registry.release(id)))
            }
            name => {
                let target = self.target(params)?;
                let v = target.class().invoke(&*target, name, params)?;
                // handlers that mutate have already called finish()
                params.finish()?;
                self.marshal(v)
            }
        }
    }

    fn target(&self, params: &mut Params<'_>) -> Result<Arc<dyn RemoteObject>> {
        Ok(params
            .next_optional_object()?
            .unwrap_or_else(|| Arc::clone(&self.root)))
    }

    /// Result encoding: data passes through, objects become handles.
    fn marshal(&self, v: Local) -> Result<Value> {
        match v {
            Local::Value(v) if is_primitive(&v) || v.is_array() => Ok(v),
            Local::Value(_) => Err(DynbusError::Method(
                "plain JSON objects cannot be returned; expose a RemoteObject".into(),
            )),
            Local::Object(obj) => {
                let class = obj.class();
                self.register_class(&class);
                let id = self.registry.id_of(&obj);
                Ok(Handle::new(class.name(), id).to_result())
            }
        }
    }
}
