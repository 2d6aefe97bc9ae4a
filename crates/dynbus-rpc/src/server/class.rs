//! Dispatch tables for exposed types.
//!
//! Each exposed Rust type gets one [`Class`]: name, optional parent, and
//! name -> handler maps for properties and methods, built once through
//! [`ClassBuilder`]. Dispatch walks the parent chain; the handler itself
//! finds its receiver by downcasting, following [`RemoteObject::base`] when
//! a type embeds its parent's state.

use std::any::Any;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use dynbus_core::error::{DynbusError, Result};
use dynbus_core::protocol::ConstructorSpec;

use super::params::Params;

/// An object that can be handed out by reference.
pub trait RemoteObject: Send + Sync + 'static {
    fn class(&self) -> Arc<Class>;

    fn as_any(&self) -> &dyn Any;

    /// Embedded parent object, for types whose class `extends` another.
    fn base(&self) -> Option<&dyn RemoteObject> {
        None
    }
}

/// A server-side value: plain JSON data or an object passed by reference.
#[derive(Clone)]
pub enum Local {
    Value(Value),
    Object(Arc<dyn RemoteObject>),
}

impl Local {
    pub fn null() -> Self {
        Local::Value(Value::Null)
    }

    pub fn object<T: RemoteObject>(obj: Arc<T>) -> Self {
        Local::Object(obj)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Local::Value(v) => Some(v),
            Local::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<dyn RemoteObject>> {
        match self {
            Local::Object(o) => Some(o),
            Local::Value(_) => None,
        }
    }
}

impl std::fmt::Debug for Local {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Local::Value(v) => write!(f, "Value({v})"),
            Local::Object(o) => write!(f, "Object({})", o.class().name()),
        }
    }
}

impl From<Value> for Local {
    fn from(v: Value) -> Self {
        Local::Value(v)
    }
}

macro_rules! local_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Local {
            fn from(v: $t) -> Self {
                Local::Value(Value::from(v))
            }
        })*
    };
}

local_from!(bool, i32, i64, u32, u64, f32, f64, String, &str);

impl From<()> for Local {
    fn from(_: ()) -> Self {
        Local::null()
    }
}

type Getter = Box<dyn Fn(&dyn RemoteObject) -> Result<Local> + Send + Sync>;
type Setter = Box<dyn Fn(&dyn RemoteObject, Local) -> Result<()> + Send + Sync>;
type Method = Box<dyn Fn(&dyn RemoteObject, &mut Params<'_>) -> Result<Local> + Send + Sync>;

struct Property {
    get: Getter,
    set: Option<Setter>,
}

pub struct Class {
    name: String,
    parent: Option<Arc<Class>>,
    properties: BTreeMap<String, Property>,
    methods: BTreeMap<String, Method>,
}

impl Class {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Class>> {
        self.parent.as_ref()
    }

    /// Shape of this level only. A class without parent reports `Object`.
    pub fn spec(&self) -> ConstructorSpec {
        let parent = self
            .parent
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "Object".to_string());
        ConstructorSpec::new(self.name.clone())
            .with_parent(parent)
            .with_properties(self.properties.keys().cloned())
            .with_methods(self.methods.keys().cloned())
    }

    /// This class followed by its ancestors.
    pub fn chain(&self) -> impl Iterator<Item = &Class> {
        std::iter::successors(Some(self), |c| c.parent.as_deref())
    }

    pub(crate) fn get(&self, obj: &dyn RemoteObject, name: &str) -> Result<Local> {
        let prop = self
            .chain()
            .find_map(|c| c.properties.get(name))
            .ok_or_else(|| DynbusError::Method(format!("{} has no property {name}", self.name)))?;
        (prop.get)(obj)
    }

    pub(crate) fn set(&self, obj: &dyn RemoteObject, name: &str, value: Local) -> Result<()> {
        let prop = self
            .chain()
            .find_map(|c| c.properties.get(name))
            .ok_or_else(|| DynbusError::Method(format!("{} has no property {name}", self.name)))?;
        match &prop.set {
            Some(set) => set(obj, value),
            None => Err(DynbusError::Method(format!(
                "property {name} of {} is read-only",
                self.name
            ))),
        }
    }

    pub(crate) fn invoke(
        &self,
        obj: &dyn RemoteObject,
        name: &str,
        params: &mut Params<'_>,
    ) -> Result<Local> {
        let method = self
            .chain()
            .find_map(|c| c.methods.get(name))
            .ok_or_else(|| DynbusError::Method(format!("{} has no method {name}", self.name)))?;
        method(obj, params)
    }
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .finish()
    }
}

/// Find the `T` inside `obj`, following embedded bases.
fn receiver<T: 'static>(obj: &dyn RemoteObject) -> Result<&T> {
    let mut cur = Some(obj);
    while let Some(o) = cur {
        if let Some(t) = o.as_any().downcast_ref::<T>() {
            return Ok(t);
        }
        cur = o.base();
    }
    Err(DynbusError::Method(format!(
        "receiver is not a {}",
        std::any::type_name::<T>()
    )))
}

/// Typed builder for a [`Class`]; handlers see `&T`.
pub struct ClassBuilder<T> {
    name: String,
    parent: Option<Arc<Class>>,
    properties: BTreeMap<String, Property>,
    methods: BTreeMap<String, Method>,
    _receiver: PhantomData<fn(&T)>,
}

impl<T: 'static> ClassBuilder<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            properties: BTreeMap::new(),
            methods: BTreeMap::new(),
            _receiver: PhantomData,
        }
    }

    pub fn extends(mut self, parent: &Arc<Class>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    pub fn property<G>(mut self, name: &str, get: G) -> Self
    where
        G: Fn(&T) -> Result<Local> + Send + Sync + 'static,
    {
        self.properties.insert(
            name.to_string(),
            Property {
                get: Box::new(move |obj| get(receiver::<T>(obj)?)),
                set: None,
            },
        );
        self
    }

    pub fn property_rw<G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Result<Local> + Send + Sync + 'static,
        S: Fn(&T, Local) -> Result<()> + Send + Sync + 'static,
    {
        self.properties.insert(
            name.to_string(),
            Property {
                get: Box::new(move |obj| get(receiver::<T>(obj)?)),
                set: Some(Box::new(move |obj, v| set(receiver::<T>(obj)?, v))),
            },
        );
        self
    }

    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&T, &mut Params<'_>) -> Result<Local> + Send + Sync + 'static,
    {
        self.methods.insert(
            name.to_string(),
            Box::new(move |obj, params| f(receiver::<T>(obj)?, params)),
        );
        self
    }

    pub fn build(self) -> Arc<Class> {
        Arc::new(Class {
            name: self.name,
            parent: self.parent,
            properties: self.properties,
            methods: self.methods,
        })
    }
}
