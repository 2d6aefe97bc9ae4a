//! Objects created from inline typed-array literals.

use std::any::Any;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use dynbus_core::protocol::{TypedArray, TypedArrayKind};

use super::class::{Class, ClassBuilder, Local, RemoteObject};

/// A typed array received as a call argument. Class name is the array type
/// (`Float32Array`, ...), parent `TypedArray`.
#[derive(Debug)]
pub struct TypedArrayObject {
    array: TypedArray,
}

impl TypedArrayObject {
    pub fn new(array: TypedArray) -> Self {
        Self { array }
    }

    pub fn kind(&self) -> TypedArrayKind {
        self.array.kind
    }

    pub fn values(&self) -> &[f64] {
        &self.array.values
    }

    pub fn array(&self) -> &TypedArray {
        &self.array
    }
}

fn class_for(kind: TypedArrayKind) -> Arc<Class> {
    static CLASSES: OnceLock<DashMap<TypedArrayKind, Arc<Class>>> = OnceLock::new();
    let classes = CLASSES.get_or_init(DashMap::new);
    let class = classes.entry(kind).or_insert_with(|| {
        let base = ClassBuilder::<TypedArrayObject>::new("TypedArray").build();
        ClassBuilder::<TypedArrayObject>::new(kind.as_str())
            .extends(&base)
            .property("length", |a| Ok(Local::from(a.array.values.len() as u64)))
            .property("byteLength", |a| Ok(Local::from(a.array.byte_length() as u64)))
            .build()
    });
    Arc::clone(class.value())
}

impl RemoteObject for TypedArrayObject {
    fn class(&self) -> Arc<Class> {
        class_for(self.array.kind)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
