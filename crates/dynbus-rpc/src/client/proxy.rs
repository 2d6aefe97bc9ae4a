use dynbus_core::error::{DynbusError, Result};
use dynbus_core::protocol::{methods, Handle, MemberKind, ObjectId};

use super::marshal::{Arg, Returned};
use super::ServerProxy;

/// Local stand-in for a remote object. Equal proxies refer to the same
/// remote object.
#[derive(Clone)]
pub struct ObjectProxy {
    server: ServerProxy,
    handle: Handle,
}

/// What an attribute name resolved to.
#[derive(Debug)]
pub enum Attribute {
    Value(Returned),
    Method(BoundMethod),
}

impl ObjectProxy {
    pub(crate) fn new(server: ServerProxy, handle: Handle) -> Self {
        Self { server, handle }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn id(&self) -> ObjectId {
        self.handle.object_id
    }

    pub fn constructor(&self) -> &str {
        &self.handle.constructor
    }

    pub fn server(&self) -> &ServerProxy {
        &self.server
    }

    pub async fn resolve(&self, member: &str) -> Result<MemberKind> {
        self.server.resolve(&self.handle.constructor, member).await
    }

    /// Property names are read right away; method names come back bound.
    pub async fn get_attribute(&self, name: &str) -> Result<Attribute> {
        match self.resolve(name).await? {
            MemberKind::Property => Ok(Attribute::Value(self.get(name).await?)),
            MemberKind::Method => Ok(Attribute::Method(BoundMethod {
                target: self.clone(),
                name: name.to_string(),
            })),
        }
    }

    /// Read a property without consulting the shape.
    pub async fn get(&self, name: &str) -> Result<Returned> {
        self.server
            .invoke_function(Some(self), methods::GETTER, vec![Arg::from(name)])
            .await
    }

    pub async fn set(&self, name: &str, value: impl Into<Arg>) -> Result<()> {
        self.server
            .invoke_function(Some(self), methods::SETTER, vec![Arg::from(name), value.into()])
            .await
            .map(|_| ())
    }

    pub async fn call(&self, method: &str, args: Vec<Arg>) -> Result<Returned> {
        self.server.invoke_function(Some(self), method, args).await
    }

    /// One-way call, buffered until the next flush point.
    pub async fn send(&self, method: &str, args: Vec<Arg>) -> Result<()> {
        self.server.invoke_procedure(Some(self), method, args).await
    }

    /// Resolve `name` as a method.
    pub async fn method(&self, name: &str) -> Result<BoundMethod> {
        match self.resolve(name).await? {
            MemberKind::Method => Ok(BoundMethod {
                target: self.clone(),
                name: name.to_string(),
            }),
            MemberKind::Property => Err(DynbusError::BadRequest(format!(
                "{} is a property of {}",
                name, self.handle.constructor
            ))),
        }
    }

    /// Ask the owner to drop this object's id. The proxy must not be used
    /// afterwards.
    pub async fn release(&self) -> Result<bool> {
        let released = self
            .server
            .invoke_function(Some(self), methods::RELEASE, Vec::new())
            .await?
            .into_value()?;
        self.server.forget_object(self.handle.object_id);
        Ok(released.as_bool().unwrap_or(false))
    }
}

impl PartialEq for ObjectProxy {
    fn eq(&self, other: &Self) -> bool {
        self.server.peer() == other.server.peer() && self.handle == other.handle
    }
}

impl std::fmt::Debug for ObjectProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectProxy({}@{})", self.handle, self.server.peer())
    }
}

/// A method name bound to its receiver.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    target: ObjectProxy,
    name: String,
}

impl BoundMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &ObjectProxy {
        &self.target
    }

    pub async fn call(&self, args: Vec<Arg>) -> Result<Returned> {
        self.target.call(&self.name, args).await
    }

    pub async fn send(&self, args: Vec<Arg>) -> Result<()> {
        self.target.send(&self.name, args).await
    }
}
