//! Client role: calling into objects owned by one peer.
//!
//! Calls are buffered and go out together on the next flush point: an
//! explicit [`ServerProxy::flush`], a request that needs a reply, or the
//! buffer reaching `max_batch`. Within one flush, calls keep issue order.

mod marshal;
mod proxy;

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use serde_json::Value;
use tokio::sync::Mutex;

use dynbus_core::error::{DynbusError, Result};
use dynbus_core::protocol::{
    is_primitive, methods, Body, Call, ConstructorSpec, Envelope, Handle, MemberKind, Message,
    ObjectId,
};

use crate::endpoint::Endpoint;

pub use marshal::{Arg, Returned};
pub use proxy::{Attribute, BoundMethod, ObjectProxy};

struct Inner {
    endpoint: Endpoint,
    peer: String,
    constructors: DashSet<String>,
    specs: DashMap<String, Option<Arc<ConstructorSpec>>>,
    seen: DashMap<ObjectId, Handle>,
    buffer: Mutex<Vec<Message>>,
}

/// Calls into the objects of one peer.
#[derive(Clone)]
pub struct ServerProxy {
    inner: Arc<Inner>,
}

impl ServerProxy {
    pub(crate) fn new(endpoint: Endpoint, peer: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                peer: peer.to_string(),
                constructors: DashSet::new(),
                specs: DashMap::new(),
                seen: DashMap::new(),
                buffer: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Accept handles of this remote type in results.
    pub fn register_constructor(&self, name: &str) {
        self.inner.constructors.insert(name.to_string());
    }

    /// Register a remote type with a known shape; saves the `__inspect__`
    /// round trip for it.
    pub fn register_spec(&self, spec: ConstructorSpec) {
        self.inner.constructors.insert(spec.name.clone());
        self.inner
            .specs
            .insert(spec.name.clone(), Some(Arc::new(spec)));
    }

    /// The peer's root application object.
    pub async fn get_root_object(&self) -> Result<ObjectProxy> {
        self.invoke_function(None, methods::GET_ROOT_OBJECT, Vec::new())
            .await?
            .into_object()
    }

    /// Call and wait for the result.
    pub async fn invoke_function(
        &self,
        target: Option<&ObjectProxy>,
        method: &str,
        args: Vec<Arg>,
    ) -> Result<Returned> {
        let params = self.encode_params(target, args)?;
        let value = self.request(method, params).await?;
        self.decode_result(value)
    }

    /// One-way call; buffered until the next flush point.
    pub async fn invoke_procedure(
        &self,
        target: Option<&ObjectProxy>,
        method: &str,
        args: Vec<Arg>,
    ) -> Result<()> {
        let params = self.encode_params(target, args)?;
        let mut buffer = self.inner.buffer.lock().await;
        buffer.push(Call::notification(method, params).into());
        if buffer.len() >= self.inner.endpoint.max_batch() {
            self.send_buffered(&mut buffer).await?;
        }
        Ok(())
    }

    /// Send everything buffered as one envelope.
    pub async fn flush(&self) -> Result<()> {
        let mut buffer = self.inner.buffer.lock().await;
        self.send_buffered(&mut buffer).await
    }

    async fn send_buffered(&self, buffer: &mut Vec<Message>) -> Result<()> {
        let Some(body) = Body::from_messages(std::mem::take(buffer)) else {
            return Ok(());
        };
        let env = Envelope::new(Some(self.inner.peer.clone()), body);
        self.inner.endpoint.send(env).await
    }

    /// Raw request: params are already wire values, the result is not
    /// decoded.
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let endpoint = &self.inner.endpoint;
        let id = endpoint.next_request_id();
        let rx = endpoint.register_pending(id, Some(&self.inner.peer))?;
        tracing::debug!(id, peer = %self.inner.peer, method, "request");
        {
            let mut buffer = self.inner.buffer.lock().await;
            buffer.push(Call::request(method, params, id).into());
            if let Err(e) = self.send_buffered(&mut buffer).await {
                endpoint.forget_pending(id);
                return Err(e);
            }
        }
        endpoint.wait(rx).await
    }

    fn encode_handle(&self, proxy: &ObjectProxy) -> Result<Value> {
        if proxy.server().peer() != self.peer() {
            return Err(DynbusError::BadRequest(format!(
                "object {} belongs to {}, not {}",
                proxy.handle(),
                proxy.server().peer(),
                self.peer()
            )));
        }
        Ok(proxy.handle().to_param())
    }

    fn encode_params(&self, target: Option<&ObjectProxy>, args: Vec<Arg>) -> Result<Vec<Value>> {
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(match target {
            Some(t) => self.encode_handle(t)?,
            None => Value::Null,
        });
        for arg in args {
            params.push(match arg {
                Arg::Value(v) => v,
                Arg::Object(p) => self.encode_handle(&p)?,
                Arg::TypedArray(a) => a.to_param(),
            });
        }
        Ok(params)
    }

    fn decode_result(&self, value: Value) -> Result<Returned> {
        if is_primitive(&value) || value.is_array() {
            return Ok(Returned::Value(value));
        }
        let handle = Handle::from_result(&value)?;
        let known = self.inner.seen.get(&handle.object_id).map(|r| r.clone());
        let handle = match known {
            Some(known) => known,
            None => {
                if !self.inner.constructors.contains(&handle.constructor) {
                    return Err(DynbusError::UnknownConstructor(handle.constructor));
                }
                tracing::debug!(peer = %self.inner.peer, object = %handle, "new remote object");
                self.inner.seen.insert(handle.object_id, handle.clone());
                handle
            }
        };
        Ok(Returned::Object(ObjectProxy::new(self.clone(), handle)))
    }

    /// One level of a remote type's shape, fetched on first use.
    pub async fn spec(&self, constructor: &str) -> Result<Option<Arc<ConstructorSpec>>> {
        if let Some(cached) = self.inner.specs.get(constructor) {
            return Ok(cached.clone());
        }
        let raw = self
            .request(
                methods::INSPECT,
                vec![Value::Null, Value::String(constructor.to_string())],
            )
            .await?;
        let spec = match raw {
            Value::Null => None,
            other => Some(Arc::new(serde_json::from_value::<ConstructorSpec>(other).map_err(
                |e| DynbusError::BadRequest(format!("invalid spec for {constructor}: {e}")),
            )?)),
        };
        self.inner
            .specs
            .insert(constructor.to_string(), spec.clone());
        Ok(spec)
    }

    /// Walk the shape chain from `constructor` until `member` is found.
    /// A chain that loops back on itself fails with `BadRequest`.
    pub async fn resolve(&self, constructor: &str, member: &str) -> Result<MemberKind> {
        let mut visited = HashSet::new();
        let mut level = Some(constructor.to_string());
        while let Some(name) = level {
            if !visited.insert(name.clone()) {
                return Err(DynbusError::BadRequest(format!(
                    "cyclic constructor chain: {constructor} reaches {name} twice"
                )));
            }
            let Some(spec) = self.spec(&name).await? else {
                break;
            };
            if let Some(kind) = spec.lookup(member) {
                return Ok(kind);
            }
            level = spec.next_level().map(str::to_string);
        }
        Err(DynbusError::UnknownMember {
            constructor: constructor.to_string(),
            member: member.to_string(),
        })
    }

    pub(crate) fn forget_object(&self, id: ObjectId) {
        self.inner.seen.remove(&id);
    }
}

impl std::fmt::Debug for ServerProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerProxy")
            .field("peer", &self.inner.peer)
            .finish()
    }
}
