//! RPC endpoint: one connection to the router.
//!
//! ```text
//!   callers ──► out queue (mpsc) ──► writer task ──► TransportSender
//!                                                       │
//!   TransportReceiver ──► receive task ──┬── reply?  ──► pending[id] (oneshot)
//!                                        ├── call?   ──► Server::handle ──► out queue
//!                                        └── notice? ──► fail pending for peer
//! ```
//!
//! The correlation table is inserted into before the request is sent and each
//! slot is resolved exactly once: by its reply, by a `__disconnected__` notice
//! for its peer, or by connection loss (`ConnectionClosed`).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use dynbus_core::error::{DynbusError, Result};
use dynbus_core::protocol::{
    methods, Body, Call, Envelope, Message, Outcome, Reply, RequestId,
};

use crate::client::ServerProxy;
use crate::config::EndpointConfig;
use crate::server::Server;
use crate::transport::{Transport, TransportReceiver, TransportSender};

struct Pending {
    peer: Option<String>,
    tx: oneshot::Sender<Result<Value>>,
}

struct Inner {
    out: mpsc::Sender<Envelope>,
    pending: DashMap<RequestId, Pending>,
    next_id: AtomicU64,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    name: Mutex<Option<String>>,
    server: Option<Arc<Server>>,
    max_batch: usize,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<Inner>,
}

impl Endpoint {
    /// Connect to `cfg.router_url`; listens under `cfg.name` if set.
    pub async fn connect(cfg: &EndpointConfig, server: Option<Server>) -> Result<Self> {
        cfg.validate()?;
        let transport = Transport::connect(&cfg.router_url).await?;
        let endpoint = Self::start(transport, server, cfg);
        if let Some(name) = &cfg.name {
            endpoint.listen(name).await?;
        }
        Ok(endpoint)
    }

    /// Run an endpoint over an established transport.
    pub fn start(transport: Transport, server: Option<Server>, cfg: &EndpointConfig) -> Self {
        let (sender, receiver) = transport.split();
        let (out_tx, out_rx) = mpsc::channel::<Envelope>(cfg.outbound_queue);
        let (closed_tx, _) = watch::channel(false);

        let endpoint = Self {
            inner: Arc::new(Inner {
                out: out_tx,
                pending: DashMap::new(),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                closed_tx,
                name: Mutex::new(None),
                server: server.map(Arc::new),
                max_batch: cfg.max_batch,
                tasks: Mutex::new(Vec::new()),
            }),
        };

        let writer = tokio::spawn(write_loop(sender, out_rx));
        let reader = tokio::spawn(read_loop(endpoint.clone(), receiver));
        endpoint.lock_tasks().extend([writer, reader]);
        endpoint
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Name bound at the router, once registration was acknowledged.
    pub fn name(&self) -> Option<String> {
        self.inner
            .name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn max_batch(&self) -> usize {
        self.inner.max_batch
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Bind `name` at the router (`__listen__`).
    pub async fn listen(&self, name: &str) -> Result<String> {
        self.control(methods::LISTEN, name).await
    }

    /// Bind a generated name anchored to `peer` and return a proxy for it.
    pub async fn connect_to(&self, peer: &str) -> Result<ServerProxy> {
        self.control(methods::CONNECT, peer).await?;
        Ok(self.proxy(peer))
    }

    /// Proxy for `peer` without anchoring (explicit addressing).
    pub fn proxy(&self, peer: &str) -> ServerProxy {
        ServerProxy::new(self.clone(), peer)
    }

    async fn control(&self, method: &str, arg: &str) -> Result<String> {
        let id = self.next_request_id();
        let rx = self.register_pending(id, None)?;
        let call = Call::request(method, vec![Value::String(arg.to_string())], id);
        if let Err(e) = self.send(Envelope::new(None, Body::Single(call.into()))).await {
            self.inner.pending.remove(&id);
            return Err(e);
        }
        let bound = match self.wait(rx).await? {
            Value::String(s) => s,
            other => {
                return Err(DynbusError::BadRequest(format!(
                    "unexpected {method} acknowledgement: {other}"
                )))
            }
        };
        tracing::info!(node = %bound, method, "registered at router");
        *self.inner.name.lock().unwrap_or_else(PoisonError::into_inner) = Some(bound.clone());
        Ok(bound)
    }

    pub(crate) fn next_request_id(&self) -> RequestId {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Reserve a correlation slot. Must happen before the request is sent.
    pub(crate) fn register_pending(
        &self,
        id: RequestId,
        peer: Option<&str>,
    ) -> Result<oneshot::Receiver<Result<Value>>> {
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(
            id,
            Pending {
                peer: peer.map(str::to_string),
                tx,
            },
        );
        // checked after insert: shutdown sets the flag before draining
        if self.is_closed() {
            self.inner.pending.remove(&id);
            return Err(DynbusError::ConnectionClosed);
        }
        Ok(rx)
    }

    pub(crate) fn forget_pending(&self, id: RequestId) {
        self.inner.pending.remove(&id);
    }

    pub(crate) async fn wait(&self, rx: oneshot::Receiver<Result<Value>>) -> Result<Value> {
        rx.await.map_err(|_| DynbusError::ConnectionClosed)?
    }

    pub(crate) async fn send(&self, env: Envelope) -> Result<()> {
        if self.is_closed() {
            return Err(DynbusError::ConnectionClosed);
        }
        self.inner
            .out
            .send(env)
            .await
            .map_err(|_| DynbusError::ConnectionClosed)
    }

    /// Resolves once the receive loop has ended.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Drop the connection and fail everything still pending.
    pub fn close(&self) {
        self.shutdown();
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
    }

    fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let ids: Vec<RequestId> = self.inner.pending.iter().map(|r| *r.key()).collect();
        if !ids.is_empty() {
            tracing::debug!(pending = ids.len(), "failing pending requests");
        }
        for id in ids {
            if let Some((_, p)) = self.inner.pending.remove(&id) {
                let _ = p.tx.send(Err(DynbusError::ConnectionClosed));
            }
        }
        self.inner.closed_tx.send_replace(true);
    }

    /// Complete the slot for `reply.id`. Replies from a node other than the
    /// one the request went to are dropped; `from == None` is the router
    /// itself failing the request.
    fn resolve(&self, from: Option<&str>, reply: Reply) {
        let Some(id) = reply.id else {
            match &reply.outcome {
                Outcome::Error(e) => {
                    tracing::warn!(code = %e.code, message = %e.message, "uncorrelated error")
                }
                Outcome::Result(v) => tracing::warn!(result = %v, "uncorrelated result"),
            }
            return;
        };
        let Some((_, pending)) = self.inner.pending.remove_if(&id, |_, p| {
            match (p.peer.as_deref(), from) {
                (Some(peer), Some(from)) => peer == from,
                _ => true,
            }
        }) else {
            match self.inner.pending.get(&id).and_then(|p| p.peer.clone()) {
                Some(peer) => tracing::warn!(id, from = ?from, %peer, "reply from the wrong node ignored"),
                None => tracing::warn!(id, from = ?from, "reply for unknown request"),
            }
            return;
        };
        let result = reply.check_version().and_then(|()| reply.into_result());
        let _ = pending.tx.send(result);
    }

    fn fail_peer(&self, peer: &str) {
        let ids: Vec<RequestId> = self
            .inner
            .pending
            .iter()
            .filter(|r| r.value().peer.as_deref() == Some(peer))
            .map(|r| *r.key())
            .collect();
        tracing::info!(peer, pending = ids.len(), "peer disconnected");
        for id in ids {
            if let Some((_, p)) = self.inner.pending.remove(&id) {
                let _ = p.tx.send(Err(DynbusError::ConnectionClosed));
            }
        }
    }

    async fn on_envelope(&self, env: Envelope) {
        let from = env.from;
        let mut replies: Vec<Message> = Vec::new();

        for msg in env.body.into_messages() {
            match msg {
                Message::Reply(reply) => self.resolve(from.as_deref(), reply),
                Message::Call(call) if from.is_none() => self.on_notice(call),
                Message::Call(call) => {
                    if let Some(reply) = self.serve(call) {
                        replies.push(reply);
                    }
                }
            }
        }

        let (Some(to), Some(body)) = (from, Body::from_messages(replies)) else {
            return;
        };
        if let Err(e) = self.send(Envelope::new(Some(to), body)).await {
            tracing::debug!(error = %e, "reply not sent");
        }
    }

    fn serve(&self, call: Call) -> Option<Message> {
        match &self.inner.server {
            Some(server) => server.handle(call),
            None => {
                let err = DynbusError::Method(format!("no server role to handle {}", call.method));
                tracing::warn!(method = %call.method, "call received without a server role");
                call.id.map(|id| Reply::error(Some(id), &err).into())
            }
        }
    }

    fn on_notice(&self, call: Call) {
        match (call.method.as_str(), call.params.as_slice()) {
            (methods::DISCONNECTED, [Value::String(peer)]) => self.fail_peer(peer),
            _ => tracing::warn!(method = %call.method, "unexpected router notice"),
        }
    }
}

async fn write_loop(mut sender: TransportSender, mut rx: mpsc::Receiver<Envelope>) {
    while let Some(env) = rx.recv().await {
        if let Err(e) = sender.send(&env).await {
            tracing::debug!(error = %e, "writer stopped");
            return;
        }
    }
    let _ = sender.close().await;
}

async fn read_loop(endpoint: Endpoint, mut receiver: TransportReceiver) {
    loop {
        match receiver.receive().await {
            Ok(Some(env)) => endpoint.on_envelope(env).await,
            Ok(None) => {
                tracing::info!("router closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "receive failed");
                break;
            }
        }
    }
    endpoint.shutdown();
}
