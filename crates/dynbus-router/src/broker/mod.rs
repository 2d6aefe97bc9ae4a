//! Node registry and envelope delivery.
//!
//! The broker is transport-agnostic: every connection is represented by a
//! bounded `mpsc::Sender<String>` of outbound frames. WebSocket sessions and
//! in-process attachments both go through [`session::NodeSession`].

pub mod registry;
pub mod session;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use dynbus_core::error::{DynbusError, Result};
use dynbus_core::protocol::{methods, Body, Call, Envelope, RawEnvelope, Reply};

use crate::config::{AddressingMode, NullDestination, RebindPolicy, RouterSection};
use crate::obs::metrics::RouterMetrics;

pub use registry::{NodeLink, NodeRegistry, SessionId};
pub use session::{FrameDecision, NodeSession};

/// How long a notice may wait on a full outbound queue before it is dropped.
const NOTICE_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Routing rules taken from config.
#[derive(Debug, Clone, Copy)]
pub struct RoutingPolicy {
    pub addressing: AddressingMode,
    pub null_destination: NullDestination,
    pub rebind: RebindPolicy,
    pub max_frame_bytes: usize,
    /// A destination whose queue stays full this long gets the envelope
    /// dropped instead of stalling the sender.
    pub delivery_timeout: Duration,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        RoutingPolicy::from(&RouterSection::default())
    }
}

impl From<&RouterSection> for RoutingPolicy {
    fn from(r: &RouterSection) -> Self {
        Self {
            addressing: r.addressing,
            null_destination: r.null_destination,
            rebind: r.rebind,
            max_frame_bytes: r.max_frame_bytes,
            delivery_timeout: Duration::from_millis(r.delivery_timeout_ms),
        }
    }
}

/// Identity of the node an envelope comes from.
#[derive(Debug, Clone)]
pub struct Origin {
    pub name: String,
    pub peer: Option<String>,
}

pub struct Broker {
    nodes: NodeRegistry,
    policy: RoutingPolicy,
    metrics: Arc<RouterMetrics>,
    seq: AtomicU64,
}

impl Broker {
    pub fn new(policy: RoutingPolicy, metrics: Arc<RouterMetrics>) -> Self {
        Self {
            nodes: NodeRegistry::new(),
            policy,
            metrics,
            seq: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub fn metrics(&self) -> &RouterMetrics {
        &self.metrics
    }

    /// Start a session for a new connection whose outbound frames go to `tx`.
    pub fn open_session(self: &Arc<Self>, tx: mpsc::Sender<String>) -> NodeSession {
        let id = self.seq.fetch_add(1, Ordering::Relaxed);
        self.metrics.connections.inc(&[]);
        tracing::debug!(session = id, "session opened");
        NodeSession::new(Arc::clone(self), id, tx)
    }

    /// Attach an in-process node. Frames written to the returned sender are
    /// handled exactly like WebSocket text frames; the receiver yields what
    /// the router sends back and ends when the session closes.
    pub fn attach(self: &Arc<Self>, queue: usize) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        let (in_tx, mut in_rx) = mpsc::channel::<String>(queue);
        let (out_tx, out_rx) = mpsc::channel::<String>(queue);
        let mut session = self.open_session(out_tx);
        tokio::spawn(async move {
            while let Some(frame) = in_rx.recv().await {
                if session.handle_frame(&frame).await == FrameDecision::Close {
                    break;
                }
            }
            session.close().await;
        });
        (in_tx, out_rx)
    }

    /// Bind `name` to a session. A replaced connection is told it lost the
    /// name and stops being routable.
    pub async fn register(&self, name: &str, link: NodeLink, peer: Option<String>) -> Result<()> {
        if name.is_empty() {
            return Err(DynbusError::BadRequest("node name must not be empty".into()));
        }
        let session = link.session;
        let bound = self.nodes.bind(name, link, peer.clone(), self.policy.rebind)?;
        match bound.replaced {
            Some(old) => {
                tracing::info!(node = %name, old = old.session, new = session, "node rebound");
                match error_notice(name, &DynbusError::AddressInUse(name.to_string())) {
                    Ok(notice) => self.push_notice(&old, notice).await,
                    Err(e) => tracing::warn!(error = %e, "encode rebind notice failed"),
                }
                // whatever was in flight to the old connection is lost
                self.notify_disconnected(name, bound.contacts).await;
            }
            None => {
                self.metrics.nodes_active.inc(&[]);
                tracing::info!(node = %name, session, peer = ?peer, "node registered");
            }
        }
        Ok(())
    }

    /// Drop `name` if `session` still owns it, then tell every node that
    /// delivered to it.
    pub async fn unregister(&self, name: &str, session: SessionId) {
        let Some(gone) = self.nodes.unbind(name, session) else {
            return;
        };
        self.metrics.nodes_active.dec(&[]);
        tracing::info!(node = %name, session, contacts = gone.contacts.len(), "node unregistered");
        self.notify_disconnected(name, gone.contacts).await;
    }

    /// Send `__disconnected__ [name]` to each still-registered contact.
    async fn notify_disconnected(&self, name: &str, contacts: Vec<String>) {
        for contact in contacts {
            let Some(view) = self.nodes.get(&contact) else { continue };
            let call = Call::notification(methods::DISCONNECTED, vec![name.into()]);
            let env = Envelope::new(Some(contact.clone()), Body::Single(call.into()));
            match env.to_json() {
                Ok(frame) => self.push_notice(&view.link, frame).await,
                Err(e) => tracing::warn!(error = %e, "encode disconnect notice failed"),
            }
        }
    }

    pub fn is_bound(&self, name: &str, session: SessionId) -> bool {
        self.nodes.is_bound(name, session)
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes.names()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Route one envelope from `sender`. `from` is overwritten with the
    /// sender's name; the body is forwarded untouched.
    pub async fn deliver(&self, sender: &Origin, mut env: RawEnvelope) -> Result<String> {
        let started = Instant::now();
        let dest = match env.to.take() {
            Some(dest) => dest,
            None => self.resolve_null(&sender.name)?,
        };

        let anchored = self.policy.addressing == AddressingMode::Anchored;
        if anchored {
            if let Some(peer) = &sender.peer {
                if *peer != dest {
                    return Err(DynbusError::UnexpectedAddress {
                        expected: peer.clone(),
                        got: dest,
                    });
                }
            }
        }

        let target = self
            .nodes
            .get(&dest)
            .ok_or_else(|| DynbusError::UnknownAddress(dest.clone()))?;

        if anchored {
            if let Some(peer) = &target.peer {
                if *peer != sender.name {
                    return Err(DynbusError::UnexpectedAddress {
                        expected: peer.clone(),
                        got: sender.name.clone(),
                    });
                }
            }
        }

        env.from = Some(sender.name.clone());
        env.to = Some(dest.clone());
        let frame = env.to_json()?;

        self.nodes.record_contact(&dest, &sender.name);
        match timeout(self.policy.delivery_timeout, target.link.tx.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(DynbusError::UnknownAddress(dest)),
            Err(_) => {
                return Err(DynbusError::Internal(format!(
                    "{dest} is not draining its queue; envelope dropped"
                )))
            }
        }

        self.metrics.envelopes_routed.inc(&[]);
        self.metrics
            .delivery_duration
            .observe(&[], started.elapsed());
        tracing::trace!(from = %sender.name, to = %dest, "envelope routed");
        Ok(dest)
    }

    fn resolve_null(&self, sender: &str) -> Result<String> {
        match self.policy.null_destination {
            NullDestination::Reject => Err(DynbusError::UnknownAddress("null".into())),
            NullDestination::SolePeer => {
                let mut others = self.nodes.others(sender);
                if others.len() == 1 {
                    others.pop().ok_or_else(|| DynbusError::UnknownAddress("null".into()))
                } else {
                    Err(DynbusError::UnknownAddress(format!(
                        "null destination is ambiguous ({} candidates)",
                        others.len()
                    )))
                }
            }
        }
    }

    async fn push_notice(&self, link: &NodeLink, frame: String) {
        match timeout(NOTICE_SEND_TIMEOUT, link.tx.send(frame)).await {
            Ok(_) => {}
            Err(_) => {
                self.metrics.notices_dropped.inc(&[]);
                tracing::warn!(session = link.session, "notice dropped: outbound queue full");
            }
        }
    }
}

/// Router-originated error addressed to `to`, not tied to any request.
pub(crate) fn error_notice(to: &str, err: &DynbusError) -> Result<String> {
    let reply = Reply::error(None, err);
    Envelope::new(Some(to.to_string()), Body::Single(reply.into())).to_json()
}
