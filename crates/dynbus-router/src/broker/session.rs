//! Per-connection frame handling.
//!
//! Every inbound text frame is one envelope. Null-addressed envelopes made
//! only of control calls (`__listen__`, `__register__`, `__connect__`) are
//! consumed here; everything else is handed to [`Broker::deliver`].
//!
//! Errors are answered with one error reply per request id found in the
//! offending envelope (or a single uncorrelated one). Routing and framing
//! errors ([`DynbusError::is_fatal`]) also end the session; anything else
//! only drops that envelope.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use dynbus_core::error::{DynbusError, Result};
use dynbus_core::protocol::{methods, Body, Call, Envelope, Message, RawEnvelope, Reply};

use super::registry::{NodeLink, SessionId};
use super::{Broker, Origin};

/// What the transport should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecision {
    Pass,
    Close,
}

pub struct NodeSession {
    broker: Arc<Broker>,
    id: SessionId,
    tx: mpsc::Sender<String>,
    name: Option<String>,
    peer: Option<String>,
}

impl NodeSession {
    pub(crate) fn new(broker: Arc<Broker>, id: SessionId, tx: mpsc::Sender<String>) -> Self {
        Self {
            broker,
            id,
            tx,
            name: None,
            peer: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Name this connection is registered under, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub async fn handle_frame(&mut self, text: &str) -> FrameDecision {
        match self.process(text).await {
            Ok(()) => FrameDecision::Pass,
            Err(err) if err.is_fatal() => {
                self.reject(&err, Some(text));
                FrameDecision::Close
            }
            Err(err) => {
                self.count_error(&err);
                tracing::warn!(session = self.id, node = ?self.name, error = %err, "envelope dropped");
                self.answer(&err, Some(text));
                FrameDecision::Pass
            }
        }
    }

    /// Report a transport-level error (e.g. a binary frame) before closing.
    pub fn fail(&self, err: &DynbusError) {
        self.reject(err, None);
    }

    /// Unregister (if still bound) and notify contacts.
    pub async fn close(mut self) {
        if let Some(name) = self.name.take() {
            self.broker.unregister(&name, self.id).await;
        }
        tracing::debug!(session = self.id, "session closed");
    }

    async fn process(&mut self, text: &str) -> Result<()> {
        if text.len() > self.broker.policy().max_frame_bytes {
            return Err(DynbusError::PayloadTooLarge);
        }
        let env = RawEnvelope::parse(text)?;

        if env.to.is_none() {
            let body = env.body()?;
            let total = body.messages().len();
            let control = body.messages().iter().filter(|m| is_control(m)).count();
            if control == total {
                return self.on_control(body).await;
            }
            if control > 0 {
                return Err(DynbusError::BadRequest(
                    "control calls cannot share an envelope with routed messages".into(),
                ));
            }
        }

        let origin = self.origin()?;
        self.broker.deliver(&origin, env).await?;
        Ok(())
    }

    fn origin(&self) -> Result<Origin> {
        let name = self.name.as_ref().ok_or(DynbusError::NotConnected)?;
        if !self.broker.is_bound(name, self.id) {
            // lost the name to a newer registration
            return Err(DynbusError::NotConnected);
        }
        Ok(Origin {
            name: name.clone(),
            peer: self.peer.clone(),
        })
    }

    async fn on_control(&mut self, body: Body) -> Result<()> {
        let mut acks: Vec<Message> = Vec::new();

        for msg in body.into_messages() {
            let Message::Call(call) = msg else {
                return Err(DynbusError::BadRequest("expected a control call".into()));
            };
            call.check_version()?;
            self.broker
                .metrics()
                .control_calls
                .inc(&[("method", call.method.as_str())]);

            let bound = match call.method.as_str() {
                methods::LISTEN | methods::REGISTER => {
                    let name = single_string(&call, "name")?;
                    self.bind(name, None).await?
                }
                methods::CONNECT => {
                    let peer = single_string(&call, "peer")?;
                    let name = Uuid::new_v4().to_string();
                    self.bind(name, Some(peer)).await?
                }
                other => {
                    return Err(DynbusError::BadRequest(format!(
                        "unknown control method: {other}"
                    )))
                }
            };

            if let Some(id) = call.id {
                acks.push(Reply::result(id, Value::String(bound)).into());
            }
        }

        if let Some(body) = Body::from_messages(acks) {
            let frame = Envelope::new(self.name.clone(), body).to_json()?;
            self.tx
                .try_send(frame)
                .map_err(|_| DynbusError::Internal("outbound queue unavailable".into()))?;
        }
        Ok(())
    }

    async fn bind(&mut self, name: String, peer: Option<String>) -> Result<String> {
        let link = NodeLink {
            session: self.id,
            tx: self.tx.clone(),
        };
        self.broker.register(&name, link, peer.clone()).await?;

        if let Some(old) = self.name.replace(name.clone()) {
            if old != name {
                self.broker.unregister(&old, self.id).await;
            }
        }
        self.peer = peer;
        Ok(name)
    }

    fn reject(&self, err: &DynbusError, text: Option<&str>) {
        self.count_error(err);
        tracing::warn!(session = self.id, node = ?self.name, error = %err, "closing connection");
        self.answer(err, text);
    }

    fn count_error(&self, err: &DynbusError) {
        self.broker
            .metrics()
            .routing_errors
            .inc(&[("code", err.wire_code())]);
    }

    /// Error replies for the request ids in `text`.
    fn answer(&self, err: &DynbusError, text: Option<&str>) {
        let ids = match (err, text) {
            (DynbusError::PayloadTooLarge, _) | (_, None) => Vec::new(),
            (_, Some(text)) => RawEnvelope::parse(text)
                .ok()
                .and_then(|env| env.body().ok())
                .map(|body| body.request_ids())
                .unwrap_or_default(),
        };
        let replies: Vec<Message> = if ids.is_empty() {
            vec![Reply::error(None, err).into()]
        } else {
            ids.into_iter()
                .map(|id| Reply::error(Some(id), err).into())
                .collect()
        };

        let Some(body) = Body::from_messages(replies) else { return };
        match Envelope::new(self.name.clone(), body).to_json() {
            Ok(frame) => {
                if self.tx.try_send(frame).is_err() {
                    tracing::debug!(session = self.id, "error reply dropped");
                }
            }
            Err(e) => tracing::warn!(error = %e, "encode error reply failed"),
        }
    }
}

fn is_control(msg: &Message) -> bool {
    matches!(msg, Message::Call(call) if methods::is_router_control(&call.method))
}

fn single_string(call: &Call, what: &str) -> Result<String> {
    match call.params.as_slice() {
        [Value::String(s)] if !s.is_empty() => Ok(s.clone()),
        _ => Err(DynbusError::BadRequest(format!(
            "{} expects a single non-empty {what}",
            call.method
        ))),
    }
}
