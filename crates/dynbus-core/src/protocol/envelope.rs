//! Routed envelopes.
//!
//! Two views of the same wire shape:
//! - [`Envelope`]: fully decoded body, used by RPC endpoints.
//! - [`RawEnvelope`]: body kept as `RawValue` so the router can forward it
//!   byte-for-byte and only parse it when it needs to look inside.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::{DynbusError, Result};
use crate::protocol::message::{Message, RequestId};

/// One message or an ordered batch of messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Single(Message),
    Batch(Vec<Message>),
}

impl Body {
    /// `None` for an empty list; a single message is never wrapped in a batch.
    pub fn from_messages(mut messages: Vec<Message>) -> Option<Self> {
        match messages.len() {
            0 => None,
            1 => messages.pop().map(Body::Single),
            _ => Some(Body::Batch(messages)),
        }
    }

    pub fn messages(&self) -> &[Message] {
        match self {
            Body::Single(m) => std::slice::from_ref(m),
            Body::Batch(ms) => ms,
        }
    }

    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Body::Single(m) => vec![m],
            Body::Batch(ms) => ms,
        }
    }

    /// Ids of every call in the body that expects a reply.
    pub fn request_ids(&self) -> Vec<RequestId> {
        self.messages().iter().filter_map(Message::request_id).collect()
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(DynbusError::BadRequest("empty batch".into()));
                }
                let messages = items
                    .into_iter()
                    .map(Message::from_value)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Body::Batch(messages))
            }
            other => Ok(Body::Single(Message::from_value(other)?)),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Body::Single(m) => m.to_value(),
            Body::Batch(ms) => Value::Array(ms.iter().map(Message::to_value).collect()),
        }
    }
}

impl Serialize for Body {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Body {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Body::from_value(value).map_err(D::Error::custom)
    }
}

/// Decoded envelope. `to == None` addresses the router itself;
/// `from` is assigned by the router and ignored when sent by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    pub body: Body,
}

impl Envelope {
    pub fn new(to: Option<String>, body: Body) -> Self {
        Self { to, from: None, body }
    }

    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| DynbusError::BadRequest(format!("invalid envelope json: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| DynbusError::Internal(format!("envelope encode failed: {e}")))
    }
}

/// Envelope with a lazily parsed body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEnvelope {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    pub body: Box<RawValue>,
}

impl RawEnvelope {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| DynbusError::BadRequest(format!("invalid envelope json: {e}")))
    }

    /// Decode the body (only needed for control traffic and error paths).
    pub fn body(&self) -> Result<Body> {
        let value: Value = serde_json::from_str(self.body.get())
            .map_err(|e| DynbusError::BadRequest(format!("invalid body: {e}")))?;
        Body::from_value(value)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| DynbusError::Internal(format!("envelope encode failed: {e}")))
    }
}
