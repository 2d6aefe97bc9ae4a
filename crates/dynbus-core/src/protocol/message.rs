//! Call / Result / Error messages.
//!
//! Messages are decoded through `serde_json::Value` so the discriminating
//! rules (a call has `method`, a reply has exactly one of `result`/`error`)
//! are checked explicitly instead of relying on untagged guessing.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{DynbusError, ErrorObject, Result};

/// Version tag required on every call.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Request id: unique per calling endpoint, never reused.
pub type RequestId = u64;

/// Reserved method names.
pub mod methods {
    /// Bind a caller-chosen node name.
    pub const LISTEN: &str = "__listen__";
    /// Alias of [`LISTEN`].
    pub const REGISTER: &str = "__register__";
    /// Bind a generated name anchored to a peer.
    pub const CONNECT: &str = "__connect__";
    /// Router notice: a node went away.
    pub const DISCONNECTED: &str = "__disconnected__";

    pub const GETTER: &str = "__getter__";
    pub const SETTER: &str = "__setter__";
    pub const INSPECT: &str = "__inspect__";
    pub const ROOT: &str = "__root__";
    pub const GET_ROOT_OBJECT: &str = "getRootObject";
    pub const RELEASE: &str = "__release__";

    /// Methods the router handles itself on null-addressed envelopes.
    pub fn is_router_control(method: &str) -> bool {
        matches!(method, LISTEN | REGISTER | CONNECT)
    }
}

/// A method invocation. `id` present means a reply is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl Call {
    /// Fire-and-forget call.
    pub fn notification(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION.to_string(),
            method: method.into(),
            params,
            id: None,
        }
    }

    /// Call expecting a reply with `id`.
    pub fn request(method: impl Into<String>, params: Vec<Value>, id: RequestId) -> Self {
        Self {
            id: Some(id),
            ..Self::notification(method, params)
        }
    }

    pub fn check_version(&self) -> Result<()> {
        if self.jsonrpc == PROTOCOL_VERSION {
            Ok(())
        } else {
            Err(DynbusError::UnsupportedVersion(self.jsonrpc.clone()))
        }
    }
}

/// Outcome carried by a reply: exactly one of `result` / `error`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Result(Value),
    Error(ErrorObject),
}

/// Reply to a call. `id` is `None` only for errors that cannot be correlated.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub jsonrpc: Option<String>,
    pub id: Option<RequestId>,
    pub outcome: Outcome,
}

impl Reply {
    pub fn result(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: Some(PROTOCOL_VERSION.to_string()),
            id: Some(id),
            outcome: Outcome::Result(result),
        }
    }

    pub fn error(id: Option<RequestId>, err: &DynbusError) -> Self {
        Self {
            jsonrpc: Some(PROTOCOL_VERSION.to_string()),
            id,
            outcome: Outcome::Error(ErrorObject::from(err)),
        }
    }

    pub fn check_version(&self) -> Result<()> {
        match self.jsonrpc.as_deref() {
            None | Some(PROTOCOL_VERSION) => Ok(()),
            Some(other) => Err(DynbusError::UnsupportedVersion(other.to_string())),
        }
    }

    /// Convert into the caller-facing result.
    pub fn into_result(self) -> Result<Value> {
        match self.outcome {
            Outcome::Result(v) => Ok(v),
            Outcome::Error(e) => Err(e.into()),
        }
    }
}

/// One Call, Result or Error.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Call(Call),
    Reply(Reply),
}

impl Message {
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(DynbusError::BadRequest("message must be a JSON object".into()));
        };

        if map.contains_key("method") {
            let call: Call = serde_json::from_value(Value::Object(map))
                .map_err(|e| DynbusError::BadRequest(format!("invalid call: {e}")))?;
            return Ok(Message::Call(call));
        }

        let jsonrpc = match map.remove("jsonrpc") {
            None => None,
            Some(Value::String(s)) => Some(s),
            Some(_) => return Err(DynbusError::BadRequest("jsonrpc must be a string".into())),
        };

        let id = match map.remove("id") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_u64().ok_or_else(|| {
                DynbusError::BadRequest("reply id must be an unsigned integer".into())
            })?),
        };

        let outcome = match (map.remove("result"), map.remove("error")) {
            (Some(result), None) => Outcome::Result(result),
            (None, Some(error)) => {
                let obj: ErrorObject = serde_json::from_value(error)
                    .map_err(|e| DynbusError::BadRequest(format!("invalid error object: {e}")))?;
                Outcome::Error(obj)
            }
            (Some(_), Some(_)) => {
                return Err(DynbusError::BadRequest(
                    "reply carries both result and error".into(),
                ))
            }
            (None, None) => {
                return Err(DynbusError::BadRequest(
                    "message is neither a call nor a reply".into(),
                ))
            }
        };

        Ok(Message::Reply(Reply { jsonrpc, id, outcome }))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Message::Call(call) => {
                let mut map = Map::new();
                map.insert("jsonrpc".into(), Value::String(call.jsonrpc.clone()));
                map.insert("method".into(), Value::String(call.method.clone()));
                map.insert("params".into(), Value::Array(call.params.clone()));
                if let Some(id) = call.id {
                    map.insert("id".into(), Value::from(id));
                }
                Value::Object(map)
            }
            Message::Reply(reply) => {
                let mut map = Map::new();
                if let Some(v) = &reply.jsonrpc {
                    map.insert("jsonrpc".into(), Value::String(v.clone()));
                }
                map.insert("id".into(), reply.id.map(Value::from).unwrap_or(Value::Null));
                match &reply.outcome {
                    Outcome::Result(v) => {
                        map.insert("result".into(), v.clone());
                    }
                    Outcome::Error(e) => {
                        let mut err = Map::new();
                        err.insert("code".into(), Value::String(e.code.clone()));
                        err.insert("message".into(), Value::String(e.message.clone()));
                        map.insert("error".into(), Value::Object(err));
                    }
                }
                Value::Object(map)
            }
        }
    }

    /// Request id of a call that expects a reply.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Message::Call(call) => call.id,
            Message::Reply(_) => None,
        }
    }
}

impl From<Call> for Message {
    fn from(call: Call) -> Self {
        Message::Call(call)
    }
}

impl From<Reply> for Message {
    fn from(reply: Reply) -> Self {
        Message::Reply(reply)
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Message::from_value(value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_without_id_is_a_notification() {
        let msg = Message::from_value(json!({
            "jsonrpc": "2.0", "method": "clear", "params": [null, 16384]
        }))
        .unwrap();
        let Message::Call(call) = msg else { panic!("expected call") };
        assert_eq!(call.id, None);
        assert_eq!(call.params.len(), 2);
        assert!(call.check_version().is_ok());
    }

    #[test]
    fn missing_version_is_unsupported() {
        let msg = Message::from_value(json!({ "method": "clear", "params": [] })).unwrap();
        let Message::Call(call) = msg else { panic!("expected call") };
        let err = call.check_version().unwrap_err();
        assert_eq!(err.client_code().as_str(), "UNSUPPORTED_VERSION");
    }

    #[test]
    fn reply_needs_exactly_one_outcome() {
        let both = json!({ "id": 1, "result": 1, "error": { "code": "X", "message": "y" } });
        assert!(Message::from_value(both).is_err());
        let neither = json!({ "id": 1 });
        assert!(Message::from_value(neither).is_err());
    }

    #[test]
    fn null_result_is_still_a_result() {
        let msg = Message::from_value(json!({ "jsonrpc": "2.0", "id": 4, "result": null })).unwrap();
        let Message::Reply(reply) = msg else { panic!("expected reply") };
        assert_eq!(reply.id, Some(4));
        assert_eq!(reply.outcome, Outcome::Result(Value::Null));
    }

    #[test]
    fn error_reply_serializes_null_id() {
        let reply = Reply::error(None, &DynbusError::NotConnected);
        let v = Message::from(reply).to_value();
        assert_eq!(v["id"], Value::Null);
        assert_eq!(v["error"]["code"], "NOT_CONNECTED");
    }
}
