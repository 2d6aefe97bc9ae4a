//! Socket message classification.
//!
//! Envelopes travel as text frames only. Binary frames are a protocol error.

use axum::extract::ws::Message;
use dynbus_core::error::{DynbusError, Result};

#[derive(Debug)]
pub enum Inbound {
    Text(String),
    Ping(Vec<u8>),
    Pong,
    Close,
}

pub fn decode(msg: Message) -> Result<Inbound> {
    match msg {
        Message::Text(s) => Ok(Inbound::Text(s)),
        Message::Binary(_) => Err(DynbusError::BadRequest(
            "binary frames are not supported".into(),
        )),
        Message::Ping(v) => Ok(Inbound::Ping(v)),
        Message::Pong(_) => Ok(Inbound::Pong),
        Message::Close(_) => Ok(Inbound::Close),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_is_rejected() {
        let err = decode(Message::Binary(vec![1, 2])).err();
        assert_eq!(err.map(|e| e.wire_code().to_string()).as_deref(), Some("BAD_REQUEST"));
    }

    #[test]
    fn text_passes_through() {
        assert!(matches!(decode(Message::Text("{}".into())), Ok(Inbound::Text(s)) if s == "{}"));
    }
}
