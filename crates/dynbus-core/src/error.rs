//! Shared error type across dynbus crates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed envelope or message.
    BadRequest,
    /// Destination has no registered transport.
    UnknownAddress,
    /// Destination or source violates an anchored pair.
    UnexpectedAddress,
    /// Routed traffic before registration completed.
    NotConnected,
    /// Name already bound and rebinding is refused.
    AddressInUse,
    /// Unsupported protocol version.
    UnsupportedVersion,
    /// Frame larger than the configured limit.
    PayloadTooLarge,
    /// Remote dispatch failed (missing target/method, arity, handler error).
    MethodError,
    /// Prototype chain exhausted without finding the member.
    UnknownMember,
    /// Decoded a handle whose constructor was never registered.
    UnknownConstructor,
    /// Transport went away while the request was pending.
    ConnectionClosed,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in JSON error objects.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::UnknownAddress => "UNKNOWN_ADDRESS",
            ErrorCode::UnexpectedAddress => "UNEXPECTED_ADDRESS",
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::AddressInUse => "ADDRESS_IN_USE",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::MethodError => "METHOD_ERROR",
            ErrorCode::UnknownMember => "UNKNOWN_MEMBER",
            ErrorCode::UnknownConstructor => "UNKNOWN_CONSTRUCTOR",
            ErrorCode::ConnectionClosed => "CONNECTION_CLOSED",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    /// Inverse of [`ErrorCode::as_str`].
    pub fn from_wire(code: &str) -> Option<Self> {
        let code = match code {
            "BAD_REQUEST" => ErrorCode::BadRequest,
            "UNKNOWN_ADDRESS" => ErrorCode::UnknownAddress,
            "UNEXPECTED_ADDRESS" => ErrorCode::UnexpectedAddress,
            "NOT_CONNECTED" => ErrorCode::NotConnected,
            "ADDRESS_IN_USE" => ErrorCode::AddressInUse,
            "UNSUPPORTED_VERSION" => ErrorCode::UnsupportedVersion,
            "PAYLOAD_TOO_LARGE" => ErrorCode::PayloadTooLarge,
            "METHOD_ERROR" => ErrorCode::MethodError,
            "UNKNOWN_MEMBER" => ErrorCode::UnknownMember,
            "UNKNOWN_CONSTRUCTOR" => ErrorCode::UnknownConstructor,
            "CONNECTION_CLOSED" => ErrorCode::ConnectionClosed,
            "INTERNAL" => ErrorCode::Internal,
            _ => return None,
        };
        Some(code)
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, DynbusError>;

/// Unified error type used by core, router and rpc.
#[derive(Debug, Error)]
pub enum DynbusError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unknown address: {0}")]
    UnknownAddress(String),
    #[error("unexpected address: expected {expected}, got {got}")]
    UnexpectedAddress { expected: String, got: String },
    #[error("not connected")]
    NotConnected,
    #[error("address in use: {0}")]
    AddressInUse(String),
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("method error: {0}")]
    Method(String),
    #[error("unknown member {member} on {constructor}")]
    UnknownMember { constructor: String, member: String },
    #[error("unknown constructor: {0}")]
    UnknownConstructor(String),
    #[error("connection closed")]
    ConnectionClosed,
    /// Error reported by the peer; code and message are carried verbatim.
    #[error("remote error {code}: {message}")]
    Remote { code: String, message: String },
    #[error("internal: {0}")]
    Internal(String),
}

impl DynbusError {
    /// Map to a stable wire code. Remote errors with a code outside the
    /// known set map to `Internal`; use [`DynbusError::wire_code`] to keep it.
    pub fn client_code(&self) -> ErrorCode {
        match self {
            DynbusError::BadRequest(_) => ErrorCode::BadRequest,
            DynbusError::UnknownAddress(_) => ErrorCode::UnknownAddress,
            DynbusError::UnexpectedAddress { .. } => ErrorCode::UnexpectedAddress,
            DynbusError::NotConnected => ErrorCode::NotConnected,
            DynbusError::AddressInUse(_) => ErrorCode::AddressInUse,
            DynbusError::UnsupportedVersion(_) => ErrorCode::UnsupportedVersion,
            DynbusError::PayloadTooLarge => ErrorCode::PayloadTooLarge,
            DynbusError::Method(_) => ErrorCode::MethodError,
            DynbusError::UnknownMember { .. } => ErrorCode::UnknownMember,
            DynbusError::UnknownConstructor(_) => ErrorCode::UnknownConstructor,
            DynbusError::ConnectionClosed => ErrorCode::ConnectionClosed,
            DynbusError::Remote { code, .. } => {
                ErrorCode::from_wire(code).unwrap_or(ErrorCode::Internal)
            }
            DynbusError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Code as it should appear on the wire.
    pub fn wire_code(&self) -> &str {
        match self {
            DynbusError::Remote { code, .. } => code,
            other => other.client_code().as_str(),
        }
    }

    /// Routing and framing errors terminate the offending connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DynbusError::BadRequest(_)
                | DynbusError::UnknownAddress(_)
                | DynbusError::UnexpectedAddress { .. }
                | DynbusError::NotConnected
                | DynbusError::AddressInUse(_)
                | DynbusError::UnsupportedVersion(_)
                | DynbusError::PayloadTooLarge
        )
    }
}

/// The `error` member of a failed reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

impl From<&DynbusError> for ErrorObject {
    fn from(err: &DynbusError) -> Self {
        let message = match err {
            DynbusError::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        };
        ErrorObject {
            code: err.wire_code().to_string(),
            message,
        }
    }
}

impl From<ErrorObject> for DynbusError {
    fn from(obj: ErrorObject) -> Self {
        DynbusError::Remote {
            code: obj.code,
            message: obj.message,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_wire_strings() {
        let all = [
            ErrorCode::BadRequest,
            ErrorCode::UnknownAddress,
            ErrorCode::UnexpectedAddress,
            ErrorCode::NotConnected,
            ErrorCode::AddressInUse,
            ErrorCode::UnsupportedVersion,
            ErrorCode::PayloadTooLarge,
            ErrorCode::MethodError,
            ErrorCode::UnknownMember,
            ErrorCode::UnknownConstructor,
            ErrorCode::ConnectionClosed,
            ErrorCode::Internal,
        ];
        for code in all {
            assert_eq!(ErrorCode::from_wire(code.as_str()), Some(code));
        }
        assert_eq!(ErrorCode::from_wire("NOPE"), None);
    }

    #[test]
    fn remote_errors_keep_their_code_verbatim() {
        let err = DynbusError::Remote {
            code: "GL_INVALID_ENUM".into(),
            message: "bad enum".into(),
        };
        assert_eq!(err.wire_code(), "GL_INVALID_ENUM");
        assert_eq!(err.client_code(), ErrorCode::Internal);

        let obj = ErrorObject::from(&err);
        assert_eq!(obj.code, "GL_INVALID_ENUM");
        assert_eq!(obj.message, "bad enum");
    }

    #[test]
    fn routing_errors_are_fatal_dispatch_errors_are_not() {
        assert!(DynbusError::UnknownAddress("x".into()).is_fatal());
        assert!(DynbusError::NotConnected.is_fatal());
        assert!(!DynbusError::Method("boom".into()).is_fatal());
        assert!(!DynbusError::ConnectionClosed.is_fatal());
    }
}
