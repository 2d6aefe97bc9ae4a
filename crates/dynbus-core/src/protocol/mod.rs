//! Wire protocol modules.
//!
//! - `message`: Call / Result / Error and the reserved method names.
//! - `envelope`: routed unit (`to`, `from`, `body`), decoded or raw.
//! - `handle`: object handles and typed-array literals (`__jsonclass__`).
//! - `shape`: Constructor Specs used for remote prototype resolution.
//!
//! All parsers are panic-free: malformed input is reported as `DynbusError`.

pub mod envelope;
pub mod handle;
pub mod message;
pub mod shape;

pub use envelope::{Body, Envelope, RawEnvelope};
pub use handle::{is_primitive, Handle, ObjectId, Tagged, TypedArray, TypedArrayKind, HANDLE_TAG};
pub use message::{methods, Call, Message, Outcome, Reply, RequestId, PROTOCOL_VERSION};
pub use shape::{is_sentinel, ConstructorSpec, MemberKind, SENTINEL_ROOTS};
