//! Thrift wire format for tproxy.
//!
//! This library provides:
//! - Dynamic Thrift values that carry their own wire types
//! - Binary protocol encoding and incremental decoding
//! - Framed and buffered transports as a `tokio_util` codec
//! - `TApplicationException` payloads
//!
//! Messages are decoded without knowing the service schema, so a decoded
//! message can be re-encoded byte for byte.

mod codec;
mod error;
mod exception;
mod protocol;
mod types;

pub use codec::{Framing, ThriftCodec, DEFAULT_MAX_FRAME_SIZE};
pub use error::WireError;
pub use exception::{ApplicationErrorKind, ApplicationException};
pub use protocol::{decode_message, encode_message, MAX_DEPTH};
pub use types::{Field, Message, MessageType, TType, Value};
