//! Framed and buffered transports.
//!
//! - Framed: each message is preceded by its length as a 4-byte big-endian integer
//! - Buffered: messages follow each other with no delimiter; boundaries come
//!   from decoding the binary protocol itself

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::WireError;
use crate::protocol::{decode_message, encode_message};
use crate::types::Message;

/// Default maximum size of a single frame or message (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Length of the framed-transport size prefix.
const FRAME_HEADER_LEN: usize = 4;

/// Transport framing convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Length-prefixed frames.
    #[default]
    Framed,
    /// Unframed messages over a buffered stream.
    Buffered,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Framed => f.write_str("framed"),
            Framing::Buffered => f.write_str("buffered"),
        }
    }
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "framed" => Ok(Framing::Framed),
            "buffered" => Ok(Framing::Buffered),
            other => Err(format!("unknown framing '{}'", other)),
        }
    }
}

/// Binary protocol over a framed or buffered transport.
#[derive(Debug, Clone)]
pub struct ThriftCodec {
    framing: Framing,
    max_frame_size: usize,
}

impl ThriftCodec {
    /// Create a codec with the default size limit.
    pub fn new(framing: Framing) -> Self {
        Self::with_max_frame_size(framing, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a codec with a custom size limit.
    pub fn with_max_frame_size(framing: Framing, max_frame_size: usize) -> Self {
        Self {
            framing,
            max_frame_size,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    fn decode_framed(&mut self, src: &mut BytesMut) -> Result<Option<Message>, WireError> {
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let size = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if size > self.max_frame_size {
            return Err(WireError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }

        if src.len() < FRAME_HEADER_LEN + size {
            src.reserve(FRAME_HEADER_LEN + size - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_LEN);
        let frame = src.split_to(size);

        match decode_message(&frame, self.max_frame_size)? {
            Some((msg, used)) if used == frame.len() => Ok(Some(msg)),
            Some((_, used)) => Err(WireError::Protocol(format!(
                "{} trailing bytes after message in frame",
                frame.len() - used
            ))),
            None => Err(WireError::Protocol("frame ends mid-message".to_string())),
        }
    }

    fn decode_buffered(&mut self, src: &mut BytesMut) -> Result<Option<Message>, WireError> {
        match decode_message(src, self.max_frame_size)? {
            Some((msg, used)) => {
                src.advance(used);
                Ok(Some(msg))
            }
            None if src.len() > self.max_frame_size => Err(WireError::FrameTooLarge {
                size: src.len(),
                max: self.max_frame_size,
            }),
            None => Ok(None),
        }
    }
}

impl Decoder for ThriftCodec {
    type Item = Message;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.framing {
            Framing::Framed => self.decode_framed(src),
            Framing::Buffered => self.decode_buffered(src),
        }
    }
}

impl Encoder<Message> for ThriftCodec {
    type Error = WireError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match self.framing {
            Framing::Framed => {
                let start = dst.len();
                dst.put_u32(0);
                encode_message(&item, dst);

                let size = dst.len() - start - FRAME_HEADER_LEN;
                if size > self.max_frame_size {
                    dst.truncate(start);
                    return Err(WireError::FrameTooLarge {
                        size,
                        max: self.max_frame_size,
                    });
                }
                dst[start..start + FRAME_HEADER_LEN].copy_from_slice(&(size as u32).to_be_bytes());
            }
            Framing::Buffered => encode_message(&item, dst),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, MessageType, Value};

    fn echo_call(seq_id: i32) -> Message {
        Message::new(
            "echo",
            MessageType::Call,
            seq_id,
            vec![Field::new(1, Value::string("hi"))],
        )
    }

    #[test]
    fn test_framing_from_str() {
        assert_eq!("framed".parse::<Framing>(), Ok(Framing::Framed));
        assert_eq!("Buffered".parse::<Framing>(), Ok(Framing::Buffered));
        assert!("zlib".parse::<Framing>().is_err());
    }

    #[test]
    fn test_framed_prefix_matches_payload() {
        let mut codec = ThriftCodec::new(Framing::Framed);
        let mut buf = BytesMut::new();
        codec.encode(echo_call(1), &mut buf).unwrap();

        let size = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(size, buf.len() - 4);
    }

    #[test]
    fn test_framed_waits_for_whole_frame() {
        let mut codec = ThriftCodec::new(Framing::Framed);
        let mut encoded = BytesMut::new();
        codec.encode(echo_call(1), &mut encoded).unwrap();

        let mut src = BytesMut::from(&encoded[..encoded.len() - 2]);
        assert!(codec.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(&encoded[encoded.len() - 2..]);
        let msg = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(msg, echo_call(1));
        assert!(src.is_empty());
    }

    #[test]
    fn test_framed_rejects_oversized_frame() {
        let mut codec = ThriftCodec::with_max_frame_size(Framing::Framed, 64);
        let mut src = BytesMut::new();
        src.put_u32(65);

        assert!(matches!(
            codec.decode(&mut src),
            Err(WireError::FrameTooLarge { size: 65, max: 64 })
        ));
    }

    #[test]
    fn test_framed_rejects_trailing_bytes() {
        let mut payload = BytesMut::new();
        encode_message(&echo_call(1), &mut payload);
        payload.put_u8(0xAA);

        let mut src = BytesMut::new();
        src.put_u32(payload.len() as u32);
        src.extend_from_slice(&payload);

        let mut codec = ThriftCodec::new(Framing::Framed);
        assert!(matches!(codec.decode(&mut src), Err(WireError::Protocol(_))));
    }

    #[test]
    fn test_buffered_splits_back_to_back_messages() {
        let mut codec = ThriftCodec::new(Framing::Buffered);
        let mut src = BytesMut::new();
        codec.encode(echo_call(1), &mut src).unwrap();
        codec.encode(echo_call(2), &mut src).unwrap();

        assert_eq!(codec.decode(&mut src).unwrap().unwrap().seq_id, 1);
        assert_eq!(codec.decode(&mut src).unwrap().unwrap().seq_id, 2);
        assert!(codec.decode(&mut src).unwrap().is_none());
    }

    #[test]
    fn test_buffered_partial_message_is_kept() {
        let mut codec = ThriftCodec::new(Framing::Buffered);
        let mut encoded = BytesMut::new();
        codec.encode(echo_call(3), &mut encoded).unwrap();

        let mut src = BytesMut::from(&encoded[..5]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        assert_eq!(src.len(), 5);

        src.extend_from_slice(&encoded[5..]);
        assert_eq!(codec.decode(&mut src).unwrap().unwrap().seq_id, 3);
    }
}
