//! Thrift binary protocol.
//!
//! Wire format of a message:
//! - strict header: i32 `0x8001_0000 | type`, name (i32 length + bytes), i32 seqid
//! - legacy header: name (i32 length + bytes), i8 type, i32 seqid
//! - body: struct fields (i8 type, i16 id, value) terminated by a STOP byte
//!
//! All integers are big-endian.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::WireError;
use crate::types::{Field, Message, MessageType, TType, Value};

/// Version marker of the strict message header.
const VERSION_1: u32 = 0x8001_0000;

/// Mask selecting the version bits of the strict header.
const VERSION_MASK: u32 = 0xffff_0000;

/// Maximum nesting of structs and containers.
pub const MAX_DEPTH: usize = 64;

/// Decode one message from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` holds only part of a message, otherwise
/// the message and the number of bytes it occupied. `max_len` bounds string
/// lengths and container sizes.
pub fn decode_message(buf: &[u8], max_len: usize) -> Result<Option<(Message, usize)>, WireError> {
    let mut reader = Reader::new(buf, max_len);
    match reader.read_message() {
        Ok(msg) => Ok(Some((msg, reader.pos))),
        Err(ReadError::Incomplete) => Ok(None),
        Err(ReadError::Wire(e)) => Err(e),
    }
}

/// Append the binary encoding of `msg` to `dst`.
pub fn encode_message(msg: &Message, dst: &mut BytesMut) {
    if msg.strict {
        dst.put_u32(VERSION_1 | msg.kind as u32);
        write_binary(dst, msg.name.as_bytes());
    } else {
        write_binary(dst, msg.name.as_bytes());
        dst.put_u8(msg.kind as u8);
    }
    dst.put_i32(msg.seq_id);
    write_struct(dst, &msg.body);
}

fn write_binary(dst: &mut BytesMut, bytes: &[u8]) {
    dst.put_i32(bytes.len() as i32);
    dst.put_slice(bytes);
}

fn write_struct(dst: &mut BytesMut, fields: &[Field]) {
    for field in fields {
        dst.put_u8(field.value.ttype() as u8);
        dst.put_i16(field.id);
        write_value(dst, &field.value);
    }
    dst.put_u8(TType::Stop as u8);
}

fn write_value(dst: &mut BytesMut, value: &Value) {
    match value {
        Value::Bool(v) => dst.put_u8(u8::from(*v)),
        Value::RawBool(v) => dst.put_u8(*v),
        Value::Byte(v) => dst.put_i8(*v),
        Value::I16(v) => dst.put_i16(*v),
        Value::I32(v) => dst.put_i32(*v),
        Value::I64(v) => dst.put_i64(*v),
        Value::Double(v) => dst.put_u64(v.to_bits()),
        Value::Binary(bytes) => write_binary(dst, bytes),
        Value::Uuid(bytes) => dst.put_slice(bytes),
        Value::Struct(fields) => write_struct(dst, fields),
        Value::List { elem, items } | Value::Set { elem, items } => {
            dst.put_u8(*elem as u8);
            dst.put_i32(items.len() as i32);
            for item in items {
                write_value(dst, item);
            }
        }
        Value::Map {
            key,
            value,
            entries,
        } => {
            dst.put_u8(*key as u8);
            dst.put_u8(*value as u8);
            dst.put_i32(entries.len() as i32);
            for (k, v) in entries {
                write_value(dst, k);
                write_value(dst, v);
            }
        }
    }
}

enum ReadError {
    /// More bytes are needed.
    Incomplete,
    Wire(WireError),
}

impl From<WireError> for ReadError {
    fn from(e: WireError) -> Self {
        ReadError::Wire(e)
    }
}

type ReadResult<T> = Result<T, ReadError>;

fn malformed<T>(message: impl Into<String>) -> ReadResult<T> {
    Err(ReadError::Wire(WireError::protocol(message)))
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
    max_len: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], max_len: usize) -> Self {
        Self {
            buf,
            pos: 0,
            depth: 0,
            max_len,
        }
    }

    fn take(&mut self, n: usize) -> ReadResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(ReadError::Incomplete)?;
        if end > self.buf.len() {
            return Err(ReadError::Incomplete);
        }
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> ReadResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> ReadResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_i16(&mut self) -> ReadResult<i16> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    fn read_i32(&mut self) -> ReadResult<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    fn read_i64(&mut self) -> ReadResult<i64> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    /// Read a length or size prefix and check it against the limit.
    fn read_size(&mut self, what: &str) -> ReadResult<usize> {
        let size = self.read_i32()?;
        if size < 0 {
            return malformed(format!("negative {} size {}", what, size));
        }
        let size = size as usize;
        if size > self.max_len {
            return Err(ReadError::Wire(WireError::FrameTooLarge {
                size,
                max: self.max_len,
            }));
        }
        Ok(size)
    }

    fn read_binary(&mut self) -> ReadResult<&'a [u8]> {
        let len = self.read_size("string")?;
        self.take(len)
    }

    fn read_ttype(&mut self) -> ReadResult<TType> {
        let code = self.read_u8()?;
        match TType::from_u8(code) {
            Some(ttype) => Ok(ttype),
            None => malformed(format!("unknown field type {}", code)),
        }
    }

    fn read_message(&mut self) -> ReadResult<Message> {
        let first = self.read_i32()?;
        let (name, kind_code, strict) = if first < 0 {
            let version = first as u32 & VERSION_MASK;
            if version != VERSION_1 {
                return malformed(format!("bad protocol version {:#010x}", version));
            }
            let name = self.read_binary()?;
            (name, (first & 0xff) as u8, true)
        } else {
            // Legacy header: the first word is the name length.
            let len = first as usize;
            if len > self.max_len {
                return Err(ReadError::Wire(WireError::FrameTooLarge {
                    size: len,
                    max: self.max_len,
                }));
            }
            let name = self.take(len)?;
            let kind = self.read_u8()?;
            (name, kind, false)
        };

        let Some(kind) = MessageType::from_u8(kind_code) else {
            return malformed(format!("unknown message type {}", kind_code));
        };
        let name = match std::str::from_utf8(name) {
            Ok(name) => name.to_string(),
            Err(_) => return malformed("method name is not valid UTF-8"),
        };
        let seq_id = self.read_i32()?;
        let body = self.read_struct()?;

        Ok(Message {
            name,
            kind,
            seq_id,
            body,
            strict,
        })
    }

    fn descend(&mut self) -> ReadResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return malformed(format!("nesting deeper than {}", MAX_DEPTH));
        }
        Ok(())
    }

    fn read_struct(&mut self) -> ReadResult<Vec<Field>> {
        self.descend()?;
        let mut fields = Vec::new();
        loop {
            let ttype = self.read_ttype()?;
            if ttype == TType::Stop {
                break;
            }
            let id = self.read_i16()?;
            let value = self.read_value(ttype)?;
            fields.push(Field { id, value });
        }
        self.depth -= 1;
        Ok(fields)
    }

    fn read_value(&mut self, ttype: TType) -> ReadResult<Value> {
        let value = match ttype {
            TType::Bool => match self.read_u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                raw => Value::RawBool(raw),
            },
            TType::Byte => Value::Byte(self.read_u8()? as i8),
            TType::I16 => Value::I16(self.read_i16()?),
            TType::I32 => Value::I32(self.read_i32()?),
            TType::I64 => Value::I64(self.read_i64()?),
            TType::Double => Value::Double(f64::from_bits(u64::from_be_bytes(self.read_array()?))),
            TType::String => Value::Binary(Bytes::copy_from_slice(self.read_binary()?)),
            TType::Uuid => Value::Uuid(self.read_array()?),
            TType::Struct => Value::Struct(self.read_struct()?),
            TType::List | TType::Set => {
                self.descend()?;
                let elem = self.read_ttype()?;
                let size = self.read_size("list")?;
                let mut items = Vec::with_capacity(size.min(1024));
                for _ in 0..size {
                    items.push(self.read_value(elem)?);
                }
                self.depth -= 1;
                if ttype == TType::List {
                    Value::List { elem, items }
                } else {
                    Value::Set { elem, items }
                }
            }
            TType::Map => {
                self.descend()?;
                let key = self.read_ttype()?;
                let value = self.read_ttype()?;
                let size = self.read_size("map")?;
                let mut entries = Vec::with_capacity(size.min(1024));
                for _ in 0..size {
                    let k = self.read_value(key)?;
                    let v = self.read_value(value)?;
                    entries.push((k, v));
                }
                self.depth -= 1;
                Value::Map {
                    key,
                    value,
                    entries,
                }
            }
            TType::Stop | TType::Void => {
                return malformed(format!("{} is not a value type", ttype));
            }
        };
        Ok(value)
    }
}
