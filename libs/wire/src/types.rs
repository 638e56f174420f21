//! Dynamic Thrift values and message envelopes.

use std::fmt;

use bytes::Bytes;

/// Thrift wire type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TType {
    Stop = 0,
    Void = 1,
    Bool = 2,
    Byte = 3,
    Double = 4,
    I16 = 6,
    I32 = 8,
    I64 = 10,
    String = 11,
    Struct = 12,
    Map = 13,
    Set = 14,
    List = 15,
    Uuid = 16,
}

impl TType {
    /// Decode a wire type code.
    pub fn from_u8(code: u8) -> Option<Self> {
        let ttype = match code {
            0 => TType::Stop,
            1 => TType::Void,
            2 => TType::Bool,
            3 => TType::Byte,
            4 => TType::Double,
            6 => TType::I16,
            8 => TType::I32,
            10 => TType::I64,
            11 => TType::String,
            12 => TType::Struct,
            13 => TType::Map,
            14 => TType::Set,
            15 => TType::List,
            16 => TType::Uuid,
            _ => return None,
        };
        Some(ttype)
    }

    /// Lowercase name as written in IDL.
    pub fn name(self) -> &'static str {
        match self {
            TType::Stop => "stop",
            TType::Void => "void",
            TType::Bool => "bool",
            TType::Byte => "byte",
            TType::Double => "double",
            TType::I16 => "i16",
            TType::I32 => "i32",
            TType::I64 => "i64",
            TType::String => "string",
            TType::Struct => "struct",
            TType::Map => "map",
            TType::Set => "set",
            TType::List => "list",
            TType::Uuid => "uuid",
        }
    }
}

impl fmt::Display for TType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Message envelope types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Call = 1,
    Reply = 2,
    Exception = 3,
    Oneway = 4,
}

impl MessageType {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(MessageType::Call),
            2 => Some(MessageType::Reply),
            3 => Some(MessageType::Exception),
            4 => Some(MessageType::Oneway),
            _ => None,
        }
    }
}

/// A decoded Thrift value.
///
/// Containers keep their declared element types so that empty containers
/// re-encode exactly as received.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    /// A bool sent as a byte other than 0 or 1. Any non-zero byte is true.
    RawBool(u8),
    Byte(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Double(f64),
    /// `string` and `binary` share a wire representation.
    Binary(Bytes),
    Uuid([u8; 16]),
    Struct(Vec<Field>),
    List {
        elem: TType,
        items: Vec<Value>,
    },
    Set {
        elem: TType,
        items: Vec<Value>,
    },
    Map {
        key: TType,
        value: TType,
        entries: Vec<(Value, Value)>,
    },
}

impl Value {
    /// Build a string value.
    pub fn string(s: impl Into<String>) -> Self {
        Value::Binary(Bytes::from(s.into()))
    }

    /// Wire type of this value.
    pub fn ttype(&self) -> TType {
        match self {
            Value::Bool(_) | Value::RawBool(_) => TType::Bool,
            Value::Byte(_) => TType::Byte,
            Value::I16(_) => TType::I16,
            Value::I32(_) => TType::I32,
            Value::I64(_) => TType::I64,
            Value::Double(_) => TType::Double,
            Value::Binary(_) => TType::String,
            Value::Uuid(_) => TType::Uuid,
            Value::Struct(_) => TType::Struct,
            Value::List { .. } => TType::List,
            Value::Set { .. } => TType::Set,
            Value::Map { .. } => TType::Map,
        }
    }

    /// The value as UTF-8 text, if it is a valid string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Binary(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// The fields of a struct value.
    pub fn as_struct(&self) -> Option<&[Field]> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }
}

/// A struct field: id plus value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: i16,
    pub value: Value,
}

impl Field {
    pub fn new(id: i16, value: Value) -> Self {
        Self { id, value }
    }
}

/// One RPC frame: the message header plus its argument or result struct.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Method name.
    pub name: String,
    /// Envelope type.
    pub kind: MessageType,
    /// Sequence id chosen by the caller.
    pub seq_id: i32,
    /// Fields of the argument (calls) or result (replies) struct.
    pub body: Vec<Field>,
    /// Whether the header used the versioned (strict) layout.
    pub strict: bool,
}

impl Message {
    /// Create a message with a strict header.
    pub fn new(name: impl Into<String>, kind: MessageType, seq_id: i32, body: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            kind,
            seq_id,
            body,
            strict: true,
        }
    }

    /// Look up a body field by id.
    pub fn field(&self, id: i16) -> Option<&Value> {
        self.body.iter().find(|f| f.id == id).map(|f| &f.value)
    }

    /// Returns true for `Call` and `Oneway` messages.
    pub fn is_request(&self) -> bool {
        matches!(self.kind, MessageType::Call | MessageType::Oneway)
    }
}
