//! `TApplicationException`: framework-level errors sent in place of a reply.

use std::fmt;

use thiserror::Error;

use crate::types::{Field, Message, MessageType, Value};

/// Standard application exception kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationErrorKind {
    Unknown = 0,
    UnknownMethod = 1,
    InvalidMessageType = 2,
    WrongMethodName = 3,
    BadSequenceId = 4,
    MissingResult = 5,
    InternalError = 6,
    ProtocolError = 7,
    InvalidTransform = 8,
    InvalidProtocol = 9,
    UnsupportedClientType = 10,
}

impl ApplicationErrorKind {
    /// Decode a kind code; unrecognized codes map to `Unknown`.
    pub fn from_i32(code: i32) -> Self {
        match code {
            1 => Self::UnknownMethod,
            2 => Self::InvalidMessageType,
            3 => Self::WrongMethodName,
            4 => Self::BadSequenceId,
            5 => Self::MissingResult,
            6 => Self::InternalError,
            7 => Self::ProtocolError,
            8 => Self::InvalidTransform,
            9 => Self::InvalidProtocol,
            10 => Self::UnsupportedClientType,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::UnknownMethod => "UNKNOWN_METHOD",
            Self::InvalidMessageType => "INVALID_MESSAGE_TYPE",
            Self::WrongMethodName => "WRONG_METHOD_NAME",
            Self::BadSequenceId => "BAD_SEQUENCE_ID",
            Self::MissingResult => "MISSING_RESULT",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::InvalidTransform => "INVALID_TRANSFORM",
            Self::InvalidProtocol => "INVALID_PROTOCOL",
            Self::UnsupportedClientType => "UNSUPPORTED_CLIENT_TYPE",
        }
    }
}

impl fmt::Display for ApplicationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field id of the message text.
const MESSAGE_FIELD: i16 = 1;

/// Field id of the kind code.
const TYPE_FIELD: i16 = 2;

/// A `TApplicationException` payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ApplicationException {
    pub kind: ApplicationErrorKind,
    pub message: String,
}

impl ApplicationException {
    pub fn new(kind: ApplicationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Decode from the body of an `Exception` message.
    ///
    /// Missing fields fall back to an empty message and `Unknown`.
    pub fn from_body(body: &[Field]) -> Self {
        let mut exc = Self::new(ApplicationErrorKind::Unknown, "");
        for field in body {
            match (field.id, &field.value) {
                (MESSAGE_FIELD, Value::Binary(bytes)) => {
                    exc.message = String::from_utf8_lossy(bytes).into_owned();
                }
                (TYPE_FIELD, Value::I32(code)) => {
                    exc.kind = ApplicationErrorKind::from_i32(*code);
                }
                _ => {}
            }
        }
        exc
    }

    /// Encode as struct fields.
    pub fn to_body(&self) -> Vec<Field> {
        vec![
            Field::new(MESSAGE_FIELD, Value::string(self.message.clone())),
            Field::new(TYPE_FIELD, Value::I32(self.kind as i32)),
        ]
    }

    /// Build the `Exception` message answering call `name` / `seq_id`.
    pub fn into_message(self, name: impl Into<String>, seq_id: i32) -> Message {
        Message::new(name, MessageType::Exception, seq_id, self.to_body())
    }
}
