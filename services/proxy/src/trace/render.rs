//! Human-readable rendering of wire values.
//!
//! Strings, bytes, booleans and containers render the way a Python
//! programmer would write them (`'hi'`, `b'\x00'`, `True`, `{1, 2}`) so
//! trace output stays familiar to users of other Thrift tooling.

use std::fmt::Write;

use tproxy_wire::{Field, Value};

use crate::service::{ArgumentSchema, ServiceDescriptor, TypeTag};

/// Renders values with the help of the service's type information.
pub(crate) struct Renderer<'a> {
    descriptor: &'a ServiceDescriptor,
}

impl<'a> Renderer<'a> {
    pub(crate) fn new(descriptor: &'a ServiceDescriptor) -> Self {
        Self { descriptor }
    }

    /// `name=value` for each field present: schema order first, then
    /// fields the schema does not know in wire order as `field_<id>=value`.
    pub(crate) fn labeled(&self, fields: &[Field], schema: &ArgumentSchema) -> Vec<String> {
        let mut out = Vec::with_capacity(fields.len());
        for entry in schema.entries() {
            if let Some(field) = fields.iter().find(|f| f.id == entry.field_id) {
                out.push(format!(
                    "{}={}",
                    entry.name,
                    self.repr(&field.value, Some(&entry.ty))
                ));
            }
        }
        for field in fields.iter().filter(|f| schema.by_field_id(f.id).is_none()) {
            out.push(format!("field_{}={}", field.id, self.repr(&field.value, None)));
        }
        out
    }

    pub(crate) fn repr(&self, value: &Value, ty: Option<&TypeTag>) -> String {
        match value {
            Value::Bool(true) | Value::RawBool(_) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Byte(v) => v.to_string(),
            Value::I16(v) => v.to_string(),
            Value::I32(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::Double(v) => format!("{:?}", v),
            Value::Binary(bytes) => match (ty, std::str::from_utf8(bytes)) {
                (Some(TypeTag::Binary), _) | (_, Err(_)) => bytes_repr(bytes),
                (_, Ok(text)) => str_repr(text),
            },
            Value::Uuid(bytes) => uuid_repr(bytes),
            Value::Struct(fields) => self.struct_repr(fields, ty),
            Value::List { items, .. } => {
                let elem = match ty {
                    Some(TypeTag::List(elem)) => Some(elem.as_ref()),
                    _ => None,
                };
                format!("[{}]", self.join(items, elem))
            }
            Value::Set { items, .. } => {
                if items.is_empty() {
                    return "set()".to_string();
                }
                let elem = match ty {
                    Some(TypeTag::Set(elem)) => Some(elem.as_ref()),
                    _ => None,
                };
                format!("{{{}}}", self.join(items, elem))
            }
            Value::Map { entries, .. } => {
                let (key_ty, value_ty) = match ty {
                    Some(TypeTag::Map(k, v)) => (Some(k.as_ref()), Some(v.as_ref())),
                    _ => (None, None),
                };
                let body = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", self.repr(k, key_ty), self.repr(v, value_ty)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{}}}", body)
            }
        }
    }

    fn struct_repr(&self, fields: &[Field], ty: Option<&TypeTag>) -> String {
        let schema = match ty {
            Some(TypeTag::Struct(key)) => self.descriptor.struct_schema(key),
            _ => None,
        };
        match schema {
            Some(schema) => format!(
                "{}({})",
                schema.name,
                self.labeled(fields, &schema.fields).join(", ")
            ),
            None => format!(
                "Struct({})",
                self.labeled(fields, &ArgumentSchema::default()).join(", ")
            ),
        }
    }

    fn join(&self, items: &[Value], elem: Option<&TypeTag>) -> String {
        items
            .iter()
            .map(|item| self.repr(item, elem))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Quote a string, preferring single quotes.
pub(crate) fn str_repr(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let code = c as u32;
                if code < 0x100 {
                    let _ = write!(out, "\\x{:02x}", code);
                } else {
                    let _ = write!(out, "\\u{:04x}", code);
                }
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn bytes_repr(bytes: &[u8]) -> String {
    let quote = if bytes.contains(&b'\'') && !bytes.contains(&b'"') {
        b'"'
    } else {
        b'\''
    };
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push('b');
    out.push(quote as char);
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b if b == quote => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7e => out.push(b as char),
            b => {
                let _ = write!(out, "\\x{:02x}", b);
            }
        }
    }
    out.push(quote as char);
    out
}

fn uuid_repr(bytes: &[u8; 16]) -> String {
    let mut out = String::with_capacity(36);
    for (i, b) in bytes.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        let _ = write!(out, "{:02x}", b);
    }
    out
}
