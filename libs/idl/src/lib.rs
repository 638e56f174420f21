//! Thrift IDL for tproxy.
//!
//! Parses `.thrift` documents into definitions and loads a module together
//! with everything it includes. The parser keeps what a proxy needs to
//! describe a service: services, functions, fields, structs, enums and
//! typedefs. Constants and annotations are parsed and discarded.

mod ast;
mod error;
mod lexer;
mod loader;
mod parser;

pub use ast::{
    Document, EnumDef, FieldDef, FieldType, FunctionDef, Requiredness, ServiceDef, StructDef,
    StructKind, TypedefDef,
};
pub use error::IdlError;
pub use loader::{IdlLoader, Program, IDL_EXTENSION};
pub use parser::parse_document;
