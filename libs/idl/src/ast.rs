//! Parsed Thrift IDL definitions.

use std::fmt;
use std::path::PathBuf;

/// A declared field or parameter type, before name resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    String,
    Binary,
    Uuid,
    List(Box<FieldType>),
    Set(Box<FieldType>),
    Map(Box<FieldType>, Box<FieldType>),
    /// A struct, union, exception, enum or typedef, possibly `module.Name`.
    Named(String),
}

impl FieldType {
    /// Map a base type keyword to its type.
    pub fn base(name: &str) -> Option<Self> {
        let ty = match name {
            "bool" => FieldType::Bool,
            "byte" | "i8" => FieldType::Byte,
            "i16" => FieldType::I16,
            "i32" => FieldType::I32,
            "i64" => FieldType::I64,
            "double" => FieldType::Double,
            "string" => FieldType::String,
            "binary" => FieldType::Binary,
            "uuid" => FieldType::Uuid,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Bool => f.write_str("bool"),
            FieldType::Byte => f.write_str("byte"),
            FieldType::I16 => f.write_str("i16"),
            FieldType::I32 => f.write_str("i32"),
            FieldType::I64 => f.write_str("i64"),
            FieldType::Double => f.write_str("double"),
            FieldType::String => f.write_str("string"),
            FieldType::Binary => f.write_str("binary"),
            FieldType::Uuid => f.write_str("uuid"),
            FieldType::List(elem) => write!(f, "list<{}>", elem),
            FieldType::Set(elem) => write!(f, "set<{}>", elem),
            FieldType::Map(key, value) => write!(f, "map<{}, {}>", key, value),
            FieldType::Named(name) => f.write_str(name),
        }
    }
}

/// Field requiredness qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Requiredness {
    #[default]
    Default,
    Required,
    Optional,
}

/// A struct field or function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field id; implicit ids are negative, counting down from -1.
    pub id: i16,
    /// Whether the id was written in the source.
    pub explicit_id: bool,
    pub name: String,
    pub ty: FieldType,
    pub requiredness: Requiredness,
}

/// A service function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub oneway: bool,
    /// Return type; `None` for `void`.
    pub returns: Option<FieldType>,
    pub args: Vec<FieldDef>,
    pub throws: Vec<FieldDef>,
    pub doc: Option<String>,
}

impl FunctionDef {
    /// IDL-style signature, e.g. `string echo(1: string message)`.
    pub fn signature(&self) -> String {
        let args = self
            .args
            .iter()
            .map(|a| format!("{}: {} {}", a.id, a.ty, a.name))
            .collect::<Vec<_>>()
            .join(", ");
        let returns = self
            .returns
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "void".to_string());
        let mut sig = format!(
            "{}{} {}({})",
            if self.oneway { "oneway " } else { "" },
            returns,
            self.name,
            args
        );
        if !self.throws.is_empty() {
            let throws = self
                .throws
                .iter()
                .map(|t| format!("{}: {} {}", t.id, t.ty, t.name))
                .collect::<Vec<_>>()
                .join(", ");
            sig.push_str(&format!(" throws ({})", throws));
        }
        sig
    }
}

/// A `service` definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDef {
    pub name: String,
    /// Base service, possibly `module.Name`.
    pub extends: Option<String>,
    pub functions: Vec<FunctionDef>,
    pub doc: Option<String>,
}

/// Which keyword introduced a struct-like definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructKind {
    Struct,
    Union,
    Exception,
}

/// A `struct`, `union` or `exception` definition.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub kind: StructKind,
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub doc: Option<String>,
}

impl StructDef {
    pub fn field(&self, id: i16) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.id == id)
    }
}

/// An `enum` definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<(String, i32)>,
}

/// A `typedef` definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedefDef {
    pub name: String,
    pub ty: FieldType,
}

/// One parsed `.thrift` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Module name: the file stem.
    pub name: String,
    /// Source file, when loaded from disk.
    pub path: Option<PathBuf>,
    /// Include paths as written.
    pub includes: Vec<String>,
    pub typedefs: Vec<TypedefDef>,
    pub enums: Vec<EnumDef>,
    pub structs: Vec<StructDef>,
    pub services: Vec<ServiceDef>,
}

impl Document {
    pub fn service(&self, name: &str) -> Option<&ServiceDef> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.enums.iter().find(|e| e.name == name)
    }

    pub fn typedef(&self, name: &str) -> Option<&TypedefDef> {
        self.typedefs.iter().find(|t| t.name == name)
    }
}
