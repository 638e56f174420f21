//! Introspected service shape: methods, argument schemas and struct layouts.

use std::collections::HashMap;
use std::fmt;

use tproxy_wire::TType;

use super::type_name::ServiceTypeName;

/// A declared type with typedefs unwrapped and names resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    String,
    Binary,
    Uuid,
    List(Box<TypeTag>),
    Set(Box<TypeTag>),
    Map(Box<TypeTag>, Box<TypeTag>),
    /// Struct, union or exception, keyed `module.Name` in the descriptor.
    Struct(String),
    /// Enum name; enums travel as i32.
    Enum(String),
}

impl TypeTag {
    /// Wire type used to encode values of this type.
    pub fn ttype(&self) -> TType {
        match self {
            TypeTag::Bool => TType::Bool,
            TypeTag::Byte => TType::Byte,
            TypeTag::I16 => TType::I16,
            TypeTag::I32 | TypeTag::Enum(_) => TType::I32,
            TypeTag::I64 => TType::I64,
            TypeTag::Double => TType::Double,
            TypeTag::String | TypeTag::Binary => TType::String,
            TypeTag::Uuid => TType::Uuid,
            TypeTag::List(_) => TType::List,
            TypeTag::Set(_) => TType::Set,
            TypeTag::Map(_, _) => TType::Map,
            TypeTag::Struct(_) => TType::Struct,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Bool => f.write_str("bool"),
            TypeTag::Byte => f.write_str("byte"),
            TypeTag::I16 => f.write_str("i16"),
            TypeTag::I32 => f.write_str("i32"),
            TypeTag::I64 => f.write_str("i64"),
            TypeTag::Double => f.write_str("double"),
            TypeTag::String => f.write_str("string"),
            TypeTag::Binary => f.write_str("binary"),
            TypeTag::Uuid => f.write_str("uuid"),
            TypeTag::List(elem) => write!(f, "list<{}>", elem),
            TypeTag::Set(elem) => write!(f, "set<{}>", elem),
            TypeTag::Map(key, value) => write!(f, "map<{}, {}>", key, value),
            TypeTag::Struct(name) | TypeTag::Enum(name) => f.write_str(name),
        }
    }
}

/// One formal parameter or struct field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEntry {
    /// 1-based declaration position. Position 0 is the reply's success slot.
    pub position: usize,
    /// Thrift field id used on the wire.
    pub field_id: i16,
    pub name: String,
    pub ty: TypeTag,
}

/// Ordered parameter list of one method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentSchema {
    entries: Vec<SchemaEntry>,
}

impl ArgumentSchema {
    pub fn new(entries: Vec<SchemaEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry labeling wire field `field_id`.
    pub fn by_field_id(&self, field_id: i16) -> Option<&SchemaEntry> {
        self.entries.iter().find(|e| e.field_id == field_id)
    }

    /// Entry at 1-based `position`; position 0 never names an argument.
    pub fn at_position(&self, position: usize) -> Option<&SchemaEntry> {
        position
            .checked_sub(1)
            .and_then(|index| self.entries.get(index))
    }
}

/// Layout of a struct, union or exception reachable from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructSchema {
    /// Unqualified name, used when rendering values.
    pub name: String,
    pub fields: ArgumentSchema,
}

/// One service operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    pub args: ArgumentSchema,
    /// Return type; `None` for void.
    pub returns: Option<TypeTag>,
    /// Declared exceptions, labeled by their result field ids.
    pub throws: ArgumentSchema,
    pub oneway: bool,
    /// IDL signature, e.g. `string echo(1: string message)`.
    pub signature: String,
    pub doc: Option<String>,
    /// Service that declared the method (differs for inherited methods).
    pub declared_in: String,
}

/// Everything the proxy knows about the service it fronts.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub type_name: ServiceTypeName,
    methods: Vec<MethodDescriptor>,
    structs: HashMap<String, StructSchema>,
}

impl ServiceDescriptor {
    pub fn new(
        type_name: ServiceTypeName,
        methods: Vec<MethodDescriptor>,
        structs: HashMap<String, StructSchema>,
    ) -> Self {
        Self {
            type_name,
            methods,
            structs,
        }
    }

    /// Methods in resolution order: inherited first, then declaration order.
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(|m| m.name.as_str())
    }

    pub fn struct_schema(&self, key: &str) -> Option<&StructSchema> {
        self.structs.get(key)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
