//! Service introspection.
//!
//! Turns a service type name plus its IDL into a [`ServiceDescriptor`]:
//!
//! ```text
//! "Echo.Client" ──► ServiceTypeName ──► IdlLoader::load("Echo") ──► describe()
//!                                                                      │
//!                       methods, argument schemas, struct layouts ◄────┘
//! ```

mod descriptor;
mod introspect;
mod type_name;

pub use descriptor::{
    ArgumentSchema, MethodDescriptor, SchemaEntry, ServiceDescriptor, StructSchema, TypeTag,
};
pub use introspect::describe;
pub use type_name::{ServiceKind, ServiceTypeName};
