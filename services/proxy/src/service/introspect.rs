//! Builds a [`ServiceDescriptor`] from a loaded IDL program.

use std::collections::HashMap;

use tracing::debug;
use tproxy_idl::{Document, FieldDef, FieldType, FunctionDef, Program, ServiceDef};

use super::descriptor::{
    ArgumentSchema, MethodDescriptor, SchemaEntry, ServiceDescriptor, StructSchema, TypeTag,
};
use super::type_name::{ServiceKind, ServiceTypeName};
use crate::error::ProxyError;

/// Typedef chains longer than this are treated as cycles.
const MAX_TYPEDEF_DEPTH: usize = 32;

/// Describe the service named by `type_name` in `program`.
///
/// Inherited methods come first, base service outermost. Reserved
/// `__name__` methods are skipped. Every method must resolve completely;
/// there is no partial result.
pub fn describe(
    program: &Program,
    type_name: &ServiceTypeName,
) -> Result<ServiceDescriptor, ProxyError> {
    let type_label = type_name.to_string();
    let root = program.root();
    let service = root.service(&type_name.service).ok_or_else(|| {
        ProxyError::malformed(
            &type_label,
            format!(
                "module '{}' defines no service '{}'",
                root.name, type_name.service
            ),
        )
    })?;

    if type_name.kind == ServiceKind::Client {
        debug!(
            client = %type_label,
            interface = %service.name,
            "Resolved client to its interface"
        );
    }

    let chain = extends_chain(program, root, service, &type_label)?;
    let mut resolver = Resolver {
        program,
        structs: HashMap::new(),
    };

    let mut methods: Vec<MethodDescriptor> = Vec::new();
    for (doc, declaring) in chain {
        for function in &declaring.functions {
            if is_reserved(&function.name) {
                debug!(method = %function.name, "Skipping reserved method");
                continue;
            }
            if let Some(existing) = methods.iter().find(|m| m.name == function.name) {
                return Err(ProxyError::malformed(
                    &type_label,
                    format!(
                        "method '{}' is declared by both '{}' and '{}'",
                        function.name, existing.declared_in, declaring.name
                    ),
                ));
            }
            methods.push(resolver.method(doc, declaring, function)?);
        }
    }

    debug!(
        service = %service.name,
        methods = methods.len(),
        structs = resolver.structs.len(),
        "Described service"
    );

    Ok(ServiceDescriptor::new(
        type_name.clone(),
        methods,
        resolver.structs,
    ))
}

/// Methods named `__something__` belong to the runtime, not the service.
fn is_reserved(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

/// The service and its ancestors, base first.
fn extends_chain<'a>(
    program: &'a Program,
    doc: &'a Document,
    service: &'a ServiceDef,
    type_name: &str,
) -> Result<Vec<(&'a Document, &'a ServiceDef)>, ProxyError> {
    let mut chain = vec![(doc, service)];
    let (mut doc, mut service) = (doc, service);

    while let Some(base) = &service.extends {
        let (base_doc, base_service) = program
            .scope_of(doc, base)
            .and_then(|(d, local)| d.service(local).map(|s| (d, s)))
            .ok_or_else(|| {
                ProxyError::malformed(
                    type_name,
                    format!("service '{}' extends unknown service '{}'", service.name, base),
                )
            })?;

        let seen = chain
            .iter()
            .any(|(d, s)| d.name == base_doc.name && s.name == base_service.name);
        if seen {
            return Err(ProxyError::malformed(
                type_name,
                format!("extends cycle through '{}'", base),
            ));
        }

        chain.push((base_doc, base_service));
        doc = base_doc;
        service = base_service;
    }

    chain.reverse();
    Ok(chain)
}

struct Resolver<'a> {
    program: &'a Program,
    /// Structs reached so far, keyed `module.Name`.
    structs: HashMap<String, StructSchema>,
}

impl<'a> Resolver<'a> {
    fn method(
        &mut self,
        doc: &'a Document,
        service: &ServiceDef,
        function: &'a FunctionDef,
    ) -> Result<MethodDescriptor, ProxyError> {
        let not_found = |reason: String| ProxyError::SchemaNotFound {
            method: function.name.clone(),
            reason,
        };

        let args = self.schema(doc, &function.args).map_err(not_found)?;
        let returns = match &function.returns {
            Some(ty) => Some(
                self.resolve(doc, ty, 0)
                    .map_err(|reason| not_found(format!("return type: {}", reason)))?,
            ),
            None => None,
        };
        let throws = self.schema(doc, &function.throws).map_err(not_found)?;

        Ok(MethodDescriptor {
            name: function.name.clone(),
            args,
            returns,
            throws,
            oneway: function.oneway,
            signature: function.signature(),
            doc: function.doc.clone(),
            declared_in: service.name.clone(),
        })
    }

    fn schema(&mut self, doc: &'a Document, fields: &'a [FieldDef]) -> Result<ArgumentSchema, String> {
        let mut entries = Vec::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            let ty = self
                .resolve(doc, &field.ty, 0)
                .map_err(|reason| format!("field '{}': {}", field.name, reason))?;
            entries.push(SchemaEntry {
                position: index + 1,
                field_id: field.id,
                name: field.name.clone(),
                ty,
            });
        }
        Ok(ArgumentSchema::new(entries))
    }

    fn resolve(&mut self, doc: &'a Document, ty: &'a FieldType, depth: usize) -> Result<TypeTag, String> {
        let tag = match ty {
            FieldType::Bool => TypeTag::Bool,
            FieldType::Byte => TypeTag::Byte,
            FieldType::I16 => TypeTag::I16,
            FieldType::I32 => TypeTag::I32,
            FieldType::I64 => TypeTag::I64,
            FieldType::Double => TypeTag::Double,
            FieldType::String => TypeTag::String,
            FieldType::Binary => TypeTag::Binary,
            FieldType::Uuid => TypeTag::Uuid,
            FieldType::List(elem) => TypeTag::List(Box::new(self.resolve(doc, elem, depth)?)),
            FieldType::Set(elem) => TypeTag::Set(Box::new(self.resolve(doc, elem, depth)?)),
            FieldType::Map(key, value) => TypeTag::Map(
                Box::new(self.resolve(doc, key, depth)?),
                Box::new(self.resolve(doc, value, depth)?),
            ),
            FieldType::Named(name) => return self.resolve_named(doc, name, depth),
        };
        Ok(tag)
    }

    fn resolve_named(&mut self, doc: &'a Document, name: &'a str, depth: usize) -> Result<TypeTag, String> {
        let (target, local) = self
            .program
            .scope_of(doc, name)
            .ok_or_else(|| format!("unknown module in type '{}'", name))?;

        if let Some(def) = target.struct_def(local) {
            let key = format!("{}.{}", target.name, local);
            if !self.structs.contains_key(&key) {
                // Placeholder first so self-referencing structs terminate.
                self.structs.insert(
                    key.clone(),
                    StructSchema {
                        name: def.name.clone(),
                        fields: ArgumentSchema::default(),
                    },
                );
                let fields = self
                    .schema(target, &def.fields)
                    .map_err(|reason| format!("in '{}': {}", def.name, reason))?;
                self.structs.insert(
                    key.clone(),
                    StructSchema {
                        name: def.name.clone(),
                        fields,
                    },
                );
            }
            return Ok(TypeTag::Struct(key));
        }

        if let Some(def) = target.enum_def(local) {
            return Ok(TypeTag::Enum(def.name.clone()));
        }

        if let Some(def) = target.typedef(local) {
            if depth >= MAX_TYPEDEF_DEPTH {
                return Err(format!("typedef cycle through '{}'", name));
            }
            return self.resolve(target, &def.ty, depth + 1);
        }

        Err(format!("unknown type '{}'", name))
    }
}
