use serde::Deserialize;

use crate::ast::{DirectiveDecl, SlotDecl, TypeNode, Visibility};
use crate::env::{Env, ModuleKind, ModuleRef};
use crate::errors::{Error, ErrorKind, Result};
use crate::syntax::Span;
use crate::types::{RecordType, Scheme, Type};

/// A schema introspection result, the sole external source of nominal
/// types beyond the language's own built-ins. Deserialized from the JSON
/// shape produced by a GraphQL-style introspection query.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub query_type: Option<NamedTypeRef>,
    #[serde(default)]
    pub directives: Vec<DirectiveDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedTypeRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeDefKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub enum_values: Vec<EnumValueDef>,
    #[serde(default)]
    pub input_fields: Vec<InputValueDef>,
    #[serde(default)]
    pub interfaces: Vec<NamedTypeRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeDefKind {
    Object,
    Enum,
    Scalar,
    Interface,
    InputObject,
    Union,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub args: Vec<InputValueDef>,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputValueDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumValueDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub args: Vec<InputValueDef>,
    #[serde(default)]
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRef {
    pub kind: TypeRefKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub of_type: Option<Box<TypeRef>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeRefKind {
    Scalar,
    Object,
    Enum,
    Interface,
    InputObject,
    Union,
    List,
    NonNull,
}

impl Schema {
    pub fn from_json(json: &str) -> Result<Schema> {
        serde_json::from_str(json)
            .map_err(|e| Error::new(ErrorKind::Eval(format!("invalid schema document: {e}"))))
    }
}

/// Resolve an introspection type reference against the environment.
pub fn type_from_ref(env: &Env, type_ref: &TypeRef) -> Result<Type> {
    match type_ref.kind {
        TypeRefKind::List => {
            let of = type_ref
                .of_type
                .as_ref()
                .ok_or_else(|| Error::new(ErrorKind::Eval("list ref without ofType".into())))?;
            Ok(Type::list(type_from_ref(env, of)?))
        }
        TypeRefKind::NonNull => {
            let of = type_ref
                .of_type
                .as_ref()
                .ok_or_else(|| Error::new(ErrorKind::Eval("non-null ref without ofType".into())))?;
            Ok(Type::non_null(type_from_ref(env, of)?))
        }
        _ => {
            let name = type_ref.name.as_deref().unwrap_or_default();
            let module = env
                .named_type(name)
                .ok_or_else(|| Error::new(ErrorKind::UndeclaredName(name.to_string())))?;
            Ok(Type::Module(module))
        }
    }
}

/// The syntactic type annotation corresponding to an introspection ref,
/// used when synthesizing directive declarations.
fn type_node_from_ref(type_ref: &TypeRef) -> TypeNode {
    let named = || TypeNode::Named(type_ref.name.clone().unwrap_or_default(), Span::default());
    match (type_ref.kind, type_ref.of_type.as_deref()) {
        (TypeRefKind::List, Some(of)) => TypeNode::List(Box::new(type_node_from_ref(of))),
        (TypeRefKind::NonNull, Some(of)) => TypeNode::NonNull(Box::new(type_node_from_ref(of))),
        _ => named(),
    }
}

fn module_kind(kind: TypeDefKind) -> ModuleKind {
    match kind {
        TypeDefKind::Enum => ModuleKind::Enum,
        TypeDefKind::Scalar => ModuleKind::Scalar,
        TypeDefKind::Interface => ModuleKind::Interface,
        _ => ModuleKind::Object,
    }
}

const BUILTIN_SCALARS: &[&str] = &["String", "Int", "Float", "Boolean", "ID"];

/// Walk an introspection result once, populating the environment's nominal
/// types and value bindings. Returns the environment with the query type
/// layered into the lexical chain so its fields resolve unqualified.
pub fn bind_schema(env: &Env, schema: &Schema) -> Result<Env> {
    // Directive declarations first, so field metadata can reference them.
    for d in &schema.directives {
        let args = d
            .args
            .iter()
            .map(|arg| SlotDecl {
                name: arg.name.clone(),
                ty: Some(type_node_from_ref(&arg.type_ref)),
                value: None,
                visibility: Visibility::Public,
                directives: Vec::new(),
                doc: arg.description.clone(),
                span: Span::default(),
            })
            .collect();
        env.add_directive_decl(DirectiveDecl {
            name: d.name.clone(),
            args,
            locations: d.locations.clone(),
            doc: d.description.clone(),
        });
    }

    // Pass 1: register every named type so fields can reference each other.
    for t in &schema.types {
        if env.named_type(&t.name).is_none() {
            let module = ModuleRef::new(t.name.clone(), module_kind(t.kind));
            if let Some(desc) = &t.description {
                module.set_module_doc(desc.clone());
            }
            env.add_class(t.name.clone(), module);
        }
    }

    // Pass 2: enum, scalar, and interface types double as value bindings.
    for t in &schema.types {
        let bindable = matches!(
            t.kind,
            TypeDefKind::Enum | TypeDefKind::Interface | TypeDefKind::Scalar
        );
        if !bindable || BUILTIN_SCALARS.contains(&t.name.as_str()) {
            continue;
        }
        if let Some(module) = env.named_type(&t.name) {
            env.add(t.name.clone(), Scheme::mono(Type::Module(module)));
            env.set_visibility(t.name.clone(), Visibility::Public);
        }
    }

    // Pass 3: members. Enum values carry the enum's own type; every field
    // and input field becomes a function binding on its owning module.
    for t in &schema.types {
        let Some(install) = env.named_type(&t.name) else {
            continue;
        };

        for ev in &t.enum_values {
            install.add(ev.name.clone(), Scheme::mono(Type::Module(install.clone())));
            install.set_visibility(ev.name.clone(), Visibility::Public);
            if let Some(desc) = &ev.description {
                install.set_doc(ev.name.clone(), desc.clone());
            }
        }

        let field_args = |args: &[InputValueDef]| -> Result<RecordType> {
            let mut rec = RecordType::new("");
            for arg in args {
                let mut arg_type = type_from_ref(env, &arg.type_ref)?;
                if arg.default_value.is_some() {
                    // A defaulted argument is optional at the call site.
                    arg_type = arg_type.nullable();
                }
                rec.add(arg.name.clone(), Scheme::mono(arg_type));
                if let Some(desc) = &arg.description {
                    rec.docs.insert(arg.name.clone(), desc.clone());
                }
            }
            Ok(rec)
        };

        for f in &t.fields {
            let ret = type_from_ref(env, &f.type_ref)?;
            let args = field_args(&f.args)?;
            install.add(f.name.clone(), Scheme::mono(Type::fun(args, ret)));
            install.set_visibility(f.name.clone(), Visibility::Public);
            if let Some(desc) = &f.description {
                install.set_doc(f.name.clone(), desc.clone());
            }
        }

        if t.kind == TypeDefKind::InputObject {
            // Input objects expose a constructor binding in the root.
            let mut rec = RecordType::new("");
            for f in &t.input_fields {
                let field_type = type_from_ref(env, &f.type_ref)?;
                install.add(f.name.clone(), Scheme::mono(field_type.clone()));
                install.set_visibility(f.name.clone(), Visibility::Public);
                let mut arg_type = field_type;
                if f.default_value.is_some() {
                    arg_type = arg_type.nullable();
                }
                rec.add(f.name.clone(), Scheme::mono(arg_type));
            }
            env.add(
                t.name.clone(),
                Scheme::mono(Type::fun(
                    rec,
                    Type::non_null(Type::Module(install.clone())),
                )),
            );
            env.set_visibility(t.name.clone(), Visibility::Public);
        }
    }

    // Pass 4: link interface implementations.
    for t in &schema.types {
        if t.interfaces.is_empty() {
            continue;
        }
        let Some(impl_module) = env.named_type(&t.name) else {
            continue;
        };
        for iface in &t.interfaces {
            if let Some(iface_module) = env.named_type(&iface.name) {
                impl_module.add_interface(iface_module);
            }
        }
    }

    // Layer the query type over the lexical chain so its fields are
    // visible unqualified.
    if let Some(query) = &schema.query_type {
        if let Some(query_module) = env.named_type(&query.name) {
            if let Env::Composite(c) = env {
                return Ok(Env::composite(
                    c.primary.clone(),
                    Env::composite(Env::Module(query_module), c.lexical.clone()),
                ));
            }
        }
    }

    Ok(env.clone())
}
