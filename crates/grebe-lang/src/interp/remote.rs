use std::collections::HashMap;
use std::rc::Rc;

use super::builtins::value_to_json;
use super::env::ModuleHandle;
use super::value::{EnumValue, ListValue, Value};
use crate::env::{ModuleKind, ModuleRef};
use crate::errors::{Error, Result};
use crate::types::{FunType, Type};

/// One step of a remote selection chain: a field plus its encoded
/// arguments.
#[derive(Clone, Debug)]
pub struct SelectionStep {
    pub field: String,
    pub args: Vec<(String, serde_json::Value)>,
}

/// The pluggable transport boundary. Evaluating a schema-backed field
/// builds up a selection path and hands it here; the implementation
/// issues the request and returns the JSON-shaped result. From the
/// evaluator's point of view this is a synchronous call that may fail.
pub trait RemoteClient {
    fn invoke(
        &self,
        path: &[SelectionStep],
        ret: &Type,
    ) -> std::result::Result<serde_json::Value, String>;
}

/// A schema-backed object value: nothing has been fetched yet, only a
/// selection path accumulated.
#[derive(Clone)]
pub struct RemoteValue {
    pub type_module: ModuleRef,
    pub path: Vec<SelectionStep>,
    pub client: Rc<dyn RemoteClient>,
}

/// A schema-backed field, callable. Scalar-returning calls dispatch to
/// the client immediately; object-returning calls extend the path.
#[derive(Clone)]
pub struct RemoteFn {
    pub field: String,
    pub fn_type: Rc<FunType>,
    pub path: Vec<SelectionStep>,
    pub client: Rc<dyn RemoteClient>,
}

impl RemoteFn {
    pub fn is_auto_callable(&self) -> bool {
        self.fn_type
            .args
            .fields
            .iter()
            .all(|(_, scheme)| !scheme.ty.is_non_null())
    }

    pub fn param_names(&self) -> Vec<String> {
        self.fn_type.args.field_names()
    }
}

/// Field selection on a remote value resolves the field's function type
/// from the static schema and defers the fetch.
pub fn select(remote: &RemoteValue, field: &str) -> Result<Value> {
    let scheme = remote
        .type_module
        .scheme_of(field)
        .ok_or_else(|| {
            Error::eval(format!(
                "remote type {} has no field {field:?}",
                remote.type_module.name()
            ))
        })?;
    match &scheme.ty {
        Type::Fun(ft) => Ok(Value::RemoteFn(RemoteFn {
            field: field.to_string(),
            fn_type: Rc::new((**ft).clone()),
            path: remote.path.clone(),
            client: remote.client.clone(),
        })),
        other => Err(Error::eval(format!(
            "remote field {field:?} is not callable (type {other})"
        ))),
    }
}

pub fn call(remote_fn: &RemoteFn, args: &HashMap<String, Value>) -> Result<Value> {
    let mut encoded: Vec<(String, serde_json::Value)> = args
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), value_to_json(v)))
        .collect();
    encoded.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut path = remote_fn.path.clone();
    path.push(SelectionStep {
        field: remote_fn.field.clone(),
        args: encoded,
    });

    // Object-shaped results stay lazy; everything else round-trips
    // through the client now.
    if let Some(module) = object_module(&remote_fn.fn_type.ret) {
        return Ok(Value::Remote(RemoteValue {
            type_module: module,
            path,
            client: remote_fn.client.clone(),
        }));
    }

    let json = remote_fn
        .client
        .invoke(&path, &remote_fn.fn_type.ret)
        .map_err(Error::eval)?;
    decode_value(&json, &remote_fn.fn_type.ret)
}

fn object_module(ty: &Type) -> Option<ModuleRef> {
    match ty {
        Type::NonNull(inner) => object_module(inner),
        Type::Module(module) => match module.kind() {
            ModuleKind::Object | ModuleKind::Interface => {
                if is_builtin_scalar(&module.name()) {
                    None
                } else {
                    Some(module.clone())
                }
            }
            _ => None,
        },
        _ => None,
    }
}

fn is_builtin_scalar(name: &str) -> bool {
    matches!(name, "String" | "Int" | "Float" | "Boolean" | "ID")
}

/// Decode a JSON result into a value, directed by the statically-known
/// return type.
pub fn decode_value(json: &serde_json::Value, ty: &Type) -> Result<Value> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    match ty {
        Type::NonNull(inner) => decode_value(json, inner),
        Type::List(elem) => {
            let arr = json
                .as_array()
                .ok_or_else(|| Error::eval(format!("expected a JSON array for {ty}")))?;
            let elements = arr
                .iter()
                .map(|item| decode_value(item, elem))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::List(ListValue {
                elements,
                elem_type: Some((**elem).clone()),
            }))
        }
        Type::Module(module) => decode_module(json, module),
        _ => Ok(decode_untyped(json)),
    }
}

fn decode_module(json: &serde_json::Value, module: &ModuleRef) -> Result<Value> {
    match (module.kind(), module.name().as_str()) {
        (ModuleKind::Scalar, "Int") => json
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| Error::eval("expected a JSON number for Int")),
        (ModuleKind::Scalar, "String") => json
            .as_str()
            .map(|s| Value::Str(s.to_string()))
            .ok_or_else(|| Error::eval("expected a JSON string for String")),
        (ModuleKind::Scalar, "Boolean") => json
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| Error::eval("expected a JSON boolean for Boolean")),
        (ModuleKind::Scalar, _) => json
            .as_str()
            .map(|s| Value::Str(s.to_string()))
            .ok_or_else(|| Error::eval("expected a JSON string for a custom scalar")),
        (ModuleKind::Enum, _) => json
            .as_str()
            .map(|s| {
                Value::Enum(EnumValue {
                    name: s.to_string(),
                    enum_type: module.clone(),
                })
            })
            .ok_or_else(|| Error::eval("expected a JSON string for an enum value")),
        _ => {
            let obj = json.as_object().ok_or_else(|| {
                Error::eval(format!("expected a JSON object for {}", module.name()))
            })?;
            let handle = ModuleHandle::new(Some(module.clone()));
            for (key, value) in obj {
                let field_ty = module.scheme_of(key).map(|scheme| match scheme.ty {
                    Type::Fun(ft) => ft.ret.clone(),
                    other => other,
                });
                let decoded = match field_ty {
                    Some(ty) => decode_value(value, &ty)?,
                    None => decode_untyped(value),
                };
                handle.set_with_visibility(key.clone(), decoded, crate::ast::Visibility::Public);
            }
            Ok(Value::Module(handle))
        }
    }
}

fn decode_untyped(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n.as_i64().map(Value::Int).unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => Value::List(ListValue {
            elements: items.iter().map(decode_untyped).collect(),
            elem_type: None,
        }),
        serde_json::Value::Object(obj) => {
            let handle = ModuleHandle::new(None);
            for (key, value) in obj {
                handle.set_with_visibility(
                    key.clone(),
                    decode_untyped(value),
                    crate::ast::Visibility::Public,
                );
            }
            Value::Module(handle)
        }
    }
}
