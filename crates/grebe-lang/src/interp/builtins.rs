use std::collections::HashMap;

use super::env::EvalEnv;
use super::value::{BuiltinFunction, ListValue, Value};
use crate::ast::Visibility;
use crate::errors::{Error, Result};

/// Install the builtin function bindings into a root evaluation
/// environment. Their types were declared by the prelude.
pub fn install(env: &EvalEnv) {
    env.set_with_visibility(
        "print",
        Value::Builtin(BuiltinFunction {
            name: "print",
            params: vec!["value"],
            all_optional: false,
        }),
        Visibility::Public,
    );
    env.set_with_visibility(
        "json",
        Value::Builtin(BuiltinFunction {
            name: "json",
            params: vec!["value"],
            all_optional: false,
        }),
        Visibility::Public,
    );
}

pub fn call(name: &str, args: &HashMap<String, Value>) -> Result<Value> {
    match name {
        "print" => {
            let value = args.get("value").cloned().unwrap_or(Value::Null);
            let rendered = value.display_str();
            println!("{rendered}");
            Ok(Value::Str(rendered))
        }
        "json" => {
            let value = args.get("value").cloned().unwrap_or(Value::Null);
            let json = value_to_json(&value);
            Ok(Value::Str(
                serde_json::to_string(&json)
                    .map_err(|e| Error::eval(format!("json encoding failed: {e}")))?,
            ))
        }
        other => Err(Error::eval(format!("unknown builtin {other:?}"))),
    }
}

/// Methods on primitive values, dispatched by receiver kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinMethod {
    StrLength,
    StrSplit,
    ListLength,
}

impl BuiltinMethod {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinMethod::StrLength | BuiltinMethod::ListLength => "length",
            BuiltinMethod::StrSplit => "split",
        }
    }

    pub fn is_auto_callable(&self) -> bool {
        matches!(self, BuiltinMethod::StrLength | BuiltinMethod::ListLength)
    }

    pub fn param_names(&self) -> Vec<String> {
        match self {
            BuiltinMethod::StrSplit => vec!["separator".to_string()],
            _ => Vec::new(),
        }
    }
}

pub fn method_for(receiver: &Value, field: &str) -> Option<BuiltinMethod> {
    match (receiver, field) {
        (Value::Str(_), "length") => Some(BuiltinMethod::StrLength),
        (Value::Str(_), "split") => Some(BuiltinMethod::StrSplit),
        (Value::List(_), "length") => Some(BuiltinMethod::ListLength),
        _ => None,
    }
}

pub fn call_method(
    method: BuiltinMethod,
    receiver: &Value,
    args: &HashMap<String, Value>,
) -> Result<Value> {
    match (method, receiver) {
        (BuiltinMethod::StrLength, Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
        (BuiltinMethod::StrSplit, Value::Str(s)) => {
            let separator = match args.get("separator") {
                Some(Value::Str(sep)) => sep.clone(),
                _ => return Err(Error::eval("split requires a string separator")),
            };
            let parts: Vec<Value> = if separator.is_empty() {
                s.chars().map(|c| Value::Str(c.to_string())).collect()
            } else {
                s.split(&separator)
                    .map(|part| Value::Str(part.to_string()))
                    .collect()
            };
            Ok(Value::List(ListValue {
                elements: parts,
                elem_type: None,
            }))
        }
        (BuiltinMethod::ListLength, Value::List(list)) => {
            Ok(Value::Int(list.elements.len() as i64))
        }
        _ => Err(Error::eval(format!(
            "builtin method {:?} not supported on {}",
            method.name(),
            receiver.kind_name()
        ))),
    }
}

/// Encode a value as JSON. Module values include private fields so state
/// round-trips; function-like values are skipped.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Int(n) => serde_json::Value::from(*n),
        Value::Str(s) => serde_json::Value::from(s.clone()),
        Value::Bool(b) => serde_json::Value::from(*b),
        Value::Null => serde_json::Value::Null,
        Value::Enum(e) => serde_json::Value::from(e.name.clone()),
        Value::List(list) => {
            serde_json::Value::Array(list.elements.iter().map(value_to_json).collect())
        }
        Value::Module(handle) => {
            let mut map = serde_json::Map::new();
            for (name, field) in handle.bindings(Visibility::Private) {
                if matches!(
                    field,
                    Value::Fun(_)
                        | Value::Bound(_)
                        | Value::BoundBuiltin(_)
                        | Value::Constructor(_)
                        | Value::Builtin(_)
                        | Value::InputCtor(_)
                        | Value::RemoteFn(_)
                ) {
                    continue;
                }
                map.insert(name, value_to_json(&field));
            }
            serde_json::Value::Object(map)
        }
        _ => serde_json::Value::Null,
    }
}
