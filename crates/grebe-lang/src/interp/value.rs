use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::builtins::BuiltinMethod;
use super::env::{EvalEnv, ModuleHandle};
use super::remote::{RemoteFn, RemoteValue};
use crate::ast::{Block, Node, SlotDecl};
use crate::env::ModuleRef;
use crate::types::{FunType, Type};

/// A runtime value. Values are persistent: field mutation inside a method
/// operates on a layered clone of the receiver, never on the caller's
/// value.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Str(String),
    Bool(bool),
    Null,
    List(ListValue),
    Module(ModuleHandle),
    Fun(FunctionValue),
    Bound(Box<BoundMethod>),
    BoundBuiltin(Box<BoundBuiltin>),
    Constructor(Rc<ConstructorFunction>),
    Builtin(BuiltinFunction),
    Enum(EnumValue),
    InputCtor(InputCtor),
    Remote(RemoteValue),
    RemoteFn(RemoteFn),
}

#[derive(Clone)]
pub struct ListValue {
    pub elements: Vec<Value>,
    pub elem_type: Option<Type>,
}

/// A closure pairing a function type, its parameter list with default
/// expressions, and the captured environment.
#[derive(Clone)]
pub struct FunctionValue {
    pub args: Vec<String>,
    pub defaults: Rc<HashMap<String, Node>>,
    pub body: Rc<Block>,
    pub closure: EvalEnv,
    pub fn_type: Rc<FunType>,
    /// Declared inside a class body; inherits the caller's dynamic scope
    /// when invoked unqualified from a sibling method.
    pub is_dynamic: bool,
}

impl FunctionValue {
    pub fn is_auto_callable(&self) -> bool {
        self.args.iter().all(|name| {
            if self.defaults.contains_key(name) {
                return true;
            }
            match self.fn_type.args.scheme_of(name) {
                Some(scheme) => !scheme.ty.is_non_null(),
                None => true,
            }
        })
    }
}

/// A method paired with its receiver. Calling it forks the receiver so
/// the bound instance, not the caller's value, absorbs any mutation.
#[derive(Clone)]
pub struct BoundMethod {
    pub method: FunctionValue,
    pub receiver: ModuleHandle,
}

/// A builtin method paired with a primitive receiver.
#[derive(Clone)]
pub struct BoundBuiltin {
    pub method: BuiltinMethod,
    pub receiver: Value,
}

/// A class constructor. Carries the class's unevaluated body forms so
/// they can be re-run per instantiation.
pub struct ConstructorFunction {
    pub class_name: String,
    pub parameters: Vec<SlotDecl>,
    pub class_type: ModuleRef,
    pub fn_type: Rc<FunType>,
    pub body_forms: Rc<Vec<Node>>,
    pub closure: EvalEnv,
}

impl ConstructorFunction {
    pub fn is_auto_callable(&self) -> bool {
        self.parameters.iter().all(|p| p.value.is_some())
    }
}

#[derive(Clone)]
pub struct BuiltinFunction {
    pub name: &'static str,
    pub params: Vec<&'static str>,
    /// True when every parameter is optional.
    pub all_optional: bool,
}

impl BuiltinFunction {
    pub fn is_auto_callable(&self) -> bool {
        self.params.is_empty() || self.all_optional
    }
}

#[derive(Clone)]
pub struct EnumValue {
    pub name: String,
    pub enum_type: ModuleRef,
}

/// Constructs a module value from named arguments, used for schema input
/// object types.
#[derive(Clone)]
pub struct InputCtor {
    pub type_name: String,
    pub type_env: ModuleRef,
    pub fn_type: Rc<FunType>,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Str(_) => "String",
            Value::Bool(_) => "Boolean",
            Value::Null => "null",
            Value::List(_) => "list",
            Value::Module(_) => "module",
            Value::Fun(_) => "function",
            Value::Bound(_) => "bound method",
            Value::BoundBuiltin(_) => "bound builtin",
            Value::Constructor(_) => "constructor",
            Value::Builtin(_) => "builtin",
            Value::Enum(_) => "enum value",
            Value::InputCtor(_) => "input constructor",
            Value::Remote(_) => "remote value",
            Value::RemoteFn(_) => "remote function",
        }
    }

    /// True when a value referenced as a plain name should be implicitly
    /// invoked: a function-like value with no required arguments.
    pub fn is_auto_callable(&self) -> bool {
        match self {
            Value::Fun(f) => f.is_auto_callable(),
            Value::Bound(b) => b.method.is_auto_callable(),
            Value::Constructor(c) => c.is_auto_callable(),
            Value::Builtin(b) => b.is_auto_callable(),
            Value::BoundBuiltin(b) => b.method.is_auto_callable(),
            Value::RemoteFn(r) => r.is_auto_callable(),
            _ => false,
        }
    }

    /// Display without quotes for strings (used by print and concat).
    pub fn display_str(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => format!("{other}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "null"),
            Value::List(list) => {
                write!(f, "[")?;
                for (i, item) in list.elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Module(handle) => match handle.module() {
                Some(module) if !module.name().is_empty() => {
                    write!(f, "<{}>", module.name())
                }
                _ => write!(f, "<module>"),
            },
            Value::Fun(fun) => write!(f, "<fn({})>", fun.args.join(", ")),
            Value::Bound(b) => write!(f, "<bound fn({})>", b.method.args.join(", ")),
            Value::BoundBuiltin(b) => write!(f, "<builtin {}>", b.method.name()),
            Value::Constructor(c) => write!(f, "<constructor {}>", c.class_name),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
            Value::Enum(e) => write!(f, "{}", e.name),
            Value::InputCtor(c) => write!(f, "<input {}>", c.type_name),
            Value::Remote(r) => write!(f, "<remote {}>", r.type_module.name()),
            Value::RemoteFn(r) => write!(f, "<remote fn {}>", r.field),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::List(a), Value::List(b)) => a.elements == b.elements,
            (Value::Enum(a), Value::Enum(b)) => {
                a.name == b.name && a.enum_type.ptr_eq(&b.enum_type)
            }
            (Value::Module(a), Value::Module(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}
