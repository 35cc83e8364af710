pub mod builtins;
mod env;
pub mod remote;
mod value;

pub use env::{EvalEnv, ModuleHandle};
pub use value::{
    BoundBuiltin, BoundMethod, BuiltinFunction, ConstructorFunction, EnumValue, FunctionValue,
    InputCtor, ListValue, Value,
};

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::{AssignOp, BinOp, Block, CallArg, Node, NodeKind, SlotDecl, Visibility};
use crate::check::phases::{classify_forms, order_by_dependencies};
use crate::check::Checker;
use crate::env::Env;
use crate::errors::{Error, ErrorKind, Result};
use crate::schema::{Schema, TypeDefKind};
use crate::types::Type;
use crate::Ctx;
use remote::RemoteClient;

/// A root evaluation environment with the builtin functions installed.
pub fn new_eval_env(_type_env: &Env) -> EvalEnv {
    let root = ModuleHandle::new(None);
    let env = EvalEnv::module(root);
    builtins::install(&env);
    env
}

/// A root evaluation environment populated with schema-backed values:
/// query fields become remote functions, enums become modules of enum
/// values, input objects become constructors.
pub fn eval_env_with_schema(
    type_env: &Env,
    schema: &Schema,
    client: Rc<dyn RemoteClient>,
) -> EvalEnv {
    let env = new_eval_env(type_env);

    for t in &schema.types {
        let Some(module) = type_env.named_type(&t.name) else {
            continue;
        };
        match t.kind {
            TypeDefKind::Enum => {
                let handle = ModuleHandle::new(Some(module.clone()));
                let mut values = Vec::new();
                for ev in &t.enum_values {
                    let value = Value::Enum(EnumValue {
                        name: ev.name.clone(),
                        enum_type: module.clone(),
                    });
                    handle.set_with_visibility(ev.name.clone(), value.clone(), Visibility::Public);
                    values.push(value);
                }
                handle.set_with_visibility(
                    "values",
                    Value::List(ListValue {
                        elements: values,
                        elem_type: Some(Type::non_null(Type::Module(module.clone()))),
                    }),
                    Visibility::Public,
                );
                env.set_with_visibility(t.name.clone(), Value::Module(handle), Visibility::Public);
            }
            TypeDefKind::InputObject => {
                if let Some(scheme) = type_env.scheme_of(&t.name) {
                    if let Type::Fun(ft) = &scheme.ty {
                        env.set_with_visibility(
                            t.name.clone(),
                            Value::InputCtor(InputCtor {
                                type_name: t.name.clone(),
                                type_env: module.clone(),
                                fn_type: Rc::new((**ft).clone()),
                            }),
                            Visibility::Public,
                        );
                    }
                }
            }
            TypeDefKind::Scalar | TypeDefKind::Interface | TypeDefKind::Union => {
                let handle = ModuleHandle::new(Some(module.clone()));
                env.set_with_visibility(t.name.clone(), Value::Module(handle), Visibility::Public);
            }
            TypeDefKind::Object => {}
        }
    }

    if let Some(query) = &schema.query_type {
        if let Some(module) = type_env.named_type(&query.name) {
            for (name, scheme) in module.bindings(Visibility::Public) {
                if let Type::Fun(ft) = &scheme.ty {
                    env.set_with_visibility(
                        name.clone(),
                        Value::RemoteFn(remote::RemoteFn {
                            field: name.clone(),
                            fn_type: Rc::new((**ft).clone()),
                            path: Vec::new(),
                            client: client.clone(),
                        }),
                        Visibility::Public,
                    );
                }
            }
        }
    }

    env
}

/// The tree-walking evaluator. Mirrors the inference phase runner over
/// runtime environments and consumes the checker's side tables.
pub struct Interp<'a> {
    checker: &'a Checker,
    ctx: Ctx,
}

impl<'a> Interp<'a> {
    pub fn new(checker: &'a Checker, ctx: Ctx) -> Self {
        Self { checker, ctx }
    }

    pub fn eval_program(&self, env: &EvalEnv, forms: &[Node]) -> Result<Value> {
        self.eval_forms_phased(env, forms)
    }

    /// Phased evaluation in the same order as inference: directives,
    /// constants, types, functions, variables in dependency order, then
    /// non-declarations in source order.
    fn eval_forms_phased(&self, env: &EvalEnv, forms: &[Node]) -> Result<Value> {
        let classified = classify_forms(forms);
        let mut result = Value::Null;

        for form in &classified.directives {
            self.eval_node(env, form)?;
        }
        for form in &classified.constants {
            self.eval_node(env, form)?;
        }
        for form in &classified.types {
            self.eval_node(env, form)?;
        }
        for form in &classified.functions {
            self.eval_node(env, form)?;
        }
        if !classified.variables.is_empty() {
            let ordered = order_by_dependencies(&classified.variables)?;
            for form in ordered {
                self.eval_node(env, form)?;
            }
        }
        for form in &classified.non_declarations {
            result = self.eval_node(env, form)?;
        }

        Ok(result)
    }

    fn eval_block(&self, env: &EvalEnv, block: &Block) -> Result<Value> {
        if block.forms.is_empty() {
            return Ok(Value::Null);
        }
        let scope = if block.inline {
            env.clone()
        } else {
            env.clone_layer()
        };
        self.eval_forms_phased(&scope, &block.forms)
    }

    fn eval_node(&self, env: &EvalEnv, node: &Node) -> Result<Value> {
        self.ctx.check()?;
        self.eval_kind(env, node).map_err(|e| e.with_span(node.span))
    }

    fn eval_kind(&self, env: &EvalEnv, node: &Node) -> Result<Value> {
        match &node.kind {
            NodeKind::Int(n) => Ok(Value::Int(*n)),
            NodeKind::Str(s) => Ok(Value::Str(s.clone())),
            NodeKind::Bool(b) => Ok(Value::Bool(*b)),
            NodeKind::Null => Ok(Value::Null),
            NodeKind::ListLit(items) => {
                let elements = items
                    .iter()
                    .map(|item| self.eval_node(env, item))
                    .collect::<Result<Vec<_>>>()?;
                let elem_type = match self.checker.resolved_type_of(node.id) {
                    Some(Type::NonNull(inner)) => match *inner {
                        Type::List(elem) => Some(*elem),
                        _ => None,
                    },
                    _ => None,
                };
                Ok(Value::List(ListValue {
                    elements,
                    elem_type,
                }))
            }
            NodeKind::ObjectLit(slots) => {
                let module = self.checker.module_of.get(&node.id).cloned();
                let handle = ModuleHandle::new(module);
                let scope = EvalEnv::composite(EvalEnv::module(handle.clone()), env.clone());
                for slot in slots {
                    self.eval_slot(&scope, slot, None)?;
                }
                Ok(Value::Module(handle))
            }
            NodeKind::SelfRef => env
                .get_dynamic_scope()
                .ok_or_else(|| Error::eval("self referenced outside of a method")),
            NodeKind::Symbol { name, auto_call } => {
                let value = env
                    .get(name)
                    .ok_or_else(|| Error::new(ErrorKind::UndeclaredName(name.clone())))?;
                if *auto_call && value.is_auto_callable() {
                    return self.call_value(env, value, HashMap::new());
                }
                Ok(value)
            }
            NodeKind::Select {
                receiver,
                field,
                auto_call,
            } => {
                let receiver_val = self.eval_node(env, receiver)?;
                let value = match &receiver_val {
                    // Null propagation through nullable selects.
                    Value::Null => return Ok(Value::Null),
                    Value::Module(handle) => match handle.get(field) {
                        Some(Value::Fun(method)) => Value::Bound(Box::new(BoundMethod {
                            method,
                            receiver: handle.clone(),
                        })),
                        Some(value) => value,
                        None => {
                            return Err(Error::eval(format!(
                                "module {receiver_val} has no field {field:?}"
                            )))
                        }
                    },
                    Value::Remote(rv) => remote::select(rv, field)?,
                    other => match builtins::method_for(other, field) {
                        Some(method) => Value::BoundBuiltin(Box::new(BoundBuiltin {
                            method,
                            receiver: other.clone(),
                        })),
                        None => {
                            return Err(Error::eval(format!(
                                "cannot select {field:?} from {} value",
                                other.kind_name()
                            )))
                        }
                    },
                };
                if *auto_call && value.is_auto_callable() {
                    return self.call_value(env, value, HashMap::new());
                }
                Ok(value)
            }
            NodeKind::Call { fun, args } => self.eval_call(env, node, fun, args),
            NodeKind::Binary { op, left, right } => self.eval_binary(env, *op, left, right),
            NodeKind::Default { left, right } => {
                let left_val = self.eval_node(env, left)?;
                if left_val.is_null() {
                    self.eval_node(env, right)
                } else {
                    Ok(left_val)
                }
            }
            NodeKind::Slot(slot) => self.eval_slot(env, slot, self.checker.resolved_type_of(node.id)),
            NodeKind::Fun(fun) => {
                let value = self.make_function(env, node, &fun.args, &fun.body)?;
                env.set_with_visibility(fun.name.clone(), value.clone(), fun.visibility);
                Ok(value)
            }
            NodeKind::Lambda(lit) => self.make_function(env, node, &lit.args, &lit.body),
            NodeKind::Class(class) => {
                let class_type = self.checker.class_of.get(&node.id).cloned().ok_or_else(|| {
                    Error::eval(format!("class {:?} has not been inferred", class.name))
                })?;
                let fn_type = self
                    .checker
                    .ctor_type_of
                    .get(&node.id)
                    .cloned()
                    .ok_or_else(|| {
                        Error::eval(format!("class {:?} has no constructor type", class.name))
                    })?;
                if let Some(doc) = &class.doc {
                    class_type.set_module_doc(doc.clone());
                }
                let constructor = Value::Constructor(Rc::new(ConstructorFunction {
                    class_name: class.name.clone(),
                    parameters: crate::check::constructor_parameters(&class.body),
                    class_type,
                    fn_type: Rc::new(fn_type),
                    body_forms: Rc::new(class.body.forms.clone()),
                    closure: env.clone(),
                }));
                env.set_with_visibility(class.name.clone(), constructor.clone(), class.visibility);
                Ok(constructor)
            }
            NodeKind::Enum(en) => {
                let module = self.checker.enum_of.get(&node.id).cloned().ok_or_else(|| {
                    Error::eval(format!("enum {:?} has not been inferred", en.name))
                })?;
                let handle = ModuleHandle::new(Some(module.clone()));
                let mut values = Vec::new();
                for name in &en.values {
                    let value = Value::Enum(EnumValue {
                        name: name.clone(),
                        enum_type: module.clone(),
                    });
                    handle.set_with_visibility(name.clone(), value.clone(), Visibility::Public);
                    values.push(value);
                }
                handle.set_with_visibility(
                    "values",
                    Value::List(ListValue {
                        elements: values,
                        elem_type: Some(Type::non_null(Type::Module(module))),
                    }),
                    Visibility::Public,
                );
                let value = Value::Module(handle);
                env.set_with_visibility(en.name.clone(), value.clone(), en.visibility);
                Ok(value)
            }
            // Directive declarations live in the type environment; the
            // evaluator only exposes them for external collaborators.
            NodeKind::Directive(_) => Ok(Value::Null),
            NodeKind::Assign { target, op, value } => self.eval_assign(env, target, *op, value),
            NodeKind::Assert(expr) => {
                let value = self.eval_node(env, expr)?;
                if is_truthy(&value) {
                    Ok(Value::Bool(true))
                } else {
                    Err(Error::at(
                        ErrorKind::Assertion(expr.describe()),
                        node.span,
                    ))
                }
            }
            NodeKind::Block(block) => self.eval_block(env, block),
        }
    }

    fn make_function(
        &self,
        env: &EvalEnv,
        node: &Node,
        args: &[SlotDecl],
        body: &Block,
    ) -> Result<Value> {
        let fn_type = self
            .checker
            .fn_type_of
            .get(&node.id)
            .cloned()
            .ok_or_else(|| Error::eval("function type has not been inferred"))?;
        let mut defaults = HashMap::new();
        let mut names = Vec::with_capacity(args.len());
        for arg in args {
            names.push(arg.name.clone());
            if let Some(value) = &arg.value {
                defaults.insert(arg.name.clone(), (**value).clone());
            }
        }
        Ok(Value::Fun(FunctionValue {
            args: names,
            defaults: Rc::new(defaults),
            body: Rc::new(body.clone()),
            closure: env.clone(),
            fn_type: Rc::new(fn_type),
            is_dynamic: self.checker.dynamic_fns.contains(&node.id),
        }))
    }

    /// Evaluate a slot declaration. Names already bound locally (e.g. by
    /// a constructor) are left untouched; value-less slots of non-null
    /// type are an error, otherwise they bind null as a placeholder.
    fn eval_slot(&self, env: &EvalEnv, slot: &SlotDecl, inferred: Option<Type>) -> Result<Value> {
        if let Some(existing) = env.get_local(&slot.name) {
            return Ok(existing);
        }

        let Some(value_node) = &slot.value else {
            let declared = inferred.or_else(|| {
                env.type_module()
                    .and_then(|m| m.local_scheme_of(&slot.name))
                    .map(|scheme| scheme.ty)
            });
            if let Some(ty) = declared {
                if ty.is_non_null() {
                    return Err(Error::at(
                        ErrorKind::RequiredSlot {
                            name: slot.name.clone(),
                            ty,
                        },
                        slot.span,
                    ));
                }
            }
            env.set_with_visibility(slot.name.clone(), Value::Null, slot.visibility);
            return Ok(Value::Null);
        };

        let value = self.eval_node(env, value_node)?;
        env.set_with_visibility(slot.name.clone(), value.clone(), slot.visibility);
        Ok(value)
    }

    fn eval_call(&self, env: &EvalEnv, node: &Node, fun: &Node, args: &[CallArg]) -> Result<Value> {
        let callee = self.eval_node(env, fun)?;

        if callee.is_null() {
            if self.checker.nullable_receiver.contains(&fun.id) {
                // Null propagation through a nullable receiver chain.
                return Ok(Value::Null);
            }
            return Err(Error::at(ErrorKind::Eval("cannot call null".into()), fun.span));
        }

        let param_names = param_names(&callee);
        let mut values: HashMap<String, Value> = HashMap::new();
        let mut positional = 0usize;
        let mut seen_named = false;
        for arg in args {
            let value = self.eval_node(env, &arg.value)?;
            let key = match &arg.name {
                Some(name) => {
                    seen_named = true;
                    name.clone()
                }
                None => {
                    if seen_named {
                        return Err(Error::at(
                            ErrorKind::Eval(
                                "positional arguments must come before named arguments".into(),
                            ),
                            arg.value.span,
                        ));
                    }
                    let Some(name) = param_names.get(positional) else {
                        return Err(Error::at(
                            ErrorKind::Eval(format!(
                                "too many positional arguments: expected at most {}",
                                param_names.len()
                            )),
                            arg.value.span,
                        ));
                    };
                    positional += 1;
                    name.clone()
                }
            };
            if values.insert(key.clone(), value).is_some() {
                return Err(Error::at(
                    ErrorKind::Eval(format!("argument {key:?} specified multiple times")),
                    arg.value.span,
                ));
            }
        }

        self.call_value(env, callee, values)
            .map_err(|e| e.with_span(node.span))
    }

    pub fn call_value(
        &self,
        env: &EvalEnv,
        callee: Value,
        args: HashMap<String, Value>,
    ) -> Result<Value> {
        match callee {
            Value::Fun(fun) => {
                let fn_env = fun.closure.clone_layer();
                if fun.is_dynamic {
                    // A naked sibling call inherits the caller's `self`.
                    if let Some(scope) = env.get_dynamic_scope() {
                        fn_env.set_dynamic_scope(scope);
                    }
                }
                self.bind_args(&fn_env, &fun, &args)?;
                self.eval_block(&fn_env, &fun.body)
            }
            Value::Bound(bound) => {
                let recv = bound.receiver.fork();
                let fn_env = EvalEnv::composite(
                    EvalEnv::module(recv.clone_layer()),
                    bound.method.closure.clone(),
                );
                fn_env.set_dynamic_scope(Value::Module(recv));
                self.bind_args(&fn_env, &bound.method, &args)?;
                self.eval_block(&fn_env, &bound.method.body)
            }
            Value::BoundBuiltin(bound) => {
                builtins::call_method(bound.method, &bound.receiver, &args)
            }
            Value::Builtin(builtin) => builtins::call(builtin.name, &args),
            Value::Constructor(ctor) => self.call_constructor(&ctor, &args),
            Value::InputCtor(ctor) => {
                let handle = ModuleHandle::new(Some(ctor.type_env.clone()));
                for (name, value) in args {
                    handle.set_with_visibility(name, value, Visibility::Public);
                }
                Ok(Value::Module(handle))
            }
            Value::RemoteFn(remote_fn) => remote::call(&remote_fn, &args),
            other => Err(Error::eval(format!(
                "{} value is not callable",
                other.kind_name()
            ))),
        }
    }

    /// Bind call arguments into a function environment. Missing or null
    /// arguments take their default, evaluated in the function env so
    /// earlier parameters are visible to later default expressions.
    fn bind_args(
        &self,
        fn_env: &EvalEnv,
        fun: &FunctionValue,
        args: &HashMap<String, Value>,
    ) -> Result<Value> {
        for name in &fun.args {
            match args.get(name) {
                Some(value) if !value.is_null() => fn_env.set(name.clone(), value.clone()),
                _ => match fun.defaults.get(name) {
                    Some(default) => {
                        let value = self.eval_node(fn_env, default)?;
                        fn_env.set(name.clone(), value);
                    }
                    None => fn_env.set(name.clone(), Value::Null),
                },
            }
        }
        Ok(Value::Null)
    }

    /// Instantiate a class: allocate a fresh instance, bind constructor
    /// arguments onto it, then run the class body through the phase
    /// runner against a composite stacking the instance over the defining
    /// lexical scope.
    fn call_constructor(
        &self,
        ctor: &ConstructorFunction,
        args: &HashMap<String, Value>,
    ) -> Result<Value> {
        let instance = ModuleHandle::new(Some(ctor.class_type.clone()));
        let instance_env = EvalEnv::composite(
            EvalEnv::module(instance.clone()),
            ctor.closure.clone(),
        );
        instance_env.set_dynamic_scope(Value::Module(instance.clone()));

        for param in &ctor.parameters {
            if let Some(value) = args.get(&param.name) {
                if !value.is_null() {
                    instance.set_with_visibility(
                        param.name.clone(),
                        value.clone(),
                        param.visibility,
                    );
                }
            }
        }

        self.eval_forms_phased(&instance_env, &ctor.body_forms)
            .map_err(|e| Error {
                kind: ErrorKind::Eval(format!(
                    "evaluating class body for {}: {e}",
                    ctor.class_name
                )),
                span: e.span,
            })?;

        Ok(Value::Module(instance))
    }

    fn eval_binary(&self, env: &EvalEnv, op: BinOp, left: &Node, right: &Node) -> Result<Value> {
        // Logical operators short-circuit.
        if matches!(op, BinOp::And | BinOp::Or) {
            let left_val = self.eval_node(env, left)?;
            let lb = match left_val {
                Value::Bool(b) => b,
                other => {
                    return Err(Error::new(ErrorKind::UnsupportedOperation {
                        op: op.symbol().to_string(),
                        left: other.kind_name().to_string(),
                        right: "Boolean".to_string(),
                    }));
                }
            };
            if (op == BinOp::And && !lb) || (op == BinOp::Or && lb) {
                return Ok(Value::Bool(lb));
            }
            let right_val = self.eval_node(env, right)?;
            return match right_val {
                Value::Bool(b) => Ok(Value::Bool(b)),
                other => Err(unsupported(op, &Value::Bool(lb), &other)),
            };
        }

        let left_val = self.eval_node(env, left)?;
        let right_val = self.eval_node(env, right)?;
        match op {
            BinOp::Add => add_values(&left_val, &right_val),
            BinOp::Sub | BinOp::Mul | BinOp::Div => match (&left_val, &right_val) {
                (Value::Int(a), Value::Int(b)) => match op {
                    BinOp::Sub => Ok(Value::Int(a - b)),
                    BinOp::Mul => Ok(Value::Int(a * b)),
                    BinOp::Div => {
                        if *b == 0 {
                            Err(Error::eval("division by zero"))
                        } else {
                            Ok(Value::Int(a / b))
                        }
                    }
                    _ => unreachable!(),
                },
                _ => Err(unsupported(op, &left_val, &right_val)),
            },
            BinOp::Eq => Ok(Value::Bool(left_val == right_val)),
            BinOp::Ne => Ok(Value::Bool(left_val != right_val)),
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => match (&left_val, &right_val) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Bool(match op {
                    BinOp::Lt => a < b,
                    BinOp::Gt => a > b,
                    BinOp::Le => a <= b,
                    BinOp::Ge => a >= b,
                    _ => unreachable!(),
                })),
                _ => Err(unsupported(op, &left_val, &right_val)),
            },
            BinOp::And | BinOp::Or => unreachable!(),
        }
    }

    /// Assignment. Field targets operate copy-on-write: the root object
    /// and every object along the path get a fresh layer, so values the
    /// caller already holds are never mutated.
    fn eval_assign(
        &self,
        env: &EvalEnv,
        target: &Node,
        op: AssignOp,
        value_node: &Node,
    ) -> Result<Value> {
        let value = self.eval_node(env, value_node)?;

        match &target.kind {
            NodeKind::Symbol { name, .. } => {
                let current = env
                    .get(name)
                    .ok_or_else(|| Error::new(ErrorKind::UndeclaredName(name.clone())))?;
                let next = match op {
                    AssignOp::Set => value,
                    AssignOp::Add => add_values(&current, &value)?,
                };
                env.reassign(name, next.clone());
                Ok(next)
            }
            NodeKind::Select { .. } => {
                let (root, path) = assignment_path(target)?;
                match root {
                    AssignRoot::SelfRef => self.assign_through_env(env, &path, op, value),
                    AssignRoot::Symbol(name) => {
                        let root_val = env
                            .get(&name)
                            .ok_or_else(|| Error::new(ErrorKind::UndeclaredName(name.clone())))?;
                        let Value::Module(root_handle) = root_val else {
                            return Err(Error::eval(format!(
                                "cannot assign through {} value",
                                root_val.kind_name()
                            )));
                        };
                        let new_root = root_handle.clone_layer();
                        self.assign_along_path(&new_root, &path, op, value)?;
                        env.reassign(&name, Value::Module(new_root.clone()));
                        Ok(Value::Module(new_root))
                    }
                }
            }
            _ => Err(Error::eval("unsupported assignment target")),
        }
    }

    /// `self`-rooted assignment: the composite environment *is* the
    /// receiver, so a one-segment path is an ordinary reassignment and a
    /// longer path clones from the first field on.
    fn assign_through_env(
        &self,
        env: &EvalEnv,
        path: &[String],
        op: AssignOp,
        value: Value,
    ) -> Result<Value> {
        if path.len() == 1 {
            let name = &path[0];
            let current = env
                .get(name)
                .ok_or_else(|| Error::new(ErrorKind::UndeclaredName(name.clone())))?;
            let next = match op {
                AssignOp::Set => value,
                AssignOp::Add => add_values(&current, &value)?,
            };
            env.reassign(name, next.clone());
            return Ok(next);
        }

        let first = &path[0];
        let first_val = env
            .get(first)
            .ok_or_else(|| Error::new(ErrorKind::UndeclaredName(first.clone())))?;
        let Value::Module(handle) = first_val else {
            return Err(Error::eval(format!(
                "cannot assign through {} value",
                first_val.kind_name()
            )));
        };
        let cloned = handle.clone_layer();
        self.assign_along_path(&cloned, &path[1..], op, value)?;
        env.reassign(first, Value::Module(cloned.clone()));
        Ok(Value::Module(cloned))
    }

    /// Clone each object along the path, then set the final field on the
    /// innermost clone.
    fn assign_along_path(
        &self,
        root: &ModuleHandle,
        path: &[String],
        op: AssignOp,
        value: Value,
    ) -> Result<()> {
        let mut current = root.clone();
        for field in &path[..path.len() - 1] {
            let next = current
                .get(field)
                .ok_or_else(|| Error::new(ErrorKind::UndeclaredName(field.clone())))?;
            let Value::Module(handle) = next else {
                return Err(Error::eval(format!(
                    "cannot assign through {} value",
                    next.kind_name()
                )));
            };
            let cloned = handle.clone_layer();
            current.set(field.clone(), Value::Module(cloned.clone()));
            current = cloned;
        }

        let last = &path[path.len() - 1];
        let next = match op {
            AssignOp::Set => value,
            AssignOp::Add => {
                let current_val = current
                    .get(last)
                    .ok_or_else(|| Error::new(ErrorKind::UndeclaredName(last.clone())))?;
                add_values(&current_val, &value)?
            }
        };
        current.set(last.clone(), next);
        Ok(())
    }
}

enum AssignRoot {
    SelfRef,
    Symbol(String),
}

/// Decompose a select chain into its root and the field path.
fn assignment_path(target: &Node) -> Result<(AssignRoot, Vec<String>)> {
    let mut path = Vec::new();
    let mut current = target;
    loop {
        match &current.kind {
            NodeKind::Select { receiver, field, .. } => {
                path.insert(0, field.clone());
                current = receiver;
            }
            NodeKind::SelfRef => return Ok((AssignRoot::SelfRef, path)),
            NodeKind::Symbol { name, .. } => {
                return Ok((AssignRoot::Symbol(name.clone()), path))
            }
            _ => {
                return Err(Error::at(
                    ErrorKind::Eval("assignment targets must start with a name or self".into()),
                    current.span,
                ))
            }
        }
    }
}

fn param_names(callee: &Value) -> Vec<String> {
    match callee {
        Value::Fun(f) => f.args.clone(),
        Value::Bound(b) => b.method.args.clone(),
        Value::BoundBuiltin(b) => b.method.param_names(),
        Value::Constructor(c) => c.parameters.iter().map(|p| p.name.clone()).collect(),
        Value::Builtin(b) => b.params.iter().map(|s| s.to_string()).collect(),
        Value::InputCtor(c) => c.fn_type.args.field_names(),
        Value::RemoteFn(r) => r.param_names(),
        _ => Vec::new(),
    }
}

fn add_values(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => {
            let mut elements = a.elements.clone();
            elements.extend(b.elements.iter().cloned());
            let elem_type = a.elem_type.clone().or_else(|| b.elem_type.clone());
            Ok(Value::List(ListValue {
                elements,
                elem_type,
            }))
        }
        _ => Err(unsupported(BinOp::Add, left, right)),
    }
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> Error {
    Error::new(ErrorKind::UnsupportedOperation {
        op: op.symbol().to_string(),
        left: left.kind_name().to_string(),
        right: right.kind_name().to_string(),
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Int(n) => *n != 0,
        Value::Str(s) => !s.is_empty(),
        Value::List(list) => !list.elements.is_empty(),
        _ => true,
    }
}
