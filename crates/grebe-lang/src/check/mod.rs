pub mod phases;

use std::collections::{HashMap, HashSet};

use crate::ast::{
    Block, CallArg, ClassDecl, DirectiveApplication, EnumDecl, FunDecl, FunLit, Node, NodeId,
    NodeKind, SlotDecl, TypeNode, Visibility,
};
use crate::env::{Env, ModuleKind, ModuleRef};
use crate::errors::{Error, ErrorKind, Result};
use crate::types::{
    assignable, generalize, instantiate, unify, FunType, RecordType, Scheme, Subst, Type,
};
use crate::Ctx;

use phases::{classify_forms, order_by_dependencies};

/// Type inference over a block of forms. Results land in side tables keyed
/// by node id so the evaluator can consume them without re-walking types.
#[derive(Debug)]
pub struct Checker {
    pub subst: Subst,
    /// Inferred type of each expression node.
    pub type_of: HashMap<NodeId, Type>,
    /// Class declarations to their nominal modules.
    pub class_of: HashMap<NodeId, ModuleRef>,
    /// Class declarations to their constructor function types.
    pub ctor_type_of: HashMap<NodeId, FunType>,
    /// Function declarations and literals to their inferred types.
    pub fn_type_of: HashMap<NodeId, FunType>,
    /// Enum declarations to their modules.
    pub enum_of: HashMap<NodeId, ModuleRef>,
    /// Object literals to their anonymous modules.
    pub module_of: HashMap<NodeId, ModuleRef>,
    /// Select/Call nodes whose receiver was nullable; results are tainted
    /// nullable and runtime null propagates through them.
    pub nullable_receiver: HashSet<NodeId>,
    /// Functions declared inside a class body; they inherit the caller's
    /// dynamic scope when invoked unqualified.
    pub dynamic_fns: HashSet<NodeId>,
    class_depth: usize,
    ctx: Ctx,
}

impl Checker {
    pub fn new(ctx: Ctx) -> Self {
        Self {
            subst: Subst::new(),
            type_of: HashMap::new(),
            class_of: HashMap::new(),
            ctor_type_of: HashMap::new(),
            fn_type_of: HashMap::new(),
            enum_of: HashMap::new(),
            module_of: HashMap::new(),
            nullable_receiver: HashSet::new(),
            dynamic_fns: HashSet::new(),
            class_depth: 0,
            ctx,
        }
    }

    /// Infer a whole program against the given root environment. The
    /// program's forms behave like an inline block: declarations land
    /// directly in the root.
    pub fn check_program(&mut self, env: &Env, forms: &[Node]) -> Result<Scheme> {
        let ty = self.infer_forms_phased(env, forms)?;
        Ok(generalize(None, &self.subst, &ty))
    }

    /// The inferred type of a node, resolved through the substitution.
    pub fn resolved_type_of(&self, id: NodeId) -> Option<Type> {
        self.type_of.get(&id).map(|t| self.subst.resolve(t))
    }

    // ── Phase runner ─────────────────────────────────────────────────

    /// Run classified forms through the ordered inference phases:
    /// directives, constants, types (two hoisting passes then full
    /// inference), function signatures, variables in dependency order,
    /// function bodies, then non-declarations in source order.
    fn infer_forms_phased(&mut self, env: &Env, forms: &[Node]) -> Result<Type> {
        let classified = classify_forms(forms);
        let mut last = None;

        for form in &classified.directives {
            self.hoist_directive(env, form)?;
            last = Some(self.infer_node(env, form)?);
        }

        for form in &classified.constants {
            last = Some(self.infer_node(env, form)?);
        }

        // Pass 0 creates every nominal placeholder before any signature is
        // built, so sibling classes can reference each other.
        for form in &classified.types {
            self.hoist_type(env, form, 0)?;
        }
        for form in &classified.types {
            self.hoist_type(env, form, 1)?;
        }
        for form in &classified.types {
            last = Some(self.infer_node(env, form)?);
        }

        for form in &classified.functions {
            self.hoist_function(env, form)?;
        }

        if !classified.variables.is_empty() {
            let ordered = order_by_dependencies(&classified.variables)?;
            for form in ordered {
                last = Some(self.infer_node(env, form)?);
            }
        }

        for form in &classified.functions {
            last = Some(self.infer_node(env, form)?);
        }

        for form in &classified.non_declarations {
            last = Some(self.infer_node(env, form)?);
        }

        match last {
            Some(ty) => Ok(ty),
            None => Ok(self.subst.fresh()),
        }
    }

    fn infer_block(&mut self, env: &Env, block: &Block) -> Result<Type> {
        let scope = if block.inline {
            env.clone()
        } else {
            env.clone_scope()
        };
        if block.forms.is_empty() {
            // A zero-form block behaves as a single null literal.
            return Ok(self.subst.fresh());
        }
        self.infer_forms_phased(&scope, &block.forms)
    }

    // ── Hoisting ─────────────────────────────────────────────────────

    fn hoist_directive(&mut self, env: &Env, node: &Node) -> Result<()> {
        if let NodeKind::Directive(decl) = &node.kind {
            env.add_directive_decl(decl.clone());
        }
        Ok(())
    }

    fn hoist_type(&mut self, env: &Env, node: &Node, pass: u8) -> Result<()> {
        match &node.kind {
            NodeKind::Class(class) => self.hoist_class(env, node, class, pass),
            NodeKind::Enum(en) => self.hoist_enum(env, node, en, pass),
            _ => Ok(()),
        }
    }

    fn hoist_class(&mut self, env: &Env, node: &Node, class: &ClassDecl, pass: u8) -> Result<()> {
        let module = match env.named_type(&class.name) {
            Some(module) => module,
            None => {
                let module = ModuleRef::new(class.name.clone(), ModuleKind::Object);
                env.add_class(class.name.clone(), module.clone());
                module
            }
        };

        if pass == 0 {
            // Placeholder pass: the nominal type plus its `self` scheme,
            // so sibling signatures can already name it.
            module.add(
                "self",
                Scheme::mono(Type::non_null(Type::Module(module.clone()))),
            );
            self.class_of.insert(node.id, module);
            return Ok(());
        }

        for iface_name in &class.implements {
            let iface = env.named_type(iface_name).ok_or_else(|| {
                Error::at(ErrorKind::UndeclaredName(iface_name.clone()), node.span)
            })?;
            if iface.kind() != ModuleKind::Interface {
                return Err(Error::at(
                    ErrorKind::InterfaceConformance(format!(
                        "{iface_name} is not an interface"
                    )),
                    node.span,
                ));
            }
            if !module.implements(&iface) {
                module.add_interface(iface);
            }
        }

        let composite = Env::composite(Env::Module(module.clone()), env.clone());

        // Constructor signature: public non-function slots plus required
        // private slots, in declaration order.
        let params = constructor_parameters(&class.body);
        let args = self.infer_fn_args(&composite, &composite.clone_scope(), &params, true)?;
        let ctor = FunType {
            args,
            ret: Type::non_null(Type::Module(module.clone())),
        };
        env.add(class.name.clone(), Scheme::mono(Type::Fun(Box::new(ctor.clone()))));
        env.set_visibility(class.name.clone(), class.visibility);
        self.ctor_type_of.insert(node.id, ctor);

        // Hoist body declarations into the class so sibling classes can
        // reference methods before bodies are inferred.
        let body_classified = classify_forms(&class.body.forms);
        for form in &body_classified.types {
            self.hoist_type(&composite, form, 0)?;
        }
        for form in &body_classified.types {
            self.hoist_type(&composite, form, 1)?;
        }
        for form in &body_classified.functions {
            self.hoist_function(&composite, form)?;
        }

        Ok(())
    }

    fn hoist_enum(&mut self, env: &Env, node: &Node, en: &EnumDecl, pass: u8) -> Result<()> {
        let module = match env.named_type(&en.name) {
            Some(module) => module,
            None => {
                let module = ModuleRef::new(en.name.clone(), ModuleKind::Enum);
                env.add_class(en.name.clone(), module.clone());
                module
            }
        };

        if pass == 0 {
            env.add(
                en.name.clone(),
                Scheme::mono(Type::non_null(Type::Module(module.clone()))),
            );
            env.set_visibility(en.name.clone(), en.visibility);
            self.enum_of.insert(node.id, module);
            return Ok(());
        }

        for value in &en.values {
            module.add(
                value.clone(),
                Scheme::mono(Type::non_null(Type::Module(module.clone()))),
            );
            module.set_visibility(value.clone(), Visibility::Public);
        }
        module.add(
            "values",
            Scheme::mono(Type::non_null(Type::list(Type::non_null(Type::Module(
                module.clone(),
            ))))),
        );
        module.set_visibility("values", Visibility::Public);
        Ok(())
    }

    /// Declare a function's signature without inferring its body. The
    /// return type is the declared annotation or a fresh variable that the
    /// body phase later unifies with the inferred type.
    fn hoist_function(&mut self, env: &Env, node: &Node) -> Result<()> {
        let (name, args, ret, visibility) = match &node.kind {
            NodeKind::Fun(fun) => (&fun.name, &fun.args, &fun.ret, fun.visibility),
            NodeKind::Slot(slot) => match slot.value.as_deref() {
                Some(Node {
                    kind: NodeKind::Lambda(lit),
                    ..
                }) => (&slot.name, &lit.args, &lit.ret, slot.visibility),
                _ => return Ok(()),
            },
            _ => return Ok(()),
        };

        // Already hoisted (e.g. during the enclosing class's signature
        // pass); the body phase unifies against the existing scheme.
        if let Some(scheme) = env.local_scheme_of(name) {
            if matches!(scheme.ty, Type::Fun(_)) {
                return Ok(());
            }
        }

        let (fn_env, param_env) = function_env(env);
        let args = self.infer_fn_args(&fn_env, &param_env, args, false)?;
        let ret = match ret {
            Some(ty) => self.infer_type_node(env, ty)?,
            None => self.subst.fresh(),
        };
        env.add(name.clone(), Scheme::mono(Type::fun(args, ret)));
        env.set_visibility(name.clone(), visibility);
        Ok(())
    }

    // ── Per-node inference ───────────────────────────────────────────

    fn infer_node(&mut self, env: &Env, node: &Node) -> Result<Type> {
        self.ctx.check()?;
        let ty = self
            .infer_kind(env, node)
            .map_err(|e| e.with_span(node.span))?;
        self.type_of.insert(node.id, ty.clone());
        Ok(ty)
    }

    fn infer_kind(&mut self, env: &Env, node: &Node) -> Result<Type> {
        match &node.kind {
            NodeKind::Int(_) => Ok(Type::non_null(self.named(env, "Int", node)?)),
            NodeKind::Str(_) => Ok(Type::non_null(self.named(env, "String", node)?)),
            NodeKind::Bool(_) => Ok(Type::non_null(self.named(env, "Boolean", node)?)),
            NodeKind::Null => Ok(self.subst.fresh()),
            NodeKind::ListLit(items) => {
                let elem = self.subst.fresh();
                for item in items {
                    let item_ty = self.infer_node(env, item)?;
                    unify(&mut self.subst, &item_ty, &elem)
                        .map_err(|e| e.with_span(item.span))?;
                }
                Ok(Type::non_null(Type::list(self.subst.resolve(&elem))))
            }
            NodeKind::ObjectLit(slots) => self.infer_object_lit(env, node, slots),
            NodeKind::SelfRef => {
                let scheme = env.scheme_of("self").ok_or_else(|| {
                    Error::new(ErrorKind::Eval("self referenced outside of a class".into()))
                })?;
                Ok(instantiate(&mut self.subst, &scheme))
            }
            NodeKind::Symbol { name, auto_call } => {
                let scheme = env
                    .scheme_of(name)
                    .ok_or_else(|| Error::new(ErrorKind::UndeclaredName(name.clone())))?;
                let ty = instantiate(&mut self.subst, &scheme);
                if *auto_call {
                    Ok(auto_call_type(&self.subst.resolve(&ty)))
                } else {
                    Ok(ty)
                }
            }
            NodeKind::Select {
                receiver,
                field,
                auto_call,
            } => self.infer_select(env, node, receiver, field, *auto_call),
            NodeKind::Call { fun, args } => self.infer_call(env, node, fun, args),
            NodeKind::Binary { op, left, right } => self.infer_binary(env, *op, left, right),
            NodeKind::Default { left, right } => {
                let lt = self.infer_node(env, left)?;
                let rt = self.infer_node(env, right)?;
                // The fallback must fit the nullable left side; the result
                // takes the fallback's nullability.
                let lt = self.subst.resolve(&lt);
                unify(&mut self.subst, &rt, &lt.nullable())?;
                Ok(self.subst.resolve(&rt))
            }
            NodeKind::Slot(slot) => self.infer_slot(env, node, slot),
            NodeKind::Fun(fun) => self.infer_fun_decl(env, node, fun),
            NodeKind::Lambda(lit) => self.infer_lambda(env, node, lit),
            NodeKind::Class(class) => self.infer_class(env, node, class),
            NodeKind::Enum(en) => self.infer_enum(env, node, en),
            NodeKind::Directive(decl) => {
                for arg in &decl.args {
                    if arg.ty.is_none() {
                        return Err(Error::new(ErrorKind::NonMonotype(format!(
                            "directive @{} argument {:?}",
                            decl.name, arg.name
                        ))));
                    }
                }
                Ok(self.subst.fresh())
            }
            NodeKind::Assign { target, op, value } => {
                let target_ty = self.infer_node(env, target)?;
                let value_ty = self.infer_node(env, value)?;
                match op {
                    crate::ast::AssignOp::Set => {
                        unify(&mut self.subst, &value_ty, &target_ty)
                            .map_err(|e| e.with_span(value.span))?;
                    }
                    crate::ast::AssignOp::Add => {
                        unify(&mut self.subst, &value_ty, &target_ty)
                            .map_err(|e| e.with_span(value.span))?;
                    }
                }
                Ok(self.subst.resolve(&target_ty))
            }
            NodeKind::Assert(expr) => {
                let ty = self.infer_node(env, expr)?;
                let boolean = self.named(env, "Boolean", node)?;
                unify(&mut self.subst, &ty, &boolean).map_err(|e| e.with_span(expr.span))?;
                Ok(Type::non_null(boolean))
            }
            NodeKind::Block(block) => self.infer_block(env, block),
        }
    }

    fn infer_object_lit(&mut self, env: &Env, node: &Node, slots: &[SlotDecl]) -> Result<Type> {
        let module = ModuleRef::new("", ModuleKind::Object);
        let composite = Env::composite(Env::Module(module.clone()), env.clone());
        for slot in slots {
            let slot_node = Node::new(NodeKind::Slot(slot.clone()), slot.span);
            self.infer_node(&composite, &slot_node)?;
        }
        self.module_of.insert(node.id, module.clone());
        Ok(Type::non_null(Type::Module(module)))
    }

    fn infer_select(
        &mut self,
        env: &Env,
        node: &Node,
        receiver: &Node,
        field: &str,
        auto_call: bool,
    ) -> Result<Type> {
        let receiver_ty = self.infer_node(env, receiver)?;
        let resolved = self.subst.resolve(&receiver_ty);
        let (inner, nullable) = match &resolved {
            Type::NonNull(inner) => ((**inner).clone(), false),
            other => (other.clone(), true),
        };

        let scheme = match &inner {
            Type::Module(module) => module.scheme_of(field),
            Type::Record(rec) => rec.scheme_of(field).cloned(),
            Type::List(elem) => {
                let ty = self.list_method_type(env, field, elem, node)?;
                Some(Scheme::mono(ty))
            }
            _ => {
                return Err(Error::new(ErrorKind::Eval(format!(
                    "cannot select {field:?} from {resolved}"
                ))))
            }
        };
        let scheme = scheme
            .ok_or_else(|| Error::new(ErrorKind::UndeclaredName(field.to_string())))?;

        let mut ty = instantiate(&mut self.subst, &scheme);
        if auto_call {
            ty = auto_call_type(&self.subst.resolve(&ty));
        }
        if nullable {
            // A nullable receiver taints the result nullable.
            ty = ty.nullable();
            self.nullable_receiver.insert(node.id);
        }
        Ok(ty)
    }

    fn list_method_type(
        &mut self,
        env: &Env,
        field: &str,
        _elem: &Type,
        node: &Node,
    ) -> Result<Type> {
        match field {
            "length" => Ok(Type::fun(
                RecordType::new(""),
                Type::non_null(self.named(env, "Int", node)?),
            )),
            _ => Err(Error::new(ErrorKind::UndeclaredName(field.to_string()))),
        }
    }

    fn infer_call(
        &mut self,
        env: &Env,
        node: &Node,
        fun: &Node,
        args: &[CallArg],
    ) -> Result<Type> {
        let fun_ty = self.infer_node(env, fun)?;
        let resolved = self.subst.resolve(&fun_ty).nullable();
        let ft = match resolved {
            Type::Fun(ft) => ft,
            other => {
                return Err(Error::new(ErrorKind::Eval(format!(
                    "expected a function, got {other}"
                ))))
            }
        };

        let param_names = ft.args.field_names();
        let mut provided: HashSet<String> = HashSet::new();
        let mut positional = 0usize;
        let mut seen_named = false;
        for arg in args {
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

            if !provided.insert(key.clone()) {
                return Err(Error::at(
                    ErrorKind::Eval(format!("argument {key:?} specified multiple times")),
                    arg.value.span,
                ));
            }

            let scheme = ft.args.scheme_of(&key).ok_or_else(|| {
                Error::at(
                    ErrorKind::Eval(format!("unknown argument {key:?}")),
                    arg.value.span,
                )
            })?;
            let want = scheme
                .mono_type()
                .cloned()
                .ok_or_else(|| Error::new(ErrorKind::NonMonotype(key.clone())))?;
            let have = self.infer_node(env, &arg.value)?;
            unify(&mut self.subst, &have, &want).map_err(|e| e.with_span(arg.value.span))?;
        }

        // With defaulted arguments made nullable in signatures, only truly
        // required parameters remain non-null here.
        for (name, scheme) in &ft.args.fields {
            if provided.contains(name) {
                continue;
            }
            if self.subst.resolve(&scheme.ty).is_non_null() {
                return Err(Error::at(
                    ErrorKind::MissingArgument(name.clone()),
                    node.span,
                ));
            }
        }

        let mut ret = self.subst.resolve(&ft.ret);
        if self.nullable_receiver.contains(&fun.id) {
            ret = ret.nullable();
            self.nullable_receiver.insert(node.id);
        }
        Ok(ret)
    }

    fn infer_binary(
        &mut self,
        env: &Env,
        op: crate::ast::BinOp,
        left: &Node,
        right: &Node,
    ) -> Result<Type> {
        use crate::ast::BinOp::*;
        let lt = self.infer_node(env, left)?;
        let rt = self.infer_node(env, right)?;
        let boolean = self.named(env, "Boolean", left)?;
        match op {
            Add | Sub | Mul | Div => {
                unify(&mut self.subst, &rt, &lt).map_err(|e| e.with_span(right.span))?;
                Ok(self.subst.resolve(&lt))
            }
            Lt | Gt | Le | Ge => {
                unify(&mut self.subst, &rt, &lt).map_err(|e| e.with_span(right.span))?;
                Ok(Type::non_null(boolean))
            }
            Eq | Ne => Ok(Type::non_null(boolean)),
            And | Or => {
                unify(&mut self.subst, &lt, &boolean).map_err(|e| e.with_span(left.span))?;
                unify(&mut self.subst, &rt, &boolean).map_err(|e| e.with_span(right.span))?;
                Ok(Type::non_null(boolean))
            }
        }
    }

    fn infer_slot(&mut self, env: &Env, node: &Node, slot: &SlotDecl) -> Result<Type> {
        let mut defined = match &slot.ty {
            Some(ty) => Some(self.infer_type_node(env, ty)?),
            None => None,
        };

        if let Some(value) = &slot.value {
            let inferred = self.infer_node(env, value)?;
            match &defined {
                Some(want) => {
                    // Type hints accept declared subtypes.
                    assignable(&mut self.subst, &inferred, want)
                        .map_err(|e| e.with_span(value.span))?;
                }
                None => defined = Some(inferred),
            }
        }

        let defined = match defined {
            Some(ty) => ty,
            None => self.subst.fresh(),
        };

        if let Some(current) = env.local_scheme_of(&slot.name) {
            let current_ty = current
                .mono_type()
                .cloned()
                .ok_or_else(|| Error::new(ErrorKind::NonMonotype(slot.name.clone())))?;
            if unify(&mut self.subst, &defined, &current_ty).is_err() {
                return Err(Error::at(
                    ErrorKind::Redeclaration {
                        name: slot.name.clone(),
                        have: self.subst.resolve(&defined),
                        want: self.subst.resolve(&current_ty),
                    },
                    node.span,
                ));
            }
        }

        for directive in &slot.directives {
            self.validate_directive_app(env, directive)?;
        }

        env.set_visibility(slot.name.clone(), slot.visibility);
        if let Some(doc) = &slot.doc {
            env.set_doc(slot.name.clone(), doc.clone());
        }
        if !slot.directives.is_empty() {
            env.set_var_directives(slot.name.clone(), slot.directives.clone());
        }
        env.add(slot.name.clone(), Scheme::mono(defined.clone()));
        Ok(defined)
    }

    /// Shared argument inference for functions, lambdas, and constructor
    /// signatures. Adds each parameter to `param_env` as it goes so later
    /// default expressions can reference earlier parameters; defaulted
    /// arguments are made nullable in the signature.
    fn infer_fn_args(
        &mut self,
        fn_env: &Env,
        param_env: &Env,
        args: &[SlotDecl],
        allow_fresh: bool,
    ) -> Result<RecordType> {
        let mut rec = RecordType::new("");
        for arg in args {
            let declared = match &arg.ty {
                Some(ty) => Some(self.infer_type_node(fn_env, ty)?),
                None => None,
            };
            let value_ty = match &arg.value {
                Some(value) => Some(self.infer_node(param_env, value)?),
                None => None,
            };
            for directive in &arg.directives {
                self.validate_directive_app(fn_env, directive)?;
            }

            let final_ty = match (declared, value_ty) {
                (Some(declared), Some(value_ty)) => {
                    unify(&mut self.subst, &value_ty, &declared)
                        .map_err(|e| e.with_span(arg.span))?;
                    declared
                }
                (Some(declared), None) => declared,
                (None, Some(value_ty)) => value_ty,
                (None, None) if allow_fresh => self.subst.fresh(),
                (None, None) => {
                    return Err(Error::at(
                        ErrorKind::NonMonotype(arg.name.clone()),
                        arg.span,
                    ))
                }
            };

            param_env.add(arg.name.clone(), Scheme::mono(final_ty.clone()));

            let signature_ty = if arg.value.is_some() {
                final_ty.nullable()
            } else {
                final_ty
            };
            rec.add(arg.name.clone(), Scheme::mono(signature_ty));
            if let Some(doc) = &arg.doc {
                rec.docs.insert(arg.name.clone(), doc.clone());
            }
            if !arg.directives.is_empty() {
                rec.directives
                    .insert(arg.name.clone(), arg.directives.clone());
            }
        }
        Ok(rec)
    }

    fn infer_fn_type(
        &mut self,
        env: &Env,
        node: &Node,
        args: &[SlotDecl],
        ret: &Option<TypeNode>,
        body: &Block,
        allow_fresh: bool,
    ) -> Result<FunType> {
        let (fn_env, param_env) = function_env(env);
        let args = self.infer_fn_args(&fn_env, &param_env, args, allow_fresh)?;

        let declared_ret = match ret {
            Some(ty) => Some(self.infer_type_node(env, ty)?),
            None => None,
        };

        let inferred_ret = self.infer_block(&fn_env, body)?;
        if let Some(declared) = &declared_ret {
            unify(&mut self.subst, &inferred_ret, declared).map_err(|e| {
                e.with_span(body.forms.last().map(|f| f.span).unwrap_or(node.span))
            })?;
        }

        let ret = self
            .subst
            .resolve(declared_ret.as_ref().unwrap_or(&inferred_ret));
        let ft = FunType { args, ret };
        if self.class_depth > 0 {
            self.dynamic_fns.insert(node.id);
        }
        self.fn_type_of.insert(node.id, ft.clone());
        Ok(ft)
    }

    fn infer_fun_decl(&mut self, env: &Env, node: &Node, fun: &FunDecl) -> Result<Type> {
        for directive in &fun.directives {
            self.validate_directive_app(env, directive)?;
        }
        let ft = self.infer_fn_type(env, node, &fun.args, &fun.ret, &fun.body, false)?;

        // Bind the hoisted signature's return variable to the body type so
        // earlier phases that called this function see a resolved type.
        if let Some(scheme) = env.scheme_of(&fun.name) {
            if let Type::Fun(hoisted) = &scheme.ty {
                unify(&mut self.subst, &ft.ret, &hoisted.ret)
                    .map_err(|e| e.with_span(node.span))?;
            }
        }
        if let Some(doc) = &fun.doc {
            env.set_doc(fun.name.clone(), doc.clone());
        }
        env.set_visibility(fun.name.clone(), fun.visibility);
        Ok(Type::Fun(Box::new(ft)))
    }

    fn infer_lambda(&mut self, env: &Env, node: &Node, lit: &FunLit) -> Result<Type> {
        let ft = self.infer_fn_type(env, node, &lit.args, &lit.ret, &lit.body, true)?;
        Ok(Type::Fun(Box::new(ft)))
    }

    fn infer_class(&mut self, env: &Env, node: &Node, class: &ClassDecl) -> Result<Type> {
        let module = env
            .named_type(&class.name)
            .ok_or_else(|| Error::new(ErrorKind::UndeclaredName(class.name.clone())))?;
        self.class_of.insert(node.id, module.clone());

        if let Some(doc) = &class.doc {
            env.set_doc(class.name.clone(), doc.clone());
            module.set_module_doc(doc.clone());
        }
        for directive in &class.directives {
            self.validate_directive_app(env, directive)?;
        }

        let composite = Env::composite(Env::Module(module.clone()), env.clone());
        self.class_depth += 1;
        let result = self.infer_forms_phased(&composite, &class.body.forms);
        self.class_depth -= 1;
        result?;

        for iface_name in &class.implements {
            if let Some(iface) = env.named_type(iface_name) {
                self.validate_conformance(node, &class.name, &module, iface_name, &iface)?;
            }
        }

        let ctor = self
            .ctor_type_of
            .get(&node.id)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::Eval("class was not hoisted".into())))?;
        Ok(Type::Fun(Box::new(ctor)))
    }

    fn validate_conformance(
        &mut self,
        node: &Node,
        class_name: &str,
        class: &ModuleRef,
        iface_name: &str,
        iface: &ModuleRef,
    ) -> Result<()> {
        let mut fields = iface.bindings(Visibility::Private);
        fields.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (field, iface_scheme) in fields {
            if field == "self" {
                continue;
            }
            let Some(class_scheme) = class.scheme_of(&field) else {
                return Err(Error::at(
                    ErrorKind::InterfaceConformance(format!(
                        "class {class_name} is missing {field:?}, required by interface {iface_name}"
                    )),
                    node.span,
                ));
            };
            let iface_ty = self.subst.resolve(&iface_scheme.ty);
            let class_ty = self.subst.resolve(&class_scheme.ty);
            if !self.conforms(&class_ty, &iface_ty) {
                return Err(Error::at(
                    ErrorKind::InterfaceConformance(format!(
                        "field {field:?}: type {class_ty} is not compatible with interface type {iface_ty}"
                    )),
                    node.span,
                ));
            }
        }
        Ok(())
    }

    /// Covariant field conformance; a plain field satisfies a zero-argument
    /// function field on the interface.
    fn conforms(&mut self, class_ty: &Type, iface_ty: &Type) -> bool {
        if let (want_inner, Type::Fun(iface_fn)) = (class_ty, iface_ty) {
            if iface_fn.args.fields.is_empty() && !matches!(want_inner, Type::Fun(_)) {
                return assignable(&mut self.subst, class_ty, &iface_fn.ret).is_ok();
            }
        }
        assignable(&mut self.subst, class_ty, iface_ty).is_ok()
    }

    fn infer_enum(&mut self, env: &Env, node: &Node, en: &EnumDecl) -> Result<Type> {
        let module = env
            .named_type(&en.name)
            .ok_or_else(|| Error::new(ErrorKind::UndeclaredName(en.name.clone())))?;
        if let Some(doc) = &en.doc {
            env.set_doc(en.name.clone(), doc.clone());
            module.set_module_doc(doc.clone());
        }
        self.enum_of.insert(node.id, module.clone());
        Ok(Type::non_null(Type::Module(module)))
    }

    fn validate_directive_app(&mut self, env: &Env, app: &DirectiveApplication) -> Result<()> {
        let decl = env.directive_decl(&app.name).ok_or_else(|| {
            Error::at(ErrorKind::UndeclaredName(format!("@{}", app.name)), app.span)
        })?;
        for arg in &app.args {
            let Some(name) = &arg.name else {
                return Err(Error::at(
                    ErrorKind::Eval(format!(
                        "directive @{} arguments must be named",
                        app.name
                    )),
                    app.span,
                ));
            };
            let Some(slot) = decl.args.iter().find(|slot| &slot.name == name) else {
                return Err(Error::at(
                    ErrorKind::Eval(format!(
                        "directive @{} has no argument {name:?}",
                        app.name
                    )),
                    app.span,
                ));
            };
            if let Some(ty) = &slot.ty {
                let want = self.infer_type_node(env, ty)?;
                let have = self.infer_node(env, &arg.value)?;
                assignable(&mut self.subst, &have, &want)
                    .map_err(|e| e.with_span(arg.value.span))?;
            }
        }
        Ok(())
    }

    fn infer_type_node(&mut self, env: &Env, ty: &TypeNode) -> Result<Type> {
        match ty {
            TypeNode::Named(name, span) => {
                let module = env
                    .named_type(name)
                    .ok_or_else(|| Error::at(ErrorKind::UndeclaredName(name.clone()), *span))?;
                Ok(Type::Module(module))
            }
            TypeNode::List(inner) => Ok(Type::list(self.infer_type_node(env, inner)?)),
            TypeNode::NonNull(inner) => Ok(Type::non_null(self.infer_type_node(env, inner)?)),
        }
    }

    fn named(&self, env: &Env, name: &str, node: &Node) -> Result<Type> {
        env.named_type(name)
            .map(Type::Module)
            .ok_or_else(|| Error::at(ErrorKind::UndeclaredName(name.to_string()), node.span))
    }
}

/// Constructor parameters for a class body: public non-function slots plus
/// private slots without a value, in declaration order.
pub fn constructor_parameters(body: &Block) -> Vec<SlotDecl> {
    let mut params = Vec::new();
    for form in &body.forms {
        if let NodeKind::Slot(slot) = &form.kind {
            if matches!(slot.value.as_deref(), Some(Node { kind: NodeKind::Lambda(_), .. })) {
                continue;
            }
            if slot.visibility == Visibility::Public
                || (slot.visibility == Visibility::Private && slot.value.is_none())
            {
                params.push(slot.clone());
            }
        }
    }
    params
}

/// The environment a function's parameters live in. Inside a composite
/// (class body), parameters go into a fresh lexical layer so that raw-name
/// lookup — which prefers lexical during inference — lets parameters
/// shadow same-named receiver fields. At runtime arguments are bound onto
/// the receiver clone instead, where primary-first lookup gives the same
/// shadowing.
fn function_env(env: &Env) -> (Env, Env) {
    match env {
        Env::Composite(c) => {
            let params = c.lexical.clone_scope();
            (
                Env::composite(c.primary.clone(), params.clone()),
                params,
            )
        }
        other => {
            let child = other.clone_scope();
            (child.clone(), child)
        }
    }
}

/// The type a binding presents when referenced as a plain value: a
/// function type with no required parameters auto-invokes, so the binding
/// presents its return type.
pub fn auto_call_type(ty: &Type) -> Type {
    if let Type::Fun(ft) = ty {
        let has_required = ft
            .args
            .fields
            .iter()
            .any(|(_, scheme)| scheme.ty.is_non_null());
        if !has_required {
            return ft.ret.clone();
        }
    }
    ty.clone()
}
