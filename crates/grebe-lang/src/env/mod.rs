use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::ast::{DirectiveApplication, DirectiveDecl, Visibility};
use crate::types::{RecordType, Scheme, Subst, Type, TypeVar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Object,
    Enum,
    Scalar,
    Interface,
}

/// A nominal module: simultaneously a *type* (compared by identity when
/// named) and an *environment* (it stores the schemes of its members).
pub struct ModuleData {
    pub name: String,
    pub kind: ModuleKind,
    pub parent: Option<Env>,
    vars: HashMap<String, Scheme>,
    classes: HashMap<String, ModuleRef>,
    visibility: HashMap<String, Visibility>,
    var_directives: HashMap<String, Vec<DirectiveApplication>>,
    directives: HashMap<String, DirectiveDecl>,
    doc_strings: HashMap<String, String>,
    module_doc: String,
    interfaces: Vec<ModuleRef>,
}

#[derive(Clone)]
pub struct ModuleRef(Rc<RefCell<ModuleData>>);

impl ModuleRef {
    pub fn new(name: impl Into<String>, kind: ModuleKind) -> Self {
        Self(Rc::new(RefCell::new(ModuleData {
            name: name.into(),
            kind,
            parent: None,
            vars: HashMap::new(),
            classes: HashMap::new(),
            visibility: HashMap::new(),
            var_directives: HashMap::new(),
            directives: HashMap::new(),
            doc_strings: HashMap::new(),
            module_doc: String::new(),
            interfaces: Vec::new(),
        })))
    }

    pub fn ptr_eq(&self, other: &ModuleRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn kind(&self) -> ModuleKind {
        self.0.borrow().kind
    }

    pub fn set_parent(&self, parent: Env) {
        self.0.borrow_mut().parent = Some(parent);
    }

    pub fn scheme_of(&self, name: &str) -> Option<Scheme> {
        let data = self.0.borrow();
        if let Some(scheme) = data.vars.get(name) {
            return Some(scheme.clone());
        }
        data.parent.as_ref().and_then(|p| p.scheme_of(name))
    }

    pub fn local_scheme_of(&self, name: &str) -> Option<Scheme> {
        self.0.borrow().vars.get(name).cloned()
    }

    pub fn add(&self, name: impl Into<String>, scheme: Scheme) {
        let name = name.into();
        let mut data = self.0.borrow_mut();
        data.visibility.entry(name.clone()).or_insert(Visibility::Private);
        data.vars.insert(name, scheme);
    }

    pub fn remove(&self, name: &str) {
        self.0.borrow_mut().vars.remove(name);
    }

    pub fn named_type(&self, name: &str) -> Option<ModuleRef> {
        let data = self.0.borrow();
        if let Some(class) = data.classes.get(name) {
            return Some(class.clone());
        }
        data.parent.as_ref().and_then(|p| p.named_type(name))
    }

    pub fn add_class(&self, name: impl Into<String>, class: ModuleRef) {
        self.0.borrow_mut().classes.insert(name.into(), class);
    }

    pub fn set_visibility(&self, name: impl Into<String>, visibility: Visibility) {
        self.0.borrow_mut().visibility.insert(name.into(), visibility);
    }

    pub fn visibility_of(&self, name: &str) -> Visibility {
        self.0
            .borrow()
            .visibility
            .get(name)
            .copied()
            .unwrap_or(Visibility::Private)
    }

    pub fn set_doc(&self, name: impl Into<String>, doc: impl Into<String>) {
        self.0.borrow_mut().doc_strings.insert(name.into(), doc.into());
    }

    pub fn doc_of(&self, name: &str) -> Option<String> {
        let data = self.0.borrow();
        if let Some(doc) = data.doc_strings.get(name) {
            return Some(doc.clone());
        }
        data.parent.as_ref().and_then(|p| p.doc_of(name))
    }

    pub fn set_module_doc(&self, doc: impl Into<String>) {
        self.0.borrow_mut().module_doc = doc.into();
    }

    pub fn module_doc(&self) -> String {
        self.0.borrow().module_doc.clone()
    }

    pub fn add_directive_decl(&self, decl: DirectiveDecl) {
        self.0.borrow_mut().directives.insert(decl.name.clone(), decl);
    }

    pub fn directive_decl(&self, name: &str) -> Option<DirectiveDecl> {
        let data = self.0.borrow();
        if let Some(decl) = data.directives.get(name) {
            return Some(decl.clone());
        }
        data.parent.as_ref().and_then(|p| p.directive_decl(name))
    }

    pub fn set_var_directives(&self, name: impl Into<String>, apps: Vec<DirectiveApplication>) {
        self.0.borrow_mut().var_directives.insert(name.into(), apps);
    }

    pub fn var_directives_of(&self, name: &str) -> Vec<DirectiveApplication> {
        self.0
            .borrow()
            .var_directives
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn add_interface(&self, iface: ModuleRef) {
        self.0.borrow_mut().interfaces.push(iface);
    }

    pub fn interfaces(&self) -> Vec<ModuleRef> {
        self.0.borrow().interfaces.clone()
    }

    pub fn implements(&self, iface: &ModuleRef) -> bool {
        self.0.borrow().interfaces.iter().any(|i| i.ptr_eq(iface))
    }

    /// Local bindings at or above the given visibility, unsorted.
    pub fn bindings(&self, min: Visibility) -> Vec<(String, Scheme)> {
        let data = self.0.borrow();
        data.vars
            .iter()
            .filter(|(name, _)| {
                data.visibility
                    .get(*name)
                    .copied()
                    .unwrap_or(Visibility::Private)
                    >= min
            })
            .map(|(name, scheme)| (name.clone(), scheme.clone()))
            .collect()
    }

    /// The structural view of this module, with fields in sorted order.
    pub fn as_record(&self) -> RecordType {
        let mut rec = RecordType::new("");
        let mut fields: Vec<(String, Scheme)> = self
            .0
            .borrow()
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        fields.sort_by(|(a, _), (b, _)| a.cmp(b));
        rec.fields = fields;
        rec
    }

    /// Nominal identity for named modules, structural equality otherwise.
    pub fn type_eq(&self, other: &ModuleRef) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let self_named = !self.0.borrow().name.is_empty();
        let other_named = !other.0.borrow().name.is_empty();
        if self_named && other_named {
            return false;
        }
        let a = Type::Record(self.as_record());
        let b = Type::Record(other.as_record());
        crate::types::types_equal(&a, &b)
    }

    fn free_type_vars(&self, subst: &Subst, out: &mut BTreeSet<TypeVar>) {
        let data = self.0.borrow();
        for scheme in data.vars.values() {
            crate::types::scheme_free_vars(scheme, subst, out);
        }
        if let Some(parent) = &data.parent {
            out.extend(parent.free_type_vars(subst));
        }
    }
}

impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Module({:?})", self.0.borrow().name)
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        if name.is_empty() {
            write!(f, "{}", Type::Record(self.as_record()))
        } else {
            f.write_str(&name)
        }
    }
}

/// A type environment: either a plain module chain or a composite that
/// layers a writable primary scope over a read-fallback lexical scope.
#[derive(Clone, Debug)]
pub enum Env {
    Module(ModuleRef),
    Composite(Rc<CompositeModule>),
}

/// Composite environment for reopening a class body over an enclosing
/// lexical scope. Raw-name lookups prefer the lexical side during
/// inference (so parameters shadow receiver fields); new declarations
/// always land in primary.
#[derive(Debug)]
pub struct CompositeModule {
    pub primary: Env,
    pub lexical: Env,
}

impl Env {
    pub fn module(module: ModuleRef) -> Env {
        Env::Module(module)
    }

    pub fn composite(primary: Env, lexical: Env) -> Env {
        Env::Composite(Rc::new(CompositeModule { primary, lexical }))
    }

    pub fn scheme_of(&self, name: &str) -> Option<Scheme> {
        match self {
            Env::Module(module) => module.scheme_of(name),
            Env::Composite(c) => c
                .lexical
                .scheme_of(name)
                .or_else(|| c.primary.scheme_of(name)),
        }
    }

    /// Lookup without parent fallback; for composites, the primary scope
    /// is the local scope.
    pub fn local_scheme_of(&self, name: &str) -> Option<Scheme> {
        match self {
            Env::Module(module) => module.local_scheme_of(name),
            Env::Composite(c) => c.primary.local_scheme_of(name),
        }
    }

    pub fn add(&self, name: impl Into<String>, scheme: Scheme) {
        match self {
            Env::Module(module) => module.add(name, scheme),
            Env::Composite(c) => c.primary.add(name, scheme),
        }
    }

    pub fn remove(&self, name: &str) {
        match self {
            Env::Module(module) => module.remove(name),
            Env::Composite(c) => c.primary.remove(name),
        }
    }

    pub fn named_type(&self, name: &str) -> Option<ModuleRef> {
        match self {
            Env::Module(module) => module.named_type(name),
            Env::Composite(c) => c
                .primary
                .named_type(name)
                .or_else(|| c.lexical.named_type(name)),
        }
    }

    pub fn add_class(&self, name: impl Into<String>, class: ModuleRef) {
        match self {
            Env::Module(module) => module.add_class(name, class),
            Env::Composite(c) => c.primary.add_class(name, class),
        }
    }

    pub fn set_visibility(&self, name: impl Into<String>, visibility: Visibility) {
        match self {
            Env::Module(module) => module.set_visibility(name, visibility),
            Env::Composite(c) => c.primary.set_visibility(name, visibility),
        }
    }

    pub fn set_doc(&self, name: impl Into<String>, doc: impl Into<String>) {
        match self {
            Env::Module(module) => module.set_doc(name, doc),
            Env::Composite(c) => c.primary.set_doc(name, doc),
        }
    }

    pub fn set_var_directives(&self, name: impl Into<String>, apps: Vec<DirectiveApplication>) {
        match self {
            Env::Module(module) => module.set_var_directives(name, apps),
            Env::Composite(c) => c.primary.set_var_directives(name, apps),
        }
    }

    pub fn add_directive_decl(&self, decl: DirectiveDecl) {
        match self {
            Env::Module(module) => module.add_directive_decl(decl),
            Env::Composite(c) => c.primary.add_directive_decl(decl),
        }
    }

    pub fn directive_decl(&self, name: &str) -> Option<DirectiveDecl> {
        match self {
            Env::Module(module) => module.directive_decl(name),
            Env::Composite(c) => c
                .primary
                .directive_decl(name)
                .or_else(|| c.lexical.directive_decl(name)),
        }
    }

    pub fn doc_of(&self, name: &str) -> Option<String> {
        match self {
            Env::Module(module) => module.doc_of(name),
            Env::Composite(c) => c.primary.doc_of(name).or_else(|| c.lexical.doc_of(name)),
        }
    }

    /// A fresh child scope. Reads delegate to this environment; writes
    /// never leak upward. Composites keep their lexical side shared.
    pub fn clone_scope(&self) -> Env {
        match self {
            Env::Module(module) => {
                let child = ModuleRef::new(module.name(), module.kind());
                child.set_parent(Env::Module(module.clone()));
                Env::Module(child)
            }
            Env::Composite(c) => Env::composite(c.primary.clone_scope(), c.lexical.clone()),
        }
    }

    pub fn free_type_vars(&self, subst: &Subst) -> BTreeSet<TypeVar> {
        let mut out = BTreeSet::new();
        match self {
            Env::Module(module) => module.free_type_vars(subst, &mut out),
            Env::Composite(c) => {
                out.extend(c.primary.free_type_vars(subst));
                out.extend(c.lexical.free_type_vars(subst));
            }
        }
        out
    }
}

/// Construct the prelude module: built-in scalar types plus the builtin
/// function bindings. The schemes for polymorphic builtins quantify a
/// variable minted from the caller's substitution so instantiation stays
/// consistent.
pub fn prelude(subst: &mut Subst) -> ModuleRef {
    let prelude = ModuleRef::new("Prelude", ModuleKind::Object);

    let string_ty = ModuleRef::new("String", ModuleKind::Scalar);
    let int_ty = ModuleRef::new("Int", ModuleKind::Scalar);
    let boolean_ty = ModuleRef::new("Boolean", ModuleKind::Scalar);

    // String methods
    {
        let args = RecordType::new("");
        string_ty.add(
            "length",
            Scheme::mono(Type::fun(args, Type::non_null(Type::Module(int_ty.clone())))),
        );
        string_ty.set_visibility("length", Visibility::Public);

        let mut args = RecordType::new("");
        args.add(
            "separator",
            Scheme::mono(Type::non_null(Type::Module(string_ty.clone()))),
        );
        string_ty.add(
            "split",
            Scheme::mono(Type::fun(
                args,
                Type::non_null(Type::list(Type::non_null(Type::Module(string_ty.clone())))),
            )),
        );
        string_ty.set_visibility("split", Visibility::Public);
    }

    prelude.add_class("String", string_ty.clone());
    prelude.add_class("Int", int_ty);
    prelude.add_class("Boolean", boolean_ty);

    // print(value: a!): String! and json(value: a!): String!. The
    // parameter is required so a bare reference stays a function value
    // instead of auto-calling.
    for name in ["print", "json"] {
        let var = match subst.fresh() {
            Type::Var(v) => v,
            _ => unreachable!(),
        };
        let mut args = RecordType::new("");
        args.add("value", Scheme::mono(Type::non_null(Type::Var(var))));
        prelude.add(
            name,
            Scheme {
                vars: vec![var],
                ty: Type::fun(args, Type::non_null(Type::Module(string_ty.clone()))),
            },
        );
        prelude.set_visibility(name, Visibility::Public);
    }

    prelude
}

/// A fresh root environment: an anonymous writable module layered over the
/// prelude.
pub fn root_env(subst: &mut Subst) -> Env {
    let user = ModuleRef::new("", ModuleKind::Object);
    Env::composite(Env::Module(user), Env::Module(prelude(subst)))
}
