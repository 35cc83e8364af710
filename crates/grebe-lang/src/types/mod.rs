use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::ast::DirectiveApplication;
use crate::env::{Env, ModuleRef};
use crate::errors::{Error, ErrorKind, Result};

/// Unique type variable identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVar(pub u32);

/// Type representation for Grebe.
///
/// Nullable-ness is absent-by-default: a bare type is nullable and `NonNull`
/// must be added explicitly. A `NonNull` never wraps another `NonNull`;
/// construct through [`Type::non_null`] to maintain the invariant.
#[derive(Debug, Clone)]
pub enum Type {
    /// Unification variable
    Var(TypeVar),
    NonNull(Box<Type>),
    List(Box<Type>),
    Fun(Box<FunType>),
    /// Anonymous record (function argument lists, object literal shapes)
    Record(RecordType),
    /// Nominal module/class type. Named modules compare by identity,
    /// anonymous modules compare structurally.
    Module(ModuleRef),
}

impl Type {
    pub fn non_null(inner: Type) -> Type {
        match inner {
            Type::NonNull(_) => inner,
            other => Type::NonNull(Box::new(other)),
        }
    }

    pub fn list(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn fun(args: RecordType, ret: Type) -> Type {
        Type::Fun(Box::new(FunType { args, ret }))
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, Type::NonNull(_))
    }

    /// Strip a single `NonNull` wrapper, if present.
    pub fn nullable(&self) -> Type {
        match self {
            Type::NonNull(inner) => (**inner).clone(),
            other => other.clone(),
        }
    }

    /// The direct supertypes of this type: `T!` is a subtype of `T`, lists
    /// are covariant, and modules are subtypes of their declared interfaces.
    pub fn supertypes(&self) -> Vec<Type> {
        match self {
            Type::NonNull(inner) => {
                let mut supers = vec![(**inner).clone()];
                for s in inner.supertypes() {
                    supers.push(Type::non_null(s));
                }
                supers
            }
            Type::List(elem) => elem.supertypes().into_iter().map(Type::list).collect(),
            Type::Module(module) => module
                .interfaces()
                .into_iter()
                .map(Type::Module)
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunType {
    pub args: RecordType,
    pub ret: Type,
}

/// An ordered record of named fields, each holding a scheme, with optional
/// per-field doc strings and directive metadata.
#[derive(Debug, Clone, Default)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<(String, Scheme)>,
    pub docs: HashMap<String, String>,
    pub directives: HashMap<String, Vec<DirectiveApplication>>,
}

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add(&mut self, key: impl Into<String>, scheme: Scheme) {
        self.fields.push((key.into(), scheme));
    }

    pub fn scheme_of(&self, key: &str) -> Option<&Scheme> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, s)| s)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|(k, _)| k.clone()).collect()
    }
}

/// Structural equality on resolved types. Named modules compare by
/// identity; anonymous modules compare by their field structure.
pub fn types_equal(a: &Type, b: &Type) -> bool {
    match (a, b) {
        (Type::Var(x), Type::Var(y)) => x == y,
        (Type::NonNull(x), Type::NonNull(y)) => types_equal(x, y),
        (Type::List(x), Type::List(y)) => types_equal(x, y),
        (Type::Fun(f), Type::Fun(g)) => {
            records_equal(&f.args, &g.args) && types_equal(&f.ret, &g.ret)
        }
        (Type::Record(x), Type::Record(y)) => records_equal(x, y),
        (Type::Module(x), Type::Module(y)) => x.type_eq(y),
        _ => false,
    }
}

fn records_equal(a: &RecordType, b: &RecordType) -> bool {
    if a.fields.len() != b.fields.len() {
        return false;
    }
    if !a.name.is_empty() && !b.name.is_empty() && a.name != b.name {
        return false;
    }
    a.fields
        .iter()
        .zip(b.fields.iter())
        .all(|((ka, sa), (kb, sb))| ka == kb && types_equal(&sa.ty, &sb.ty))
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        types_equal(self, other)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Var(v) => write!(f, "t{}", v.0),
            Type::NonNull(inner) => write!(f, "{inner}!"),
            Type::List(elem) => write!(f, "[{elem}]"),
            Type::Fun(ft) => {
                write!(f, "(")?;
                for (i, (key, scheme)) in ft.args.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {}", scheme.ty)?;
                }
                write!(f, "): {}", ft.ret)
            }
            Type::Record(rec) => {
                if !rec.name.is_empty() {
                    write!(f, "{}", rec.name)?;
                }
                write!(f, "{{")?;
                for (i, (key, scheme)) in rec.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {}", scheme.ty)?;
                }
                write!(f, "}}")
            }
            Type::Module(module) => {
                let name = module.name();
                if name.is_empty() {
                    write!(f, "{}", Type::Record(module.as_record()))
                } else {
                    write!(f, "{name}")
                }
            }
        }
    }
}

/// Type scheme: forall vars . type (for let-polymorphism).
#[derive(Debug, Clone)]
pub struct Scheme {
    pub vars: Vec<TypeVar>,
    pub ty: Type,
}

impl Scheme {
    pub fn mono(ty: Type) -> Self {
        Self { vars: vec![], ty }
    }

    pub fn is_mono(&self) -> bool {
        self.vars.is_empty()
    }

    /// The underlying type, provided the scheme is monomorphic.
    pub fn mono_type(&self) -> Option<&Type> {
        if self.is_mono() {
            Some(&self.ty)
        } else {
            None
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.vars.is_empty() {
            return write!(f, "{}", self.ty);
        }
        write!(f, "forall")?;
        for v in &self.vars {
            write!(f, " t{}", v.0)?;
        }
        write!(f, ". {}", self.ty)
    }
}

/// Mutable substitution: maps TypeVar -> Type, and mints fresh variables.
#[derive(Debug)]
pub struct Subst {
    bindings: Vec<Option<Type>>,
    next_var: u32,
}

impl Subst {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
            next_var: 0,
        }
    }

    pub fn fresh(&mut self) -> Type {
        let v = TypeVar(self.next_var);
        self.next_var += 1;
        self.bindings.push(None);
        Type::Var(v)
    }

    pub fn bind(&mut self, v: TypeVar, ty: Type) {
        let idx = v.0 as usize;
        if idx < self.bindings.len() {
            self.bindings[idx] = Some(ty);
        }
    }

    /// Walk a type, resolving any bound type variables.
    pub fn resolve(&self, ty: &Type) -> Type {
        match ty {
            Type::Var(v) => {
                let idx = v.0 as usize;
                if idx < self.bindings.len() {
                    if let Some(bound) = &self.bindings[idx] {
                        return self.resolve(bound);
                    }
                }
                ty.clone()
            }
            Type::NonNull(inner) => Type::non_null(self.resolve(inner)),
            Type::List(elem) => Type::list(self.resolve(elem)),
            Type::Fun(ft) => Type::fun(self.resolve_record(&ft.args), self.resolve(&ft.ret)),
            Type::Record(rec) => Type::Record(self.resolve_record(rec)),
            Type::Module(_) => ty.clone(),
        }
    }

    fn resolve_record(&self, rec: &RecordType) -> RecordType {
        let mut out = rec.clone();
        for (_, scheme) in &mut out.fields {
            scheme.ty = self.resolve(&scheme.ty);
        }
        out
    }

    /// Occurs check: does TypeVar v occur in type ty?
    fn occurs_in(&self, v: TypeVar, ty: &Type) -> bool {
        match self.resolve(ty) {
            Type::Var(u) => u == v,
            Type::NonNull(inner) => self.occurs_in(v, &inner),
            Type::List(elem) => self.occurs_in(v, &elem),
            Type::Fun(ft) => {
                ft.args
                    .fields
                    .iter()
                    .any(|(_, s)| self.occurs_in(v, &s.ty))
                    || self.occurs_in(v, &ft.ret)
            }
            Type::Record(rec) => rec.fields.iter().any(|(_, s)| self.occurs_in(v, &s.ty)),
            Type::Module(_) => false,
        }
    }

    pub fn snapshot(&self) -> Vec<Option<Type>> {
        self.bindings.clone()
    }

    pub fn restore(&mut self, snapshot: Vec<Option<Type>>) {
        let extra = self.bindings.len().saturating_sub(snapshot.len());
        self.bindings = snapshot;
        // Variables minted after the snapshot stay allocated, unbound.
        for _ in 0..extra {
            self.bindings.push(None);
        }
    }
}

impl Default for Subst {
    fn default() -> Self {
        Self::new()
    }
}

fn bind_var(subst: &mut Subst, v: TypeVar, ty: &Type) -> Result<()> {
    if let Type::Var(u) = ty {
        if *u == v {
            return Ok(());
        }
    }
    if subst.occurs_in(v, ty) {
        return Err(Error::new(ErrorKind::OccursCheck {
            var: Type::Var(v),
            ty: ty.clone(),
        }));
    }
    subst.bind(v, ty.clone());
    Ok(())
}

/// Unify `have` against `want` under the substitution.
///
/// A `NonNull` on the `have` side unwraps freely against a nullable `want`
/// (non-null is assignable to nullable); a nullable `have` against a
/// non-null `want` is a hard failure. Callers that also want declared
/// subtyping use [`assignable`].
pub fn unify(subst: &mut Subst, have: &Type, want: &Type) -> Result<()> {
    let have = subst.resolve(have);
    let want = subst.resolve(want);

    match (&have, &want) {
        (Type::Var(v), _) => bind_var(subst, *v, &want),
        (_, Type::Var(v)) => bind_var(subst, *v, &have),
        (Type::NonNull(a), Type::NonNull(b)) => unify(subst, a, b),
        // Non-null `have` unwraps against a nullable `want`.
        (Type::NonNull(a), _) => unify(subst, a, &want),
        (Type::List(a), Type::List(b)) => unify(subst, a, b),
        (Type::Fun(f), Type::Fun(g)) => {
            unify_records(subst, &f.args, &g.args)
                .and_then(|_| unify(subst, &f.ret, &g.ret))
                .map_err(|_| mismatch(&have, &want))
        }
        (Type::Record(a), Type::Record(b)) => {
            unify_records(subst, a, b).map_err(|_| mismatch(&have, &want))
        }
        (Type::Module(a), Type::Module(b)) => {
            if a.type_eq(b) {
                Ok(())
            } else {
                Err(mismatch(&have, &want))
            }
        }
        _ => Err(mismatch(&have, &want)),
    }
}

fn unify_records(subst: &mut Subst, a: &RecordType, b: &RecordType) -> Result<()> {
    if a.fields.len() != b.fields.len() {
        return Err(mismatch(&Type::Record(a.clone()), &Type::Record(b.clone())));
    }
    for ((ka, sa), (kb, sb)) in a.fields.iter().zip(b.fields.iter()) {
        if ka != kb {
            return Err(mismatch(&Type::Record(a.clone()), &Type::Record(b.clone())));
        }
        unify(subst, &sa.ty, &sb.ty)?;
    }
    Ok(())
}

fn mismatch(have: &Type, want: &Type) -> Error {
    Error::new(ErrorKind::Unification {
        have: have.clone(),
        want: want.clone(),
    })
}

/// The weaker assignability relation: unification, falling back to
/// covariant component-wise assignability for same-constructor composites,
/// then to a recursive walk of `have`'s declared supertypes.
pub fn assignable(subst: &mut Subst, have: &Type, want: &Type) -> Result<()> {
    let snapshot = subst.snapshot();
    let unify_err = match unify(subst, have, want) {
        Ok(()) => return Ok(()),
        Err(err) => {
            subst.restore(snapshot);
            err
        }
    };

    let have = subst.resolve(have);
    let want = subst.resolve(want);

    match (&have, &want) {
        (Type::NonNull(a), Type::NonNull(b)) | (Type::List(a), Type::List(b)) => {
            assignable(subst, a, b).map_err(|_| unify_err)
        }
        _ => {
            for supertype in have.supertypes() {
                let snapshot = subst.snapshot();
                if assignable(subst, &supertype, &want).is_ok() {
                    return Ok(());
                }
                subst.restore(snapshot);
            }
            Err(unify_err)
        }
    }
}

fn free_vars_ty(ty: &Type, out: &mut BTreeSet<TypeVar>) {
    match ty {
        Type::Var(v) => {
            out.insert(*v);
        }
        Type::NonNull(inner) | Type::List(inner) => free_vars_ty(inner, out),
        Type::Fun(ft) => {
            for (_, scheme) in &ft.args.fields {
                free_vars_ty(&scheme.ty, out);
            }
            free_vars_ty(&ft.ret, out);
        }
        Type::Record(rec) => {
            for (_, scheme) in &rec.fields {
                free_vars_ty(&scheme.ty, out);
            }
        }
        Type::Module(_) => {}
    }
}

/// Free type variables of a scheme: those of its type minus the bound set.
pub fn scheme_free_vars(scheme: &Scheme, subst: &Subst, out: &mut BTreeSet<TypeVar>) {
    let mut vars = BTreeSet::new();
    free_vars_ty(&subst.resolve(&scheme.ty), &mut vars);
    for v in &scheme.vars {
        vars.remove(v);
    }
    out.extend(vars);
}

/// Generalize a type into a scheme by quantifying over variables not free
/// in the environment.
pub fn generalize(env: Option<&Env>, subst: &Subst, ty: &Type) -> Scheme {
    let resolved = subst.resolve(ty);
    let env_fvs = match env {
        Some(env) => env.free_type_vars(subst),
        None => BTreeSet::new(),
    };
    let mut ty_fvs = BTreeSet::new();
    free_vars_ty(&resolved, &mut ty_fvs);
    let vars: Vec<TypeVar> = ty_fvs.difference(&env_fvs).copied().collect();
    Scheme { vars, ty: resolved }
}

/// Instantiate a scheme by replacing its quantified variables with fresh
/// ones.
pub fn instantiate(subst: &mut Subst, scheme: &Scheme) -> Type {
    if scheme.vars.is_empty() {
        return scheme.ty.clone();
    }
    let mapping: HashMap<TypeVar, Type> = scheme
        .vars
        .iter()
        .map(|v| (*v, subst.fresh()))
        .collect();
    substitute(&scheme.ty, &mapping)
}

fn substitute(ty: &Type, mapping: &HashMap<TypeVar, Type>) -> Type {
    match ty {
        Type::Var(v) => mapping.get(v).cloned().unwrap_or_else(|| ty.clone()),
        Type::NonNull(inner) => Type::non_null(substitute(inner, mapping)),
        Type::List(elem) => Type::list(substitute(elem, mapping)),
        Type::Fun(ft) => {
            let mut args = ft.args.clone();
            for (_, scheme) in &mut args.fields {
                scheme.ty = substitute(&scheme.ty, mapping);
            }
            Type::fun(args, substitute(&ft.ret, mapping))
        }
        Type::Record(rec) => {
            let mut out = rec.clone();
            for (_, scheme) in &mut out.fields {
                scheme.ty = substitute(&scheme.ty, mapping);
            }
            Type::Record(out)
        }
        Type::Module(_) => ty.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ModuleKind, ModuleRef};
    use crate::errors::ErrorKind;

    fn int_module() -> ModuleRef {
        ModuleRef::new("Int", ModuleKind::Scalar)
    }

    #[test]
    fn non_null_is_assignable_to_nullable() {
        let int = Type::Module(int_module());
        let mut subst = Subst::new();
        assert!(unify(&mut subst, &Type::non_null(int.clone()), &int).is_ok());
    }

    #[test]
    fn nullable_is_not_assignable_to_non_null() {
        let int = Type::Module(int_module());
        let mut subst = Subst::new();
        let err = unify(&mut subst, &int, &Type::non_null(int.clone())).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Unification { .. }));
    }

    #[test]
    fn non_null_never_nests() {
        let int = Type::Module(int_module());
        let t = Type::non_null(Type::non_null(int));
        assert!(matches!(t, Type::NonNull(ref inner) if !inner.is_non_null()));
    }

    #[test]
    fn var_binding_resolves() {
        let int = Type::Module(int_module());
        let mut subst = Subst::new();
        let v = subst.fresh();
        unify(&mut subst, &v, &Type::non_null(int.clone())).unwrap();
        assert_eq!(subst.resolve(&v), Type::non_null(int));
    }

    #[test]
    fn occurs_check_rejects_infinite_types() {
        let mut subst = Subst::new();
        let v = subst.fresh();
        let infinite = Type::list(v.clone());
        let err = unify(&mut subst, &v, &infinite).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::OccursCheck { .. }));
    }

    #[test]
    fn lists_unify_covariantly_under_assignable() {
        let int = Type::Module(int_module());
        let mut subst = Subst::new();
        // [Int!] is assignable to [Int]
        let have = Type::list(Type::non_null(int.clone()));
        let want = Type::list(int);
        assert!(assignable(&mut subst, &have, &want).is_ok());
    }

    #[test]
    fn named_modules_compare_by_identity() {
        let a = ModuleRef::new("User", ModuleKind::Object);
        let b = ModuleRef::new("User", ModuleKind::Object);
        assert!(a.type_eq(&a.clone()));
        assert!(!a.type_eq(&b));
    }

    #[test]
    fn module_is_assignable_to_declared_interface() {
        let iface = ModuleRef::new("Node", ModuleKind::Interface);
        let user = ModuleRef::new("User", ModuleKind::Object);
        user.add_interface(iface.clone());
        let mut subst = Subst::new();
        assert!(assignable(
            &mut subst,
            &Type::Module(user),
            &Type::Module(iface)
        )
        .is_ok());
    }

    #[test]
    fn generalize_then_instantiate_gives_fresh_vars() {
        let mut subst = Subst::new();
        let v = subst.fresh();
        let scheme = generalize(None, &subst, &v);
        assert_eq!(scheme.vars.len(), 1);
        let inst1 = instantiate(&mut subst, &scheme);
        let inst2 = instantiate(&mut subst, &scheme);
        assert_ne!(inst1, inst2);
    }
}
