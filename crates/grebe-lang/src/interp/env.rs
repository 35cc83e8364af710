use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::value::Value;
use crate::ast::Visibility;
use crate::env::ModuleRef;

/// Backing state for a module value. Instances form parent chains: a
/// layered clone is an empty child whose reads delegate upward and whose
/// writes stay local, which is what keeps field mutation copy-on-write.
pub struct ModuleValueData {
    /// The nominal type of this instance, when it has one.
    pub module: Option<ModuleRef>,
    values: HashMap<String, Value>,
    visibilities: HashMap<String, Visibility>,
    parent: Option<ModuleHandle>,
    /// A fork boundary: reassignments never propagate above it.
    is_forked: bool,
    dynamic_scope: Option<Value>,
}

#[derive(Clone)]
pub struct ModuleHandle(Rc<RefCell<ModuleValueData>>);

impl ModuleHandle {
    pub fn new(module: Option<ModuleRef>) -> Self {
        Self(Rc::new(RefCell::new(ModuleValueData {
            module,
            values: HashMap::new(),
            visibilities: HashMap::new(),
            parent: None,
            is_forked: false,
            dynamic_scope: None,
        })))
    }

    pub fn ptr_eq(&self, other: &ModuleHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn module(&self) -> Option<ModuleRef> {
        self.0.borrow().module.clone()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let data = self.0.borrow();
        if let Some(value) = data.values.get(name) {
            return Some(value.clone());
        }
        data.parent.as_ref().and_then(|p| p.get(name))
    }

    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.0.borrow().values.get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let visibility = self.visibility_of(&name);
        let mut data = self.0.borrow_mut();
        data.values.insert(name.clone(), value);
        data.visibilities.insert(name, visibility);
    }

    pub fn set_with_visibility(&self, name: impl Into<String>, value: Value, visibility: Visibility) {
        let name = name.into();
        let mut data = self.0.borrow_mut();
        data.values.insert(name.clone(), value);
        data.visibilities.insert(name, visibility);
    }

    pub fn visibility_of(&self, name: &str) -> Visibility {
        let data = self.0.borrow();
        if let Some(vis) = data.visibilities.get(name) {
            return *vis;
        }
        match &data.parent {
            Some(parent) => parent.visibility_of(name),
            None => Visibility::Private,
        }
    }

    /// Reassign following scoping rules: update locally when the name is
    /// local; otherwise delegate to the parent when it knows the name and
    /// no fork boundary intervenes; otherwise bind locally.
    pub fn reassign(&self, name: &str, value: Value) {
        let exists_locally = self.0.borrow().values.contains_key(name);
        if exists_locally {
            self.set(name, value);
            return;
        }
        let parent = {
            let data = self.0.borrow();
            if data.is_forked {
                None
            } else {
                data.parent.clone()
            }
        };
        match parent {
            Some(parent) if parent.get(name).is_some() => parent.reassign(name, value),
            _ => self.set(name, value),
        }
    }

    /// An empty child layer; reads delegate, writes stay local.
    pub fn clone_layer(&self) -> ModuleHandle {
        let data = self.0.borrow();
        ModuleHandle(Rc::new(RefCell::new(ModuleValueData {
            module: data.module.clone(),
            values: HashMap::new(),
            visibilities: HashMap::new(),
            parent: Some(self.clone()),
            is_forked: false,
            dynamic_scope: data.dynamic_scope.clone(),
        })))
    }

    /// Like [`clone_layer`], but reassignments stop here instead of
    /// reaching the parent. Method invocation forks the receiver so the
    /// caller's value is never mutated.
    pub fn fork(&self) -> ModuleHandle {
        let forked = self.clone_layer();
        forked.0.borrow_mut().is_forked = true;
        forked
    }

    pub fn get_dynamic_scope(&self) -> Option<Value> {
        let data = self.0.borrow();
        if let Some(scope) = &data.dynamic_scope {
            return Some(scope.clone());
        }
        data.parent.as_ref().and_then(|p| p.get_dynamic_scope())
    }

    pub fn set_dynamic_scope(&self, value: Value) {
        self.0.borrow_mut().dynamic_scope = Some(value);
    }

    /// Bindings at or above the given visibility, nearest layer first,
    /// shadowed names deduplicated.
    pub fn bindings(&self, min: Visibility) -> Vec<(String, Value)> {
        let mut out: Vec<(String, Value)> = Vec::new();
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut current = Some(self.clone());
        while let Some(handle) = current {
            let data = handle.0.borrow();
            for (name, value) in &data.values {
                if seen.contains(name) {
                    continue;
                }
                if data
                    .visibilities
                    .get(name)
                    .copied()
                    .unwrap_or(Visibility::Private)
                    >= min
                {
                    out.push((name.clone(), value.clone()));
                }
                seen.insert(name.clone());
            }
            current = data.parent.clone();
        }
        out.sort_by(|(a, _), (b, _)| a.cmp(b));
        out
    }
}

/// Runtime environment: a module-value chain, or a composite layering a
/// primary (written-to) scope over a lexical fallback. Unlike inference,
/// runtime lookup prefers primary, so receiver fields shadow outer
/// bindings.
#[derive(Clone)]
pub enum EvalEnv {
    Module(ModuleHandle),
    Composite(Rc<CompositeEnv>),
}

pub struct CompositeEnv {
    pub primary: EvalEnv,
    pub lexical: EvalEnv,
}

impl EvalEnv {
    pub fn module(handle: ModuleHandle) -> EvalEnv {
        EvalEnv::Module(handle)
    }

    pub fn composite(primary: EvalEnv, lexical: EvalEnv) -> EvalEnv {
        EvalEnv::Composite(Rc::new(CompositeEnv { primary, lexical }))
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        match self {
            EvalEnv::Module(handle) => handle.get(name),
            EvalEnv::Composite(c) => c.primary.get(name).or_else(|| c.lexical.get(name)),
        }
    }

    pub fn get_local(&self, name: &str) -> Option<Value> {
        match self {
            EvalEnv::Module(handle) => handle.get_local(name),
            EvalEnv::Composite(c) => c.primary.get_local(name),
        }
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        match self {
            EvalEnv::Module(handle) => handle.set(name, value),
            EvalEnv::Composite(c) => c.primary.set(name, value),
        }
    }

    pub fn set_with_visibility(&self, name: impl Into<String>, value: Value, visibility: Visibility) {
        match self {
            EvalEnv::Module(handle) => handle.set_with_visibility(name, value, visibility),
            EvalEnv::Composite(c) => c.primary.set_with_visibility(name, value, visibility),
        }
    }

    pub fn reassign(&self, name: &str, value: Value) {
        match self {
            EvalEnv::Module(handle) => handle.reassign(name, value),
            EvalEnv::Composite(c) => c.primary.reassign(name, value),
        }
    }

    pub fn clone_layer(&self) -> EvalEnv {
        match self {
            EvalEnv::Module(handle) => EvalEnv::Module(handle.clone_layer()),
            EvalEnv::Composite(c) => {
                EvalEnv::composite(c.primary.clone_layer(), c.lexical.clone())
            }
        }
    }

    pub fn get_dynamic_scope(&self) -> Option<Value> {
        match self {
            EvalEnv::Module(handle) => handle.get_dynamic_scope(),
            EvalEnv::Composite(c) => c
                .primary
                .get_dynamic_scope()
                .or_else(|| c.lexical.get_dynamic_scope()),
        }
    }

    pub fn set_dynamic_scope(&self, value: Value) {
        match self {
            EvalEnv::Module(handle) => handle.set_dynamic_scope(value),
            EvalEnv::Composite(c) => c.primary.set_dynamic_scope(value),
        }
    }

    /// The nominal type of the nearest primary module, if any.
    pub fn type_module(&self) -> Option<ModuleRef> {
        match self {
            EvalEnv::Module(handle) => handle.module(),
            EvalEnv::Composite(c) => c.primary.type_module(),
        }
    }
}
