//! The Grebe language: a small statically-typed, expression-oriented
//! language whose nominal type universe is generated from an external
//! schema introspection document. Programs are type-checked with
//! Hindley-Milner-style inference extended with non-null subtyping, then
//! evaluated by a tree-walking interpreter producing persistent,
//! copy-on-write values.

pub mod ast;
pub mod check;
pub mod env;
pub mod errors;
pub mod interp;
pub mod parser;
pub mod schema;
pub mod syntax;
pub mod types;

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ast::Node;
use check::Checker;
use env::Env;
use errors::{Error, ErrorKind, Result};
use interp::{EvalEnv, Interp, Value};

pub use parser::parse;

/// Ambient cancellation token threaded through every inference and
/// evaluation call. The core never spawns work of its own; this exists so
/// a long-running external call can be aborted by the host.
#[derive(Clone, Default, Debug)]
pub struct Ctx {
    cancelled: Arc<AtomicBool>,
}

impl Ctx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::new(ErrorKind::Cancelled))
        } else {
            Ok(())
        }
    }
}

/// Type-check a program against a fresh root environment. Returns the
/// checker (whose side tables the evaluator consumes) and the populated
/// environment.
pub fn check_program(forms: &[Node]) -> Result<(Checker, Env)> {
    check_program_with_ctx(forms, Ctx::new())
}

pub fn check_program_with_ctx(forms: &[Node], ctx: Ctx) -> Result<(Checker, Env)> {
    let mut checker = Checker::new(ctx);
    let env = env::root_env(&mut checker.subst);
    checker.check_program(&env, forms)?;
    Ok((checker, env))
}

/// Type-check a program against an environment bootstrapped from a schema
/// introspection document.
pub fn check_program_with_schema(
    forms: &[Node],
    schema: &schema::Schema,
) -> Result<(Checker, Env)> {
    let mut checker = Checker::new(Ctx::new());
    let env = env::root_env(&mut checker.subst);
    let env = schema::bind_schema(&env, schema)?;
    checker.check_program(&env, forms)?;
    Ok((checker, env))
}

/// Check and evaluate a program, returning the final value.
pub fn eval_program(forms: &[Node]) -> Result<Value> {
    let (checker, type_env) = check_program(forms)?;
    let eval_env = interp::new_eval_env(&type_env);
    let interp = Interp::new(&checker, Ctx::new());
    interp.eval_program(&eval_env, forms)
}

/// Parse, check, and evaluate a source string.
pub fn eval_source(source: &str) -> Result<Value> {
    let forms = parse(source)?;
    eval_program(&forms)
}

/// Parse, check, and evaluate against a schema-backed environment with a
/// remote client for schema-backed field invocation.
pub fn eval_source_with_schema(
    source: &str,
    schema: &schema::Schema,
    client: Rc<dyn interp::remote::RemoteClient>,
) -> Result<Value> {
    let forms = parse(source)?;
    let (checker, type_env) = check_program_with_schema(&forms, schema)?;
    let eval_env = interp::eval_env_with_schema(&type_env, schema, client);
    let interp = Interp::new(&checker, Ctx::new());
    interp.eval_program(&eval_env, &forms)
}

/// Check and evaluate against pre-built environments. The REPL uses this
/// to keep one environment alive across inputs.
pub fn eval_in(
    forms: &[Node],
    checker: &mut Checker,
    type_env: &Env,
    eval_env: &EvalEnv,
) -> Result<Value> {
    checker.check_program(type_env, forms)?;
    let interp = Interp::new(checker, Ctx::new());
    interp.eval_program(eval_env, forms)
}
