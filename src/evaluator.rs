//! Environments and the eval/apply core.
//!
//! An [`Environment`] is an insertion-ordered map from symbol names to
//! bindings, each binding carrying a locked flag, plus an optional parent
//! environment for lexical scoping. Environments are shared by handle
//! (reference counted): a closure keeps its captured environment alive for
//! as long as the closure itself lives, across and beyond the call frame
//! that created it. Evaluation is single-threaded and synchronous, so the
//! interior mutability needs no locking.
//!
//! Evaluation rewrites S-expressions only. Children are evaluated fully,
//! left to right, before any error check, so the first error among the
//! results (by position, not by time of occurrence) becomes the result of
//! the whole expression and nothing is applied.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::Error;
use crate::ast::{VARIADIC_MARKER, Value};
use crate::builtinops;

#[derive(Clone)]
struct Binding {
    value: Value,
    locked: bool,
}

#[derive(Clone)]
struct Scope {
    bindings: HashMap<String, Binding>,
    /// Names in the order they were first defined. Only the `env` builtin
    /// observes this order.
    order: Vec<String>,
    parent: Option<Environment>,
}

/// A shared handle to one scope in a lexical chain.
///
/// Cloning the handle shares the scope; use [`Environment::copy`] for a
/// deep copy of the bindings.
#[derive(Clone)]
pub struct Environment {
    inner: Rc<RefCell<Scope>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            inner: Rc::new(RefCell::new(Scope {
                bindings: HashMap::new(),
                order: Vec::new(),
                parent: None,
            })),
        }
    }

    /// A fresh child scope, used as the call frame of one closure
    /// invocation. The parent is shared, not copied.
    pub fn with_parent(parent: Environment) -> Self {
        let env = Environment::new();
        env.inner.borrow_mut().parent = Some(parent);
        env
    }

    /// Bind `name` in this scope. An existing unlocked entry is
    /// overwritten in place; an existing locked entry is left untouched
    /// and the attempt is reported rather than failed, since `def` must
    /// still produce a valid result.
    pub fn define(&self, name: &str, value: Value, locked: bool) {
        let mut scope = self.inner.borrow_mut();
        match scope.bindings.get_mut(name) {
            Some(binding) if binding.locked => {
                warn!(name, "cannot overwrite locked binding");
            }
            Some(binding) => binding.value = value,
            None => {
                scope.order.push(name.to_owned());
                scope
                    .bindings
                    .insert(name.to_owned(), Binding { value, locked });
            }
        }
    }

    /// Resolve `name` here or anywhere up the parent chain.
    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        let scope = self.inner.borrow();
        if let Some(binding) = scope.bindings.get(name) {
            return Ok(binding.value.clone());
        }
        match &scope.parent {
            Some(parent) => parent.lookup(name),
            None => Err(Error::UnboundSymbol(name.to_owned())),
        }
    }

    /// Deep-copy the bindings of this scope (values cloned, locks
    /// preserved). The parent chain is shared with the original.
    pub fn copy(&self) -> Environment {
        Environment {
            inner: Rc::new(RefCell::new(self.inner.borrow().clone())),
        }
    }

    /// Names bound in this scope (parents excluded), in definition order
    pub fn names(&self) -> Vec<String> {
        self.inner.borrow().order.clone()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = self.inner.borrow();
        f.debug_struct("Environment")
            .field("names", &scope.order)
            .field("has_parent", &scope.parent.is_some())
            .finish()
    }
}

/// Create the root environment with every builtin installed as a locked
/// binding. Built once per process (or REPL session) and reused.
pub fn create_global_env() -> Environment {
    let env = Environment::new();
    for def in builtinops::registry() {
        env.define(def.name, Value::Builtin(def), true);
    }
    debug!(
        count = builtinops::registry().len(),
        "installed builtin bindings"
    );
    env
}

/// Evaluate an expression in the given environment.
///
/// Numbers, errors, functions and Q-expressions evaluate to themselves.
/// Symbols are looked up; a symbol bound to a nullary builtin invokes it
/// immediately, so constant-like operations (`env`, `exit`) work when
/// referenced bare.
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    match expr {
        Value::Symbol(name) => {
            let value = env.lookup(name)?;
            if let Value::Builtin(def) = &value {
                if def.nullary {
                    return (def.func)(env, Vec::new());
                }
            }
            Ok(value)
        }
        Value::Sexpr(children) => eval_sexpr(children, env),
        other => Ok(other.clone()),
    }
}

fn eval_sexpr(children: &[Value], env: &Environment) -> Result<Value, Error> {
    // Every child is evaluated before any result is inspected, so a
    // side-effecting operation in a later position still runs even when
    // an earlier sibling failed.
    let results: Vec<Result<Value, Error>> =
        children.iter().map(|child| eval(child, env)).collect();

    let mut evaluated = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Err(err) | Ok(Value::Error(err)) => return Err(err),
            Ok(value) => evaluated.push(value),
        }
    }

    // () is its own value
    if evaluated.is_empty() {
        return Ok(Value::Sexpr(Vec::new()));
    }
    // A singleton collapses to its sole element
    if evaluated.len() == 1 {
        return Ok(evaluated.remove(0));
    }

    let func = evaluated.remove(0);
    apply(func, evaluated, env)
}

fn apply(func: Value, args: Vec<Value>, env: &Environment) -> Result<Value, Error> {
    match func {
        Value::Builtin(def) => {
            def.arity.validate(args.len())?;
            (def.func)(env, args)
        }
        Value::Lambda {
            formals,
            body,
            env: captured,
        } => call_lambda(formals, *body, &captured, args),
        other => Err(Error::NotCallable(other.type_name())),
    }
}

/// Bind arguments positionally in a fresh child of the captured
/// environment, then either evaluate the body (all formals bound), curry
/// (too few arguments), or fail (too many and no `&` marker).
fn call_lambda(
    formals: Vec<String>,
    body: Value,
    captured: &Environment,
    args: Vec<Value>,
) -> Result<Value, Error> {
    let expected = formals.len();
    let given = args.len();
    let frame = Environment::with_parent(captured.clone());
    let mut formals: VecDeque<String> = formals.into();
    let mut args: VecDeque<Value> = args.into();

    while let Some(arg) = args.pop_front() {
        let Some(formal) = formals.pop_front() else {
            return Err(Error::arity_mismatch(expected, given));
        };
        if formal == VARIADIC_MARKER {
            let rest_name = formals.pop_front().ok_or(Error::InvalidFormals)?;
            let mut rest = vec![arg];
            rest.extend(args.drain(..));
            frame.define(&rest_name, Value::Qexpr(rest), false);
        } else {
            frame.define(&formal, arg, false);
        }
    }

    // A call that stops right before the rest marker still binds it, to {}
    if formals.front().is_some_and(|f| f == VARIADIC_MARKER) {
        formals.pop_front();
        let rest_name = formals.pop_front().ok_or(Error::InvalidFormals)?;
        frame.define(&rest_name, Value::Qexpr(Vec::new()), false);
    }

    if formals.is_empty() {
        // Full application: the stored body list becomes an S-expression
        // and is evaluated in the new frame
        let body = match body {
            Value::Qexpr(items) => Value::Sexpr(items),
            other => other,
        };
        eval(&body, &frame)
    } else {
        // Partial application: the frame holding the bound prefix becomes
        // the captured environment of the remaining function
        Ok(Value::Lambda {
            formals: formals.into(),
            body: Box::new(body),
            env: frame,
        })
    }
}
