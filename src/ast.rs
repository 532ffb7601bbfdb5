//! Core value representation for the interpreter. The main enum, [`Value`],
//! covers every runtime datum: numbers, symbols, errors, built-in and
//! user-defined functions, and the two list forms (S-expressions and
//! Q-expressions). Equality is structural, with two deliberate exceptions:
//! builtins compare by identity of their registry entry, and closures
//! compare by formals and body while ignoring their captured environments.
//! Cloning a value deep-copies every owned sub-structure; the one shared
//! piece is a closure's captured environment, which is a handle and travels
//! by reference count.

use std::fmt;

use crate::Error;
use crate::builtinops::BuiltinDef;
use crate::evaluator::Environment;

/// Formal parameter marker that collects all remaining arguments of a call
/// into a single Q-expression.
pub(crate) const VARIADIC_MARKER: &str = "&";

/// A runtime value.
///
/// S-expressions are the only variant the evaluator rewrites; everything
/// else either evaluates to itself or, for symbols, to whatever the
/// environment binds.
#[derive(Clone)]
pub enum Value {
    /// IEEE-754 double. NaN and infinities propagate like any other number.
    Number(f64),
    /// A first-class evaluation failure. Never evaluated further, only
    /// propagated outward or printed.
    Error(Error),
    /// A bare identifier awaiting lookup
    Symbol(String),
    /// A native operation from the fixed registry
    Builtin(&'static BuiltinDef),
    /// A user-defined function: formal names, an unevaluated body, and the
    /// environment captured where the function was created
    Lambda {
        formals: Vec<String>,
        body: Box<Value>,
        env: Environment,
    },
    /// Function application: head evaluates to the function, the rest to
    /// its arguments
    Sexpr(Vec<Value>),
    /// Inert list data, untouched until `eval` or a list operation
    /// deconstructs it
    Qexpr(Vec<Value>),
}

impl Value {
    /// Human-readable name of this variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Error(_) => "error",
            Value::Symbol(_) => "symbol",
            Value::Builtin(_) | Value::Lambda { .. } => "function",
            Value::Sexpr(_) => "S-expression",
            Value::Qexpr(_) => "Q-expression",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Error(e) => write!(f, "Error({e:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Builtin(def) => write!(f, "Builtin({})", def.name),
            Value::Lambda { formals, body, .. } => {
                write!(f, "Lambda(formals={formals:?}, body={body:?})")
            }
            Value::Sexpr(items) => write!(f, "Sexpr({items:?})"),
            Value::Qexpr(items) => write!(f, "Qexpr({items:?})"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            // Builtins compare by registry identity, not function pointer
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            // Captured environments are not compared
            (
                Value::Lambda {
                    formals: f1,
                    body: b1,
                    ..
                },
                Value::Lambda {
                    formals: f2,
                    body: b2,
                    ..
                },
            ) => f1 == f2 && b1 == b2,
            (Value::Sexpr(a), Value::Sexpr(b)) | (Value::Qexpr(a), Value::Qexpr(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Error(e) => write!(f, "Error: {e}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Builtin(def) => write!(f, "<{}>", def.name),
            Value::Lambda { formals, body, .. } => {
                write!(f, "(\\ {{")?;
                for (i, name) in formals.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{name}")?;
                }
                write!(f, "}} {body})")
            }
            Value::Sexpr(items) => write_expr(f, items, '(', ')'),
            Value::Qexpr(items) => write_expr(f, items, '{', '}'),
        }
    }
}

fn write_expr(f: &mut fmt::Formatter<'_>, items: &[Value], open: char, close: char) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "{close}")
}

/// Helper for creating number values in tests
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn num(n: f64) -> Value {
    Value::Number(n)
}

/// Helper for creating symbols in tests
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper for creating S-expressions in tests
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sexpr(items: Vec<Value>) -> Value {
    Value::Sexpr(items)
}

/// Helper for creating Q-expressions in tests
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn qexpr(items: Vec<Value>) -> Value {
    Value::Qexpr(items)
}
