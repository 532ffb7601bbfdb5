//! The fixed registry of built-in operations.
//!
//! Builtins are plain native functions with the uniform signature
//! `fn(&Environment, Vec<Value>) -> Result<Value, Error>`. Each owns its
//! argument vector outright and either consumes it into a result or drops
//! it while constructing an error. The registry is installed into the root
//! environment as locked bindings at startup; a builtin value in a tree is
//! just a reference to its registry entry, which is also what printing and
//! equality use.
//!
//! Argument counts are validated once, at application time, from the
//! [`Arity`] declared in the registry, so the implementations only check
//! types. The five arithmetic operators all funnel through one
//! `builtin_op` parametrized by the operator symbol.

use std::fmt;
use std::process;

use crate::Error;
use crate::ast::{VARIADIC_MARKER, Value};
use crate::evaluator::{Environment, eval};

/// Canonical signature of a native operation. The environment is the one
/// the enclosing S-expression is being evaluated in, which is what `def`
/// writes to and `env` lists.
pub type BuiltinFn = fn(&Environment, Vec<Value>) -> Result<Value, Error>;

/// Expected number of arguments for a builtin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub(crate) fn validate(self, got: usize) -> Result<(), Error> {
        let expected = match self {
            Arity::Exact(n) if got != n => n,
            Arity::AtLeast(n) if got < n => n,
            _ => return Ok(()),
        };
        Err(Error::arity_mismatch(expected, got))
    }
}

/// One entry of the builtin registry
pub struct BuiltinDef {
    pub name: &'static str,
    pub arity: Arity,
    /// Nullary builtins are invoked immediately when their symbol is
    /// looked up bare, without any surrounding call
    pub nullary: bool,
    pub func: BuiltinFn,
}

impl fmt::Debug for BuiltinDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinDef")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("nullary", &self.nullary)
            .finish()
    }
}

static BUILTINS: &[BuiltinDef] = &[
    BuiltinDef {
        name: "list",
        arity: Arity::Any,
        nullary: false,
        func: builtin_list,
    },
    BuiltinDef {
        name: "head",
        arity: Arity::Exact(1),
        nullary: false,
        func: builtin_head,
    },
    BuiltinDef {
        name: "tail",
        arity: Arity::Exact(1),
        nullary: false,
        func: builtin_tail,
    },
    BuiltinDef {
        name: "init",
        arity: Arity::Exact(1),
        nullary: false,
        func: builtin_init,
    },
    BuiltinDef {
        name: "last",
        arity: Arity::Exact(1),
        nullary: false,
        func: builtin_last,
    },
    BuiltinDef {
        name: "len",
        arity: Arity::Exact(1),
        nullary: false,
        func: builtin_len,
    },
    BuiltinDef {
        name: "cons",
        arity: Arity::Exact(2),
        nullary: false,
        func: builtin_cons,
    },
    BuiltinDef {
        name: "join",
        arity: Arity::AtLeast(1),
        nullary: false,
        func: builtin_join,
    },
    BuiltinDef {
        name: "eval",
        arity: Arity::Exact(1),
        nullary: false,
        func: builtin_eval,
    },
    BuiltinDef {
        name: "def",
        arity: Arity::AtLeast(1),
        nullary: false,
        func: builtin_def,
    },
    BuiltinDef {
        name: "\\",
        arity: Arity::Exact(2),
        nullary: false,
        func: builtin_lambda,
    },
    BuiltinDef {
        name: "env",
        arity: Arity::Exact(0),
        nullary: true,
        func: builtin_env,
    },
    BuiltinDef {
        name: "exit",
        arity: Arity::Exact(0),
        nullary: true,
        func: builtin_exit,
    },
    BuiltinDef {
        name: "+",
        arity: Arity::AtLeast(1),
        nullary: false,
        func: builtin_add,
    },
    BuiltinDef {
        name: "-",
        arity: Arity::AtLeast(1),
        nullary: false,
        func: builtin_sub,
    },
    BuiltinDef {
        name: "*",
        arity: Arity::AtLeast(1),
        nullary: false,
        func: builtin_mul,
    },
    BuiltinDef {
        name: "/",
        arity: Arity::AtLeast(1),
        nullary: false,
        func: builtin_div,
    },
    BuiltinDef {
        name: "%",
        arity: Arity::AtLeast(1),
        nullary: false,
        func: builtin_rem,
    },
];

/// All registered builtins, in installation order
pub(crate) fn registry() -> &'static [BuiltinDef] {
    BUILTINS
}

/// Look up a builtin by name
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn find(name: &str) -> Option<&'static BuiltinDef> {
    BUILTINS.iter().find(|def| def.name == name)
}

//
// Argument extraction helpers
//

fn unpack<const N: usize>(args: Vec<Value>) -> Result<[Value; N], Error> {
    <[Value; N]>::try_from(args).map_err(|args| Error::arity_mismatch(N, args.len()))
}

fn take_qexpr(func: &'static str, value: Value) -> Result<Vec<Value>, Error> {
    match value {
        Value::Qexpr(items) => Ok(items),
        other => Err(Error::wrong_type(func, "Q-expression", other.type_name())),
    }
}

fn take_nonempty_qexpr(func: &'static str, value: Value) -> Result<Vec<Value>, Error> {
    let items = take_qexpr(func, value)?;
    if items.is_empty() {
        return Err(Error::EmptyList(func));
    }
    Ok(items)
}

//
// List operations
//

fn builtin_list(_env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::Qexpr(args))
}

fn builtin_head(_env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let [list] = unpack(args)?;
    let mut items = take_nonempty_qexpr("head", list)?;
    items.truncate(1);
    Ok(Value::Qexpr(items))
}

fn builtin_tail(_env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let [list] = unpack(args)?;
    let mut items = take_nonempty_qexpr("tail", list)?;
    items.remove(0);
    Ok(Value::Qexpr(items))
}

fn builtin_init(_env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let [list] = unpack(args)?;
    let mut items = take_nonempty_qexpr("init", list)?;
    items.pop();
    Ok(Value::Qexpr(items))
}

fn builtin_last(_env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let [list] = unpack(args)?;
    let items = take_nonempty_qexpr("last", list)?;
    let last = items.len() - 1;
    Ok(Value::Qexpr(items.into_iter().skip(last).collect()))
}

fn builtin_len(_env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let [list] = unpack(args)?;
    let items = take_qexpr("len", list)?;
    Ok(Value::Number(items.len() as f64))
}

fn builtin_cons(_env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let [head, tail] = unpack(args)?;
    let items = take_qexpr("cons", tail)?;
    let mut joined = vec![head];
    joined.extend(items);
    Ok(Value::Qexpr(joined))
}

fn builtin_join(_env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let mut joined = Vec::new();
    for arg in args {
        joined.extend(take_qexpr("join", arg)?);
    }
    Ok(Value::Qexpr(joined))
}

/// Promote a Q-expression to an S-expression and evaluate it
fn builtin_eval(env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let [quoted] = unpack(args)?;
    let items = take_qexpr("eval", quoted)?;
    eval(&Value::Sexpr(items), env)
}

//
// Definitions and functions
//

/// `(def {names...} values...)` binds each name, unlocked, in the current
/// environment and yields ()
fn builtin_def(env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let mut args = args.into_iter();
    let Some(first) = args.next() else {
        return Err(Error::arity_mismatch(1, 0));
    };
    let symbols = take_qexpr("def", first)?;
    let values: Vec<Value> = args.collect();

    let mut names = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        match symbol {
            Value::Symbol(name) => names.push(name),
            other => return Err(Error::wrong_type("def", "symbol", other.type_name())),
        }
    }

    if names.len() != values.len() {
        return Err(Error::DefMismatch {
            symbols: names.len(),
            values: values.len(),
        });
    }

    for (name, value) in names.into_iter().zip(values) {
        env.define(&name, value, false);
    }
    Ok(Value::Sexpr(Vec::new()))
}

/// `(\ {formals} {body})` builds a closure over the current environment
fn builtin_lambda(env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let [formals, body] = unpack(args)?;
    let formal_items = take_qexpr("\\", formals)?;
    if !matches!(body, Value::Qexpr(_)) {
        return Err(Error::wrong_type("\\", "Q-expression", body.type_name()));
    }

    let mut names = Vec::with_capacity(formal_items.len());
    for item in formal_items {
        match item {
            Value::Symbol(name) => names.push(name),
            other => return Err(Error::wrong_type("\\", "symbol", other.type_name())),
        }
    }

    // `&` may appear once, as the second-to-last formal
    if let Some(pos) = names.iter().position(|n| n == VARIADIC_MARKER) {
        if pos + 2 != names.len() || names[pos + 1] == VARIADIC_MARKER {
            return Err(Error::InvalidFormals);
        }
    }

    Ok(Value::Lambda {
        formals: names,
        body: Box::new(body),
        env: env.clone(),
    })
}

//
// Nullary operations
//

/// List the names bound in the current scope, in definition order
fn builtin_env(env: &Environment, _args: Vec<Value>) -> Result<Value, Error> {
    let names = env.names().into_iter().map(Value::Symbol).collect();
    Ok(Value::Qexpr(names))
}

fn builtin_exit(_env: &Environment, _args: Vec<Value>) -> Result<Value, Error> {
    println!("Exiting...");
    process::exit(0);
}

//
// Arithmetic
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        }
    }
}

/// Shared implementation of the numeric operators. All operands are
/// checked to be numbers before any is consumed. A lone operand under `-`
/// negates; a zero divisor fails instead of producing an IEEE infinity.
fn builtin_op(args: Vec<Value>, op: ArithOp) -> Result<Value, Error> {
    let mut operands = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Number(n) => operands.push(n),
            other => return Err(Error::wrong_type(op.symbol(), "number", other.type_name())),
        }
    }

    let mut operands = operands.into_iter();
    let Some(mut acc) = operands.next() else {
        return Err(Error::arity_mismatch(1, 0));
    };

    if op == ArithOp::Sub && operands.as_slice().is_empty() {
        return Ok(Value::Number(-acc));
    }

    for n in operands {
        acc = match op {
            ArithOp::Add => acc + n,
            ArithOp::Sub => acc - n,
            ArithOp::Mul => acc * n,
            ArithOp::Div => {
                if n == 0.0 {
                    return Err(Error::DivisionByZero { numerator: acc });
                }
                acc / n
            }
            ArithOp::Rem => {
                if n == 0.0 {
                    return Err(Error::ModuloByZero { numerator: acc });
                }
                acc % n
            }
        };
    }
    Ok(Value::Number(acc))
}

fn builtin_add(_env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    builtin_op(args, ArithOp::Add)
}

fn builtin_sub(_env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    builtin_op(args, ArithOp::Sub)
}

fn builtin_mul(_env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    builtin_op(args, ArithOp::Mul)
}

fn builtin_div(_env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    builtin_op(args, ArithOp::Div)
}

fn builtin_rem(_env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    builtin_op(args, ArithOp::Rem)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ast::{num, qexpr, sym};
    use crate::evaluator::create_global_env;

    /// Invoke a builtin through the registry the way the evaluator does,
    /// including the arity check
    fn call_builtin(name: &str, args: Vec<Value>) -> Result<Value, Error> {
        let def = find(name).unwrap_or_else(|| panic!("builtin '{name}' should exist"));
        let env = create_global_env();
        def.arity.validate(args.len())?;
        (def.func)(&env, args)
    }

    #[test]
    fn test_registry_is_consistent() {
        let mut seen = std::collections::HashSet::new();
        for def in registry() {
            assert!(seen.insert(def.name), "duplicate builtin '{}'", def.name);
        }

        // Only the constant-like operations are nullary
        let nullary: Vec<&str> = registry()
            .iter()
            .filter(|def| def.nullary)
            .map(|def| def.name)
            .collect();
        assert_eq!(nullary, vec!["env", "exit"]);
    }

    #[test]
    fn test_arity_validation() {
        use Arity::*;

        Exact(2).validate(2).unwrap();
        Exact(2).validate(1).unwrap_err();
        Exact(2).validate(3).unwrap_err();

        AtLeast(1).validate(1).unwrap();
        AtLeast(1).validate(5).unwrap();
        AtLeast(1).validate(0).unwrap_err();

        Any.validate(0).unwrap();
        Any.validate(100).unwrap();

        assert_eq!(
            Exact(2).validate(1),
            Err(Error::arity_mismatch(2, 1))
        );
    }

    #[test]
    fn test_list_builtins_directly() {
        let cases: Vec<(&str, Vec<Value>, Result<Value, Error>)> = vec![
            ("list", vec![], Ok(qexpr(vec![]))),
            (
                "list",
                vec![num(1.0), sym("a")],
                Ok(qexpr(vec![num(1.0), sym("a")])),
            ),
            (
                "head",
                vec![qexpr(vec![num(1.0), num(2.0)])],
                Ok(qexpr(vec![num(1.0)])),
            ),
            ("head", vec![qexpr(vec![])], Err(Error::EmptyList("head"))),
            (
                "head",
                vec![num(1.0)],
                Err(Error::wrong_type("head", "Q-expression", "number")),
            ),
            (
                "tail",
                vec![qexpr(vec![num(1.0), num(2.0), num(3.0)])],
                Ok(qexpr(vec![num(2.0), num(3.0)])),
            ),
            ("tail", vec![qexpr(vec![])], Err(Error::EmptyList("tail"))),
            (
                "init",
                vec![qexpr(vec![num(1.0), num(2.0), num(3.0)])],
                Ok(qexpr(vec![num(1.0), num(2.0)])),
            ),
            (
                "last",
                vec![qexpr(vec![num(1.0), num(2.0), num(3.0)])],
                Ok(qexpr(vec![num(3.0)])),
            ),
            ("len", vec![qexpr(vec![])], Ok(num(0.0))),
            (
                "len",
                vec![qexpr(vec![num(1.0), num(2.0)])],
                Ok(num(2.0)),
            ),
            (
                "cons",
                vec![num(0.0), qexpr(vec![num(1.0)])],
                Ok(qexpr(vec![num(0.0), num(1.0)])),
            ),
            (
                "cons",
                vec![num(0.0), num(1.0)],
                Err(Error::wrong_type("cons", "Q-expression", "number")),
            ),
            (
                "join",
                vec![qexpr(vec![num(1.0)]), qexpr(vec![num(2.0)])],
                Ok(qexpr(vec![num(1.0), num(2.0)])),
            ),
            (
                "join",
                vec![qexpr(vec![num(1.0)]), num(2.0)],
                Err(Error::wrong_type("join", "Q-expression", "number")),
            ),
            ("join", vec![], Err(Error::arity_mismatch(1, 0))),
            ("head", vec![], Err(Error::arity_mismatch(1, 0))),
            (
                "head",
                vec![qexpr(vec![]), qexpr(vec![])],
                Err(Error::arity_mismatch(1, 2)),
            ),
        ];

        for (i, (name, args, expected)) in cases.into_iter().enumerate() {
            let actual = call_builtin(name, args);
            assert_eq!(actual, expected, "case #{} '{name}'", i + 1);
        }
    }

    #[test]
    fn test_arithmetic_builtins_directly() {
        let cases: Vec<(&str, Vec<Value>, Result<Value, Error>)> = vec![
            ("+", vec![num(1.0), num(2.0), num(3.0)], Ok(num(6.0))),
            ("+", vec![num(5.0)], Ok(num(5.0))),
            ("-", vec![num(5.0)], Ok(num(-5.0))),
            ("-", vec![num(-5.0)], Ok(num(5.0))),
            ("-", vec![num(10.0), num(4.0)], Ok(num(6.0))),
            ("*", vec![num(2.0), num(3.0)], Ok(num(6.0))),
            ("/", vec![num(9.0), num(2.0)], Ok(num(4.5))),
            ("%", vec![num(9.0), num(2.0)], Ok(num(1.0))),
            (
                "/",
                vec![num(3.0), num(0.0)],
                Err(Error::DivisionByZero { numerator: 3.0 }),
            ),
            (
                "%",
                vec![num(3.0), num(0.0)],
                Err(Error::ModuloByZero { numerator: 3.0 }),
            ),
            ("+", vec![], Err(Error::arity_mismatch(1, 0))),
            (
                "+",
                vec![num(1.0), sym("x")],
                Err(Error::wrong_type("+", "number", "symbol")),
            ),
            (
                "*",
                vec![qexpr(vec![])],
                Err(Error::wrong_type("*", "number", "Q-expression")),
            ),
        ];

        for (i, (name, args, expected)) in cases.into_iter().enumerate() {
            let actual = call_builtin(name, args);
            assert_eq!(actual, expected, "case #{} '{name}'", i + 1);
        }
    }

    #[test]
    fn test_nan_and_infinity_propagate() {
        // IEEE semantics are kept as-is: no special rejection
        let inf = call_builtin("*", vec![num(1e308), num(10.0)]).unwrap();
        match inf {
            Value::Number(n) => assert!(n.is_infinite()),
            other => panic!("expected a number, got {other:?}"),
        }

        let nan = call_builtin("+", vec![num(f64::NAN), num(1.0)]).unwrap();
        match nan {
            Value::Number(n) => assert!(n.is_nan()),
            other => panic!("expected a number, got {other:?}"),
        }
    }

    #[test]
    fn test_def_binds_into_the_given_environment() {
        let env = create_global_env();
        let def = find("def").unwrap();

        let result = (def.func)(
            &env,
            vec![qexpr(vec![sym("x"), sym("y")]), num(1.0), num(2.0)],
        );
        assert_eq!(result, Ok(Value::Sexpr(vec![])));
        assert_eq!(env.lookup("x"), Ok(num(1.0)));
        assert_eq!(env.lookup("y"), Ok(num(2.0)));

        // Count mismatch defines nothing
        let result = (def.func)(&env, vec![qexpr(vec![sym("z")]), num(1.0), num(2.0)]);
        assert_eq!(
            result,
            Err(Error::DefMismatch {
                symbols: 1,
                values: 2
            })
        );
        assert_eq!(env.lookup("z"), Err(Error::UnboundSymbol("z".to_owned())));
    }

    #[test]
    fn test_lambda_builtin_captures_the_current_environment() {
        let env = create_global_env();
        env.define("x", num(42.0), false);
        let lambda_def = find("\\").unwrap();

        let lambda = (lambda_def.func)(
            &env,
            vec![qexpr(vec![sym("y")]), qexpr(vec![sym("+"), sym("x"), sym("y")])],
        )
        .unwrap();

        let Value::Lambda { env: captured, .. } = &lambda else {
            panic!("expected a lambda, got {lambda:?}");
        };
        assert_eq!(captured.lookup("x"), Ok(num(42.0)));
    }

    #[test]
    fn test_env_builtin_lists_current_scope_only() {
        let root = create_global_env();
        let frame = Environment::with_parent(root);
        frame.define("local", num(1.0), false);

        let listing = call_builtin_in("env", vec![], &frame);
        assert_eq!(listing, Ok(qexpr(vec![sym("local")])));
    }

    fn call_builtin_in(name: &str, args: Vec<Value>, env: &Environment) -> Result<Value, Error> {
        let def = find(name).unwrap_or_else(|| panic!("builtin '{name}' should exist"));
        def.arity.validate(args.len())?;
        (def.func)(env, args)
    }
}
