//! Text parsing and the reader.
//!
//! Parsing is split in two layers. The `nom` grammar produces a generic
//! [`SyntaxNode`] tree: every node carries a kind tag, the literal text
//! for leaves, and ordered children for groups, with the delimiter tokens
//! (`(` `)` `{` `}`) kept in place as token nodes. [`read`] then converts
//! that tree into values: number leaves become [`Value::Number`] (an
//! out-of-range literal becomes an error value instead of failing the
//! parse), symbol leaves become [`Value::Symbol`], groups become S- or
//! Q-expressions, and delimiter tokens are skipped. The root of a source
//! line reads as an S-expression, so `+ 1 2` works without outer parens.
//!
//! Grammar: `number: -?(digits.)?digits`, symbols over
//! `[a-zA-Z0-9_%+*\-/\\=<>!&]`, `( expr* )` S-groups, `{ expr* }`
//! Q-groups, whitespace between expressions.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::{opt, recognize},
    multi::many0,
    sequence::{pair, preceded, terminated},
};

use crate::ast::Value;
use crate::{Error, MAX_PARSE_DEPTH};

/// Non-alphanumeric characters allowed in symbol names
const SYMBOL_CHARS: &str = "_%+*-/\\=<>!&";

/// Tag of one parse tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    Number,
    Symbol,
    SGroup,
    QGroup,
    /// A bracket token; carries no value of its own
    Delimiter,
}

/// A generic parse tree node: a kind tag, literal text for leaves, and
/// ordered children for groups
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxNode {
    pub kind: SyntaxKind,
    pub text: String,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn leaf(kind: SyntaxKind, text: &str) -> Self {
        SyntaxNode {
            kind,
            text: text.to_owned(),
            children: Vec::new(),
        }
    }

    pub fn group(kind: SyntaxKind, children: Vec<SyntaxNode>) -> Self {
        SyntaxNode {
            kind,
            text: String::new(),
            children,
        }
    }

    fn delimiter(token: char) -> Self {
        SyntaxNode {
            kind: SyntaxKind::Delimiter,
            text: token.to_string(),
            children: Vec::new(),
        }
    }
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

/// `-?(digits.)?digits`, kept as raw text; conversion happens in [`read`]
fn number(input: &str) -> IResult<&str, SyntaxNode> {
    let (rest, text) = recognize(pair(
        opt(char('-')),
        pair(
            opt(pair(take_while1(is_digit), char('.'))),
            take_while1(is_digit),
        ),
    ))
    .parse(input)?;
    Ok((rest, SyntaxNode::leaf(SyntaxKind::Number, text)))
}

fn symbol(input: &str) -> IResult<&str, SyntaxNode> {
    let (rest, text) =
        take_while1(|c: char| c.is_ascii_alphanumeric() || SYMBOL_CHARS.contains(c)).parse(input)?;
    Ok((rest, SyntaxNode::leaf(SyntaxKind::Symbol, text)))
}

fn sgroup(input: &str, depth: usize) -> IResult<&str, SyntaxNode> {
    group(input, '(', ')', SyntaxKind::SGroup, depth)
}

fn qgroup(input: &str, depth: usize) -> IResult<&str, SyntaxNode> {
    group(input, '{', '}', SyntaxKind::QGroup, depth)
}

fn group(
    input: &str,
    open: char,
    close: char,
    kind: SyntaxKind,
    depth: usize,
) -> IResult<&str, SyntaxNode> {
    if depth >= MAX_PARSE_DEPTH {
        // Failure, not Error: nothing upstream should retry a different
        // interpretation of over-deep input
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TooLarge,
        )));
    }
    let (input, _) = char(open).parse(input)?;
    let (input, mut children) = many0(|input| expr(input, depth + 1)).parse(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, _) = char(close).parse(input)?;

    children.insert(0, SyntaxNode::delimiter(open));
    children.push(SyntaxNode::delimiter(close));
    Ok((input, SyntaxNode::group(kind, children)))
}

fn expr(input: &str, depth: usize) -> IResult<&str, SyntaxNode> {
    preceded(
        multispace0,
        alt((
            number,
            symbol,
            |input| sgroup(input, depth),
            |input| qgroup(input, depth),
        )),
    )
    .parse(input)
}

/// Parse a line of source into a syntax tree. The returned root is an
/// S-group holding every top-level expression.
pub fn parse_source(input: &str) -> Result<SyntaxNode, Error> {
    match terminated(many0(|input| expr(input, 0)), multispace0).parse(input) {
        Ok(("", children)) => Ok(SyntaxNode::group(SyntaxKind::SGroup, children)),
        Ok((remaining, _)) => {
            let snippet: String = remaining.chars().take(10).collect();
            Err(Error::ParseError(format!(
                "unexpected input near '{snippet}'"
            )))
        }
        Err(err) => Err(Error::ParseError(describe_error(input, err))),
    }
}

fn describe_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> String {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            match e.code {
                nom::error::ErrorKind::TooLarge => {
                    format!("expression nested deeper than {MAX_PARSE_DEPTH} levels")
                }
                _ => format!("invalid syntax at position {position}"),
            }
        }
        nom::Err::Incomplete(_) => "incomplete input".to_owned(),
    }
}

/// Convert one parse tree node into a value. Delimiter tokens carry no
/// value and read as `None`.
pub fn read(node: &SyntaxNode) -> Option<Value> {
    let value = match node.kind {
        SyntaxKind::Delimiter => return None,
        SyntaxKind::Number => read_number(&node.text),
        SyntaxKind::Symbol => Value::Symbol(node.text.clone()),
        SyntaxKind::SGroup => Value::Sexpr(read_children(node)),
        SyntaxKind::QGroup => Value::Qexpr(read_children(node)),
    };
    Some(value)
}

fn read_children(node: &SyntaxNode) -> Vec<Value> {
    node.children.iter().filter_map(read).collect()
}

/// A literal outside the finite range reads as an error value, so a bad
/// number inside an otherwise fine expression fails only that expression
fn read_number(text: &str) -> Value {
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Number(n),
        _ => Value::Error(Error::InvalidNumber(text.to_owned())),
    }
}

/// Parse a line of source straight to a value tree
pub fn parse(input: &str) -> Result<Value, Error> {
    let root = parse_source(input)?;
    Ok(Value::Sexpr(read_children(&root)))
}
