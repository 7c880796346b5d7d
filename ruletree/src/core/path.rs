//! Built-in path expression evaluator.
//!
//! A small FHIRPath-flavoured language, enough for rule files to select
//! documents by kind and by field values:
//!
//! ```text
//! Patient.name
//! Condition.code.coding.where($this.code in %cancerCodes)
//! Observation.status = 'final'
//! AllergyIntolerance.where(substance.coding.empty())
//! Procedure.code.coding.where($this.code = '1' or $this.code = '2')
//! Patient.where((active = true and gender = 'male').not())
//! ```
//!
//! Every query returns a JSON array. A leading capitalised step keeps only
//! documents whose discriminator equals it; other steps navigate fields and
//! flatten arrays. Comparisons over an empty collection return an empty
//! collection, otherwise a single boolean. Numbers compare by value.
//!
//! `and` binds tighter than `or`. Both use three-valued logic: an empty
//! operand is unknown, so `false and {}` is `false`, `true or {}` is `true`
//! and `true and {}` is empty.

use std::borrow::Cow;
use std::sync::{Arc, LazyLock};

use anyhow::{Result, anyhow, bail};
use regex::Regex;
use serde_json::Value;

use crate::core::predicate::{Evaluator, Query, Variables};
use crate::core::truthiness::is_true;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\s*(?:",
        r"(?P<string>'(?:[^'\\]|\\.)*')",
        r"|(?P<number>-?\d+(?:\.\d+)?)",
        r"|(?P<variable>%[A-Za-z_][A-Za-z0-9_]*)",
        r"|(?P<name>\$this|[A-Za-z_][A-Za-z0-9_]*)",
        r"|(?P<symbol>!=|=|\.|\(|\))",
        r")"
    ))
    .unwrap()
});

/// Evaluator for the built-in path language.
#[derive(Debug, Clone)]
pub struct PathEvaluator {
    discriminator: String,
}

impl PathEvaluator {
    pub fn new(discriminator: impl Into<String>) -> Self {
        Self {
            discriminator: discriminator.into(),
        }
    }
}

impl Default for PathEvaluator {
    fn default() -> Self {
        Self::new("resourceType")
    }
}

impl Evaluator for PathEvaluator {
    fn compile(&self, expression: &str, variables: &Variables) -> Result<Query> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            variables,
        };
        let expr = parser.expr()?;
        if let Some(token) = parser.peek() {
            bail!("unexpected {token:?} after end of expression");
        }
        let discriminator = self.discriminator.clone();
        Ok(Arc::new(move |document: &Value| {
            let items = evaluate(&expr, Cow::Borrowed(document), &discriminator);
            Ok(Value::Array(items.into_iter().map(Cow::into_owned).collect()))
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Num(Value),
    Var(String),
    Name(String),
    Dot,
    Open,
    Close,
    Eq,
    NotEq,
}

#[derive(Debug)]
enum Expr {
    Path(Vec<Step>),
    Compare { path: Vec<Step>, op: Op, rhs: Value },
    /// A parenthesized expression followed by further steps.
    Group(Box<Expr>, Vec<Step>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug)]
enum Step {
    Name(String),
    This,
    Where(Box<Expr>),
    Exists,
    Empty,
    Not,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Eq,
    NotEq,
    In,
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    while !source[pos..].trim().is_empty() {
        let rest = &source[pos..];
        let caps = TOKEN_RE
            .captures(rest)
            .ok_or_else(|| anyhow!("unexpected input at offset {pos}: `{}`", rest.trim()))?;
        let token = if let Some(m) = caps.name("string") {
            Token::Str(unquote(m.as_str()))
        } else if let Some(m) = caps.name("number") {
            Token::Num(serde_json::from_str(m.as_str())?)
        } else if let Some(m) = caps.name("variable") {
            Token::Var(m.as_str()[1..].to_string())
        } else if let Some(m) = caps.name("name") {
            Token::Name(m.as_str().to_string())
        } else {
            match caps.name("symbol").map(|m| m.as_str()) {
                Some("!=") => Token::NotEq,
                Some("=") => Token::Eq,
                Some(".") => Token::Dot,
                Some("(") => Token::Open,
                Some(")") => Token::Close,
                _ => bail!("unexpected input at offset {pos}"),
            }
        };
        tokens.push(token);
        pos += caps.get(0).map_or(rest.len(), |m| m.end());
    }
    Ok(tokens)
}

fn unquote(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    variables: &'a Variables,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        let tokens = self.tokens;
        tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(anyhow!("expected {expected:?}, found {token:?}")),
            None => Err(anyhow!("expected {expected:?}, found end of expression")),
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut left = self.conjunction()?;
        while self.keyword("or") {
            let right = self.conjunction()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn conjunction(&mut self) -> Result<Expr> {
        let mut left = self.comparison()?;
        while self.keyword("and") {
            let right = self.comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// Consume `word` if it is the next token.
    fn keyword(&mut self, word: &str) -> bool {
        match self.peek() {
            Some(Token::Name(name)) if name == word => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn comparison(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Open) {
            self.pos += 1;
            let inner = self.expr()?;
            self.expect(&Token::Close)?;
            let mut steps = Vec::new();
            while self.peek() == Some(&Token::Dot) {
                self.pos += 1;
                steps.push(self.step()?);
            }
            return Ok(Expr::Group(Box::new(inner), steps));
        }
        let path = self.path()?;
        let op = match self.peek() {
            Some(Token::Eq) => Op::Eq,
            Some(Token::NotEq) => Op::NotEq,
            Some(Token::Name(name)) if name == "in" => Op::In,
            _ => return Ok(Expr::Path(path)),
        };
        self.pos += 1;
        let rhs = self.literal()?;
        Ok(Expr::Compare { path, op, rhs })
    }

    fn path(&mut self) -> Result<Vec<Step>> {
        let mut steps = vec![self.step()?];
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            steps.push(self.step()?);
        }
        Ok(steps)
    }

    fn step(&mut self) -> Result<Step> {
        let name = match self.advance() {
            Some(Token::Name(name)) => name.clone(),
            Some(token) => bail!("expected a path step, found {token:?}"),
            None => bail!("expected a path step, found end of expression"),
        };
        if name == "$this" {
            return Ok(Step::This);
        }
        if self.peek() != Some(&Token::Open) {
            return Ok(Step::Name(name));
        }
        self.pos += 1;
        let step = match name.as_str() {
            "where" => Step::Where(Box::new(self.expr()?)),
            "exists" => Step::Exists,
            "empty" => Step::Empty,
            "not" => Step::Not,
            other => bail!("unknown function `{other}`"),
        };
        self.expect(&Token::Close)?;
        Ok(step)
    }

    fn literal(&mut self) -> Result<Value> {
        match self.advance() {
            Some(Token::Str(text)) => Ok(Value::String(text.clone())),
            Some(Token::Num(number)) => Ok(number.clone()),
            Some(Token::Name(name)) if name == "true" => Ok(Value::Bool(true)),
            Some(Token::Name(name)) if name == "false" => Ok(Value::Bool(false)),
            Some(Token::Var(name)) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow!("unknown variable `%{name}`")),
            Some(token) => Err(anyhow!("expected a literal, found {token:?}")),
            None => Err(anyhow!("expected a literal, found end of expression")),
        }
    }
}

fn evaluate<'a>(expr: &Expr, root: Cow<'a, Value>, discriminator: &str) -> Vec<Cow<'a, Value>> {
    match expr {
        Expr::Path(steps) => walk(steps, root, discriminator),
        Expr::Compare { path, op, rhs } => {
            let items = walk(path, root, discriminator);
            if items.is_empty() {
                return Vec::new();
            }
            let matched = match op {
                Op::Eq => items.iter().any(|item| values_equal(item, rhs)),
                Op::NotEq => !items.iter().any(|item| values_equal(item, rhs)),
                Op::In => items.iter().any(|item| match rhs {
                    Value::Array(candidates) => {
                        candidates.iter().any(|candidate| values_equal(item, candidate))
                    }
                    scalar => values_equal(item, scalar),
                }),
            };
            vec![Cow::Owned(Value::Bool(matched))]
        }
        Expr::Group(inner, steps) => {
            let items = evaluate(inner, root, discriminator);
            apply_steps(steps, items, false, discriminator)
        }
        Expr::And(left, right) => {
            let left = truth(&evaluate(left, root.clone(), discriminator));
            if left == Some(false) {
                return boolean(Some(false));
            }
            let right = truth(&evaluate(right, root, discriminator));
            boolean(match (left, right) {
                (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            })
        }
        Expr::Or(left, right) => {
            let left = truth(&evaluate(left, root.clone(), discriminator));
            if left == Some(true) {
                return boolean(Some(true));
            }
            let right = truth(&evaluate(right, root, discriminator));
            boolean(match (left, right) {
                (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            })
        }
    }
}

/// Equality where `3` and `3.0` are the same number.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}

/// An empty collection is unknown; otherwise any truthy item makes it true.
fn truth(items: &[Cow<'_, Value>]) -> Option<bool> {
    if items.is_empty() {
        None
    } else {
        Some(items.iter().any(|item| is_true(item)))
    }
}

fn boolean<'a>(value: Option<bool>) -> Vec<Cow<'a, Value>> {
    value
        .map(|value| Cow::Owned(Value::Bool(value)))
        .into_iter()
        .collect()
}

fn walk<'a>(steps: &[Step], root: Cow<'a, Value>, discriminator: &str) -> Vec<Cow<'a, Value>> {
    apply_steps(steps, vec![root], true, discriminator)
}

/// Run `steps` over `items`. With `typed_head`, a capitalised first step
/// filters on the discriminator instead of navigating.
fn apply_steps<'a>(
    steps: &[Step],
    mut items: Vec<Cow<'a, Value>>,
    typed_head: bool,
    discriminator: &str,
) -> Vec<Cow<'a, Value>> {
    for (index, step) in steps.iter().enumerate() {
        items = match step {
            Step::Name(name) if typed_head && index == 0 && starts_uppercase(name) => items
                .into_iter()
                .filter(|item| {
                    item.get(discriminator).and_then(Value::as_str) == Some(name.as_str())
                })
                .collect(),
            Step::Name(name) => items
                .into_iter()
                .flat_map(|item| children(item, name))
                .collect(),
            Step::This => items,
            Step::Where(condition) => items
                .into_iter()
                .filter(|item| {
                    evaluate(condition, item.clone(), discriminator)
                        .iter()
                        .any(|result| is_true(result))
                })
                .collect(),
            Step::Exists => vec![Cow::Owned(Value::Bool(!items.is_empty()))],
            Step::Empty => vec![Cow::Owned(Value::Bool(items.is_empty()))],
            Step::Not => boolean(truth(&items).map(|value| !value)),
        };
    }
    items
}

fn children<'a>(item: Cow<'a, Value>, name: &str) -> Vec<Cow<'a, Value>> {
    match item {
        Cow::Borrowed(value) => match value.get(name) {
            Some(Value::Array(list)) => list
                .iter()
                .filter(|child| !child.is_null())
                .map(Cow::Borrowed)
                .collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(child) => vec![Cow::Borrowed(child)],
        },
        Cow::Owned(value) => children(Cow::Borrowed(&value), name)
            .into_iter()
            .map(|child| Cow::Owned(child.into_owned()))
            .collect(),
    }
}

fn starts_uppercase(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}
