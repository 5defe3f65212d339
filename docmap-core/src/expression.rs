//! Computed-value expressions.
//!
//! A property or constructor parameter may be bound to an expression instead of a
//! stored field. Expressions are compiled once, when mapping metadata is built, and
//! evaluated on read against the top-level fields of the source record.
//!
//! # Grammar
//!
//! - Literals: integers, floats, `'single'` or `"double"` quoted strings, `true`,
//!   `false`, `null`
//! - Variables: `#name` or a bare `name`, bound to top-level record fields
//! - Member access `a.b` and indexing `a[0]`, `a['key']`
//! - Unary `!` (or `not`) and `-`
//! - `*`, `/`, `%`, then `+` and `-`; `+` concatenates when either side is a string
//! - Comparisons `==`, `!=`, `<`, `<=`, `>`, `>=`
//! - `&&` / `and`, `||` / `or`
//! - Ternary `cond ? a : b` and parentheses
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! let expr = Expression::parse("#first + ' ' + #last")?;
//! let record = doc! { "first": "Ada", "last": "Lovelace" };
//! assert_eq!(expr.evaluate(&EvaluationContext::new(&record))?, Bson::from("Ada Lovelace"));
//! ```

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap, fmt};

use crate::error::{MappingError, MappingResult};

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Binary operators, in no particular order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

/// A node of a compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Bson),
    /// A top-level record field.
    Variable(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

/// Walks an expression tree.
pub trait ExprVisitor {
    type Output;

    fn visit_literal(&mut self, value: &Bson) -> MappingResult<Self::Output>;
    fn visit_variable(&mut self, name: &str) -> MappingResult<Self::Output>;
    fn visit_member(&mut self, target: &Expr, member: &str) -> MappingResult<Self::Output>;
    fn visit_index(&mut self, target: &Expr, index: &Expr) -> MappingResult<Self::Output>;
    fn visit_unary(&mut self, op: UnaryOp, operand: &Expr) -> MappingResult<Self::Output>;
    fn visit_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> MappingResult<Self::Output>;
    fn visit_conditional(
        &mut self,
        condition: &Expr,
        then: &Expr,
        otherwise: &Expr,
    ) -> MappingResult<Self::Output>;

    fn visit_expr(&mut self, expr: &Expr) -> MappingResult<Self::Output> {
        match expr {
            Expr::Literal(value) => self.visit_literal(value),
            Expr::Variable(name) => self.visit_variable(name),
            Expr::Member(target, member) => self.visit_member(target, member),
            Expr::Index(target, index) => self.visit_index(target, index),
            Expr::Unary(op, operand) => self.visit_unary(*op, operand),
            Expr::Binary(op, left, right) => self.visit_binary(*op, left, right),
            Expr::Conditional { condition, then, otherwise } => {
                self.visit_conditional(condition, then, otherwise)
            }
        }
    }
}

/// A compiled expression and the source it was compiled from.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    /// Compiles an expression.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::Expression`] on malformed input.
    pub fn parse(source: &str) -> MappingResult<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, position: 0 };
        let root = parser.ternary()?;

        if let Some(token) = parser.peek() {
            return Err(MappingError::Expression(format!(
                "unexpected {token} in '{source}'"
            )));
        }

        Ok(Self { source: source.to_string(), root })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// Evaluates the expression against a record's top-level fields.
    pub fn evaluate(&self, context: &EvaluationContext<'_>) -> MappingResult<Bson> {
        ExpressionEvaluator { context }.visit_expr(&self.root)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Variables visible to an expression: the top-level fields of the source record.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    root: &'a Document,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(root: &'a Document) -> Self {
        Self { root }
    }

    /// Unknown variables are null.
    pub fn variable(&self, name: &str) -> Bson {
        self.root.get(name).cloned().unwrap_or(Bson::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Bson),
    Str(String),
    Ident(String),
    Variable(String),
    Punct(&'static str),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {n}"),
            Token::Str(s) => write!(f, "string '{s}'"),
            Token::Ident(name) => write!(f, "identifier {name}"),
            Token::Variable(name) => write!(f, "variable #{name}"),
            Token::Punct(p) => write!(f, "'{p}'"),
        }
    }
}

const PUNCTUATION: [&str; 19] = [
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "!", "+", "-", "*", "/", "%", "?", ":", ".",
    "(", ")",
];

fn tokenize(source: &str) -> MappingResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            let mut float = false;

            while i < chars.len()
                && (chars[i].is_ascii_digit()
                    || (chars[i] == '.' && !float && chars.get(i + 1).is_some_and(char::is_ascii_digit)))
            {
                float |= chars[i] == '.';
                i += 1;
            }

            let text: String = chars[start..i].iter().collect();
            let number = if float {
                text.parse::<f64>().map(Bson::Double).ok()
            } else {
                text.parse::<i64>().ok().map(|n| match i32::try_from(n) {
                    Ok(small) => Bson::Int32(small),
                    Err(_) => Bson::Int64(n),
                })
            };

            tokens.push(Token::Number(number.ok_or_else(|| {
                MappingError::Expression(format!("invalid number {text}"))
            })?));
        } else if c == '\'' || c == '"' {
            let mut text = String::new();
            i += 1;

            loop {
                match chars.get(i) {
                    None => {
                        return Err(MappingError::Expression(format!(
                            "unterminated string in '{source}'"
                        )));
                    }
                    // a doubled quote escapes itself
                    Some(&q) if q == c && chars.get(i + 1) == Some(&c) => {
                        text.push(c);
                        i += 2;
                    }
                    Some(&q) if q == c => {
                        i += 1;
                        break;
                    }
                    Some(&other) => {
                        text.push(other);
                        i += 1;
                    }
                }
            }

            tokens.push(Token::Str(text));
        } else if c == '#' || c.is_alphabetic() || c == '_' || c == '$' {
            let is_variable = c == '#';
            if is_variable {
                i += 1;
            }

            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                i += 1;
            }

            let name: String = chars[start..i].iter().collect();
            if name.is_empty() {
                return Err(MappingError::Expression(format!("empty variable name in '{source}'")));
            }

            tokens.push(if is_variable { Token::Variable(name) } else { Token::Ident(name) });
        } else if c == '[' || c == ']' {
            tokens.push(Token::Punct(if c == '[' { "[" } else { "]" }));
            i += 1;
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let punct = PUNCTUATION
                .iter()
                .find(|p| rest.starts_with(**p))
                .ok_or_else(|| MappingError::Expression(format!("unexpected character '{c}' in '{source}'")))?;

            tokens.push(Token::Punct(*punct));
            i += punct.len();
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Some(Token::Punct(p)) if *p == punct) {
            self.position += 1;
            return true;
        }
        false
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(word)) if word == keyword) {
            self.position += 1;
            return true;
        }
        false
    }

    fn expect_punct(&mut self, punct: &str) -> MappingResult<()> {
        if self.eat_punct(punct) {
            return Ok(());
        }

        Err(MappingError::Expression(match self.peek() {
            Some(token) => format!("expected '{punct}' but found {token}"),
            None => format!("expected '{punct}' but reached the end"),
        }))
    }

    fn ternary(&mut self) -> MappingResult<Expr> {
        let condition = self.or()?;

        if self.eat_punct("?") {
            let then = self.ternary()?;
            self.expect_punct(":")?;
            let otherwise = self.ternary()?;

            return Ok(Expr::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }

        Ok(condition)
    }

    fn or(&mut self) -> MappingResult<Expr> {
        let mut left = self.and()?;
        while self.eat_punct("||") || self.eat_keyword("or") {
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> MappingResult<Expr> {
        let mut left = self.comparison()?;
        while self.eat_punct("&&") || self.eat_keyword("and") {
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(self.comparison()?));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> MappingResult<Expr> {
        let mut left = self.additive()?;

        loop {
            let op = match self.peek() {
                Some(Token::Punct("==")) => BinaryOp::Eq,
                Some(Token::Punct("!=")) => BinaryOp::Ne,
                Some(Token::Punct("<")) => BinaryOp::Lt,
                Some(Token::Punct("<=")) => BinaryOp::Lte,
                Some(Token::Punct(">")) => BinaryOp::Gt,
                Some(Token::Punct(">=")) => BinaryOp::Gte,
                _ => return Ok(left),
            };
            self.position += 1;
            left = Expr::Binary(op, Box::new(left), Box::new(self.additive()?));
        }
    }

    fn additive(&mut self) -> MappingResult<Expr> {
        let mut left = self.multiplicative()?;

        loop {
            let op = match self.peek() {
                Some(Token::Punct("+")) => BinaryOp::Add,
                Some(Token::Punct("-")) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.position += 1;
            left = Expr::Binary(op, Box::new(left), Box::new(self.multiplicative()?));
        }
    }

    fn multiplicative(&mut self) -> MappingResult<Expr> {
        let mut left = self.unary()?;

        loop {
            let op = match self.peek() {
                Some(Token::Punct("*")) => BinaryOp::Mul,
                Some(Token::Punct("/")) => BinaryOp::Div,
                Some(Token::Punct("%")) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.position += 1;
            left = Expr::Binary(op, Box::new(left), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> MappingResult<Expr> {
        if self.eat_punct("!") || self.eat_keyword("not") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        if self.eat_punct("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> MappingResult<Expr> {
        let mut target = self.primary()?;

        loop {
            if self.eat_punct(".") {
                match self.next() {
                    Some(Token::Ident(member)) => {
                        target = Expr::Member(Box::new(target), member);
                    }
                    Some(other) => {
                        return Err(MappingError::Expression(format!(
                            "expected a member name after '.' but found {other}"
                        )));
                    }
                    None => {
                        return Err(MappingError::Expression(
                            "expected a member name after '.'".to_string(),
                        ));
                    }
                }
            } else if self.eat_punct("[") {
                let index = self.ternary()?;
                self.expect_punct("]")?;
                target = Expr::Index(Box::new(target), Box::new(index));
            } else {
                return Ok(target);
            }
        }
    }

    fn primary(&mut self) -> MappingResult<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(n)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Bson::String(s))),
            Some(Token::Variable(name)) => Ok(Expr::Variable(name)),
            Some(Token::Ident(word)) => Ok(match word.as_str() {
                "true" => Expr::Literal(Bson::Boolean(true)),
                "false" => Expr::Literal(Bson::Boolean(false)),
                "null" => Expr::Literal(Bson::Null),
                _ => Expr::Variable(word),
            }),
            Some(Token::Punct("(")) => {
                let inner = self.ternary()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            Some(other) => Err(MappingError::Expression(format!("unexpected {other}"))),
            None => Err(MappingError::Expression("unexpected end of expression".to_string())),
        }
    }
}

/// Comparable view of BSON values. Numbers are normalized to `f64`.
#[derive(Debug)]
enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &Bson) -> Option<Number> {
        match value {
            Bson::Int32(i) => Some(Number::Int(i64::from(*i))),
            Bson::Int64(i) => Some(Number::Int(*i)),
            Bson::Double(d) => Some(Number::Float(*d)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

fn integer(value: i64) -> Bson {
    match i32::try_from(value) {
        Ok(small) => Bson::Int32(small),
        Err(_) => Bson::Int64(value),
    }
}

/// Text form used for string concatenation.
fn text(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Null => "null".to_string(),
        Bson::Boolean(b) => b.to_string(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        Bson::Double(d) => d.to_string(),
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}

fn truthy(value: &Bson) -> MappingResult<bool> {
    match value {
        Bson::Boolean(b) => Ok(*b),
        Bson::Null => Ok(false),
        other => Err(MappingError::Expression(format!(
            "expected a boolean but found {other}"
        ))),
    }
}

struct ExpressionEvaluator<'c, 'a> {
    context: &'c EvaluationContext<'a>,
}

impl ExpressionEvaluator<'_, '_> {
    fn arithmetic(&self, op: BinaryOp, left: &Bson, right: &Bson) -> MappingResult<Bson> {
        if op == BinaryOp::Add
            && (matches!(left, Bson::String(_)) || matches!(right, Bson::String(_)))
        {
            return Ok(Bson::String(format!("{}{}", text(left), text(right))));
        }

        let (Some(a), Some(b)) = (Number::of(left), Number::of(right)) else {
            return Err(MappingError::Expression(format!(
                "cannot apply {op:?} to {left} and {right}"
            )));
        };

        match (a, b) {
            (Number::Int(a), Number::Int(b)) => {
                let result = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    BinaryOp::Mul => a.checked_mul(b),
                    BinaryOp::Div if b == 0 => {
                        return Err(MappingError::Expression("division by zero".to_string()));
                    }
                    BinaryOp::Div => a.checked_div(b),
                    BinaryOp::Rem if b == 0 => {
                        return Err(MappingError::Expression("division by zero".to_string()));
                    }
                    BinaryOp::Rem => a.checked_rem(b),
                    _ => None,
                };

                result
                    .map(integer)
                    .ok_or_else(|| MappingError::Expression(format!("integer overflow in {a} {op:?} {b}")))
            }
            (a, b) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                Ok(Bson::Double(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                }))
            }
        }
    }

    fn compare(&self, op: BinaryOp, left: &Bson, right: &Bson) -> MappingResult<Bson> {
        let (a, b) = (Comparable::from(left), Comparable::from(right));

        let result = match op {
            BinaryOp::Eq => a == b,
            BinaryOp::Ne => a != b,
            _ => {
                let ordering = a.partial_cmp(&b).ok_or_else(|| {
                    MappingError::Expression(format!("cannot compare {left} with {right}"))
                })?;

                match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Lte => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }
            }
        };

        Ok(Bson::Boolean(result))
    }
}

impl ExprVisitor for ExpressionEvaluator<'_, '_> {
    type Output = Bson;

    fn visit_literal(&mut self, value: &Bson) -> MappingResult<Bson> {
        Ok(value.clone())
    }

    fn visit_variable(&mut self, name: &str) -> MappingResult<Bson> {
        Ok(self.context.variable(name))
    }

    fn visit_member(&mut self, target: &Expr, member: &str) -> MappingResult<Bson> {
        match self.visit_expr(target)? {
            Bson::Document(doc) => Ok(doc.get(member).cloned().unwrap_or(Bson::Null)),
            Bson::Null => Ok(Bson::Null),
            Bson::Array(items) if member == "length" || member == "size" => {
                Ok(integer(items.len() as i64))
            }
            Bson::String(s) if member == "length" => Ok(integer(s.chars().count() as i64)),
            other => Err(MappingError::Expression(format!(
                "cannot access member {member} of {other}"
            ))),
        }
    }

    fn visit_index(&mut self, target: &Expr, index: &Expr) -> MappingResult<Bson> {
        let target = self.visit_expr(target)?;
        let index = self.visit_expr(index)?;

        match (target, index) {
            (Bson::Null, _) => Ok(Bson::Null),
            (Bson::Array(items), index) => {
                let position = match Number::of(&index) {
                    Some(Number::Int(i)) => usize::try_from(i).ok(),
                    _ => {
                        return Err(MappingError::Expression(format!(
                            "cannot index a list with {index}"
                        )));
                    }
                };

                Ok(position
                    .and_then(|i| items.into_iter().nth(i))
                    .unwrap_or(Bson::Null))
            }
            (Bson::Document(doc), Bson::String(key)) => {
                Ok(doc.get(&key).cloned().unwrap_or(Bson::Null))
            }
            (target, index) => Err(MappingError::Expression(format!(
                "cannot index {target} with {index}"
            ))),
        }
    }

    fn visit_unary(&mut self, op: UnaryOp, operand: &Expr) -> MappingResult<Bson> {
        let value = self.visit_expr(operand)?;

        match op {
            UnaryOp::Not => Ok(Bson::Boolean(!truthy(&value)?)),
            UnaryOp::Neg => match Number::of(&value) {
                Some(Number::Int(i)) => i
                    .checked_neg()
                    .map(integer)
                    .ok_or_else(|| MappingError::Expression(format!("cannot negate {i}"))),
                Some(Number::Float(f)) => Ok(Bson::Double(-f)),
                None => Err(MappingError::Expression(format!("cannot negate {value}"))),
            },
        }
    }

    fn visit_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> MappingResult<Bson> {
        match op {
            BinaryOp::And => {
                if !truthy(&self.visit_expr(left)?)? {
                    return Ok(Bson::Boolean(false));
                }
                Ok(Bson::Boolean(truthy(&self.visit_expr(right)?)?))
            }
            BinaryOp::Or => {
                if truthy(&self.visit_expr(left)?)? {
                    return Ok(Bson::Boolean(true));
                }
                Ok(Bson::Boolean(truthy(&self.visit_expr(right)?)?))
            }
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
                let (l, r) = (self.visit_expr(left)?, self.visit_expr(right)?);
                self.compare(op, &l, &r)
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                let (l, r) = (self.visit_expr(left)?, self.visit_expr(right)?);
                self.arithmetic(op, &l, &r)
            }
        }
    }

    fn visit_conditional(&mut self, condition: &Expr, then: &Expr, otherwise: &Expr) -> MappingResult<Bson> {
        if truthy(&self.visit_expr(condition)?)? {
            self.visit_expr(then)
        } else {
            self.visit_expr(otherwise)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn eval(source: &str, record: &Document) -> MappingResult<Bson> {
        Expression::parse(source)?.evaluate(&EvaluationContext::new(record))
    }

    #[test]
    fn literals_and_arithmetic() {
        let empty = Document::new();
        assert_eq!(eval("1 + 2 * 3", &empty).unwrap(), Bson::Int32(7));
        assert_eq!(eval("(1 + 2) * 3", &empty).unwrap(), Bson::Int32(9));
        assert_eq!(eval("7 % 4 - -1", &empty).unwrap(), Bson::Int32(4));
        assert_eq!(eval("1.5 * 2", &empty).unwrap(), Bson::Double(3.0));
        assert_eq!(eval("'it''s'", &empty).unwrap(), Bson::String("it's".into()));
        assert_eq!(eval("null", &empty).unwrap(), Bson::Null);
    }

    #[test]
    fn variables_bind_to_record_fields() {
        let record = doc! { "first": "Ada", "last": "Lovelace", "age": 36 };
        assert_eq!(
            eval("#first + ' ' + last", &record).unwrap(),
            Bson::String("Ada Lovelace".into())
        );
        assert_eq!(eval("#age + 1", &record).unwrap(), Bson::Int32(37));
        assert_eq!(eval("#missing", &record).unwrap(), Bson::Null);
    }

    #[test]
    fn member_access_and_indexing() {
        let record = doc! {
            "address": { "city": "London" },
            "tags": ["a", "b"],
        };
        assert_eq!(eval("#address.city", &record).unwrap(), Bson::String("London".into()));
        assert_eq!(eval("#address['city']", &record).unwrap(), Bson::String("London".into()));
        assert_eq!(eval("#tags[1]", &record).unwrap(), Bson::String("b".into()));
        assert_eq!(eval("#tags[5]", &record).unwrap(), Bson::Null);
        assert_eq!(eval("#tags.length", &record).unwrap(), Bson::Int32(2));
        assert_eq!(eval("#nothing.city", &record).unwrap(), Bson::Null);
    }

    #[test]
    fn logic_comparison_and_ternary() {
        let record = doc! { "age": 20, "name": "x" };
        assert_eq!(eval("#age >= 18 ? 'adult' : 'minor'", &record).unwrap(), Bson::String("adult".into()));
        assert_eq!(eval("#age > 18 and #name == 'x'", &record).unwrap(), Bson::Boolean(true));
        assert_eq!(eval("!(#age < 18) || false", &record).unwrap(), Bson::Boolean(true));
        assert_eq!(eval("#age == 20.0", &record).unwrap(), Bson::Boolean(true));
    }

    #[test]
    fn errors_are_reported() {
        let empty = Document::new();
        assert!(matches!(Expression::parse("1 +"), Err(MappingError::Expression(_))));
        assert!(matches!(Expression::parse("'open"), Err(MappingError::Expression(_))));
        assert!(matches!(Expression::parse("a b"), Err(MappingError::Expression(_))));
        assert!(matches!(eval("1 / 0", &empty), Err(MappingError::Expression(_))));
        assert!(matches!(eval("'a' < 1", &empty), Err(MappingError::Expression(_))));
        assert!(matches!(eval("1 ? 2 : 3", &empty), Err(MappingError::Expression(_))));
    }
}
