//! Row filter expressions used by mixed-fields entries.
//!
//! Filters are a small predicate language evaluated by an interpreter; nothing
//! in a filter can execute code. Grammar:
//!
//! ```text
//! expr       := and_expr (("or" | "||") and_expr)*
//! and_expr   := not_expr (("and" | "&&") not_expr)*
//! not_expr   := ("not" | "!") not_expr | "(" expr ")" | comparison
//! comparison := operand (op operand)?
//! op         := == | != | < | <= | > | >= | contains | startswith | endswith | in | not in
//! operand    := field | example["field"] | example.get("field") | "string" | number
//!             | true | false | null
//! ```
//!
//! A lone operand tests truthiness. Missing fields evaluate to null. A
//! parenthesised group followed by a comparison operator is used as a value:
//! `(score) > 3` compares the field, `(a or b) == true` compares the group's
//! boolean result.
//!
//! Nesting of `not` and parentheses is capped at `MAX_FILTER_DEPTH` and the
//! operator count at `MAX_FILTER_OPERATORS`; longer filters are syntax errors.

use std::cmp::Ordering;

use serde_json::{Number, Value};
use thiserror::Error;

use crate::constants::filter::{MAX_FILTER_DEPTH, MAX_FILTER_OPERATORS};
use crate::table::Row;

/// Failure to parse a filter expression.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("filter syntax error at offset {offset}: {message}")]
pub struct FilterError {
    /// Byte offset in the source where parsing failed.
    pub offset: usize,
    /// What was expected or found.
    pub message: String,
}

impl FilterError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Parsed filter, ready to evaluate against rows.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    source: String,
    predicate: Predicate,
}

impl Filter {
    /// Parse `source` into a filter.
    pub fn parse(source: &str) -> Result<Self, FilterError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
            depth: 0,
            operators: 0,
        };
        let predicate = parser.expr()?;
        if let Some(token) = parser.peek() {
            return Err(FilterError::new(
                token.offset,
                format!("unexpected {}", token.kind.describe()),
            ));
        }
        Ok(Self {
            source: source.to_string(),
            predicate,
        })
    }

    /// Expression text as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True if `row` satisfies the filter.
    pub fn matches(&self, row: &Row) -> bool {
        self.predicate.evaluate(row)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    Truthy(Operand),
}

#[derive(Clone, Debug, PartialEq)]
enum Operand {
    Field(String),
    Literal(Value),
    Group(Box<Predicate>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
}

impl Predicate {
    fn evaluate(&self, row: &Row) -> bool {
        match self {
            Self::And(left, right) => left.evaluate(row) && right.evaluate(row),
            Self::Or(left, right) => left.evaluate(row) || right.evaluate(row),
            Self::Not(inner) => !inner.evaluate(row),
            Self::Compare { left, op, right } => compare(&left.resolve(row), *op, &right.resolve(row)),
            Self::Truthy(operand) => truthy(&operand.resolve(row)),
        }
    }
}

impl Operand {
    fn resolve(&self, row: &Row) -> Value {
        match self {
            Self::Field(name) => row.get(name).cloned().unwrap_or(Value::Null),
            Self::Literal(value) => value.clone(),
            Self::Group(predicate) => Value::Bool(predicate.evaluate(row)),
        }
    }

    /// `(field)` stays a field; any other group yields its boolean result.
    fn from_group(predicate: Predicate) -> Self {
        match predicate {
            Predicate::Truthy(operand) => operand,
            other => Self::Group(Box::new(other)),
        }
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::Ne => !values_equal(left, right),
        CompareOp::Lt => ordering(left, right) == Some(Ordering::Less),
        CompareOp::Le => matches!(
            ordering(left, right),
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::Gt => ordering(left, right) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            ordering(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::Contains => contains(left, right),
        CompareOp::StartsWith => match (left, right) {
            (Value::String(a), Value::String(b)) => a.starts_with(b.as_str()),
            _ => false,
        },
        CompareOp::EndsWith => match (left, right) {
            (Value::String(a), Value::String(b)) => a.ends_with(b.as_str()),
            _ => false,
        },
        CompareOp::In => contains(right, left),
        CompareOp::NotIn => !contains(right, left),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) if left.is_number() && right.is_number() => a == b,
        _ => left == right,
    }
}

fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
        (Value::Array(items), _) => items.iter().any(|item| values_equal(item, needle)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[derive(Clone, Debug, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Num(Value),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Cmp(CompareOp),
    And,
    Or,
    Not,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Str(value) => format!("string \"{value}\""),
            Self::Num(value) => format!("number {value}"),
            Self::LParen => "'('".into(),
            Self::RParen => "')'".into(),
            Self::LBracket => "'['".into(),
            Self::RBracket => "']'".into(),
            Self::Dot => "'.'".into(),
            Self::Cmp(op) => format!("operator {op:?}"),
            Self::And => "'and'".into(),
            Self::Or => "'or'".into(),
            Self::Not => "'not'".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn tokenize(source: &str) -> Result<Vec<Token>, FilterError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (offset, ch) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        let mut push = |kind: TokenKind, width: usize| {
            tokens.push(Token { kind, offset });
            width
        };
        i += match ch {
            c if c.is_whitespace() => 1,
            '(' => push(TokenKind::LParen, 1),
            ')' => push(TokenKind::RParen, 1),
            '[' => push(TokenKind::LBracket, 1),
            ']' => push(TokenKind::RBracket, 1),
            '.' if !next.is_some_and(|c| c.is_ascii_digit()) => push(TokenKind::Dot, 1),
            '=' if next == Some('=') => push(TokenKind::Cmp(CompareOp::Eq), 2),
            '!' if next == Some('=') => push(TokenKind::Cmp(CompareOp::Ne), 2),
            '!' => push(TokenKind::Not, 1),
            '<' if next == Some('=') => push(TokenKind::Cmp(CompareOp::Le), 2),
            '<' => push(TokenKind::Cmp(CompareOp::Lt), 1),
            '>' if next == Some('=') => push(TokenKind::Cmp(CompareOp::Ge), 2),
            '>' => push(TokenKind::Cmp(CompareOp::Gt), 1),
            '&' if next == Some('&') => push(TokenKind::And, 2),
            '|' if next == Some('|') => push(TokenKind::Or, 2),
            '"' | '\'' => {
                let (value, width) = lex_string(&chars, i, source.len())?;
                push(TokenKind::Str(value), width)
            }
            c if c.is_ascii_digit()
                || (c == '-' || c == '.') && next.is_some_and(|n| n.is_ascii_digit()) =>
            {
                let (value, width) = lex_number(&chars, i)?;
                push(TokenKind::Num(value), width)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = i;
                while end < chars.len() && (chars[end].1.is_alphanumeric() || chars[end].1 == '_')
                {
                    end += 1;
                }
                let word: String = chars[i..end].iter().map(|(_, c)| *c).collect();
                let kind = match word.as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    "in" => TokenKind::Cmp(CompareOp::In),
                    "contains" => TokenKind::Cmp(CompareOp::Contains),
                    "startswith" => TokenKind::Cmp(CompareOp::StartsWith),
                    "endswith" => TokenKind::Cmp(CompareOp::EndsWith),
                    _ => TokenKind::Ident(word),
                };
                push(kind, end - i)
            }
            other => {
                return Err(FilterError::new(
                    offset,
                    format!("unexpected character '{other}'"),
                ));
            }
        };
    }
    Ok(tokens)
}

fn lex_string(
    chars: &[(usize, char)],
    start: usize,
    source_len: usize,
) -> Result<(String, usize), FilterError> {
    let quote = chars[start].1;
    let mut value = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i].1 {
            c if c == quote => return Ok((value, i + 1 - start)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .map(|(_, c)| *c)
                    .ok_or_else(|| FilterError::new(source_len, "unterminated escape"))?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 2;
            }
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    Err(FilterError::new(chars[start].0, "unterminated string"))
}

fn lex_number(chars: &[(usize, char)], start: usize) -> Result<(Value, usize), FilterError> {
    let mut end = start + 1;
    while end < chars.len() {
        let c = chars[end].1;
        let exponent_sign = (c == '-' || c == '+') && matches!(chars[end - 1].1, 'e' | 'E');
        if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exponent_sign {
            end += 1;
        } else {
            break;
        }
    }
    let text: String = chars[start..end].iter().map(|(_, c)| *c).collect();
    let offset = chars[start].0;
    let value = if let Ok(int) = text.parse::<i64>() {
        Value::Number(int.into())
    } else {
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| FilterError::new(offset, format!("invalid number '{text}'")))?
    };
    Ok((value, end - start))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
    depth: usize,
    operators: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|token| &token.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.peek().map(|token| token.offset).unwrap_or(self.end)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), FilterError> {
        let offset = self.offset();
        match self.next() {
            Some(token) if token.kind == kind => Ok(()),
            Some(token) => Err(FilterError::new(
                offset,
                format!("expected {}, found {}", kind.describe(), token.kind.describe()),
            )),
            None => Err(FilterError::new(
                offset,
                format!("expected {}, found end of input", kind.describe()),
            )),
        }
    }

    fn enter(&mut self, offset: usize) -> Result<(), FilterError> {
        self.depth += 1;
        if self.depth > MAX_FILTER_DEPTH {
            return Err(FilterError::new(
                offset,
                format!("filter nests deeper than {MAX_FILTER_DEPTH} levels"),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn count_operator(&mut self, offset: usize) -> Result<(), FilterError> {
        self.operators += 1;
        if self.operators > MAX_FILTER_OPERATORS {
            return Err(FilterError::new(
                offset,
                format!("filter uses more than {MAX_FILTER_OPERATORS} boolean operators"),
            ));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Predicate, FilterError> {
        let mut left = self.and_expr()?;
        while self.peek_kind() == Some(&TokenKind::Or) {
            let offset = self.offset();
            self.pos += 1;
            self.count_operator(offset)?;
            let right = self.and_expr()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Predicate, FilterError> {
        let mut left = self.not_expr()?;
        while self.peek_kind() == Some(&TokenKind::And) {
            let offset = self.offset();
            self.pos += 1;
            self.count_operator(offset)?;
            let right = self.not_expr()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Predicate, FilterError> {
        match self.peek_kind() {
            Some(TokenKind::Not) => {
                let offset = self.offset();
                self.pos += 1;
                self.count_operator(offset)?;
                self.enter(offset)?;
                let inner = self.not_expr()?;
                self.leave();
                Ok(Predicate::Not(Box::new(inner)))
            }
            Some(TokenKind::LParen) => {
                let inner = self.group()?;
                match self.comparison_op() {
                    Some(op) => {
                        let right = self.operand()?;
                        Ok(Predicate::Compare {
                            left: Operand::from_group(inner),
                            op,
                            right,
                        })
                    }
                    None => Ok(inner),
                }
            }
            _ => self.comparison(),
        }
    }

    fn group(&mut self) -> Result<Predicate, FilterError> {
        let offset = self.offset();
        self.expect(TokenKind::LParen)?;
        self.enter(offset)?;
        let inner = self.expr()?;
        self.expect(TokenKind::RParen)?;
        self.leave();
        Ok(inner)
    }

    fn comparison(&mut self) -> Result<Predicate, FilterError> {
        let left = self.operand()?;
        let Some(op) = self.comparison_op() else {
            return Ok(Predicate::Truthy(left));
        };
        let right = self.operand()?;
        Ok(Predicate::Compare { left, op, right })
    }

    /// Consume a comparison operator, `not in` included, if one is next.
    fn comparison_op(&mut self) -> Option<CompareOp> {
        match self.peek_kind() {
            Some(TokenKind::Cmp(op)) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            Some(TokenKind::Not)
                if self.tokens.get(self.pos + 1).map(|token| &token.kind)
                    == Some(&TokenKind::Cmp(CompareOp::In)) =>
            {
                self.pos += 2;
                Some(CompareOp::NotIn)
            }
            _ => None,
        }
    }

    fn operand(&mut self) -> Result<Operand, FilterError> {
        if self.peek_kind() == Some(&TokenKind::LParen) {
            return Ok(Operand::from_group(self.group()?));
        }
        let offset = self.offset();
        let token = self
            .next()
            .ok_or_else(|| FilterError::new(offset, "expected a value, found end of input"))?;
        match token.kind {
            TokenKind::Str(value) => Ok(Operand::Literal(Value::String(value))),
            TokenKind::Num(value) => Ok(Operand::Literal(value)),
            TokenKind::Ident(name) => match name.as_str() {
                "true" | "True" => Ok(Operand::Literal(Value::Bool(true))),
                "false" | "False" => Ok(Operand::Literal(Value::Bool(false))),
                "null" | "None" => Ok(Operand::Literal(Value::Null)),
                _ => self.field_access(name),
            },
            other => Err(FilterError::new(
                offset,
                format!("expected a value, found {}", other.describe()),
            )),
        }
    }

    /// `name`, `name["field"]`, or `name.get("field")`; the subscripted forms name the row itself.
    fn field_access(&mut self, name: String) -> Result<Operand, FilterError> {
        match self.peek_kind() {
            Some(TokenKind::LBracket) => {
                self.pos += 1;
                let field = self.string_literal()?;
                self.expect(TokenKind::RBracket)?;
                Ok(Operand::Field(field))
            }
            Some(TokenKind::Dot) => {
                self.pos += 1;
                let offset = self.offset();
                match self.next().map(|token| token.kind) {
                    Some(TokenKind::Ident(method)) if method == "get" => {}
                    _ => return Err(FilterError::new(offset, "expected 'get' after '.'")),
                }
                self.expect(TokenKind::LParen)?;
                let field = self.string_literal()?;
                self.expect(TokenKind::RParen)?;
                Ok(Operand::Field(field))
            }
            _ => Ok(Operand::Field(name)),
        }
    }

    fn string_literal(&mut self) -> Result<String, FilterError> {
        let offset = self.offset();
        match self.next().map(|token| token.kind) {
            Some(TokenKind::Str(value)) => Ok(value),
            _ => Err(FilterError::new(offset, "expected a quoted field name")),
        }
    }
}
