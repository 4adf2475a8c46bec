//! Interpreter for the expression subset the mapper emits.
//!
//! Conditions: comparisons, `BETWEEN`, `begins_with`, `contains`,
//! `attribute_exists`/`attribute_not_exists`, and `AND`/`OR`/`NOT`
//! with parentheses. Updates: `SET` (including `#a = #a + :v`
//! arithmetic) and `REMOVE`. Attribute references arrive as `#n`
//! placeholders and literals as `:n` placeholders; both are resolved
//! against the request's attribute maps during parsing.

use crate::{
    store::{Attrs, ExprNames, ExprValues, StoreError},
    value::{KeyValue, Value},
};
use std::cmp::Ordering;

///
/// CmpOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn matches(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

///
/// Cond
///

#[derive(Clone, Debug)]
pub(crate) enum Cond {
    Cmp {
        attr: String,
        op: CmpOp,
        value: Value,
    },
    Between {
        attr: String,
        lo: Value,
        hi: Value,
    },
    BeginsWith {
        attr: String,
        prefix: Value,
    },
    Contains {
        attr: String,
        operand: Value,
    },
    Exists {
        attr: String,
    },
    NotExists {
        attr: String,
    },
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
    Not(Box<Cond>),
}

impl Cond {
    /// Evaluate against a row; `None` models an absent row, where no
    /// attribute exists.
    pub(crate) fn eval(&self, row: Option<&Attrs>) -> bool {
        let attr_of = |name: &str| row.and_then(|attrs| attrs.get(name));

        match self {
            Self::Cmp { attr, op, value } => attr_of(attr).is_some_and(|present| {
                same_family(present, value)
                    && op.matches(KeyValue::from(present.clone()).cmp(&KeyValue::from(value.clone())))
            }),
            Self::Between { attr, lo, hi } => attr_of(attr).is_some_and(|present| {
                if !same_family(present, lo) {
                    return false;
                }
                let present = KeyValue::from(present.clone());
                present >= KeyValue::from(lo.clone()) && present <= KeyValue::from(hi.clone())
            }),
            Self::BeginsWith { attr, prefix } => attr_of(attr).is_some_and(|present| {
                match (present, prefix) {
                    (Value::Str(s), Value::Str(p)) => s.starts_with(p.as_str()),
                    _ => false,
                }
            }),
            Self::Contains { attr, operand } => attr_of(attr).is_some_and(|present| {
                match present {
                    Value::Str(s) => operand
                        .as_str()
                        .is_some_and(|needle| s.contains(needle)),
                    Value::List(items) => items.contains(operand),
                    _ => false,
                }
            }),
            Self::Exists { attr } => attr_of(attr).is_some(),
            Self::NotExists { attr } => attr_of(attr).is_none(),
            Self::And(left, right) => left.eval(row) && right.eval(row),
            Self::Or(left, right) => left.eval(row) || right.eval(row),
            Self::Not(inner) => !inner.eval(row),
        }
    }
}

/// Comparing values of different families is always false, never an
/// order.
fn same_family(a: &Value, b: &Value) -> bool {
    a.kind() == b.kind() || (a.is_numeric() && b.is_numeric())
}

///
/// UpdateAction
///

#[derive(Clone, Debug)]
pub(crate) enum UpdateAction {
    Set { attr: String, value: Value },
    /// `#a = #a + :v`, the numeric self-increment.
    Add { attr: String, value: Value },
    Remove { attr: String },
}

/// Apply parsed update actions to a row in place.
pub(crate) fn apply_update(actions: &[UpdateAction], row: &mut Attrs) -> Result<(), StoreError> {
    for action in actions {
        match action {
            UpdateAction::Set { attr, value } => {
                row.insert(attr.clone(), value.clone());
            }
            UpdateAction::Add { attr, value } => {
                let current = row.get(attr).ok_or_else(|| StoreError::Validation {
                    message: format!("cannot add to missing attribute '{attr}'"),
                })?;
                let next = current.checked_add(value).ok_or_else(|| {
                    StoreError::Validation {
                        message: format!("non-numeric or overflowing add on '{attr}'"),
                    }
                })?;
                row.insert(attr.clone(), next);
            }
            UpdateAction::Remove { attr } => {
                row.remove(attr);
            }
        }
    }
    Ok(())
}

///
/// Tokenizer
///

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Attr(String),
    Literal(Value),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str, names: &ExprNames, values: &ExprValues) -> Result<Vec<Token>, StoreError> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut idx = 0;

    let err = |message: String| StoreError::Validation { message };

    while idx < bytes.len() {
        let ch = bytes[idx] as char;
        match ch {
            ' ' | '\t' | '\n' => idx += 1,
            '(' => {
                tokens.push(Token::LParen);
                idx += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                idx += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                idx += 1;
            }
            '+' => {
                tokens.push(Token::Op("+"));
                idx += 1;
            }
            '=' => {
                tokens.push(Token::Op("="));
                idx += 1;
            }
            '<' => {
                if bytes.get(idx + 1) == Some(&b'>') {
                    tokens.push(Token::Op("<>"));
                    idx += 2;
                } else if bytes.get(idx + 1) == Some(&b'=') {
                    tokens.push(Token::Op("<="));
                    idx += 2;
                } else {
                    tokens.push(Token::Op("<"));
                    idx += 1;
                }
            }
            '>' => {
                if bytes.get(idx + 1) == Some(&b'=') {
                    tokens.push(Token::Op(">="));
                    idx += 2;
                } else {
                    tokens.push(Token::Op(">"));
                    idx += 1;
                }
            }
            '#' | ':' => {
                let start = idx;
                idx += 1;
                while idx < bytes.len()
                    && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_')
                {
                    idx += 1;
                }
                let placeholder = &input[start..idx];
                if ch == '#' {
                    let attr = names.get(placeholder).ok_or_else(|| {
                        err(format!("unresolved name placeholder '{placeholder}'"))
                    })?;
                    tokens.push(Token::Attr(attr.clone()));
                } else {
                    let value = values.get(placeholder).ok_or_else(|| {
                        err(format!("unresolved value placeholder '{placeholder}'"))
                    })?;
                    tokens.push(Token::Literal(value.clone()));
                }
            }
            _ if ch.is_ascii_alphabetic() || ch == '_' => {
                let start = idx;
                while idx < bytes.len()
                    && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_')
                {
                    idx += 1;
                }
                tokens.push(Token::Ident(input[start..idx].to_string()));
            }
            other => return Err(err(format!("unexpected character '{other}'"))),
        }
    }

    Ok(tokens)
}

///
/// Condition parser (recursive descent)
///

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> StoreError {
        StoreError::Validation {
            message: message.into(),
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), StoreError> {
        match self.next() {
            Some(Token::Op(found)) if found == op => Ok(()),
            other => Err(self.error(format!("expected '{op}', found {other:?}"))),
        }
    }

    fn expect_ident(&mut self, keyword: &str) -> Result<(), StoreError> {
        match self.next() {
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword) => Ok(()),
            other => Err(self.error(format!("expected '{keyword}', found {other:?}"))),
        }
    }

    fn expect_literal(&mut self) -> Result<Value, StoreError> {
        match self.next() {
            Some(Token::Literal(value)) => Ok(value),
            other => Err(self.error(format!("expected a value placeholder, found {other:?}"))),
        }
    }

    fn expect_attr(&mut self) -> Result<String, StoreError> {
        match self.next() {
            Some(Token::Attr(attr)) => Ok(attr),
            other => Err(self.error(format!("expected an attribute placeholder, found {other:?}"))),
        }
    }

    fn or_expr(&mut self) -> Result<Cond, StoreError> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case("OR")) {
            self.next();
            let right = self.and_expr()?;
            left = Cond::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Cond, StoreError> {
        let mut left = self.unary()?;
        while matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case("AND")) {
            self.next();
            let right = self.unary()?;
            left = Cond::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Cond, StoreError> {
        if matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case("NOT")) {
            self.next();
            return Ok(Cond::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Cond, StoreError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    other => Err(self.error(format!("expected ')', found {other:?}"))),
                }
            }
            Some(Token::Ident(function)) => self.function(&function),
            Some(Token::Attr(attr)) => self.comparison(attr),
            other => Err(self.error(format!("unexpected token {other:?}"))),
        }
    }

    fn function(&mut self, function: &str) -> Result<Cond, StoreError> {
        match self.next() {
            Some(Token::LParen) => {}
            other => return Err(self.error(format!("expected '(', found {other:?}"))),
        }
        let attr = self.expect_attr()?;

        let cond = match function.to_ascii_lowercase().as_str() {
            "attribute_exists" => Cond::Exists { attr },
            "attribute_not_exists" => Cond::NotExists { attr },
            "begins_with" => {
                match self.next() {
                    Some(Token::Comma) => {}
                    other => return Err(self.error(format!("expected ',', found {other:?}"))),
                }
                let prefix = self.expect_literal()?;
                Cond::BeginsWith { attr, prefix }
            }
            "contains" => {
                match self.next() {
                    Some(Token::Comma) => {}
                    other => return Err(self.error(format!("expected ',', found {other:?}"))),
                }
                let operand = self.expect_literal()?;
                Cond::Contains { attr, operand }
            }
            other => return Err(self.error(format!("unknown function '{other}'"))),
        };

        match self.next() {
            Some(Token::RParen) => Ok(cond),
            other => Err(self.error(format!("expected ')', found {other:?}"))),
        }
    }

    fn comparison(&mut self, attr: String) -> Result<Cond, StoreError> {
        match self.next() {
            Some(Token::Op(op)) => {
                let op = match op {
                    "=" => CmpOp::Eq,
                    "<>" => CmpOp::Ne,
                    "<" => CmpOp::Lt,
                    "<=" => CmpOp::Le,
                    ">" => CmpOp::Gt,
                    ">=" => CmpOp::Ge,
                    other => return Err(self.error(format!("unknown operator '{other}'"))),
                };
                let value = self.expect_literal()?;
                Ok(Cond::Cmp { attr, op, value })
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("BETWEEN") => {
                let lo = self.expect_literal()?;
                self.expect_ident("AND")?;
                let hi = self.expect_literal()?;
                Ok(Cond::Between { attr, lo, hi })
            }
            other => Err(self.error(format!("expected a comparison, found {other:?}"))),
        }
    }
}

/// Parse one condition or filter expression.
pub(crate) fn parse_condition(
    input: &str,
    names: &ExprNames,
    values: &ExprValues,
) -> Result<Cond, StoreError> {
    let tokens = tokenize(input, names, values)?;
    let mut parser = Parser { tokens, pos: 0 };
    let cond = parser.or_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(StoreError::Validation {
            message: format!("trailing tokens in expression '{input}'"),
        });
    }
    Ok(cond)
}

/// Parse one update expression (`SET …` / `REMOVE …`).
pub(crate) fn parse_update(
    input: &str,
    names: &ExprNames,
    values: &ExprValues,
) -> Result<Vec<UpdateAction>, StoreError> {
    let tokens = tokenize(input, names, values)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut actions = Vec::new();

    while let Some(token) = parser.next() {
        let Token::Ident(section) = token else {
            return Err(parser.error(format!("expected SET or REMOVE, found {token:?}")));
        };

        match section.to_ascii_uppercase().as_str() {
            "SET" => loop {
                let attr = parser.expect_attr()?;
                parser.expect_op("=")?;
                match parser.next() {
                    Some(Token::Literal(value)) => {
                        actions.push(UpdateAction::Set { attr, value });
                    }
                    Some(Token::Attr(operand)) => {
                        if operand != attr {
                            return Err(parser.error(
                                "self-reference in SET must target the assigned attribute",
                            ));
                        }
                        parser.expect_op("+")?;
                        let value = parser.expect_literal()?;
                        actions.push(UpdateAction::Add { attr, value });
                    }
                    other => {
                        return Err(parser.error(format!("unexpected SET operand {other:?}")));
                    }
                }
                if matches!(parser.peek(), Some(Token::Comma)) {
                    parser.next();
                } else {
                    break;
                }
            },
            "REMOVE" => loop {
                let attr = parser.expect_attr()?;
                actions.push(UpdateAction::Remove { attr });
                if matches!(parser.peek(), Some(Token::Comma)) {
                    parser.next();
                } else {
                    break;
                }
            },
            other => {
                return Err(parser.error(format!("unknown update section '{other}'")));
            }
        }
    }

    Ok(actions)
}

///
/// TESTS
///
